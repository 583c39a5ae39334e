/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::scenario::ScenarioPlan;
use std::{fmt, path::Path};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::debug;

/// Control file that only exists when the kernel accounts real-time CPU time per cgroup.
pub const RT_ACCOUNTING_PATH: &str = "/sys/fs/cgroup/cpu/cpu.rt_runtime_us";

/// What the host can do, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct HostCapabilities {
    pub cpu_count: usize,
    pub rt_accounting: bool,
    pub cpu_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoRealtimeAccounting,
    NotEnoughCores { required: usize, available: usize },
}
impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRealtimeAccounting => {
                write!(f, "host lacks real-time cpu accounting")
            }
            SkipReason::NotEnoughCores {
                required,
                available,
            } => write!(f, "needs {} cores, host has {}", required, available),
        }
    }
}

impl HostCapabilities {
    pub fn new(cpu_count: usize, rt_accounting: bool) -> Self {
        Self {
            cpu_count,
            rt_accounting,
            cpu_name: None,
        }
    }

    /// Inspects the running host.
    ///
    /// # Arguments
    /// * rt_accounting_path - control file whose presence signals real-time accounting support
    pub fn probe(rt_accounting_path: &Path) -> Self {
        let cpu_count = num_cpus::get();
        let rt_accounting = rt_accounting_path.exists();
        let cpu_name = find_cpu();

        debug!(
            "probed host: {} cores, rt accounting {}, cpu {:?}",
            cpu_count, rt_accounting, cpu_name
        );

        Self {
            cpu_count,
            rt_accounting,
            cpu_name,
        }
    }

    /// Returns why the plan cannot run on this host, or None if it can.
    pub fn skip_reason(&self, plan: &ScenarioPlan) -> Option<SkipReason> {
        if plan.needs_realtime() && !self.rt_accounting {
            return Some(SkipReason::NoRealtimeAccounting);
        }

        if plan.min_cpus > self.cpu_count {
            return Some(SkipReason::NotEnoughCores {
                required: plan.min_cpus,
                available: self.cpu_count,
            });
        }

        None
    }
}

fn find_cpu() -> Option<String> {
    let sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    sys.cpus().first().map(|cpu| cpu.brand().to_string())
}
