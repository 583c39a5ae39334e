/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{control_plane::ContainerHandle, gate::Gate};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

#[derive(Debug, Deserialize, PartialEq, Eq, Serialize, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CpuPolicy {
    Normal,
    #[serde(rename = "rt")]
    RealTime,
}
impl CpuPolicy {
    /// The value of the `cpu_policy` property for this policy.
    pub fn as_property(&self) -> &'static str {
        match self {
            CpuPolicy::Normal => "normal",
            CpuPolicy::RealTime => "rt",
        }
    }

    pub fn is_realtime(&self) -> bool {
        matches!(self, CpuPolicy::RealTime)
    }
}
impl fmt::Display for CpuPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_property())
    }
}

/// Formats a core count the way the control plane expects it, e.g. `1.5c`.
///
/// Values are rounded to three decimal places and trailing zeros are dropped so that a split such
/// as `2.0 / 3.0` becomes `0.667c` rather than a seventeen digit float.
pub fn format_cores(cores: f64) -> String {
    let rounded = format!("{:.3}", cores);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{}c", trimmed)
}

/// A single workload under test, registered with the control plane and held at its gate.
#[derive(Debug)]
pub struct ContainerSpec {
    pub name: String,
    pub handle: ContainerHandle,
    pub policy: CpuPolicy,
    pub limit: f64,
    pub guarantee: f64,
    pub command: String,
    pub gate: Gate,
    pub tolerance: f64,
    pub duration: Duration,
}
impl ContainerSpec {
    /// Snapshot of the declared configuration, used to describe failures and results.
    pub fn report(&self, measured: Option<f64>) -> ContainerReport {
        ContainerReport {
            name: self.name.clone(),
            policy: self.policy,
            limit: self.limit,
            guarantee: self.guarantee,
            tolerance: self.tolerance,
            measured,
        }
    }

    /// Longest time the verifier waits for the workload to finish.
    pub fn deadline(&self) -> Duration {
        self.duration * 2
    }
}

/// Everything needed to diagnose a container's result without rerunning it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerReport {
    pub name: String,
    pub policy: CpuPolicy,
    pub limit: f64,
    pub guarantee: f64,
    pub tolerance: f64,
    pub measured: Option<f64>,
}
impl ContainerReport {
    /// Report for a container that has not been measured yet.
    pub fn declared(name: &str, policy: CpuPolicy, limit: f64, guarantee: f64, tolerance: f64) -> Self {
        Self {
            name: name.to_string(),
            policy,
            limit,
            guarantee,
            tolerance,
            measured: None,
        }
    }
}
impl fmt::Display for ContainerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "container {} (policy {}, limit {}, guarantee {}, tolerance {:.3}, measured ",
            self.name,
            self.policy,
            format_cores(self.limit),
            format_cores(self.guarantee),
            self.tolerance
        )?;
        match self.measured {
            Some(usage) => write!(f, "{:.3}c)", usage),
            None => write!(f, "n/a)"),
        }
    }
}

/// Realised CPU usage of a container that passed its checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub name: String,
    pub policy: CpuPolicy,
    pub limit: f64,
    pub guarantee: f64,
    pub tolerance: f64,
    pub usage: f64,
}
impl Measurement {
    pub fn report(&self) -> ContainerReport {
        ContainerReport {
            name: self.name.clone(),
            policy: self.policy,
            limit: self.limit,
            guarantee: self.guarantee,
            tolerance: self.tolerance,
            measured: Some(self.usage),
        }
    }
}
