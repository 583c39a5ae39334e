/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod portoctl;

use async_trait::async_trait;
use std::{fmt, time::Duration};

// properties written when preparing a container
pub const CPU_POLICY: &str = "cpu_policy";
pub const CPU_LIMIT: &str = "cpu_limit";
pub const CPU_GUARANTEE: &str = "cpu_guarantee";
pub const CWD: &str = "cwd";
pub const COMMAND: &str = "command";
pub const STDIN_PATH: &str = "stdin_path";

// properties read back when checking a container
pub const CPUACCT_USAGE: &str = "cpuacct.usage";
pub const EXIT_STATUS: &str = "exit_status";
pub const STDERR: &str = "stderr";

/// Reference to a container registered with the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    name: String,
}
impl ContainerHandle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The named container finished.
    Exited(String),
    TimedOut,
}

/// The narrow property protocol through which containers are created, configured, run and
/// inspected. Implementations must be safe to call concurrently for distinct containers.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    async fn create_container(&self, name: &str) -> anyhow::Result<ContainerHandle>;

    async fn destroy(&self, handle: &ContainerHandle) -> anyhow::Result<()>;

    async fn set_property(
        &self,
        handle: &ContainerHandle,
        key: &str,
        value: &str,
    ) -> anyhow::Result<()>;

    async fn get_property(&self, handle: &ContainerHandle, key: &str) -> anyhow::Result<String>;

    async fn start(&self, handle: &ContainerHandle) -> anyhow::Result<()>;

    /// Blocks until the container finishes or `timeout` elapses.
    async fn wait(
        &self,
        handle: &ContainerHandle,
        timeout: Duration,
    ) -> anyhow::Result<WaitOutcome>;
}
