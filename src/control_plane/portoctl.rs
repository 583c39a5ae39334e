/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{ContainerHandle, ControlPlaneClient, WaitOutcome};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Control plane client driving the `portoctl` command line tool.
#[derive(Debug, Clone)]
pub struct PortoCtl {
    binary: String,
    request_timeout: Duration,
}
impl PortoCtl {
    pub fn new(binary: &str, request_timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            request_timeout,
        }
    }

    /// Runs `portoctl` with the given arguments and returns its trimmed stdout.
    async fn invoke(&self, args: &[&str]) -> anyhow::Result<String> {
        debug!("{} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .context(format!("Failed to run {}", self.binary))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let error_message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(anyhow!(
                "{} {} failed ({}): {}",
                self.binary,
                args.join(" "),
                output.status,
                error_message
            ))
        }
    }

    /// Same as `invoke` but gives up after the configured request timeout.
    async fn request(&self, args: &[&str]) -> anyhow::Result<String> {
        tokio::time::timeout(self.request_timeout, self.invoke(args))
            .await
            .map_err(|_| {
                anyhow!(
                    "{} {} did not answer within {:?}",
                    self.binary,
                    args.join(" "),
                    self.request_timeout
                )
            })?
    }
}

#[async_trait]
impl ControlPlaneClient for PortoCtl {
    async fn create_container(&self, name: &str) -> anyhow::Result<ContainerHandle> {
        self.request(&["create", name]).await?;
        Ok(ContainerHandle::new(name))
    }

    async fn destroy(&self, handle: &ContainerHandle) -> anyhow::Result<()> {
        self.request(&["destroy", handle.name()]).await.map(|_| ())
    }

    async fn set_property(
        &self,
        handle: &ContainerHandle,
        key: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        self.request(&["set", handle.name(), key, value])
            .await
            .map(|_| ())
    }

    async fn get_property(&self, handle: &ContainerHandle, key: &str) -> anyhow::Result<String> {
        self.request(&["get", handle.name(), key]).await
    }

    async fn start(&self, handle: &ContainerHandle) -> anyhow::Result<()> {
        self.request(&["start", handle.name()]).await.map(|_| ())
    }

    async fn wait(
        &self,
        handle: &ContainerHandle,
        timeout: Duration,
    ) -> anyhow::Result<WaitOutcome> {
        // the wait is bounded by the caller's timeout, not the request timeout
        match tokio::time::timeout(timeout, self.invoke(&["wait", handle.name()])).await {
            Err(_) => Ok(WaitOutcome::TimedOut),
            Ok(res) => {
                let out = res?;
                let name = out.lines().last().unwrap_or(handle.name()).trim();
                let name = if name.is_empty() { handle.name() } else { name };
                Ok(WaitOutcome::Exited(name.to_string()))
            }
        }
    }
}

#[cfg(all(test, target_family = "unix"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdout_of_a_successful_request_is_returned() -> anyhow::Result<()> {
        // `echo` stands in for portoctl and echoes the arguments back
        let client = PortoCtl::new("echo", Duration::from_secs(5));
        let handle = ContainerHandle::new("ct");

        let value = client.get_property(&handle, "exit_status").await?;
        assert_eq!(value, "get ct exit_status");

        Ok(())
    }

    #[tokio::test]
    async fn failing_request_is_an_error() {
        let client = PortoCtl::new("false", Duration::from_secs(5));
        let res = client.create_container("ct").await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let client = PortoCtl::new("/nonexistent/portoctl", Duration::from_secs(5));
        let res = client.start(&ContainerHandle::new("ct")).await;
        assert!(res.is_err());
    }
}
