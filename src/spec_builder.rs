/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    config::RunSettings,
    container_spec::{format_cores, ContainerReport, ContainerSpec, CpuPolicy},
    control_plane::{self, ContainerHandle, ControlPlaneClient},
    error::CheckError,
    gate::Gate,
    tolerance::tolerance,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Builds the shell command run inside each container: block on stdin until the gate opens, then
/// saturate `workers` cores for `duration`.
pub fn workload_command(stress: &str, workers: usize, duration: Duration) -> anyhow::Result<String> {
    let script = format!(
        "read; {} -c {} -t {}",
        shlex::try_quote(stress)?,
        workers,
        duration.as_secs()
    );
    Ok(format!("bash -c {}", shlex::try_quote(&script)?))
}

async fn set(
    client: &dyn ControlPlaneClient,
    handle: &ContainerHandle,
    report: &ContainerReport,
    key: &str,
    value: &str,
) -> Result<(), CheckError> {
    client
        .set_property(handle, key, value)
        .await
        .map_err(|e| CheckError::Configuration {
            report: report.clone(),
            key: key.to_string(),
            value: value.to_string(),
            reason: format!("{:#}", e),
        })
}

/// Registers a container with the control plane, configures it and starts its workload, which
/// then sits blocked on its gate until released.
///
/// # Arguments
///
/// * client - the control plane
/// * settings - run wide settings (duration, stress binary, tolerance base...)
/// * name - unique container name
/// * policy - cpu scheduling policy
/// * limit - cpu limit in cores, 0 for none
/// * guarantee - cpu guarantee in cores, 0 for none
///
/// # Returns
///
/// The prepared container, or the first error. A container that was created before the error is
/// destroyed again before returning.
pub async fn prepare(
    client: &dyn ControlPlaneClient,
    settings: &RunSettings,
    name: &str,
    policy: CpuPolicy,
    limit: f64,
    guarantee: f64,
) -> Result<ContainerSpec, CheckError> {
    let tolerance = tolerance(limit, guarantee, settings.eps_base);
    let report = ContainerReport::declared(name, policy, limit, guarantee, tolerance);

    let handle = client
        .create_container(name)
        .await
        .map_err(|e| CheckError::control_plane(report.clone(), "create", e))?;

    match configure(client, settings, &handle, &report).await {
        Ok(spec) => Ok(spec),
        Err(err) => {
            if let Err(destroy_err) = client.destroy(&handle).await {
                warn!(
                    "Failed to destroy half-prepared container {}\n{:#}",
                    handle, destroy_err
                );
            }
            Err(err)
        }
    }
}

async fn configure(
    client: &dyn ControlPlaneClient,
    settings: &RunSettings,
    handle: &ContainerHandle,
    report: &ContainerReport,
) -> Result<ContainerSpec, CheckError> {
    let name = handle.name();
    let (policy, limit, guarantee) = (report.policy, report.limit, report.guarantee);

    set(client, handle, report, control_plane::CPU_POLICY, policy.as_property()).await?;
    if limit > 0.0 {
        set(client, handle, report, control_plane::CPU_LIMIT, &format_cores(limit)).await?;
    }
    if guarantee > 0.0 {
        set(client, handle, report, control_plane::CPU_GUARANTEE, &format_cores(guarantee)).await?;
    }

    let cwd = settings.cwd.to_string_lossy();
    set(client, handle, report, control_plane::CWD, &cwd).await?;

    let command = workload_command(&settings.stress, settings.workers, settings.duration)
        .map_err(|e| CheckError::Configuration {
            report: report.clone(),
            key: control_plane::COMMAND.to_string(),
            value: settings.stress.clone(),
            reason: format!("{:#}", e),
        })?;
    set(client, handle, report, control_plane::COMMAND, &command).await?;

    let gate = Gate::new().map_err(|e| CheckError::Gate {
        report: report.clone(),
        reason: format!("{:#}", e),
    })?;
    set(client, handle, report, control_plane::STDIN_PATH, gate.stdin_path()).await?;

    client
        .start(handle)
        .await
        .map_err(|e| CheckError::control_plane(report.clone(), "start", e))?;

    debug!(
        "prepared {} (policy {}, limit {}, guarantee {}, tolerance {:.3})",
        name,
        policy,
        format_cores(limit),
        format_cores(guarantee),
        report.tolerance
    );

    Ok(ContainerSpec {
        name: name.to_string(),
        handle: handle.clone(),
        policy,
        limit,
        guarantee,
        command,
        gate,
        tolerance: report.tolerance,
        duration: settings.duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_blocks_on_stdin_before_stressing() -> anyhow::Result<()> {
        let command = workload_command("stress", 4, Duration::from_millis(1000))?;
        let words = shlex::split(&command).expect("command should be POSIX compliant");

        assert_eq!(words, ["bash", "-c", "read; stress -c 4 -t 1"]);
        Ok(())
    }

    #[test]
    fn stress_path_with_spaces_is_quoted() -> anyhow::Result<()> {
        let command = workload_command("/opt/my tools/stress", 2, Duration::from_secs(3))?;
        let words = shlex::split(&command).expect("command should be POSIX compliant");
        let inner = shlex::split(&words[2]).expect("script should be POSIX compliant");

        assert_eq!(inner, ["read;", "/opt/my tools/stress", "-c", "2", "-t", "3"]);
        Ok(())
    }
}
