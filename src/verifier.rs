/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    container_spec::{ContainerSpec, Measurement},
    control_plane::{self, ControlPlaneClient, WaitOutcome},
    error::{Bound, CheckError},
};
use colored::Colorize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Converts a cumulative `cpuacct.usage` reading into cores used over the run.
pub fn usage_in_cores(usage_ns: u64, duration: Duration) -> f64 {
    usage_ns as f64 / NANOS_PER_SEC / duration.as_secs_f64()
}

/// Checks the measured usage against the container's declared bounds.
pub fn check_bounds(spec: &ContainerSpec, usage: f64) -> Result<(), CheckError> {
    if spec.limit > 0.0 {
        let threshold = spec.limit + spec.tolerance;
        if !(usage < threshold) {
            return Err(CheckError::BoundViolation {
                report: spec.report(Some(usage)),
                bound: Bound::Limit,
                threshold,
            });
        }
    }

    if spec.guarantee > 0.0 {
        let threshold = spec.guarantee - spec.tolerance;
        if !(usage > threshold) {
            return Err(CheckError::BoundViolation {
                report: spec.report(Some(usage)),
                bound: Bound::Guarantee,
                threshold,
            });
        }
    }

    Ok(())
}

/// Waits for the container to finish, measures it and checks it against its bounds. The
/// container is destroyed whatever the outcome.
///
/// # Arguments
///
/// * client - the control plane
/// * spec - a released container
/// * cancel - cancels the wait; the container is still destroyed
///
/// # Returns
///
/// The measured usage in cores, or the reason the container failed.
pub async fn check(
    client: &dyn ControlPlaneClient,
    spec: &ContainerSpec,
    cancel: &CancellationToken,
) -> Result<Measurement, CheckError> {
    let res = measure(client, spec, cancel).await;

    let destroyed = client.destroy(&spec.handle).await;
    match (res, destroyed) {
        (Ok(measurement), Ok(())) => Ok(measurement),
        (Ok(measurement), Err(err)) => Err(CheckError::control_plane(
            spec.report(Some(measurement.usage)),
            "destroy",
            err,
        )),
        (Err(check_err), Err(destroy_err)) => {
            warn!(
                "Failed to destroy container {} after a failed check\n{:#}",
                spec.name, destroy_err
            );
            Err(check_err)
        }
        (Err(check_err), Ok(())) => Err(check_err),
    }
}

async fn measure(
    client: &dyn ControlPlaneClient,
    spec: &ContainerSpec,
    cancel: &CancellationToken,
) -> Result<Measurement, CheckError> {
    let deadline = spec.deadline();
    debug!("waiting for {}: {}", spec.name, spec.command);

    let waited = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(CheckError::Cancelled { report: spec.report(None) });
        }
        waited = client.wait(&spec.handle, deadline) => waited,
    };
    let outcome = waited.map_err(|e| CheckError::control_plane(spec.report(None), "wait", e))?;

    match outcome {
        WaitOutcome::TimedOut => {
            return Err(CheckError::Timeout {
                report: spec.report(None),
                timeout_ms: deadline.as_millis(),
            })
        }
        WaitOutcome::Exited(name) if name != spec.name => {
            return Err(CheckError::ControlPlane {
                report: spec.report(None),
                operation: "wait",
                reason: format!("wait returned container {}", name),
            })
        }
        WaitOutcome::Exited(_) => {}
    }

    let raw = get(client, spec, None, control_plane::CPUACCT_USAGE).await?;
    let usage_ns = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| CheckError::ControlPlane {
            report: spec.report(None),
            operation: "get cpuacct.usage",
            reason: format!("unparsable value {:?}: {}", raw, e),
        })?;
    let usage = usage_in_cores(usage_ns, spec.duration);

    info!("{} : cpuacct usage: {:.3}", spec.name, usage);
    println!(
        "\t{} {}",
        spec.name.bright_black(),
        format!("{:.3}c", usage).cyan()
    );

    let exit_status = get(client, spec, Some(usage), control_plane::EXIT_STATUS).await?;
    if exit_status.trim() != "0" {
        let stderr = get(client, spec, Some(usage), control_plane::STDERR).await?;
        return Err(CheckError::Workload {
            report: spec.report(Some(usage)),
            exit_status: exit_status.trim().to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    check_bounds(spec, usage)?;

    Ok(Measurement {
        name: spec.name.clone(),
        policy: spec.policy,
        limit: spec.limit,
        guarantee: spec.guarantee,
        tolerance: spec.tolerance,
        usage,
    })
}

async fn get(
    client: &dyn ControlPlaneClient,
    spec: &ContainerSpec,
    measured: Option<f64>,
    key: &'static str,
) -> Result<String, CheckError> {
    client
        .get_property(&spec.handle, key)
        .await
        .map_err(|e| CheckError::control_plane(spec.report(measured), "get", e))
}
