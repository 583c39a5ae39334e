/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::container_spec::ContainerReport;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// measured must stay below limit + tolerance
    Limit,
    /// measured must stay above guarantee - tolerance
    Guarantee,
    /// measured must stay above share - tolerance in an equal split
    SplitShare,
}
impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Limit => write!(f, "at most"),
            Bound::Guarantee | Bound::SplitShare => write!(f, "at least"),
        }
    }
}

/// Reasons a scenario fails. None of them are retried.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The control plane refused a property while the container was being prepared.
    #[error("configuration rejected: {report}: {key}={value}: {reason}")]
    Configuration {
        report: ContainerReport,
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to arm gate: {report}: {reason}")]
    Gate {
        report: ContainerReport,
        reason: String,
    },

    /// The control plane could not be reached or answered something unusable.
    #[error("control plane {operation} failed: {report}: {reason}")]
    ControlPlane {
        report: ContainerReport,
        operation: &'static str,
        reason: String,
    },

    #[error("deadline exceeded: {report} did not finish within {timeout_ms} ms")]
    Timeout {
        report: ContainerReport,
        timeout_ms: u128,
    },

    #[error("workload exited with status {exit_status}: {report}, stderr: {stderr}")]
    Workload {
        report: ContainerReport,
        exit_status: String,
        stderr: String,
    },

    #[error("bound violation: {report}: usage should be {bound} {threshold:.3}c")]
    BoundViolation {
        report: ContainerReport,
        bound: Bound,
        threshold: f64,
    },

    /// The wait for a running container was interrupted.
    #[error("cancelled while waiting: {report}")]
    Cancelled { report: ContainerReport },

    /// The run was interrupted between scenarios.
    #[error("run cancelled before scenario {scenario}")]
    RunCancelled { scenario: String },
}
impl CheckError {
    pub(crate) fn control_plane(
        report: ContainerReport,
        operation: &'static str,
        err: anyhow::Error,
    ) -> Self {
        CheckError::ControlPlane {
            report,
            operation,
            reason: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_spec::CpuPolicy;

    fn report(measured: Option<f64>) -> ContainerReport {
        ContainerReport {
            name: "schedcheck-x-3-normal_one_core".to_string(),
            policy: CpuPolicy::Normal,
            limit: 1.0,
            guarantee: 0.0,
            tolerance: 0.75,
            measured,
        }
    }

    #[test]
    fn bound_violation_message_is_self_contained() {
        let err = CheckError::BoundViolation {
            report: report(Some(1.9)),
            bound: Bound::Limit,
            threshold: 1.75,
        };
        let msg = err.to_string();

        assert!(msg.starts_with("bound violation"));
        assert!(msg.contains("normal_one_core"));
        assert!(msg.contains("measured 1.900c"));
        assert!(msg.contains("at most 1.750c"));
    }

    #[test]
    fn control_plane_error_keeps_the_cause_chain() {
        let cause = anyhow::anyhow!("socket closed").context("portoctl get failed");
        let err = CheckError::control_plane(report(Some(0.42)), "get", cause);
        let msg = err.to_string();

        assert!(msg.contains("portoctl get failed"));
        assert!(msg.contains("socket closed"));
        assert!(msg.contains("limit 1c"));
        assert!(msg.contains("measured 0.420c"));
    }

    #[test]
    fn cancelled_wait_names_the_container_bounds() {
        let err = CheckError::Cancelled {
            report: report(None),
        };
        let msg = err.to_string();

        assert!(msg.contains("normal_one_core"));
        assert!(msg.contains("tolerance 0.750"));
        assert!(msg.contains("measured n/a"));
    }
}
