/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    config::RunSettings,
    container_spec::{ContainerSpec, CpuPolicy, Measurement},
    control_plane::ControlPlaneClient,
    error::{Bound, CheckError},
    host::{HostCapabilities, SkipReason},
    scenario::{MemberPlan, ScenarioKind, ScenarioPlan},
    spec_builder, verifier,
};
use chrono::{DateTime, Utc};
use colored::Colorize;
use futures_util::future::join_all;
use nanoid::nanoid;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioStatus {
    Passed,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub description: String,
    pub status: ScenarioStatus,
    pub measurements: Vec<Measurement>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

/// Result of running a list of scenarios. Holds the error that stopped the run, if any.
#[derive(Debug)]
pub struct SuiteReport {
    pub run_id: String,
    pub outcomes: Vec<ScenarioOutcome>,
    pub failure: Option<CheckError>,
}
impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn count(&self, pred: impl Fn(&ScenarioStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Checks that an equal split was actually shared out evenly: every member got at least its
/// share less tolerance.
///
/// Members reach this point only after passing their limit check (`share + tolerance`), so
/// together with the floor the sum is always within `total` plus or minus the summed tolerances.
pub fn check_split(total: f64, measurements: &[Measurement]) -> Result<(), CheckError> {
    if measurements.is_empty() {
        return Ok(());
    }

    let share = total / measurements.len() as f64;
    for measurement in measurements {
        let floor = share - measurement.tolerance;
        if !(measurement.usage >= floor) {
            return Err(CheckError::BoundViolation {
                report: measurement.report(),
                bound: Bound::SplitShare,
                threshold: floor,
            });
        }
    }

    Ok(())
}

/// Builds, releases and checks groups of containers through a control plane client.
pub struct Orchestrator {
    client: Arc<dyn ControlPlaneClient>,
    host: HostCapabilities,
    settings: RunSettings,
    run_id: String,
    cancel: CancellationToken,
}
impl Orchestrator {
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        host: HostCapabilities,
        settings: RunSettings,
    ) -> Self {
        Self {
            client,
            host,
            settings,
            run_id: nanoid!(5, &nanoid::alphabet::SAFE),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the run when the token is cancelled. Containers are still torn down.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Container names are unique per run and per scenario.
    pub fn container_name(&self, ordinal: usize, suffix: &str) -> String {
        format!(
            "{}-{}-{}-{}",
            self.settings.name_prefix, self.run_id, ordinal, suffix
        )
    }

    pub async fn prepare(
        &self,
        name: &str,
        policy: CpuPolicy,
        limit: f64,
        guarantee: f64,
    ) -> Result<ContainerSpec, CheckError> {
        spec_builder::prepare(
            self.client.as_ref(),
            &self.settings,
            name,
            policy,
            limit,
            guarantee,
        )
        .await
    }

    /// Lets the container's workload start consuming CPU.
    pub fn release(spec: &mut ContainerSpec) {
        spec.gate.release();
    }

    pub async fn check(&self, spec: &ContainerSpec) -> Result<Measurement, CheckError> {
        verifier::check(self.client.as_ref(), spec, &self.cancel).await
    }

    /// Prepares every member, then releases them all, then checks them all.
    ///
    /// Teardown is all-or-nothing: if preparing a member fails the members prepared so far are
    /// destroyed, and once released every member is checked (and so destroyed) even when another
    /// member has already failed. The first failure in member order is returned.
    pub async fn run_group(
        &self,
        ordinal: usize,
        members: &[MemberPlan],
    ) -> Result<Vec<Measurement>, CheckError> {
        let mut specs = Vec::with_capacity(members.len());
        for member in members {
            let name = self.container_name(ordinal, &member.suffix);
            match self
                .prepare(&name, member.policy, member.limit, member.guarantee)
                .await
            {
                Ok(spec) => specs.push(spec),
                Err(err) => {
                    self.teardown(&mut specs).await;
                    return Err(err);
                }
            }
        }

        // kick everyone before anyone is checked
        for spec in specs.iter_mut() {
            Self::release(spec);
        }

        let results = join_all(specs.iter().map(|spec| self.check(spec))).await;

        let mut measurements = Vec::with_capacity(results.len());
        let mut first_err = None;
        for res in results {
            match res {
                Ok(measurement) => measurements.push(measurement),
                Err(err) if first_err.is_none() => first_err = Some(err),
                Err(err) => error!("{}", err),
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(measurements),
        }
    }

    async fn teardown(&self, specs: &mut Vec<ContainerSpec>) {
        for mut spec in specs.drain(..) {
            spec.gate.close();
            if let Err(err) = self.client.destroy(&spec.handle).await {
                warn!("Failed to destroy container {}\n{:#}", spec.name, err);
            }
        }
    }

    /// Splits `total` cores equally as a limit between `n` containers and checks both each
    /// member's limit and the fairness of the split.
    pub async fn split_limit(
        &self,
        ordinal: usize,
        prefix: &str,
        total: f64,
        n: usize,
        policy: CpuPolicy,
    ) -> Result<Vec<Measurement>, CheckError> {
        let plan = ScenarioPlan::split_limit(prefix, total, n, policy);
        self.run_scenario(ordinal, &plan).await
    }

    pub async fn run_scenario(
        &self,
        ordinal: usize,
        plan: &ScenarioPlan,
    ) -> Result<Vec<Measurement>, CheckError> {
        let measurements = self.run_group(ordinal, &plan.members).await?;

        if let ScenarioKind::EqualSplit { total } = plan.kind {
            check_split(total, &measurements)?;
        }

        Ok(measurements)
    }

    /// Runs the plans one after another, skipping those the host cannot run and stopping at
    /// the first failure.
    pub async fn run_suite(&self, plans: &[ScenarioPlan]) -> SuiteReport {
        let mut outcomes = vec![];
        let mut failure = None;

        for (ordinal, plan) in plans.iter().enumerate() {
            if self.cancel.is_cancelled() {
                failure = Some(CheckError::RunCancelled {
                    scenario: plan.name.clone(),
                });
                break;
            }

            let started_at = Utc::now();

            if let Some(reason) = self.host.skip_reason(plan) {
                println!(
                    "> skipping scenario {} {}",
                    plan.name.yellow(),
                    format!("({})", reason).bright_black()
                );
                info!("skipping {}: {}", plan.name, reason);
                outcomes.push(ScenarioOutcome {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                    status: ScenarioStatus::Skipped(reason),
                    measurements: vec![],
                    started_at,
                    elapsed_ms: 0,
                });
                continue;
            }

            println!(
                "> running scenario {} - {}",
                plan.name.green(),
                plan.description
            );
            let res = self.run_scenario(ordinal, plan).await;
            let elapsed_ms = (Utc::now() - started_at).num_milliseconds();

            match res {
                Ok(measurements) => {
                    info!("scenario {} passed in {} ms", plan.name, elapsed_ms);
                    outcomes.push(ScenarioOutcome {
                        name: plan.name.clone(),
                        description: plan.description.clone(),
                        status: ScenarioStatus::Passed,
                        measurements,
                        started_at,
                        elapsed_ms,
                    });
                }
                Err(err) => {
                    error!("scenario {} failed: {}", plan.name, err);
                    outcomes.push(ScenarioOutcome {
                        name: plan.name.clone(),
                        description: plan.description.clone(),
                        status: ScenarioStatus::Failed(err.to_string()),
                        measurements: vec![],
                        started_at,
                        elapsed_ms,
                    });
                    failure = Some(err);
                    break;
                }
            }
        }

        SuiteReport {
            run_id: self.run_id.clone(),
            outcomes,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(usage: f64, limit: f64, tolerance: f64) -> Measurement {
        Measurement {
            name: "ct".to_string(),
            policy: CpuPolicy::Normal,
            limit,
            guarantee: 0.0,
            tolerance,
            usage,
        }
    }

    #[test]
    fn fair_split_passes() {
        let ms = [measurement(0.74, 0.75, 0.5625), measurement(0.73, 0.75, 0.5625)];
        assert!(check_split(1.5, &ms).is_ok());
    }

    #[test]
    fn starved_member_fails_the_split() {
        let ms = [measurement(1.3, 0.75, 0.5625), measurement(0.1, 0.75, 0.5625)];
        let res = check_split(1.5, &ms);
        assert!(matches!(
            res,
            Err(CheckError::BoundViolation {
                bound: Bound::SplitShare,
                ..
            })
        ));
    }

    #[test]
    fn underused_budget_is_caught_by_the_share_floor() {
        // 6c split three ways: each member must reach 2.0 - 0.95
        let ms = [
            measurement(1.0, 2.0, 0.95),
            measurement(1.0, 2.0, 0.95),
            measurement(1.0, 2.0, 0.95),
        ];
        match check_split(6.0, &ms) {
            Err(CheckError::BoundViolation {
                bound: Bound::SplitShare,
                threshold,
                ..
            }) => assert!((threshold - 1.05).abs() < 1e-9),
            other => panic!("expected a split share violation, got {:?}", other),
        }
    }

    #[test]
    fn share_floor_is_inclusive() {
        let ms = [measurement(1.05, 2.0, 0.95), measurement(2.9, 2.0, 0.95)];
        assert!(check_split(4.0, &ms).is_ok());
    }

    #[test]
    fn empty_split_is_trivially_fair() {
        assert!(check_split(3.0, &[]).is_ok());
    }
}
