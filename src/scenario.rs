/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::container_spec::{format_cores, CpuPolicy};
use itertools::Itertools;

/// One container of a scenario, before anything is sent to the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberPlan {
    pub suffix: String,
    pub policy: CpuPolicy,
    pub limit: f64,
    pub guarantee: f64,
}
impl MemberPlan {
    pub fn new(suffix: &str, policy: CpuPolicy, limit: f64, guarantee: f64) -> Self {
        Self {
            suffix: suffix.to_string(),
            policy,
            limit,
            guarantee,
        }
    }

    /// A peer with neither limit nor guarantee, there only to compete for CPU.
    pub fn unconstrained(suffix: &str) -> Self {
        Self::new(suffix, CpuPolicy::Normal, 0.0, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioKind {
    SingleBound,
    /// `total` cores divided evenly as a limit across all members
    EqualSplit { total: f64 },
    GuaranteeContention,
    MixedPolicy,
    FixedLimits,
}

/// A group of containers that run concurrently and are checked together.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub name: String,
    pub description: String,
    pub kind: ScenarioKind,
    pub min_cpus: usize,
    pub members: Vec<MemberPlan>,
}
impl ScenarioPlan {
    pub fn single(name: &str, policy: CpuPolicy, limit: f64, guarantee: f64) -> Self {
        let description = if limit > 0.0 {
            format!("Set {} limit for single {} container", format_cores(limit), policy)
        } else {
            format!(
                "Set {} guarantee for single {} container",
                format_cores(guarantee),
                policy
            )
        };

        Self {
            name: name.to_string(),
            description,
            kind: ScenarioKind::SingleBound,
            min_cpus: 1,
            members: vec![MemberPlan::new(name, policy, limit, guarantee)],
        }
    }

    /// `total` cores split equally as a limit between `n` containers named `<prefix>_<i>`.
    pub fn split_limit(prefix: &str, total: f64, n: usize, policy: CpuPolicy) -> Self {
        let share = total / n as f64;
        let members = (0..n)
            .map(|i| MemberPlan::new(&format!("{}_{}", prefix, i), policy, share, 0.0))
            .collect_vec();

        Self {
            name: format!("{}_split", prefix),
            description: format!(
                "Split {} limit equally btwn {} {} containers",
                format_cores(total),
                n,
                policy
            ),
            kind: ScenarioKind::EqualSplit { total },
            min_cpus: 1,
            members,
        }
    }

    /// One guaranteed container competing with `peers` unconstrained ones.
    pub fn guarantee_vs_free(prefix: &str, guarantee: f64, peers: &[&str]) -> Self {
        let mut members = peers
            .iter()
            .map(|suffix| MemberPlan::unconstrained(&format!("{}_{}", prefix, suffix)))
            .collect_vec();
        members.push(MemberPlan::new(
            &format!("{}_guaranteed", prefix),
            CpuPolicy::Normal,
            0.0,
            guarantee,
        ));

        Self {
            name: format!("{}_guarantee", prefix),
            description: format!(
                "Set {} guarantee for 1 of {} containers",
                format_cores(guarantee),
                members.len()
            ),
            kind: ScenarioKind::GuaranteeContention,
            min_cpus: 1,
            members,
        }
    }

    pub fn requires_cpus(mut self, min_cpus: usize) -> Self {
        self.min_cpus = min_cpus;
        self
    }

    pub fn needs_realtime(&self) -> bool {
        self.members.iter().any(|m| m.policy.is_realtime())
    }
}

/// Every scenario of the CPU scheduling suite, in execution order, for a host with `cpu_count`
/// cores. Scenarios the host cannot run are still listed; the orchestrator skips them.
///
/// # Arguments
/// * cpu_count - logical cores on the host
/// * limit_share - fraction of the whole machine divided up by the split scenarios
pub fn canonical_suite(cpu_count: usize, limit_share: f64) -> Vec<ScenarioPlan> {
    let cores = cpu_count as f64;
    let share = cores * limit_share;
    let minus_one = cores - 1.0;
    let two_thirds = (cpu_count * 2 / 3) as f64;
    let half = (cpu_count / 2) as f64;

    let mut suite = vec![];

    for (policy, prefix) in [(CpuPolicy::Normal, "normal"), (CpuPolicy::RealTime, "rt")] {
        suite.push(ScenarioPlan::single(
            &format!("{}_one_core", prefix),
            policy,
            1.0,
            0.0,
        ));
        suite.push(
            ScenarioPlan::single(&format!("{}_one_and_half_core", prefix), policy, 1.5, 0.0)
                .requires_cpus(2),
        );
        suite.push(
            ScenarioPlan::single(&format!("{}_minus_one_core", prefix), policy, minus_one, 0.0)
                .requires_cpus(3),
        );
    }

    suite.push(ScenarioPlan::guarantee_vs_free("normal_half", two_thirds, &["0"]).requires_cpus(2));
    suite.push(ScenarioPlan::split_limit("normal_half", share, 2, CpuPolicy::Normal).requires_cpus(2));
    suite.push(ScenarioPlan::split_limit("rt_half", share, 2, CpuPolicy::RealTime).requires_cpus(2));

    suite.push(
        ScenarioPlan::guarantee_vs_free("normal_third", half, &["1", "2"]).requires_cpus(3),
    );
    suite.push(ScenarioPlan::split_limit("normal_third", share, 3, CpuPolicy::Normal).requires_cpus(3));
    suite.push(ScenarioPlan::split_limit("rt_third", share, 3, CpuPolicy::RealTime).requires_cpus(3));

    suite.push(ScenarioPlan {
        name: "one_third_limits".to_string(),
        description: "Set 0.33c limit for 3 containers".to_string(),
        kind: ScenarioKind::FixedLimits,
        min_cpus: 3,
        members: (0..3)
            .map(|i| MemberPlan::new(&format!("one_third_{}", i), CpuPolicy::Normal, 0.33, 0.0))
            .collect_vec(),
    });

    suite.push(
        ScenarioPlan::guarantee_vs_free("normal_quarter", half, &["0", "1", "2"]).requires_cpus(4),
    );
    suite.push(
        ScenarioPlan::split_limit("normal_quarter", share, 4, CpuPolicy::Normal).requires_cpus(4),
    );
    suite.push(ScenarioPlan::split_limit("rt_quarter", share, 4, CpuPolicy::RealTime).requires_cpus(4));

    let mut mixed = (0..3)
        .map(|i| MemberPlan::new(&format!("one_third_{}", i), CpuPolicy::Normal, 0.0, 1.0))
        .collect_vec();
    mixed.push(MemberPlan::new("rt_guy", CpuPolicy::RealTime, 1.0, 0.0));
    suite.push(ScenarioPlan {
        name: "mixed_policy".to_string(),
        description: "Set 1c guarantee for 3 containers and 1c limit for rt container".to_string(),
        kind: ScenarioKind::MixedPolicy,
        min_cpus: 4,
        members: mixed,
    });

    suite
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_limit_divides_the_total_evenly() {
        let plan = ScenarioPlan::split_limit("normal_half", 1.5, 2, CpuPolicy::Normal);

        assert_eq!(plan.members.len(), 2);
        for member in &plan.members {
            assert_eq!(member.limit, 0.75);
            assert_eq!(member.guarantee, 0.0);
        }
        assert_eq!(plan.kind, ScenarioKind::EqualSplit { total: 1.5 });
        assert_eq!(
            plan.members.iter().map(|m| m.suffix.as_str()).collect_vec(),
            ["normal_half_0", "normal_half_1"]
        );
    }

    #[test]
    fn guaranteed_member_comes_last() {
        let plan = ScenarioPlan::guarantee_vs_free("normal_half", 2.0, &["0"]);
        let last = plan.members.last().expect("plan should have members");

        assert_eq!(last.suffix, "normal_half_guaranteed");
        assert_eq!(last.guarantee, 2.0);
        assert_eq!(plan.members[0].limit, 0.0);
        assert_eq!(plan.members[0].guarantee, 0.0);
    }

    #[test]
    fn no_generated_member_declares_both_bounds() {
        for plan in canonical_suite(16, 0.75) {
            for member in &plan.members {
                assert!(
                    !(member.limit > 0.0 && member.guarantee > 0.0),
                    "{} sets both bounds",
                    member.suffix
                );
            }
        }
    }

    #[test]
    fn suite_uses_integer_fractions_of_the_host() {
        let suite = canonical_suite(4, 0.75);

        let half_guarantee = suite
            .iter()
            .find(|plan| plan.name == "normal_half_guarantee")
            .expect("guarantee scenario should exist");
        assert_eq!(half_guarantee.members.last().map(|m| m.guarantee), Some(2.0));

        let minus_one = suite
            .iter()
            .find(|plan| plan.name == "normal_minus_one_core")
            .expect("minus one scenario should exist");
        assert_eq!(minus_one.members[0].limit, 3.0);

        let split = suite
            .iter()
            .find(|plan| plan.name == "normal_quarter_split")
            .expect("split scenario should exist");
        assert_eq!(split.kind, ScenarioKind::EqualSplit { total: 3.0 });
    }

    #[test]
    fn scenario_names_are_unique() {
        let suite = canonical_suite(8, 0.75);
        let names = suite.iter().map(|plan| plan.name.as_str()).collect_vec();
        assert_eq!(names.len(), names.iter().unique().count());
    }

    #[test]
    fn realtime_scenarios_are_flagged() {
        let suite = canonical_suite(8, 0.75);
        let rt = suite
            .iter()
            .filter(|plan| plan.needs_realtime())
            .map(|plan| plan.name.as_str())
            .collect_vec();

        assert_eq!(
            rt,
            [
                "rt_one_core",
                "rt_one_and_half_core",
                "rt_minus_one_core",
                "rt_half_split",
                "rt_third_split",
                "rt_quarter_split",
                "mixed_policy"
            ]
        );
    }
}
