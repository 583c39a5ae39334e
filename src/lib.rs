/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod clap_args;
pub mod config;
pub mod container_spec;
pub mod control_plane;
pub mod error;
pub mod gate;
pub mod host;
pub mod orchestrator;
pub mod report;
pub mod scenario;
pub mod spec_builder;
pub mod tolerance;
pub mod verifier;

use scenario::ScenarioPlan;

/// Keeps the plans whose name matches one of `only`. An empty filter keeps everything.
pub fn filter_plans(plans: Vec<ScenarioPlan>, only: &[String]) -> Vec<ScenarioPlan> {
    if only.is_empty() {
        return plans;
    }
    plans
        .into_iter()
        .filter(|plan| only.iter().any(|name| name == &plan.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_suite_order() {
        let suite = scenario::canonical_suite(4, 0.75);
        let only = vec!["rt_one_core".to_string(), "normal_one_core".to_string()];
        let names = filter_plans(suite, &only)
            .into_iter()
            .map(|p| p.name)
            .collect::<Vec<_>>();

        assert_eq!(names, ["normal_one_core", "rt_one_core"]);
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let suite = scenario::canonical_suite(4, 0.75);
        let len = suite.len();
        assert_eq!(filter_plans(suite, &[]).len(), len);
    }
}
