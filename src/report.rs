/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    container_spec::format_cores,
    orchestrator::{ScenarioOutcome, ScenarioStatus, SuiteReport},
};
use colored::*;
use itertools::Itertools;
use term_table::{row, row::Row, table_cell::*, Table, TableStyle};

fn status_cell(status: &ScenarioStatus) -> String {
    match status {
        ScenarioStatus::Passed => "passed".green().to_string(),
        ScenarioStatus::Skipped(reason) => format!("skipped ({})", reason).yellow().to_string(),
        ScenarioStatus::Failed(_) => "FAILED".red().bold().to_string(),
    }
}

fn usage_cell(outcome: &ScenarioOutcome) -> String {
    if outcome.measurements.is_empty() {
        return "--".to_string();
    }
    outcome
        .measurements
        .iter()
        .map(|m| format!("{:.3}c", m.usage))
        .join(" ")
}

fn bounds_cell(outcome: &ScenarioOutcome) -> String {
    if outcome.measurements.is_empty() {
        return "--".to_string();
    }
    outcome
        .measurements
        .iter()
        .map(|m| match (m.limit > 0.0, m.guarantee > 0.0) {
            (true, true) => format!("{}..{}", format_cores(m.guarantee), format_cores(m.limit)),
            (true, false) => format!("<{}", format_cores(m.limit)),
            (false, true) => format!(">{}", format_cores(m.guarantee)),
            (false, false) => "-".to_string(),
        })
        .join(" ")
}

/// Renders one row per scenario plus the outcome of the whole run.
pub fn render_summary(report: &SuiteReport) -> String {
    let mut rows = vec![row![
        TableCell::builder("Scenario".bold()).build(),
        TableCell::builder("Status".bold()).build(),
        TableCell::builder("Bounds".bold()).build(),
        TableCell::builder("Usage".bold()).build(),
        TableCell::builder("Duration (ms)".bold()).build()
    ]];

    for outcome in &report.outcomes {
        rows.push(row![
            TableCell::new(&outcome.name),
            TableCell::new(status_cell(&outcome.status)),
            TableCell::new(bounds_cell(outcome)),
            TableCell::new(usage_cell(outcome)),
            TableCell::new(outcome.elapsed_ms)
        ]);
    }

    let table = Table::builder()
        .rows(rows)
        .style(TableStyle::rounded())
        .build();

    let passed = report.count(|s| matches!(s, ScenarioStatus::Passed));
    let skipped = report.count(|s| matches!(s, ScenarioStatus::Skipped(_)));
    let verdict = match &report.failure {
        None => format!("run {} OK", report.run_id).green(),
        Some(err) => format!("run {} FAILED: {}", report.run_id, err).red(),
    };

    format!(
        "{}\n{} passed, {} skipped\n{}",
        table.render(),
        passed,
        skipped,
        verdict
    )
}

pub fn print_summary(report: &SuiteReport) {
    println!("{}", render_summary(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        container_spec::{CpuPolicy, Measurement},
        error::CheckError,
        host::SkipReason,
    };
    use chrono::Utc;

    fn outcome(name: &str, status: ScenarioStatus, measurements: Vec<Measurement>) -> ScenarioOutcome {
        ScenarioOutcome {
            name: name.to_string(),
            description: String::new(),
            status,
            measurements,
            started_at: Utc::now(),
            elapsed_ms: 1004,
        }
    }

    #[test]
    fn summary_lists_every_scenario() {
        colored::control::set_override(false);

        let report = SuiteReport {
            run_id: "abcde".to_string(),
            outcomes: vec![
                outcome(
                    "normal_one_core",
                    ScenarioStatus::Passed,
                    vec![Measurement {
                        name: "schedcheck-abcde-0-normal_one_core".to_string(),
                        policy: CpuPolicy::Normal,
                        limit: 1.0,
                        guarantee: 0.0,
                        tolerance: 0.75,
                        usage: 0.998,
                    }],
                ),
                outcome(
                    "rt_one_core",
                    ScenarioStatus::Skipped(SkipReason::NoRealtimeAccounting),
                    vec![],
                ),
            ],
            failure: None,
        };
        let summary = render_summary(&report);

        assert!(summary.contains("normal_one_core"));
        assert!(summary.contains("0.998c"));
        assert!(summary.contains("<1c"));
        assert!(summary.contains("rt_one_core"));
        assert!(summary.contains("skipped"));
        assert!(summary.contains("1 passed, 1 skipped"));
        assert!(summary.contains("run abcde OK"));
    }

    #[test]
    fn summary_names_the_failure() {
        colored::control::set_override(false);

        let report = SuiteReport {
            run_id: "xyz12".to_string(),
            outcomes: vec![outcome(
                "normal_half_split",
                ScenarioStatus::Failed("boom".to_string()),
                vec![],
            )],
            failure: Some(CheckError::RunCancelled {
                scenario: "normal_half_split".to_string(),
            }),
        };
        let summary = render_summary(&report);

        assert!(summary.contains("FAILED"));
        assert!(summary.contains("run xyz12 FAILED: run cancelled before scenario normal_half_split"));
    }
}
