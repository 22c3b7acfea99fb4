//! Rendering of verdicts, plans and run reports.

use crate::config::OutputFormat;
use console::{StyledObject, style};
use gatekeeper_core::JobResult;
use gatekeeper_core::gate::GateVerdict;
use gatekeeper_core::run::RunReport;
use gatekeeper_core::workflow::TriggerEvent;
use gatekeeper_scheduler::ExecutionPlan;
use serde::Serialize;
use std::fmt::Write;

/// Print `value` as JSON or YAML. Returns false for the table format, which
/// callers render themselves.
pub fn print_structured<T: Serialize>(
    value: &T,
    format: OutputFormat,
) -> Result<bool, Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Table => return Ok(false),
    }
    Ok(true)
}

/// Header printed before a run; structured formats keep stdout to the
/// document alone.
pub fn run_banner(workflow: &str, event: TriggerEvent, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Table => Some(format!(
            "{} Running workflow: {} ({})",
            style("▶").cyan().bold(),
            style(workflow).bold(),
            event
        )),
        OutputFormat::Json | OutputFormat::Yaml => None,
    }
}

fn icon(result: JobResult) -> StyledObject<&'static str> {
    match result {
        JobResult::Success => style("✓").green(),
        JobResult::Failure => style("✗").red(),
        JobResult::Cancelled => style("⊘").yellow(),
        JobResult::Skipped => style("⏭").dim(),
    }
}

pub fn render_verdict(verdict: &GateVerdict) -> String {
    let mut out = String::new();
    for check in &verdict.checks {
        let mark = if check.passed {
            style("✓").green()
        } else {
            style("✗").red()
        };
        let observed = check.observed.as_deref().unwrap_or("missing");
        let _ = writeln!(out, "  {} {} ({})", mark, check.dependency, observed);
    }

    if verdict.passed() {
        let _ = writeln!(
            out,
            "{} All {} required dependencies succeeded",
            style("✓").green().bold(),
            verdict.checks.len()
        );
    } else {
        for diagnostic in verdict.diagnostics() {
            let _ = writeln!(out, "{} {}", style("✗").red().bold(), diagnostic);
        }
    }
    out
}

pub fn render_plan(plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({} groups, {} variants)",
        style("▶").cyan().bold(),
        style(&plan.workflow).bold(),
        plan.groups.len(),
        plan.variant_count()
    );

    for group in &plan.groups {
        let _ = write!(out, "  {}", style(&group.job).bold());
        if !group.needs.is_empty() {
            let _ = write!(out, " needs [{}]", group.needs.join(", "));
        }
        if let Some(condition) = &group.condition {
            let _ = write!(out, " if {}", style(condition).dim());
        }
        if let Some(uses) = &group.uses {
            let _ = write!(out, " uses {}", style(uses).dim());
        }
        if group.variants.len() > 1 {
            let fail_fast = if group.fail_fast { "fail-fast" } else { "no fail-fast" };
            let _ = write!(out, " ({})", fail_fast);
        }
        let _ = writeln!(out);

        if group.variants.is_empty() {
            let _ = writeln!(out, "    {} no variants", style("-").dim());
        }
        for variant in &group.variants {
            let _ = writeln!(out, "    - {}", variant);
        }
    }
    out
}

pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();

    for group in &report.groups {
        let _ = writeln!(
            out,
            "{} {} {}",
            icon(group.result),
            style(&group.display_name).bold(),
            style(group.result).dim()
        );
        if let Some(reason) = &group.reason {
            let _ = writeln!(out, "    {}", style(reason).dim());
        }
        for variant in &group.variants {
            let _ = write!(out, "    {} {}", icon(variant.result), variant.display_name);
            if let Some(ms) = variant.duration_ms {
                let _ = write!(out, " {}", style(format!("{:.2}s", ms as f64 / 1000.0)).dim());
            }
            let _ = writeln!(out);
            if variant.result != JobResult::Success
                && let Some(diagnostic) = &variant.diagnostic
            {
                let _ = writeln!(out, "      {}", diagnostic);
            }
        }
    }

    if let Some(verdict) = &report.gate {
        let _ = writeln!(out, "\nGate:");
        out.push_str(&render_verdict(verdict));
    }

    let summary = if report.success() {
        format!(
            "{} Workflow \"{}\" passed in {:.2}s",
            style("✓").green().bold(),
            report.workflow,
            report.duration_ms as f64 / 1000.0
        )
    } else {
        format!(
            "{} Workflow \"{}\" failed after {:.2}s",
            style("✗").red().bold(),
            report.workflow,
            report.duration_ms as f64 / 1000.0
        )
    };
    let _ = writeln!(out, "\n{}", summary);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::gate::Gate;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_failing_verdict_names_dependency() {
        let results: BTreeMap<String, String> = [
            ("integration-tests".to_string(), "success".to_string()),
            ("unit-tests".to_string(), "failure".to_string()),
        ]
        .into();
        let rendered = render_verdict(&Gate::new().evaluate(&results));
        assert!(rendered.contains("unit-tests (failure)"));
        assert!(rendered.contains("dependency 'unit-tests' did not succeed"));
        assert!(!rendered.contains("did not succeed (result: success)"));
    }

    #[test]
    fn test_render_passing_verdict() {
        let results: BTreeMap<String, String> =
            [("integration-tests".to_string(), "success".to_string())].into();
        let rendered = render_verdict(&Gate::new().evaluate(&results));
        assert!(rendered.contains("All 1 required dependencies succeeded"));
    }

    #[test]
    fn test_run_banner_only_for_table() {
        let banner = run_banner("Integration tests", TriggerEvent::PullRequest, OutputFormat::Table);
        assert!(banner.unwrap().contains("Integration tests"));
        assert!(run_banner("t", TriggerEvent::PullRequest, OutputFormat::Json).is_none());
        assert!(run_banner("t", TriggerEvent::PullRequest, OutputFormat::Yaml).is_none());
    }

    #[test]
    fn test_render_missing_dependency() {
        let rendered = render_verdict(&Gate::requiring(["unit-tests"]).evaluate(&BTreeMap::new()));
        assert!(rendered.contains("unit-tests (missing)"));
    }
}
