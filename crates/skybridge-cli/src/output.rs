//! Console summary of a run

use colored::*;
use skybridge_deploy::{RunReport, UnitReport, WiringSummary};
use tabled::{Table, Tabled};

/// One table row per unit
#[derive(Debug, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "UNIT")]
    pub unit: String,
    #[tabled(rename = "FUNCTION")]
    pub function: String,
    #[tabled(rename = "OUTCOME")]
    pub outcome: String,
    #[tabled(rename = "VERSION")]
    pub version: String,
    #[tabled(rename = "ALIAS")]
    pub alias: String,
}

impl From<&UnitReport> for SummaryRow {
    fn from(unit: &UnitReport) -> Self {
        let (version, alias) = match &unit.identifiers {
            Some(ids) => (ids.version.clone(), ids.alias_arn.clone()),
            None => ("-".to_string(), "-".to_string()),
        };
        Self {
            unit: unit.name.clone(),
            function: unit.function_name.clone(),
            outcome: unit.outcome.to_string(),
            version,
            alias,
        }
    }
}

/// Final count line, e.g. `2 deployed, 1 failed`
pub fn count_line(report: &RunReport) -> String {
    let mut parts = Vec::new();
    if report.dry_run {
        parts.push(format!("{} planned", report.planned()));
    } else {
        parts.push(format!("{} deployed", report.deployed()));
    }
    parts.push(format!("{} failed", report.failed()));
    format!("{} (stage {})", parts.join(", "), report.stage)
}

fn wiring_line(label: &str, summary: &WiringSummary) -> String {
    format!(
        "{label}: {} applied, {} planned, {} failed",
        summary.applied, summary.planned, summary.failed
    )
}

pub fn print_report(report: &RunReport) {
    if report.units.is_empty() {
        println!("{}", "No functions configured".dimmed());
        return;
    }

    let rows: Vec<SummaryRow> = report.units.iter().map(SummaryRow::from).collect();
    println!("{}", Table::new(rows));

    for unit in report.units.iter().filter(|u| u.outcome.is_failure()) {
        if let skybridge_deploy::UnitOutcome::BuildFailed(reason)
        | skybridge_deploy::UnitOutcome::Failed(reason) = &unit.outcome
        {
            print_error(&format!("{}: {}", unit.name, reason));
        }
    }

    for (label, summary) in [("gateway", &report.gateway), ("identity pools", &report.identity)] {
        if let Some(summary) = summary {
            let line = wiring_line(label, summary);
            if summary.is_clean() {
                print_info(&line);
            } else {
                print_warning(&line);
            }
        }
    }

    let line = count_line(report);
    if report.has_failures() {
        print_error(&line);
    } else {
        print_success(&line);
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybridge_deploy::{ConvergenceState, UnitIdentifiers, UnitOutcome};

    fn unit(name: &str, outcome: UnitOutcome, identifiers: Option<UnitIdentifiers>) -> UnitReport {
        UnitReport {
            name: name.to_string(),
            function_name: format!("app-{name}"),
            outcome,
            state: ConvergenceState::Unseen,
            identifiers,
        }
    }

    #[test]
    fn test_row_shows_version_and_alias() {
        let ids = UnitIdentifiers {
            function_arn: "arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello".to_string(),
            version: "4".to_string(),
            alias_arn: "arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello:dev".to_string(),
            revision_id: "r".to_string(),
        };
        let row = SummaryRow::from(&unit("hello", UnitOutcome::Deployed { created: true }, Some(ids)));
        assert_eq!(row.outcome, "created");
        assert_eq!(row.version, "4");
        assert!(row.alias.ends_with(":dev"));

        let row = SummaryRow::from(&unit("bye", UnitOutcome::BuildFailed("exit 1".to_string()), None));
        assert_eq!(row.outcome, "build failed");
        assert_eq!(row.version, "-");
    }

    #[test]
    fn test_count_line() {
        let report = RunReport {
            stage: "dev".to_string(),
            units: vec![
                unit("a", UnitOutcome::Deployed { created: false }, None),
                unit("b", UnitOutcome::Failed("boom".to_string()), None),
            ],
            ..RunReport::default()
        };
        assert_eq!(count_line(&report), "1 deployed, 1 failed (stage dev)");

        let planned = RunReport {
            dry_run: true,
            units: vec![unit("a", UnitOutcome::DryRun { create: true }, None)],
            stage: "prod".to_string(),
            ..RunReport::default()
        };
        assert_eq!(count_line(&planned), "1 planned, 0 failed (stage prod)");
    }
}
