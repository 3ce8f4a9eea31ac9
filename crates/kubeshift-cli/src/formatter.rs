//! Output formatters for plans, risk and simulation results.

use clap::ValueEnum;
use comfy_table::Table;
use serde::Serialize;

use kubeshift_core::{MigrationPlan, MigrationRecord, RiskAnalysis};

use crate::commands::{PlanCheck, Simulation};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    fn format_plan(&self, plan: &MigrationPlan) -> String;

    fn format_risk(&self, risk: &RiskAnalysis) -> String;

    fn format_check(&self, check: &PlanCheck) -> String;

    fn format_simulation(&self, simulation: &Simulation) -> String;

    fn format_history(&self, records: &[MigrationRecord]) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_plan(&self, plan: &MigrationPlan) -> String {
        let mut output = format!(
            "{} -> {}\n{} resource(s), {} batch(es) of up to {}, concurrency {}{}\n",
            plan.source_type,
            plan.target_type,
            plan.resources.len(),
            plan.batch_count(),
            plan.batch_size,
            plan.effective_concurrency(),
            if plan.dry_run { ", dry run" } else { "" },
        );

        let mut table = Table::new();
        table.set_header(vec!["#", "Batch", "Namespace", "Name"]);
        for (index, identity) in plan.resources.iter().enumerate() {
            table.add_row(vec![
                (index + 1).to_string(),
                (index / plan.batch_size.max(1) + 1).to_string(),
                identity.namespace.clone(),
                identity.name.clone(),
            ]);
        }
        output.push_str(&table.to_string());
        output
    }

    fn format_risk(&self, risk: &RiskAnalysis) -> String {
        let mut output = format!("Overall risk: {}\n", risk.overall_risk);
        if risk.factors.is_empty() {
            output.push_str("No risk factors");
            return output;
        }

        let mut table = Table::new();
        table.set_header(vec!["Level", "Factor", "Mitigation"]);
        for factor in &risk.factors {
            table.add_row(vec![
                factor.level.to_string(),
                factor.description.clone(),
                factor.mitigation.clone(),
            ]);
        }
        output.push_str(&table.to_string());
        output
    }

    fn format_check(&self, check: &PlanCheck) -> String {
        let mut output = String::new();
        if check.issues.is_empty() {
            output.push_str("Plan is valid\n");
        } else {
            for issue in &check.issues {
                output.push_str(&format!("Error: {}\n", issue));
            }
        }

        let mut table = Table::new();
        table.set_header(vec!["Batch", "Resources", "Namespaces"]);
        for batch in &check.batches {
            table.add_row(vec![
                batch.index.to_string(),
                batch.resources.to_string(),
                batch.namespaces.join(", "),
            ]);
        }
        output.push_str(&table.to_string());
        output
    }

    fn format_simulation(&self, simulation: &Simulation) -> String {
        let result = &simulation.result;
        let mut sections = Vec::new();

        if let Some(report) = &simulation.report {
            sections.push(report.summary.clone());
        }

        let mut counts = Table::new();
        counts.set_header(vec!["Total", "Migrated", "Failed", "Skipped", "Cache hits"]);
        counts.add_row(vec![
            result.total_resources.to_string(),
            result.successful_count.to_string(),
            result.failed_count.to_string(),
            result.skipped_count.to_string(),
            result.cache_hits.to_string(),
        ]);
        sections.push(counts.to_string());

        if !result.dry_run_outcomes.is_empty() {
            let mut table = Table::new();
            table.set_header(vec!["Resource", "Changed fields", "Data loss"]);
            for outcome in &result.dry_run_outcomes {
                let loss = outcome
                    .data_loss
                    .as_ref()
                    .map(|loss| loss.lost_fields.join(", "))
                    .unwrap_or_default();
                table.add_row(vec![
                    outcome.resource.to_string(),
                    outcome.diff.changes.len().to_string(),
                    loss,
                ]);
            }
            sections.push(table.to_string());
        }

        if !result.errors.is_empty() {
            let mut table = Table::new();
            table.set_header(vec!["Resource", "Phase", "Attempts", "Error"]);
            for failure in &result.errors {
                table.add_row(vec![
                    failure.resource.to_string(),
                    failure.phase.to_string(),
                    failure.attempts.to_string(),
                    failure.message.clone(),
                ]);
            }
            sections.push(table.to_string());
        }

        if let Some(rollback) = &simulation.rollback {
            sections.push(format!(
                "Rolled back {} resource(s), {} failure(s)",
                rollback.restored_count(),
                rollback.failures.len()
            ));
        }

        sections.join("\n\n")
    }

    fn format_history(&self, records: &[MigrationRecord]) -> String {
        if records.is_empty() {
            return "No recorded migrations".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "Recorded", "Kind", "From", "To", "Status", "Total", "Migrated", "Failed", "Skipped",
        ]);
        for record in records {
            let status = if record.dry_run {
                format!("{} (dry run)", record.status)
            } else {
                record.status.to_string()
            };
            table.add_row(vec![
                record.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                record.group_kind.to_string(),
                record.from_version.clone(),
                record.to_version.clone(),
                status,
                record.total_resources.to_string(),
                record.successful.to_string(),
                record.failed.to_string(),
                record.skipped.to_string(),
            ]);
        }
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_plan(&self, plan: &MigrationPlan) -> String {
        Self::to_json(plan)
    }

    fn format_risk(&self, risk: &RiskAnalysis) -> String {
        Self::to_json(risk)
    }

    fn format_check(&self, check: &PlanCheck) -> String {
        Self::to_json(check)
    }

    fn format_simulation(&self, simulation: &Simulation) -> String {
        Self::to_json(simulation)
    }

    fn format_history(&self, records: &[MigrationRecord]) -> String {
        Self::to_json(&records)
    }
}
