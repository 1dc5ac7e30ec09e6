//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{AgentsConfig, ConfigHasher, ValidationResult};
use crate::planner::{GrantDiff, Plan, PlanAction, PlanItem};
use crate::reconciler::{DriftReport, ReconciliationResult};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan item row for table display.
#[derive(Tabled)]
struct PlanItemRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "Spec changes")]
    spec_changes: usize,
    #[tabled(rename = "Grants")]
    grants: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a reconciliation plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - {} agents are up to date.\n",
                "✓".green(),
                plan.items.len()
            );
        }

        let mut output = String::new();

        let _ = writeln!(output, "\nAgent Plan");
        let _ = writeln!(
            output,
            "   Config hash: {}\n",
            ConfigHasher::short_hash(&plan.fingerprint)
        );

        let rows: Vec<PlanItemRow> = plan
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| PlanItemRow {
                index: i + 1,
                action: Self::format_action(item.action()),
                agent: Self::truncate(&item.target.to_string(), 48),
                spec_changes: item.spec_changes.len(),
                grants: Self::format_grant_counts(&item.grant_diff),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for item in plan.actionable() {
                Self::write_item_details(&mut output, item);
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} unchanged, {} grant operations\n",
            plan.create_count().to_string().green(),
            plan.update_count().to_string().yellow(),
            plan.unchanged_count(),
            plan.grant_operation_count()
        );

        output
    }

    /// Writes every spec change and grant operation of one item.
    fn write_item_details(output: &mut String, item: &PlanItem) {
        let _ = writeln!(output, "\n{} {}", Self::format_action(item.action()), item.target);
        for change in &item.spec_changes {
            let _ = writeln!(output, "   {change}");
        }
        for entry in &item.grant_diff.to_revoke {
            let _ = writeln!(output, "   {} revoke {entry}", "-".red());
        }
        for entry in &item.grant_diff.to_grant {
            let _ = writeln!(output, "   {} grant {entry}", "+".green());
        }
    }

    /// Formats the outcome of an apply run.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Reconciliation successful", "✓".green())
                } else {
                    format!("{} Reconciliation failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Grant operations: {}", result.grant_operations);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                if !result.applied.is_empty() {
                    let _ = writeln!(output, "\n   Applied:");
                    for name in &result.applied {
                        let _ = writeln!(output, "     - {name}");
                    }
                }

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    format!("{} No drift detected - state is converged.\n", "✓".green())
                } else {
                    let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   - {resource}");
                    }
                    let _ = write!(
                        output,
                        "\n{}/{} agents have drifted ({} missing).\n",
                        report.drifted_resources.len(),
                        report.total_resources,
                        report.missing_count
                    );
                    output
                }
            }
        }
    }

    /// Formats validation results with a short configuration summary.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &AgentsConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ValidationJson::new(config, result)).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    let mut output = format!(
                        "{} Configuration has {} errors:\n",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let grant_count: usize = config.agents.iter().map(|a| a.grants.len()).sum();
                let _ = writeln!(output, "\nConfiguration summary:");
                let _ = writeln!(output, "   Account: {}", config.connection.account_url);
                let _ = writeln!(
                    output,
                    "   Location: {}.{}",
                    config.connection.database, config.connection.schema
                );
                let _ = writeln!(output, "   Agents: {}", config.agents.len());
                let _ = writeln!(output, "   Grant entries: {grant_count}");

                output
            }
        }
    }

    /// Formats a plan action with color.
    fn format_action(action: PlanAction) -> String {
        match action {
            PlanAction::Create => "+create".green().to_string(),
            PlanAction::Update => "~update".yellow().to_string(),
            PlanAction::NoChange => "noop".dimmed().to_string(),
        }
    }

    fn format_grant_counts(diff: &GrantDiff) -> String {
        if diff.is_empty() {
            return String::from("-");
        }
        format!("+{}/-{}", diff.to_grant.len(), diff.to_revoke.len())
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson<'a> {
    fingerprint: &'a str,
    created_at: String,
    creates: usize,
    updates: usize,
    unchanged: usize,
    grant_operations: usize,
    items: Vec<PlanItemJson<'a>>,
}

#[derive(Serialize)]
struct PlanItemJson<'a> {
    agent: String,
    action: PlanAction,
    #[serde(flatten)]
    item: &'a PlanItem,
}

impl<'a> From<&'a Plan> for PlanJson<'a> {
    fn from(plan: &'a Plan) -> Self {
        Self {
            fingerprint: &plan.fingerprint,
            created_at: plan.created_at.to_rfc3339(),
            creates: plan.create_count(),
            updates: plan.update_count(),
            unchanged: plan.unchanged_count(),
            grant_operations: plan.grant_operation_count(),
            items: plan
                .items
                .iter()
                .map(|item| PlanItemJson {
                    agent: item.target.to_string(),
                    action: item.action(),
                    item,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ValidationJson {
    valid: bool,
    agents: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationJson {
    fn new(config: &AgentsConfig, result: &ValidationResult) -> Self {
        Self {
            valid: result.is_valid(),
            agents: config.agents.len(),
            errors: result.errors.iter().map(ToString::to_string).collect(),
            warnings: result.warnings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{Change, GrantEntry, Privilege, RoleType};
    use crate::service::AgentId;
    use crate::tree::ConfigTree;
    use chrono::Utc;
    use serde_json::json;

    fn plan() -> Plan {
        let update = PlanItem {
            target: AgentId::new("AI", "AGENTS", "SALES"),
            exists: true,
            desired: ConfigTree::from(json!({"comment": "new"})),
            spec_changes: vec![Change::modified(
                "comment",
                ConfigTree::string("old"),
                ConfigTree::string("new"),
            )],
            grant_diff: GrantDiff {
                to_grant: vec![GrantEntry::new(Privilege::Usage, RoleType::AccountRole, "ANALYST")],
                to_revoke: Vec::new(),
            },
        };
        let settled = PlanItem {
            target: AgentId::new("AI", "AGENTS", "HR"),
            exists: true,
            desired: ConfigTree::from(json!({})),
            spec_changes: Vec::new(),
            grant_diff: GrantDiff::default(),
        };
        Plan {
            created_at: Utc::now(),
            fingerprint: String::from("0123456789abcdef0123"),
            items: vec![update, settled],
        }
    }

    #[test]
    fn test_plan_text_lists_details() {
        let out = OutputFormatter::new(OutputFormat::Text).format_plan(&plan(), true);

        assert!(out.contains("0123456789ab"));
        assert!(out.contains("AI.AGENTS.SALES"));
        assert!(out.contains("+1/-0"));
        assert!(out.contains("comment"));
        assert!(out.contains("USAGE on ROLE ANALYST"));
    }

    #[test]
    fn test_empty_plan_text() {
        let mut plan = plan();
        plan.items.remove(0);

        let out = OutputFormatter::new(OutputFormat::Text).format_plan(&plan, false);
        assert!(out.contains("No changes required"));
    }

    #[test]
    fn test_plan_json() {
        let out = OutputFormatter::new(OutputFormat::Json).format_plan(&plan(), false);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["updates"], 1);
        assert_eq!(value["unchanged"], 1);
        assert_eq!(value["grant_operations"], 1);
        assert_eq!(value["items"][0]["agent"], "AI.AGENTS.SALES");
        assert_eq!(value["items"][0]["action"], "update");
        assert_eq!(value["items"][1]["action"], "no_change");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("ééééééé", 6), "ééé...");
    }
}
