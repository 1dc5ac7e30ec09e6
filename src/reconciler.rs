//! Reconciler for maintaining desired state.
//!
//! This module ties configuration, planning and execution together: it
//! turns the configured agents into targets, builds a plan against the
//! platform and applies it under a single run deadline.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::AgentsConfig;
use crate::error::Result;
use crate::planner::{ApplyExecutor, ApplyOutcome, Plan, PlanAction, PlanBuilder, PlanItem};
use crate::service::{GrantService, ResourceService};

/// Reconciler for maintaining desired state.
pub struct Reconciler<'a> {
    /// Configuration.
    config: &'a AgentsConfig,
    /// Agent body service.
    resources: &'a dyn ResourceService,
    /// Grant service.
    grants: &'a dyn GrantService,
    /// Deadline for a whole run.
    deadline: Option<Duration>,
}

/// Result of a reconciliation run.
#[derive(Debug, serde::Serialize)]
pub struct ReconciliationResult {
    /// Whether reconciliation succeeded.
    pub success: bool,
    /// Number of agents created.
    pub created: usize,
    /// Number of agents whose spec was updated.
    pub updated: usize,
    /// Number of grant and revoke calls made.
    pub grant_operations: usize,
    /// Number of agents already converged.
    pub unchanged: usize,
    /// Agents whose body was created or updated.
    pub applied: Vec<String>,
    /// Errors encountered.
    pub errors: Vec<String>,
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler using the configured deadline.
    #[must_use]
    pub fn new(
        config: &'a AgentsConfig,
        resources: &'a dyn ResourceService,
        grants: &'a dyn GrantService,
    ) -> Self {
        Self {
            config,
            resources,
            grants,
            deadline: config.deadline(),
        }
    }

    /// Overrides the run deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    fn deadline_from_now(&self) -> Option<Instant> {
        self.deadline.map(|d| Instant::now() + d)
    }

    /// Builds a plan for every configured agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be turned into targets
    /// or the current state of any agent cannot be read.
    pub async fn plan(&self) -> Result<Plan> {
        self.plan_until(self.deadline_from_now()).await
    }

    async fn plan_until(&self, deadline: Option<Instant>) -> Result<Plan> {
        let targets = self.config.targets()?;
        PlanBuilder::new(self.resources, self.grants)
            .with_options(self.config.diff_options())
            .with_deadline(deadline)
            .build(&targets)
            .await
    }

    /// Applies a previously built plan.
    pub async fn apply(&self, plan: &Plan) -> ApplyOutcome {
        self.apply_until(plan, self.deadline_from_now()).await
    }

    async fn apply_until(&self, plan: &Plan, deadline: Option<Instant>) -> ApplyOutcome {
        ApplyExecutor::new(self.resources, self.grants)
            .with_deadline(deadline)
            .apply(&plan.items)
            .await
    }

    /// Plans and applies in one run, under one deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails. Apply failures are reported in
    /// the result.
    pub async fn reconcile(&self) -> Result<ReconciliationResult> {
        info!("Starting reconciliation of {} agents", self.config.agents.len());
        let deadline = self.deadline_from_now();

        let plan = self.plan_until(deadline).await?;
        if plan.is_empty() {
            info!("No changes required - state is converged");
            return Ok(ReconciliationResult::from_outcome(&plan, None));
        }

        let outcome = self.apply_until(&plan, deadline).await;
        if let Some(e) = &outcome.error {
            error!("Reconciliation stopped: {e}");
        }

        Ok(ReconciliationResult::from_outcome(&plan, Some(&outcome)))
    }

    /// Checks for drift without applying changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the drift check fails.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        info!("Checking for drift in {} agents", self.config.agents.len());

        let plan = self.plan().await?;
        let drifted_resources: Vec<String> =
            plan.actionable().into_iter().map(describe_drift).collect();

        Ok(DriftReport {
            has_drift: !drifted_resources.is_empty(),
            drifted_resources,
            total_resources: plan.items.len(),
            missing_count: plan.create_count(),
        })
    }
}

fn describe_drift(item: &PlanItem) -> String {
    if item.action() == PlanAction::Create {
        return format!("{} (missing)", item.target);
    }
    format!(
        "{} ({} spec changes, {} grant changes)",
        item.target,
        item.spec_changes.len(),
        item.grant_diff.len()
    )
}

impl ReconciliationResult {
    /// Summarises a plan and the outcome of applying it.
    ///
    /// `None` means nothing was applied because the plan was empty.
    #[must_use]
    pub fn from_outcome(plan: &Plan, outcome: Option<&ApplyOutcome>) -> Self {
        let Some(outcome) = outcome else {
            return Self {
                success: true,
                created: 0,
                updated: 0,
                grant_operations: 0,
                unchanged: plan.unchanged_count(),
                applied: Vec::new(),
                errors: Vec::new(),
            };
        };

        let count = |action| {
            outcome
                .applied
                .iter()
                .filter(|i| i.spec_action() == action)
                .count()
        };

        Self {
            success: outcome.is_success(),
            created: count(PlanAction::Create),
            updated: count(PlanAction::Update),
            grant_operations: outcome.grant_operations,
            unchanged: plan.unchanged_count(),
            applied: outcome.applied.iter().map(|i| i.target.to_string()).collect(),
            errors: outcome.error.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Report of drift detection.
#[derive(Debug, serde::Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Agents that have drifted.
    pub drifted_resources: Vec<String>,
    /// Total number of agents in config.
    pub total_resources: usize,
    /// Number of configured agents that do not exist.
    pub missing_count: usize,
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource}")?;
            }
        } else {
            write!(f, "No drift detected - state is converged")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Grant operations: {}", self.grant_operations)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::HalldyllError;
    use crate::service::ObservedGrant;
    use crate::service::mocks::{FakeGrants, MockResources};
    use crate::tree::ConfigTree;
    use crate::snowflake::{AgentService, SnowflakeClient};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AGENT_PATH: &str = "/api/v2/databases/AI/schemas/AGENTS/agents/SALES";

    const CONFIG: &str = r"
connection:
  account_url: https://xy12345.snowflakecomputing.com
  database: AI
  schema: AGENTS
agents:
  - name: NEW_AGENT
    spec:
      comment: fresh
    grants:
      - role: ANALYST
        privileges: [USAGE]
  - name: SETTLED
    spec:
      comment: same
";

    fn config() -> AgentsConfig {
        ConfigParser::new().parse_yaml(CONFIG, None).unwrap()
    }

    fn resources() -> MockResources {
        let mut resources = MockResources::new();
        resources
            .expect_get_current()
            .withf(|id| id.name == "NEW_AGENT")
            .returning(|_| Ok(None));
        resources
            .expect_get_current()
            .withf(|id| id.name == "SETTLED")
            .returning(|_| Ok(Some(ConfigTree::from(json!({"comment": "same"})))));
        resources
    }

    #[tokio::test]
    async fn test_reconcile_creates_missing_agent() {
        let config = config();
        let mut resources = resources();
        resources
            .expect_create()
            .withf(|id, _| id.name == "NEW_AGENT")
            .times(1)
            .returning(|_, _| Ok(()));
        let grants = FakeGrants::default();

        let result = Reconciler::new(&config, &resources, &grants)
            .reconcile()
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.created, 1);
        assert_eq!(result.updated, 0);
        assert_eq!(result.unchanged, 1);
        assert_eq!(result.grant_operations, 1);
        assert_eq!(result.applied, vec![String::from("AI.AGENTS.NEW_AGENT")]);
    }

    #[tokio::test]
    async fn test_reconcile_reports_apply_failure() {
        let config = config();
        let mut resources = resources();
        resources
            .expect_create()
            .returning(|_, _| Err(HalldyllError::internal("no privileges")));
        let grants = FakeGrants::default();

        let result = Reconciler::new(&config, &resources, &grants)
            .reconcile()
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("AI.AGENTS.NEW_AGENT"));
    }

    #[tokio::test]
    async fn test_drift_report() {
        let config = config();
        let resources = resources();
        let grants = FakeGrants::with_current(vec![ObservedGrant {
            privilege: String::from("USAGE"),
            granted_to: String::from("ROLE"),
            grantee_name: String::from("INTRUDER"),
        }]);

        let report = Reconciler::new(&config, &resources, &grants)
            .check_drift()
            .await
            .unwrap();

        assert!(report.has_drift);
        assert_eq!(report.total_resources, 2);
        assert_eq!(report.missing_count, 1);
        assert_eq!(
            report.drifted_resources,
            vec![
                String::from("AI.AGENTS.NEW_AGENT (missing)"),
                String::from("AI.AGENTS.SETTLED (0 spec changes, 1 grant changes)")
            ]
        );
    }

    const ROUND_TRIP_CONFIG: &str = r#"
connection:
  account_url: https://xy12345.snowflakecomputing.com
  database: AI
  schema: AGENTS
agents:
  - name: SALES
    spec:
      comment: "[1, 2]"
      profile:
        display_name: Sales
      tools:
        - tool_spec:
            type: generic
            name: lookup
      experimental:
        flag: true
"#;

    #[tokio::test]
    async fn test_applied_agent_reads_back_unchanged() {
        let config = ConfigParser::new().parse_yaml(ROUND_TRIP_CONFIG, None).unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(AGENT_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/databases/AI/schemas/AGENTS/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = SnowflakeClient::new(&server.uri(), "t")
            .unwrap()
            .with_retry_delay(Duration::from_millis(1));
        let agents = AgentService::new(client);
        let grants = FakeGrants::default();
        let reconciler = Reconciler::new(&config, &agents, &grants);

        let plan = reconciler.plan().await.unwrap();
        assert_eq!(plan.create_count(), 1);
        reconciler.apply(&plan).await.into_result().unwrap();

        let requests = server.received_requests().await.unwrap();
        let post = requests
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .unwrap();
        let mut sent: serde_json::Map<String, serde_json::Value> = post.body_json().unwrap();
        assert_eq!(sent.remove("name"), Some(json!("SALES")));
        let comment = sent.remove("comment").unwrap();
        assert_eq!(sent.get("experimental"), Some(&json!({"flag": true})));

        // The describe endpoint echoes metadata and nests the body as a string.
        Mock::given(method("GET"))
            .and(path(AGENT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "SALES",
                "database_name": "AI",
                "schema_name": "AGENTS",
                "owner": "SYSADMIN",
                "created_on": "2025-01-01T00:00:00Z",
                "comment": comment,
                "agent_spec": serde_json::Value::Object(sent).to_string()
            })))
            .mount(&server)
            .await;

        let replan = reconciler.plan().await.unwrap();
        assert!(replan.is_empty());
        assert_eq!(replan.items[0].action(), PlanAction::NoChange);
        assert!(replan.items[0].spec_changes.is_empty());
    }
}
