//! Plan types and plan construction.
//!
//! The builder fetches current state for every target, runs the tree and
//! grant differs, and classifies each agent as create, update or no change.
//! A fetch failure for any target abandons the whole plan.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ConfigHasher;
use crate::error::{HalldyllError, PlanError, Result};
use crate::service::{AgentId, GrantService, ResourceService};
use crate::tree::ConfigTree;

use super::diff::{Change, DiffOptions, TreeDiffer};
use super::grants::{GrantDiff, GrantDiffer, GrantState};
use super::within_deadline;

/// Desired state of one agent, ready to be planned.
#[derive(Debug, Clone)]
pub struct Target {
    /// Agent coordinates.
    pub id: AgentId,
    /// Desired spec.
    pub desired: ConfigTree,
    /// Desired grants.
    pub grants: GrantState,
}

/// Classification of a plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// The agent does not exist yet.
    Create,
    /// The agent exists and its spec or grants differ.
    Update,
    /// The agent matches the desired state.
    NoChange,
}

/// The computed changes for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct PlanItem {
    /// Agent coordinates.
    pub target: AgentId,
    /// Whether the agent currently exists.
    pub exists: bool,
    /// Desired spec, sent in full on create.
    #[serde(skip)]
    pub desired: ConfigTree,
    /// Spec changes; for a create, every leaf of the desired spec.
    pub spec_changes: Vec<Change>,
    /// Grants to add and remove.
    pub grant_diff: GrantDiff,
}

impl PlanItem {
    /// Overall classification, covering spec and grants.
    #[must_use]
    pub fn action(&self) -> PlanAction {
        if !self.exists {
            PlanAction::Create
        } else if self.spec_changes.is_empty() && self.grant_diff.is_empty() {
            PlanAction::NoChange
        } else {
            PlanAction::Update
        }
    }

    /// Classification of the agent body alone, ignoring grants.
    ///
    /// Drives which resource call the executor makes.
    #[must_use]
    pub fn spec_action(&self) -> PlanAction {
        if !self.exists {
            PlanAction::Create
        } else if self.spec_changes.is_empty() {
            PlanAction::NoChange
        } else {
            PlanAction::Update
        }
    }

    /// Returns true if applying this item would call the platform.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.action() != PlanAction::NoChange
    }
}

/// A complete reconciliation plan.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the desired state this plan was built from.
    pub fingerprint: String,
    /// One item per target, in target order.
    pub items: Vec<PlanItem>,
}

impl Plan {
    /// Returns true if no item needs any remote call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.items.iter().any(PlanItem::has_changes)
    }

    /// Number of agents to create.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.count(PlanAction::Create)
    }

    /// Number of agents to update.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.count(PlanAction::Update)
    }

    /// Number of agents already converged.
    #[must_use]
    pub fn unchanged_count(&self) -> usize {
        self.count(PlanAction::NoChange)
    }

    /// Total number of grant and revoke operations in the plan.
    #[must_use]
    pub fn grant_operation_count(&self) -> usize {
        self.items.iter().map(|i| i.grant_diff.len()).sum()
    }

    /// Items that need at least one remote call.
    #[must_use]
    pub fn actionable(&self) -> Vec<&PlanItem> {
        self.items.iter().filter(|i| i.has_changes()).collect()
    }

    fn count(&self, action: PlanAction) -> usize {
        self.items.iter().filter(|i| i.action() == action).count()
    }
}

/// Builds plans from desired targets and current remote state.
pub struct PlanBuilder<'a> {
    /// Agent body service.
    resources: &'a dyn ResourceService,
    /// Grant service.
    grants: &'a dyn GrantService,
    /// Tree differ.
    differ: TreeDiffer,
    /// Grant differ.
    grant_differ: GrantDiffer,
    /// Diff options.
    options: DiffOptions,
    /// Optional deadline for every fetch.
    deadline: Option<Instant>,
}

impl<'a> PlanBuilder<'a> {
    /// Creates a plan builder.
    #[must_use]
    pub fn new(resources: &'a dyn ResourceService, grants: &'a dyn GrantService) -> Self {
        Self {
            resources,
            grants,
            differ: TreeDiffer::default(),
            grant_differ: GrantDiffer::new(),
            options: DiffOptions::default(),
            deadline: None,
        }
    }

    /// Uses a custom tree differ.
    #[must_use]
    pub const fn with_differ(mut self, differ: TreeDiffer) -> Self {
        self.differ = differ;
        self
    }

    /// Sets the diff options.
    #[must_use]
    pub const fn with_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets a deadline for all remote fetches.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Builds a plan for the given targets.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::RemoteFetch` (or `DeadlineExceeded`) for the first
    /// target whose state cannot be read. No partial plan is returned.
    pub async fn build(&self, targets: &[Target]) -> Result<Plan> {
        info!("Planning {} agents", targets.len());

        let mut items = Vec::with_capacity(targets.len());
        for target in targets {
            let item = self.plan_target(target).await?;
            debug!("{}: {:?}", item.target, item.action());
            items.push(item);
        }

        Ok(Plan {
            created_at: Utc::now(),
            fingerprint: ConfigHasher::new().hash_targets(targets),
            items,
        })
    }

    /// Plans a single target.
    async fn plan_target(&self, target: &Target) -> Result<PlanItem> {
        let id = &target.id;

        let Some(current) = self.fetch(id, self.resources.get_current(id)).await? else {
            info!("{id} does not exist and will be created");
            return Ok(PlanItem {
                target: id.clone(),
                exists: false,
                desired: target.desired.clone(),
                spec_changes: self.differ.diff_for_create(&target.desired),
                grant_diff: self
                    .grant_differ
                    .compute_diff(&target.grants, &GrantState::new()),
            });
        };

        let rows = self.fetch(id, self.grants.list_current_grants(id)).await?;
        let observed = GrantState::from_observed(&rows);

        let spec_changes = self.differ.diff(&target.desired, &current, self.options);
        let grant_diff = self.grant_differ.compute_diff(&target.grants, &observed);

        debug!(
            "{id}: {} spec changes, {} grants to add, {} to revoke",
            spec_changes.len(),
            grant_diff.to_grant.len(),
            grant_diff.to_revoke.len()
        );

        Ok(PlanItem {
            target: id.clone(),
            exists: true,
            desired: target.desired.clone(),
            spec_changes,
            grant_diff,
        })
    }

    /// Awaits a remote read, mapping failures to plan errors.
    async fn fetch<T>(
        &self,
        id: &AgentId,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let Some(result) = within_deadline(self.deadline, fut).await else {
            return Err(PlanError::DeadlineExceeded {
                target: id.to_string(),
            }
            .into());
        };
        result.map_err(|source| {
            HalldyllError::Plan(PlanError::RemoteFetch {
                target: id.to_string(),
                source: Box::new(source),
            })
        })
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for PlanItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action(), self.target)?;
        if self.has_changes() {
            write!(
                f,
                " ({} spec changes, +{}/-{} grants)",
                self.spec_changes.len(),
                self.grant_diff.to_grant.len(),
                self.grant_diff.to_revoke.len()
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Agent Plan ({} agents):", self.items.len())?;
        for (i, item) in self.items.iter().enumerate() {
            writeln!(f, "  {i}. {item}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{ChangeKind, GrantEntry, Privilege, RoleType};
    use crate::service::ObservedGrant;
    use crate::service::mocks::{FakeGrants, MockResources};
    use serde_json::json;

    fn target(name: &str, desired: serde_json::Value, grants: Vec<GrantEntry>) -> Target {
        Target {
            id: AgentId::new("AI", "AGENTS", name),
            desired: ConfigTree::from(desired),
            grants: grants.into_iter().collect(),
        }
    }

    fn usage(role: &str) -> GrantEntry {
        GrantEntry::new(Privilege::Usage, RoleType::AccountRole, role)
    }

    fn observed(privilege: &str, grantee: &str) -> ObservedGrant {
        ObservedGrant {
            privilege: privilege.to_string(),
            granted_to: String::from("ROLE"),
            grantee_name: grantee.to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_agent_is_created_with_all_grants() {
        let mut resources = MockResources::new();
        resources.expect_get_current().returning(|_| Ok(None));
        let grants = FakeGrants::default();

        let targets = vec![target(
            "SALES",
            json!({"comment": "c", "models": {"orchestration": "auto"}}),
            vec![GrantEntry::new(Privilege::All, RoleType::AccountRole, "R1")],
        )];
        let plan = PlanBuilder::new(&resources, &grants).build(&targets).await.unwrap();

        let item = &plan.items[0];
        assert_eq!(item.action(), PlanAction::Create);
        assert!(!item.exists);
        assert_eq!(item.spec_changes.len(), 2);
        assert!(item.spec_changes.iter().all(|c| c.kind() == ChangeKind::Added));
        assert_eq!(item.grant_diff.to_grant.len(), 3);
        assert!(item.grant_diff.to_revoke.is_empty());
        assert!(grants.calls().is_empty(), "grants of a missing agent are not listed");
        assert_eq!(plan.create_count(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_agent_is_no_change() {
        let spec = json!({"comment": "c", "tools": [{"tool_spec": {"name": "t", "type": "generic"}}]});
        let remote = ConfigTree::from(spec.clone());

        let mut resources = MockResources::new();
        resources
            .expect_get_current()
            .returning(move |_| Ok(Some(remote.clone())));
        let grants = FakeGrants::with_current(vec![
            observed("OWNERSHIP", "SYSADMIN"),
            observed("USAGE", "ANALYST"),
        ]);

        let targets = vec![target("SALES", spec, vec![usage("analyst")])];
        let plan = PlanBuilder::new(&resources, &grants).build(&targets).await.unwrap();

        assert_eq!(plan.items[0].action(), PlanAction::NoChange);
        assert!(plan.items[0].grant_diff.is_empty());
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_spec_is_update() {
        let mut resources = MockResources::new();
        resources
            .expect_get_current()
            .returning(|_| Ok(Some(ConfigTree::from(json!({"comment": "old"})))));
        let grants = FakeGrants::default();

        let targets = vec![target("SALES", json!({"comment": "new"}), vec![])];
        let plan = PlanBuilder::new(&resources, &grants).build(&targets).await.unwrap();

        let item = &plan.items[0];
        assert_eq!(item.action(), PlanAction::Update);
        assert_eq!(item.spec_action(), PlanAction::Update);
        assert_eq!(item.spec_changes.len(), 1);
        assert_eq!(item.spec_changes[0].path(), "comment");
    }

    #[tokio::test]
    async fn test_grant_drift_alone_is_update() {
        let mut resources = MockResources::new();
        resources
            .expect_get_current()
            .returning(|_| Ok(Some(ConfigTree::from(json!({"comment": "c"})))));
        let grants = FakeGrants::with_current(vec![observed("USAGE", "R1"), observed("USAGE", "R2")]);

        let targets = vec![target("SALES", json!({"comment": "c"}), vec![usage("R1")])];
        let plan = PlanBuilder::new(&resources, &grants).build(&targets).await.unwrap();

        let item = &plan.items[0];
        assert_eq!(item.action(), PlanAction::Update);
        assert_eq!(item.spec_action(), PlanAction::NoChange);
        assert_eq!(item.grant_diff.to_revoke, vec![usage("R2")]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_plan() {
        let mut resources = MockResources::new();
        resources
            .expect_get_current()
            .withf(|id| id.name == "FIRST")
            .returning(|_| Ok(None));
        resources
            .expect_get_current()
            .withf(|id| id.name == "SECOND")
            .returning(|_| Err(HalldyllError::internal("boom")));
        resources
            .expect_get_current()
            .withf(|id| id.name == "THIRD")
            .never();
        let grants = FakeGrants::default();

        let targets = vec![
            target("FIRST", json!({"comment": "a"}), vec![]),
            target("SECOND", json!({"comment": "b"}), vec![]),
            target("THIRD", json!({"comment": "c"}), vec![]),
        ];
        let err = PlanBuilder::new(&resources, &grants)
            .build(&targets)
            .await
            .unwrap_err();

        match err {
            HalldyllError::Plan(PlanError::RemoteFetch { target, .. }) => {
                assert_eq!(target, "AI.AGENTS.SECOND");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_grant_listing_failure_aborts_plan() {
        let mut resources = MockResources::new();
        resources
            .expect_get_current()
            .returning(|_| Ok(Some(ConfigTree::from(json!({"comment": "c"})))));
        let grants = FakeGrants::failing_list();

        let targets = vec![target("SALES", json!({"comment": "c"}), vec![])];
        let result = PlanBuilder::new(&resources, &grants).build(&targets).await;

        assert!(matches!(
            result,
            Err(HalldyllError::Plan(PlanError::RemoteFetch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_plan_is_idempotent_for_converged_state() {
        let spec = json!({
            "comment": "c",
            "instructions": {"response": "r"},
            "tool_resources": {}
        });
        let remote = ConfigTree::from(json!({"comment": "c", "instructions": {"response": "r"}}));

        let mut resources = MockResources::new();
        resources
            .expect_get_current()
            .returning(move |_| Ok(Some(remote.clone())));
        let grants = FakeGrants::with_current(vec![
            observed("USAGE", "R1"),
            observed("MODIFY", "R1"),
            observed("MONITOR", "R1"),
        ]);

        let targets = vec![target(
            "SALES",
            spec,
            vec![GrantEntry::new(Privilege::All, RoleType::AccountRole, "r1")],
        )];
        let builder = PlanBuilder::new(&resources, &grants);
        let first = builder.build(&targets).await.unwrap();
        let second = builder.build(&targets).await.unwrap();

        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(first.fingerprint, second.fingerprint);
    }
}
