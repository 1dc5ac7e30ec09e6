//! Apply executor for reconciliation plans.
//!
//! Items are applied one at a time, in plan order. Each item gets at most
//! one body call (create or partial update) followed by grant convergence:
//! every revoke, then every grant. Grant failures within an item are
//! collected together; the first failing item stops the batch.

use serde::Serialize;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ApplyError, GrantError, GrantOperation, Result};
use crate::service::{AgentId, GrantService, ResourceService, UpdatePayload};
use crate::tree::{ConfigTree, Scalar};

use super::grants::GrantEntry;
use super::plan::{PlanAction, PlanItem};
use super::within_deadline;

static EMPTY_ARRAY: ConfigTree = ConfigTree::empty_array();
static EMPTY_OBJECT: ConfigTree = ConfigTree::empty_object();

/// Result of applying a batch of plan items.
#[derive(Debug, Serialize)]
pub struct ApplyOutcome {
    /// Items whose agent body was created or updated, in apply order.
    pub applied: Vec<PlanItem>,
    /// Number of successful grant and revoke calls.
    pub grant_operations: usize,
    /// The failure that stopped the batch, if any.
    #[serde(skip)]
    pub error: Option<ApplyError>,
}

impl ApplyOutcome {
    /// Returns true if every item was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts the outcome into the applied items or the stopping error.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the batch.
    pub fn into_result(self) -> Result<Vec<PlanItem>> {
        match self.error {
            Some(e) => Err(e.into()),
            None => Ok(self.applied),
        }
    }
}

/// Executes plan items against the platform.
pub struct ApplyExecutor<'a> {
    /// Agent body service.
    resources: &'a dyn ResourceService,
    /// Grant service.
    grants: &'a dyn GrantService,
    /// Optional deadline for every remote call.
    deadline: Option<Instant>,
}

impl<'a> ApplyExecutor<'a> {
    /// Creates a new executor.
    #[must_use]
    pub fn new(resources: &'a dyn ResourceService, grants: &'a dyn GrantService) -> Self {
        Self {
            resources,
            grants,
            deadline: None,
        }
    }

    /// Sets a deadline for all remote calls.
    ///
    /// When it passes, the in-flight call is abandoned and the batch stops.
    /// Items already applied stay applied.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Applies items in order, stopping at the first failing item.
    pub async fn apply(&self, items: &[PlanItem]) -> ApplyOutcome {
        info!("Applying {} plan items", items.len());

        let mut outcome = ApplyOutcome {
            applied: Vec::new(),
            grant_operations: 0,
            error: None,
        };

        for item in items {
            if !item.has_changes() {
                debug!("{}: nothing to do", item.target);
                continue;
            }

            match self.apply_item(item).await {
                Ok(grant_operations) => {
                    outcome.grant_operations += grant_operations;
                    if item.spec_action() != PlanAction::NoChange {
                        outcome.applied.push(item.clone());
                    }
                }
                Err(e) => {
                    error!("{e}");
                    outcome.error = Some(e);
                    break;
                }
            }
        }

        if outcome.is_success() {
            info!(
                "Applied {} agents, {} grant operations",
                outcome.applied.len(),
                outcome.grant_operations
            );
        } else {
            warn!(
                "Apply stopped after {} agents; remaining items were not attempted",
                outcome.applied.len()
            );
        }

        outcome
    }

    /// Applies the body change and converges grants for one item.
    ///
    /// Returns the number of grant operations performed.
    async fn apply_item(&self, item: &PlanItem) -> std::result::Result<usize, ApplyError> {
        let id = &item.target;

        match item.spec_action() {
            PlanAction::Create => {
                info!("Creating {id}");
                self.call(id, self.resources.create(id, &item.desired))
                    .await?
                    .map_err(|e| ApplyError::CreateFailed {
                        target: id.to_string(),
                        source: Box::new(e),
                    })?;
            }
            PlanAction::Update => {
                let payload = build_update_payload(item);
                info!(
                    "Updating {id} ({})",
                    payload.keys().cloned().collect::<Vec<_>>().join(", ")
                );
                self.call(id, self.resources.update(id, &payload))
                    .await?
                    .map_err(|e| ApplyError::UpdateFailed {
                        target: id.to_string(),
                        source: Box::new(e),
                    })?;
            }
            PlanAction::NoChange => {}
        }

        self.converge_grants(item).await
    }

    /// Runs every revoke, then every grant, collecting failures.
    async fn converge_grants(&self, item: &PlanItem) -> std::result::Result<usize, ApplyError> {
        let id = &item.target;
        let diff = &item.grant_diff;
        if diff.is_empty() {
            return Ok(0);
        }

        debug!(
            "{id}: converging grants (-{}/+{})",
            diff.to_revoke.len(),
            diff.to_grant.len()
        );

        let mut failures = Vec::new();
        let mut done = 0;

        for entry in &diff.to_revoke {
            let call = self
                .grants
                .revoke(id, entry.role_type, &entry.role_name, entry.privilege);
            match within_deadline(self.deadline, call).await {
                Some(Ok(())) => done += 1,
                Some(Err(e)) => failures.push(grant_failure(GrantOperation::Revoke, entry, &e)),
                None => return Err(deadline_exceeded(id, failures)),
            }
        }

        for entry in &diff.to_grant {
            let call = self
                .grants
                .grant(id, entry.role_type, &entry.role_name, entry.privilege);
            match within_deadline(self.deadline, call).await {
                Some(Ok(())) => done += 1,
                Some(Err(e)) => failures.push(grant_failure(GrantOperation::Grant, entry, &e)),
                None => return Err(deadline_exceeded(id, failures)),
            }
        }

        if failures.is_empty() {
            Ok(done)
        } else {
            Err(ApplyError::GrantsFailed {
                target: id.to_string(),
                failures,
            })
        }
    }

    /// Awaits a remote call, mapping an elapsed deadline to an apply error.
    async fn call<T>(
        &self,
        id: &AgentId,
        fut: impl Future<Output = T>,
    ) -> std::result::Result<T, ApplyError> {
        within_deadline(self.deadline, fut)
            .await
            .ok_or_else(|| deadline_exceeded(id, Vec::new()))
    }
}

fn deadline_exceeded(id: &AgentId, failures: Vec<GrantError>) -> ApplyError {
    ApplyError::DeadlineExceeded {
        target: id.to_string(),
        failures,
    }
}

fn grant_failure(
    operation: GrantOperation,
    entry: &GrantEntry,
    err: &crate::error::HalldyllError,
) -> GrantError {
    warn!("Failed to {operation} {entry}: {err}");
    GrantError {
        operation,
        entry: entry.clone(),
        message: err.to_string(),
    }
}

/// Builds the partial update body for an item.
///
/// Holds one entry per top-level field touched by a spec change. A field
/// still present locally is sent whole; a field removed locally is sent as
/// its empty sentinel so the platform clears it.
#[must_use]
pub fn build_update_payload(item: &PlanItem) -> UpdatePayload {
    let mut payload = UpdatePayload::new();

    for change in &item.spec_changes {
        let key = change.top_level_key();
        if payload.contains_key(key) {
            continue;
        }

        let value = match item.desired.get(key) {
            Some(local) if !local.is_empty() => local.clone(),
            _ => empty_sentinel(key, removed_shape(change.path(), key, change.before())),
        };
        payload.insert(key.to_string(), value);
    }

    payload
}

/// Best available evidence of the remote shape of a removed top-level field.
fn removed_shape<'t>(
    path: &str,
    key: &str,
    before: Option<&'t ConfigTree>,
) -> Option<&'t ConfigTree> {
    match path[key.len()..].chars().next() {
        None => before,
        Some('[') => Some(&EMPTY_ARRAY),
        Some(_) => Some(&EMPTY_OBJECT),
    }
}

/// Value that clears a top-level agent field.
///
/// Known fields use their declared shape; other fields follow the shape of
/// the remote value. Collections are cleared with an empty collection,
/// never null.
#[must_use]
pub fn empty_sentinel(key: &str, before: Option<&ConfigTree>) -> ConfigTree {
    match key {
        "comment" => ConfigTree::string(""),
        "tools" => ConfigTree::empty_array(),
        "profile" | "models" | "instructions" | "orchestration" | "tool_resources" => {
            ConfigTree::empty_object()
        }
        _ => match before {
            Some(ConfigTree::Array(_)) => ConfigTree::empty_array(),
            Some(ConfigTree::Object(_)) => ConfigTree::empty_object(),
            Some(ConfigTree::Scalar(Scalar::String(_))) => ConfigTree::string(""),
            _ => ConfigTree::Null,
        },
    }
}
