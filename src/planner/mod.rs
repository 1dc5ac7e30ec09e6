//! Planning module for agent reconciliation.
//!
//! This module compares desired agent specs and grants with what the
//! platform reports, classifies each agent, and applies the resulting plan.

mod diff;
mod executor;
mod grants;
mod plan;

pub use diff::{AGENT_FIELD_ORDER, Change, ChangeKind, DiffOptions, TreeDiffer};
pub use executor::{ApplyExecutor, ApplyOutcome, build_update_payload, empty_sentinel};
pub use grants::{
    BOOTSTRAP_PRIVILEGE, GrantDiff, GrantDiffer, GrantEntry, GrantKey, GrantState, Privilege,
    RoleType,
};
pub use plan::{Plan, PlanAction, PlanBuilder, PlanItem, Target};

use std::future::Future;
use tokio::time::Instant;

/// Awaits `fut`, giving up at `deadline` if one is set.
///
/// Returns `None` when the deadline passed first; the in-flight call is
/// dropped.
pub(crate) async fn within_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}
