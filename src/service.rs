//! Collaborator interfaces used by the planner and executor.
//!
//! The reconciliation engine never talks to the network directly: it reads
//! current state and issues changes through these traits. The Snowflake
//! implementations live in [`crate::snowflake`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::planner::{Privilege, RoleType};
use crate::tree::ConfigTree;

/// Partial update body: top-level field name to its new value.
pub type UpdatePayload = BTreeMap<String, ConfigTree>;

/// Fully qualified coordinates of an agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId {
    /// Database containing the agent.
    pub database: String,
    /// Schema containing the agent.
    pub schema: String,
    /// Agent name.
    pub name: String,
}

impl AgentId {
    /// Creates agent coordinates.
    #[must_use]
    pub fn new(database: impl Into<String>, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.name)
    }
}

/// One row of `SHOW GRANTS ON AGENT`, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedGrant {
    /// Privilege name (may be `OWNERSHIP`).
    pub privilege: String,
    /// Grantee kind (`ROLE`, `DATABASE_ROLE`, ...).
    pub granted_to: String,
    /// Grantee name.
    pub grantee_name: String,
}

/// Reads and writes agent bodies.
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Fetches the current spec; `None` when the agent does not exist.
    async fn get_current(&self, id: &AgentId) -> Result<Option<ConfigTree>>;

    /// Creates the agent with the full desired spec.
    async fn create(&self, id: &AgentId, spec: &ConfigTree) -> Result<()>;

    /// Replaces the given top-level fields of an existing agent.
    async fn update(&self, id: &AgentId, payload: &UpdatePayload) -> Result<()>;
}

/// Reads and changes grants on agents.
#[async_trait]
pub trait GrantService: Send + Sync {
    /// Lists every grant currently held on the agent.
    async fn list_current_grants(&self, id: &AgentId) -> Result<Vec<ObservedGrant>>;

    /// Grants a privilege to a role.
    async fn grant(
        &self,
        id: &AgentId,
        role_type: RoleType,
        role_name: &str,
        privilege: Privilege,
    ) -> Result<()>;

    /// Revokes a privilege from a role.
    async fn revoke(
        &self,
        id: &AgentId,
        role_type: RoleType,
        role_name: &str,
        privilege: Privilege,
    ) -> Result<()>;
}
