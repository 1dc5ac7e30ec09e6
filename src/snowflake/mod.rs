//! Snowflake API integration module.
//!
//! This module implements the collaborator traits from [`crate::service`]
//! against a Snowflake account: agent bodies through the Cortex Agents REST
//! API and grants through the SQL statements API.

mod agents;
mod client;
mod grants;
mod types;

pub use agents::{AgentService, reduce_agent_response};
pub use client::SnowflakeClient;
pub use grants::{
    GrantStatementService, grant_statement, is_plain_identifier, qualified_name, quote_identifier,
    revoke_statement,
};
pub use types::{ColumnType, ResultSetMetaData, STATEMENT_IN_PROGRESS, StatementRequest, StatementResponse};
