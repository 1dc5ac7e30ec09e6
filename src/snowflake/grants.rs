//! Grant management through the SQL statements API.
//!
//! Agents have no REST endpoint for grants, so `SHOW GRANTS`, `GRANT` and
//! `REVOKE` are sent as SQL statements.

use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::planner::{Privilege, RoleType};
use crate::service::{AgentId, GrantService, ObservedGrant};

use super::client::SnowflakeClient;
use super::types::{StatementRequest, StatementResponse};

/// Maximum number of polls for a statement that runs asynchronously.
const MAX_POLLS: u32 = 30;

/// Delay between polls in milliseconds.
const POLL_DELAY_MS: u64 = 500;

/// Server-side statement timeout in seconds.
const STATEMENT_TIMEOUT_SECS: u64 = 60;

/// Returns true if `name` can be used unquoted.
///
/// Unquoted identifiers start with a letter or underscore and contain only
/// letters, digits, `_` and `$`. They resolve case-insensitively.
#[must_use]
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Quotes an identifier unless it is plain.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Fully qualified, quoted agent name.
#[must_use]
pub fn qualified_name(id: &AgentId) -> String {
    format!(
        "{}.{}.{}",
        quote_identifier(&id.database),
        quote_identifier(&id.schema),
        quote_identifier(&id.name)
    )
}

/// Quoted role name; database roles are quoted per part.
fn role_name_sql(role_type: RoleType, role_name: &str) -> String {
    match role_type {
        RoleType::AccountRole => quote_identifier(role_name),
        RoleType::DatabaseRole => role_name
            .split('.')
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join("."),
    }
}

/// `GRANT <privilege> ON AGENT <agent> TO <role>`.
#[must_use]
pub fn grant_statement(id: &AgentId, role_type: RoleType, role_name: &str, privilege: Privilege) -> String {
    format!(
        "GRANT {privilege} ON AGENT {} TO {} {}",
        qualified_name(id),
        role_type.keyword(),
        role_name_sql(role_type, role_name)
    )
}

/// `REVOKE <privilege> ON AGENT <agent> FROM <role>`.
#[must_use]
pub fn revoke_statement(id: &AgentId, role_type: RoleType, role_name: &str, privilege: Privilege) -> String {
    format!(
        "REVOKE {privilege} ON AGENT {} FROM {} {}",
        qualified_name(id),
        role_type.keyword(),
        role_name_sql(role_type, role_name)
    )
}

/// Grant service backed by SQL statements.
#[derive(Debug, Clone)]
pub struct GrantStatementService {
    /// API client.
    client: SnowflakeClient,
    /// Delay between polls of running statements.
    poll_delay: Duration,
}

impl GrantStatementService {
    /// Creates a new grant service.
    #[must_use]
    pub const fn new(client: SnowflakeClient) -> Self {
        Self {
            client,
            poll_delay: Duration::from_millis(POLL_DELAY_MS),
        }
    }

    /// Sets the delay between polls of running statements.
    #[must_use]
    pub const fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Runs one statement and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement is rejected or does not finish.
    pub async fn run_statement(&self, sql: &str) -> Result<StatementResponse> {
        debug!("Executing: {sql}");

        let mut request = StatementRequest::new(sql);
        request.timeout = Some(STATEMENT_TIMEOUT_SECS);
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::invalid_response(format!("Failed to encode statement: {e}")))?;

        let value = self
            .client
            .execute(Method::POST, &["api", "v2", "statements"], Some(&body))
            .await?;
        let mut response = parse_statement(value)?;

        for _ in 0..MAX_POLLS {
            if !response.in_progress() {
                return Ok(response);
            }
            let Some(handle) = response.statement_handle.clone() else {
                return Err(ApiError::invalid_response("Running statement has no handle").into());
            };
            tokio::time::sleep(self.poll_delay).await;
            let value = self
                .client
                .execute(Method::GET, &["api", "v2", "statements", &handle], None)
                .await?;
            response = parse_statement(value)?;
        }

        if response.in_progress() {
            return Err(ApiError::invalid_response(format!(
                "Statement did not finish after {MAX_POLLS} polls"
            ))
            .into());
        }
        Ok(response)
    }
}

fn parse_statement(value: serde_json::Value) -> Result<StatementResponse> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::invalid_response(format!("Unexpected statement response: {e}")).into())
}

#[async_trait]
impl GrantService for GrantStatementService {
    async fn list_current_grants(&self, id: &AgentId) -> Result<Vec<ObservedGrant>> {
        let response = self
            .run_statement(&format!("SHOW GRANTS ON AGENT {}", qualified_name(id)))
            .await?;

        let mut grants = Vec::with_capacity(response.data.len());
        for row in &response.data {
            let (Some(privilege), Some(granted_to), Some(grantee_name)) = (
                response.cell(row, "privilege"),
                response.cell(row, "granted_to"),
                response.cell(row, "grantee_name"),
            ) else {
                return Err(ApiError::invalid_response(
                    "SHOW GRANTS row is missing privilege, granted_to or grantee_name",
                )
                .into());
            };
            grants.push(ObservedGrant {
                privilege: privilege.to_string(),
                granted_to: granted_to.to_string(),
                grantee_name: grantee_name.to_string(),
            });
        }

        debug!("{id}: {} grants observed", grants.len());
        Ok(grants)
    }

    async fn grant(
        &self,
        id: &AgentId,
        role_type: RoleType,
        role_name: &str,
        privilege: Privilege,
    ) -> Result<()> {
        info!("Granting {privilege} on {id} to {role_type} {role_name}");
        self.run_statement(&grant_statement(id, role_type, role_name, privilege))
            .await
            .map(|_| ())
    }

    async fn revoke(
        &self,
        id: &AgentId,
        role_type: RoleType,
        role_name: &str,
        privilege: Privilege,
    ) -> Result<()> {
        info!("Revoking {privilege} on {id} from {role_type} {role_name}");
        self.run_statement(&revoke_statement(id, role_type, role_name, privilege))
            .await
            .map(|_| ())
    }
}
