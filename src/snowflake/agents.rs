//! Agent bodies through the Cortex Agents REST API.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ApiError, Result};
use crate::service::{AgentId, ResourceService, UpdatePayload};
use crate::tree::ConfigTree;

use super::client::SnowflakeClient;
use super::grants::quote_identifier;

/// Response field holding the agent body as a JSON string.
const AGENT_SPEC_FIELD: &str = "agent_spec";

/// Resource service for Cortex agents.
#[derive(Debug, Clone)]
pub struct AgentService {
    /// API client.
    client: SnowflakeClient,
}

impl AgentService {
    /// Creates a new agent service.
    #[must_use]
    pub const fn new(client: SnowflakeClient) -> Self {
        Self { client }
    }
}

/// Quoted path segments of the agents collection.
fn collection(id: &AgentId) -> [String; 7] {
    [
        String::from("api"),
        String::from("v2"),
        String::from("databases"),
        quote_identifier(&id.database),
        String::from("schemas"),
        quote_identifier(&id.schema),
        String::from("agents"),
    ]
}

/// Describe fields that carry object metadata rather than spec content.
const METADATA_FIELDS: &[&str] = &[
    "name",
    "database_name",
    "schema_name",
    "owner",
    "owner_role_type",
    "created_on",
    "updated_on",
];

/// Spec fields declared as objects or arrays; the platform may return them
/// as JSON strings.
const STRUCTURED_FIELDS: &[&str] = &[
    "profile",
    "models",
    "instructions",
    "orchestration",
    "tools",
    "tool_resources",
];

/// Reduces a describe response to the agent's spec fields.
///
/// Every field except object metadata is kept, so fields without a typed
/// model still round-trip. The platform returns the body either inline or
/// as a JSON string under `agent_spec`; both are merged, with `agent_spec`
/// taking precedence. Structured fields returned as JSON strings are
/// decoded; plain string fields such as `comment` are left alone.
///
/// # Errors
///
/// Returns an error if the response is not an object or `agent_spec` is not
/// valid JSON.
pub fn reduce_agent_response(body: Value) -> Result<ConfigTree> {
    let Value::Object(mut fields) = body else {
        return Err(ApiError::invalid_response("Agent response is not an object").into());
    };

    let embedded = match fields.remove(AGENT_SPEC_FIELD) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(
            serde_json::from_str::<Value>(&text)
                .map_err(|e| ApiError::invalid_response(format!("Invalid {AGENT_SPEC_FIELD}: {e}")))?,
        ),
        Some(Value::Object(spec)) => Some(Value::Object(spec)),
        _ => None,
    };

    let mut merged: Map<String, Value> = fields
        .into_iter()
        .filter(|(key, _)| !METADATA_FIELDS.contains(&key.as_str()))
        .collect();
    if let Some(Value::Object(spec)) = embedded {
        merged.extend(spec);
    }

    for (key, value) in &mut merged {
        if STRUCTURED_FIELDS.contains(&key.as_str()) {
            decode_json_string(value);
        }
    }
    merged.retain(|_, v| !v.is_null());

    Ok(ConfigTree::from(Value::Object(merged)))
}

/// Replaces a string holding a JSON object or array with its decoded value.
fn decode_json_string(value: &mut Value) {
    let Value::String(text) = value else {
        return;
    };
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(decoded) => *value = decoded,
        Err(e) => warn!("Keeping undecodable field value as a string: {e}"),
    }
}

#[async_trait]
impl ResourceService for AgentService {
    async fn get_current(&self, id: &AgentId) -> Result<Option<ConfigTree>> {
        let mut segments = collection(id).to_vec();
        segments.push(quote_identifier(&id.name));
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match self.client.execute(Method::GET, &segments, None).await {
            Ok(body) => {
                debug!("{id} exists");
                reduce_agent_response(body).map(Some)
            }
            Err(e) if e.is_not_found() => {
                debug!("{id} not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create(&self, id: &AgentId, spec: &ConfigTree) -> Result<()> {
        let mut body = match spec.to_json() {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                return Err(ApiError::invalid_response(format!(
                    "Agent spec must be an object, got {}",
                    ConfigTree::from(other).kind_name()
                ))
                .into());
            }
        };
        body.insert(String::from("name"), Value::String(id.name.clone()));

        let segments = collection(id);
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        info!("POST agent {id}");
        self.client
            .execute(Method::POST, &segments, Some(&Value::Object(body)))
            .await
            .map(|_| ())
    }

    async fn update(&self, id: &AgentId, payload: &UpdatePayload) -> Result<()> {
        let body: Map<String, Value> = payload
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();

        let mut segments = collection(id).to_vec();
        segments.push(quote_identifier(&id.name));
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        info!("PUT agent {id} ({} fields)", body.len());
        self.client
            .execute(Method::PUT, &segments, Some(&Value::Object(body)))
            .await
            .map(|_| ())
    }
}
