//! Configuration specification types for agent reconciliation.
//!
//! This module defines all the structs that map to the `halldyll.agents.yaml`
//! file. The file is declarative: it describes every agent that should exist
//! and exactly which roles may use it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::planner::{DiffOptions, GrantEntry, GrantState, Privilege, RoleType, Target};
use crate::service::AgentId;
use crate::tree::ConfigTree;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Account and default location.
    pub connection: ConnectionConfig,
    /// Reconciliation behaviour.
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Agents to manage.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// Account connection and default agent location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Account URL, e.g. `https://xy12345.snowflakecomputing.com`.
    pub account_url: String,
    /// Default database for agents.
    pub database: String,
    /// Default schema for agents.
    pub schema: String,
    /// HTTP request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsConfig {
    /// Ignore fields set locally that the platform does not report back.
    #[serde(default)]
    pub ignore_missing_remote: bool,
    /// Leave fields alone that the platform reports but the file omits.
    #[serde(default)]
    pub ignore_missing_local: bool,
    /// Overall deadline for a plan or apply run, in seconds.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

/// One managed agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Agent name.
    pub name: String,
    /// Database override.
    #[serde(default)]
    pub database: Option<String>,
    /// Schema override.
    #[serde(default)]
    pub schema: Option<String>,
    /// Desired agent body.
    #[serde(default)]
    pub spec: AgentSpec,
    /// Desired grants on the agent.
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
}

/// Desired agent body, as sent to the agents API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Display profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<AgentProfile>,
    /// Model selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsConfig>,
    /// Prompt instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Instructions>,
    /// Orchestration limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<OrchestrationConfig>,
    /// Tools available to the agent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolConfig>,
    /// Per-tool resources, keyed by tool name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tool_resources: BTreeMap<String, serde_json::Value>,
    /// Fields this tool does not model, passed through as written.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// How the agent is presented to users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Accent color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Model selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelsConfig {
    /// Orchestration model, or `auto`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<String>,
}

/// Prompt instructions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instructions {
    /// Instructions for the final response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Instructions for tool orchestration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<String>,
    /// System prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Suggested starter questions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_questions: Vec<SampleQuestion>,
}

/// A suggested starter question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleQuestion {
    /// Question text.
    pub question: String,
    /// Optional canned answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Orchestration limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestrationConfig {
    /// Time and token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetConfig>,
}

/// Orchestration budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetConfig {
    /// Wall-clock limit in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    /// Token limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

/// A tool entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfig {
    /// Tool definition.
    pub tool_spec: ToolSpec,
}

/// Tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// Tool type, e.g. `cortex_analyst_text_to_sql` or `generic`.
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Tool name, referenced by `tool_resources`.
    pub name: String,
    /// What the tool does, shown to the orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the tool input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

/// Grants to one role.
///
/// Exactly one of `role` and `database_role` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantConfig {
    /// Account role name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Database role name, usually `DB.ROLE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_role: Option<String>,
    /// Privileges to grant (`USAGE`, `MODIFY`, `MONITOR`, `ALL`).
    pub privileges: Vec<String>,
}

impl AgentsConfig {
    /// Returns the diff options implied by the settings.
    #[must_use]
    pub const fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            ignore_missing_remote: self.settings.ignore_missing_remote,
            ignore_missing_local: self.settings.ignore_missing_local,
        }
    }

    /// Returns the configured run deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.settings.deadline_secs.map(Duration::from_secs)
    }

    /// Returns the agent with the given name.
    #[must_use]
    pub fn get_agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Converts every agent into a plan target.
    ///
    /// # Errors
    ///
    /// Returns an error if a spec cannot be serialized or a grant names an
    /// unknown privilege or no role.
    pub fn targets(&self) -> Result<Vec<Target>> {
        self.agents
            .iter()
            .map(|agent| agent.target(&self.connection))
            .collect()
    }
}

impl AgentConfig {
    /// Fully qualified coordinates, using connection defaults.
    #[must_use]
    pub fn id(&self, connection: &ConnectionConfig) -> AgentId {
        AgentId::new(
            self.database.as_deref().unwrap_or(&connection.database),
            self.schema.as_deref().unwrap_or(&connection.schema),
            &self.name,
        )
    }

    /// Desired grants, one entry per listed privilege.
    ///
    /// # Errors
    ///
    /// Returns an error if a grant is malformed.
    pub fn grant_state(&self) -> Result<GrantState> {
        let mut state = GrantState::new();
        for grant in &self.grants {
            let (role_type, role_name) = grant.grantee()?;
            for privilege in &grant.privileges {
                let privilege: Privilege = privilege.parse()?;
                state.insert(GrantEntry::new(privilege, role_type, role_name));
            }
        }
        Ok(state)
    }

    /// Builds the plan target for this agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be serialized or a grant is
    /// malformed.
    pub fn target(&self, connection: &ConnectionConfig) -> Result<Target> {
        let id = self.id(connection);
        let desired = ConfigTree::from_serializable(&self.spec).map_err(|e| {
            ConfigError::Serialization {
                target: id.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Target {
            grants: self.grant_state()?,
            id,
            desired,
        })
    }
}

impl GrantConfig {
    /// Returns the grantee kind and name.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly one of `role` and `database_role` is set.
    pub fn grantee(&self) -> Result<(RoleType, &str)> {
        match (&self.role, &self.database_role) {
            (Some(role), None) => Ok((RoleType::AccountRole, role)),
            (None, Some(role)) => Ok((RoleType::DatabaseRole, role)),
            (Some(_), Some(_)) => Err(ConfigError::validation(
                "Grant must set only one of 'role' and 'database_role'",
                "grants",
            )
            .into()),
            (None, None) => Err(ConfigError::validation(
                "Grant must set 'role' or 'database_role'",
                "grants",
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection() -> ConnectionConfig {
        ConnectionConfig {
            account_url: String::from("https://xy12345.snowflakecomputing.com"),
            database: String::from("AI"),
            schema: String::from("AGENTS"),
            timeout_secs: None,
        }
    }

    fn agent(name: &str) -> AgentConfig {
        AgentConfig {
            name: name.to_string(),
            database: None,
            schema: None,
            spec: AgentSpec::default(),
            grants: Vec::new(),
        }
    }

    #[test]
    fn test_id_uses_connection_defaults() {
        let mut a = agent("SALES");
        assert_eq!(a.id(&connection()).to_string(), "AI.AGENTS.SALES");

        a.schema = Some(String::from("OTHER"));
        assert_eq!(a.id(&connection()).to_string(), "AI.OTHER.SALES");
    }

    #[test]
    fn test_settings_drive_diff_options() {
        let config: AgentsConfig = serde_yaml::from_str(
            r"
connection:
  account_url: https://xy12345.snowflakecomputing.com
  database: AI
  schema: AGENTS
settings:
  ignore_missing_local: true
",
        )
        .unwrap();

        let options = config.diff_options();
        assert!(options.ignore_missing_local);
        assert!(!options.ignore_missing_remote);

        let defaults = AgentsConfig {
            settings: SettingsConfig::default(),
            ..config
        };
        assert_eq!(defaults.diff_options(), DiffOptions::default());
    }

    #[test]
    fn test_unset_fields_are_left_out_of_tree() {
        let mut a = agent("SALES");
        a.spec.comment = Some(String::from("hello"));
        a.spec.models = Some(ModelsConfig {
            orchestration: Some(String::from("auto")),
        });

        let target = a.target(&connection()).unwrap();

        assert_eq!(
            target.desired,
            ConfigTree::from(json!({"comment": "hello", "models": {"orchestration": "auto"}}))
        );
    }

    #[test]
    fn test_tool_type_is_renamed() {
        let mut a = agent("SALES");
        a.spec.tools.push(ToolConfig {
            tool_spec: ToolSpec {
                tool_type: String::from("generic"),
                name: String::from("lookup"),
                description: None,
                input_schema: None,
            },
        });

        let target = a.target(&connection()).unwrap();

        assert_eq!(
            target.desired.get("tools"),
            Some(&ConfigTree::from(json!([{"tool_spec": {"type": "generic", "name": "lookup"}}])))
        );
    }

    #[test]
    fn test_grant_state_from_config() {
        let mut a = agent("SALES");
        a.grants.push(GrantConfig {
            role: Some(String::from("ANALYST")),
            database_role: None,
            privileges: vec![String::from("usage"), String::from("monitor")],
        });
        a.grants.push(GrantConfig {
            role: None,
            database_role: Some(String::from("AI.USERS")),
            privileges: vec![String::from("ALL")],
        });

        let state = a.grant_state().unwrap();
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_grant_needs_exactly_one_role() {
        let both = GrantConfig {
            role: Some(String::from("A")),
            database_role: Some(String::from("B")),
            privileges: vec![String::from("USAGE")],
        };
        let neither = GrantConfig {
            role: None,
            database_role: None,
            privileges: vec![String::from("USAGE")],
        };

        assert!(both.grantee().is_err());
        assert!(neither.grantee().is_err());
    }

    #[test]
    fn test_unknown_privilege_is_rejected() {
        let mut a = agent("SALES");
        a.grants.push(GrantConfig {
            role: Some(String::from("ANALYST")),
            database_role: None,
            privileges: vec![String::from("OWNERSHIP")],
        });

        assert!(a.target(&connection()).is_err());
    }
}
