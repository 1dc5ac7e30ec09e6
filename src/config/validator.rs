//! Configuration validation for agent specs.
//!
//! This module checks agent configurations before anything is sent to the
//! platform: identifiers, duplicate agents and tools, grant shapes and the
//! account URL.

use crate::error::{ConfigError, HalldyllError, Result};
use crate::planner::Privilege;
use crate::snowflake::is_plain_identifier;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use super::spec::{AgentConfig, AgentsConfig, ConnectionConfig, GrantConfig, SettingsConfig};

/// Longest identifier the platform accepts.
const MAX_IDENTIFIER_LEN: usize = 255;

/// Validator for agent configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The underlying error.
    pub error: ConfigError,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, error: ConfigError) {
        self.errors.push(ValidationError {
            field: field.into(),
            error,
        });
    }

    fn invalid(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        let error = ConfigError::validation(message, field.clone());
        self.error(field, error);
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration, failing on the first error found.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self, config: &AgentsConfig) -> Result<ValidationResult> {
        let mut result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first = result.errors.swap_remove(0);
            Err(HalldyllError::Config(first.error))
        }
    }

    /// Runs every check and returns all errors and warnings.
    #[must_use]
    pub fn check(&self, config: &AgentsConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_connection(&config.connection, &mut result);
        Self::validate_settings(&config.settings, &mut result);
        Self::validate_agents(config, &mut result);

        result
    }

    /// Validates connection settings.
    fn validate_connection(connection: &ConnectionConfig, result: &mut ValidationResult) {
        let url = connection.account_url.trim();
        if url.is_empty() {
            result.invalid("connection.account_url", "Account URL cannot be empty");
        } else if !url.starts_with("https://") {
            result.invalid(
                "connection.account_url",
                format!("Account URL '{url}' must use https"),
            );
        }

        check_identifier(&connection.database, "connection.database", result);
        check_identifier(&connection.schema, "connection.schema", result);

        if connection.timeout_secs == Some(0) {
            result.invalid("connection.timeout_secs", "Timeout must be at least 1 second");
        }
    }

    /// Validates reconciliation settings.
    fn validate_settings(settings: &SettingsConfig, result: &mut ValidationResult) {
        if settings.deadline_secs == Some(0) {
            result.invalid("settings.deadline_secs", "Deadline must be at least 1 second");
        }
    }

    /// Validates every agent and cross-agent uniqueness.
    fn validate_agents(config: &AgentsConfig, result: &mut ValidationResult) {
        if config.agents.is_empty() {
            result.warnings.push(String::from("No agents defined"));
        }

        let mut seen = HashSet::new();
        for (i, agent) in config.agents.iter().enumerate() {
            let prefix = format!("agents[{i}]");

            let id = agent.id(&config.connection);
            let key = id.to_string().to_uppercase();
            if !seen.insert(key) {
                result.error(
                    format!("{prefix}.name"),
                    ConfigError::DuplicateName {
                        name: id.to_string(),
                    },
                );
            }

            Self::validate_agent(agent, &prefix, result);
        }
    }

    /// Validates a single agent.
    fn validate_agent(agent: &AgentConfig, prefix: &str, result: &mut ValidationResult) {
        check_identifier(&agent.name, &format!("{prefix}.name"), result);
        if let Some(database) = &agent.database {
            check_identifier(database, &format!("{prefix}.database"), result);
        }
        if let Some(schema) = &agent.schema {
            check_identifier(schema, &format!("{prefix}.schema"), result);
        }

        let spec = &agent.spec;
        let mut tool_names = HashSet::new();
        for (i, tool) in spec.tools.iter().enumerate() {
            let field = format!("{prefix}.spec.tools[{i}].tool_spec");
            let name = tool.tool_spec.name.trim();
            if name.is_empty() {
                result.invalid(format!("{field}.name"), "Tool name cannot be empty");
            } else if !tool_names.insert(name.to_string()) {
                result.invalid(
                    format!("{field}.name"),
                    format!("Duplicate tool name '{name}'"),
                );
            }
            if tool.tool_spec.tool_type.trim().is_empty() {
                result.invalid(format!("{field}.type"), "Tool type cannot be empty");
            }
        }

        for resource in spec.tool_resources.keys() {
            if !tool_names.contains(resource.as_str()) {
                result.warnings.push(format!(
                    "{prefix}.spec.tool_resources.{resource}: no tool named '{resource}'"
                ));
            }
        }

        if let Some(budget) = spec.orchestration.as_ref().and_then(|o| o.budget.as_ref()) {
            if budget.seconds == Some(0) {
                result.invalid(
                    format!("{prefix}.spec.orchestration.budget.seconds"),
                    "Budget seconds must be positive",
                );
            }
            if budget.tokens == Some(0) {
                result.invalid(
                    format!("{prefix}.spec.orchestration.budget.tokens"),
                    "Budget tokens must be positive",
                );
            }
        }

        for (i, grant) in agent.grants.iter().enumerate() {
            Self::validate_grant(grant, &format!("{prefix}.grants[{i}]"), result);
        }
    }

    /// Validates a grant entry.
    fn validate_grant(grant: &GrantConfig, field: &str, result: &mut ValidationResult) {
        match grant.grantee() {
            Ok((_, name)) if grant.database_role.is_some() => {
                let parts: Vec<&str> = name.split('.').collect();
                if parts.len() > 2 {
                    result.error(
                        format!("{field}.database_role"),
                        ConfigError::InvalidIdentifier {
                            identifier: name.to_string(),
                            reason: String::from("expected DATABASE.ROLE"),
                        },
                    );
                } else {
                    if parts.len() == 1 {
                        result.warnings.push(format!(
                            "{field}.database_role: '{name}' is not qualified and resolves against the agent's database"
                        ));
                    }
                    for part in parts {
                        check_identifier(part, &format!("{field}.database_role"), result);
                    }
                }
            }
            Ok((_, name)) => check_identifier(name, &format!("{field}.role"), result),
            Err(HalldyllError::Config(e)) => result.error(field, e),
            Err(e) => result.invalid(field, e.to_string()),
        }

        if grant.privileges.is_empty() {
            result.invalid(format!("{field}.privileges"), "At least one privilege is required");
        }
        for privilege in &grant.privileges {
            if let Err(e) = privilege.parse::<Privilege>() {
                result.error(format!("{field}.privileges"), e);
            }
        }
    }
}

/// Records an error if `value` cannot be used as an object name, and a
/// warning if it will be treated case-sensitively.
fn check_identifier(value: &str, field: &str, result: &mut ValidationResult) {
    let reason = if value.is_empty() {
        Some("cannot be empty")
    } else if value.len() > MAX_IDENTIFIER_LEN {
        Some("is longer than 255 characters")
    } else if value.chars().any(char::is_control) {
        Some("contains control characters")
    } else {
        None
    };

    if let Some(reason) = reason {
        result.error(
            field,
            ConfigError::InvalidIdentifier {
                identifier: value.to_string(),
                reason: reason.to_string(),
            },
        );
    } else if !is_plain_identifier(value) {
        result.warnings.push(format!(
            "{field}: '{value}' will be quoted and matched case-sensitively"
        ));
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}
