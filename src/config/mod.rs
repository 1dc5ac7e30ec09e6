//! Configuration module for agent reconciliation.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `halldyll.agents.yaml`
//! - Validation of configuration values
//! - Computing desired-state fingerprints

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    AgentConfig, AgentProfile, AgentSpec, AgentsConfig, BudgetConfig, ConnectionConfig,
    GrantConfig, Instructions, ModelsConfig, OrchestrationConfig, SampleQuestion, SettingsConfig,
    ToolConfig, ToolSpec,
};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, TOKEN_ENV_VAR, apply_env_overrides, find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
