//! Error types for the Halldyll agent reconciliation system.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, the Snowflake transport, planning, and apply.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::planner::GrantEntry;

/// The main error type for the Halldyll agent reconciliation system.
#[derive(Debug, Error)]
pub enum HalldyllError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snowflake API errors.
    #[error("Snowflake API error: {0}")]
    Api(#[from] ApiError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Apply errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Two agents resolve to the same fully qualified name.
    #[error("Duplicate agent: {name}")]
    DuplicateName {
        /// The duplicated fully qualified name.
        name: String,
    },

    /// A privilege name is not one this tool manages.
    #[error("Invalid privilege: {privilege}")]
    InvalidPrivilege {
        /// The rejected privilege string.
        privilege: String,
    },

    /// An identifier cannot be used as a Snowflake object name.
    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A desired-state record could not be turned into a configuration tree.
    #[error("Failed to serialize desired state for {target}: {message}")]
    Serialization {
        /// Target whose spec failed to serialize.
        target: String,
        /// Serializer message.
        message: String,
    },
}

/// Snowflake API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// API request failed.
    #[error("API request failed with status {status}: {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the authentication failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid API response: {message}")]
    InvalidResponse {
        /// Description of the invalid response.
        message: String,
    },

    /// A SQL statement was rejected by the statements API.
    #[error("Statement failed ({code}): {message}")]
    StatementFailed {
        /// Snowflake error code.
        code: String,
        /// Error message returned with the code.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Reading current state for a target failed; the whole plan is abandoned.
    #[error("Failed to fetch current state of {target}: {source}")]
    RemoteFetch {
        /// Target being fetched.
        target: String,
        /// Underlying failure.
        source: Box<HalldyllError>,
    },

    /// The caller's deadline passed while fetching a target.
    #[error("Deadline exceeded while fetching {target}")]
    DeadlineExceeded {
        /// Target being fetched.
        target: String,
    },
}

/// Apply errors.
///
/// Any of these stops the batch; items applied before it stay applied.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The create call for a target failed.
    #[error("Failed to create {target}: {source}")]
    CreateFailed {
        /// Target being created.
        target: String,
        /// Underlying failure.
        source: Box<HalldyllError>,
    },

    /// The update call for a target failed.
    #[error("Failed to update {target}: {source}")]
    UpdateFailed {
        /// Target being updated.
        target: String,
        /// Underlying failure.
        source: Box<HalldyllError>,
    },

    /// One or more grant operations in a target's convergence batch failed.
    #[error("{} grant operation(s) failed on {target}: {}", .failures.len(), join_failures(.failures))]
    GrantsFailed {
        /// Target whose grants were being converged.
        target: String,
        /// Every failure in the batch.
        failures: Vec<GrantError>,
    },

    /// The caller's deadline passed during a remote call.
    ///
    /// Carries the grant failures collected for the item before the deadline.
    #[error("Deadline exceeded while applying {target}{}", deadline_failures(.failures))]
    DeadlineExceeded {
        /// Target being applied.
        target: String,
        /// Grant failures seen earlier in the same batch.
        failures: Vec<GrantError>,
    },
}

/// Which side of grant convergence an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOperation {
    /// A `GRANT` statement.
    Grant,
    /// A `REVOKE` statement.
    Revoke,
}

/// A single failed grant or revoke call.
#[derive(Debug, Clone, Error)]
#[error("{operation} {entry}: {message}")]
pub struct GrantError {
    /// Operation that failed.
    pub operation: GrantOperation,
    /// Entry the operation was applied to.
    pub entry: GrantEntry,
    /// Failure message.
    pub message: String,
}

fn join_failures(failures: &[GrantError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn deadline_failures(failures: &[GrantError]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" after {} grant failure(s): {}", failures.len(), join_failures(failures))
    }
}

/// Result type alias for Halldyll operations.
pub type Result<T> = std::result::Result<T, HalldyllError>;

impl HalldyllError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::RateLimited { .. } | ApiError::NetworkError { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            Self::Api(ApiError::NetworkError { .. }) => Some(1),
            _ => None,
        }
    }

    /// Returns true if the error is an HTTP 404 from the API.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::ApiRequestFailed { status: 404, .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl ApplyError {
    /// Returns the target the failure belongs to.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::CreateFailed { target, .. }
            | Self::UpdateFailed { target, .. }
            | Self::GrantsFailed { target, .. }
            | Self::DeadlineExceeded { target, .. } => target,
        }
    }
}

impl fmt::Display for GrantOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
        };
        write!(f, "{s}")
    }
}
