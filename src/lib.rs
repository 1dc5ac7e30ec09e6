// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halldyll Deploy Agents
//!
//! A declarative, idempotent reconciler for Snowflake Cortex agents and the
//! privileges granted on them.
//!
//! ## Overview
//!
//! Halldyll lets you keep agents as code:
//!
//! - Describe every agent's spec and grants in a YAML configuration file
//! - See a plan of structural spec changes and grant operations before applying
//! - Converge agents with minimal partial updates and grant/revoke calls
//! - Detect drift between the file and the account
//!
//! ## Architecture
//!
//! 1. **Desired State**: Defined in `halldyll.agents.yaml`
//! 2. **Observed State**: Read from the Cortex Agents REST API and `SHOW GRANTS`
//! 3. **Planner**: Tree and grant differs classify each agent
//! 4. **Executor**: Applies body changes, then revokes, then grants
//!
//! ## Modules
//!
//! - [`tree`]: Configuration tree model and path rendering
//! - [`config`]: Configuration parsing, validation and fingerprinting
//! - [`planner`]: Tree differ, grant differ, plan builder and apply executor
//! - [`service`]: Collaborator traits for agent bodies and grants
//! - [`snowflake`]: Snowflake REST and SQL statements transport
//! - [`reconciler`]: Plan and apply orchestration, drift detection
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! connection:
//!   account_url: https://xy12345.snowflakecomputing.com
//!   database: AI
//!   schema: AGENTS
//!
//! agents:
//!   - name: SALES_ASSISTANT
//!     spec:
//!       comment: Answers pipeline questions
//!       models:
//!         orchestration: claude-4-sonnet
//!     grants:
//!       - role: ANALYST
//!         privileges: [USAGE]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod service;
pub mod snowflake;
pub mod tree;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{AgentsConfig, ConfigHasher, ConfigParser, ConfigValidator};
pub use error::{HalldyllError, Result};
pub use planner::{
    ApplyExecutor, ApplyOutcome, Change, GrantDiff, GrantDiffer, Plan, PlanAction, PlanBuilder,
    PlanItem, TreeDiffer,
};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use service::{AgentId, GrantService, ResourceService};
pub use snowflake::{AgentService, GrantStatementService, SnowflakeClient};
pub use tree::ConfigTree;
