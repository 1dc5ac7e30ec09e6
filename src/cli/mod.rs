//! CLI module for the Halldyll agents tool.
//!
//! This module provides the command-line interface for reconciling
//! Snowflake Cortex agents and their grants.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
