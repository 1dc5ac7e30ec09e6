//! Halldyll CLI entrypoint.
//!
//! This is the main entrypoint for the halldyll command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use halldyll_deploy_agents::cli::{Cli, Commands, OutputFormatter};
use halldyll_deploy_agents::config::{
    AgentsConfig, ConfigParser, ConfigValidator, find_config_file,
};
use halldyll_deploy_agents::error::{HalldyllError, Result};
use halldyll_deploy_agents::reconciler::{ReconciliationResult, Reconciler};
use halldyll_deploy_agents::snowflake::{AgentService, GrantStatementService, SnowflakeClient};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system; `RUST_LOG` wins over the defaults.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply { yes } => cmd_apply(cli.config.as_ref(), yes, &formatter).await,
        Commands::Drift => cmd_drift(cli.config.as_ref(), &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&config);
    emit(&formatter.format_validation(&config, &result, show_warnings))?;

    if result.is_valid() {
        Ok(())
    } else {
        Err(HalldyllError::internal(format!(
            "Configuration has {} errors",
            result.error_count()
        )))
    }
}

/// Show reconciliation plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let (agents, grants) = create_services(&config)?;

    let reconciler = Reconciler::new(&config, &agents, &grants);
    let plan = reconciler.plan().await?;

    emit(&formatter.format_plan(&plan, detailed))
}

/// Apply reconciliation plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let (agents, grants) = create_services(&config)?;

    let reconciler = Reconciler::new(&config, &agents, &grants);
    let plan = reconciler.plan().await?;

    if plan.is_empty() {
        emit(&formatter.format_plan(&plan, false))?;
        return Ok(());
    }

    emit(&formatter.format_plan(&plan, true))?;

    if !auto_approve {
        eprint!("Do you want to apply this plan? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(());
        }
    }

    let outcome = reconciler.apply(&plan).await;
    let result = ReconciliationResult::from_outcome(&plan, Some(&outcome));
    emit(&formatter.format_reconciliation(&result))?;

    outcome.into_result().map(|_| ())
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    let (agents, grants) = create_services(&config)?;

    let report = Reconciler::new(&config, &agents, &grants)
        .check_drift()
        .await?;

    emit(&formatter.format_drift(&report))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Creates a parser rooted at the directory of the configuration file.
fn parser_for(config_file: &Path) -> ConfigParser {
    ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")))
}

/// Loads and validates the configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<AgentsConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    ConfigValidator::new().validate(&config)?;

    Ok(config)
}

/// Creates the agent and grant services for the configured account.
fn create_services(config: &AgentsConfig) -> Result<(AgentService, GrantStatementService)> {
    let token = ConfigParser::get_snowflake_token()?;
    let client = SnowflakeClient::from_config(&config.connection, &token)?;
    Ok((
        AgentService::new(client.clone()),
        GrantStatementService::new(client),
    ))
}
