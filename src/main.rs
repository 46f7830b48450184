mod cache;
mod cmd;
mod config;
mod context;
mod domain;
mod error;
mod infra;
mod services;
mod workflow;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cache::CapabilityCache;
use crate::cmd::config::{self as config_cmd, ConfigArgs};
use crate::cmd::generate::{self, GenerateArgs};
use crate::cmd::probe::{self, ProbeArgs};
use crate::cmd::sync::{self as sync_cmd, CreateArgs, SyncArgs};
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::domain::sync::SyncResult;
use crate::error::{AppError, AppResult};
use crate::infra::jira::JiraClient;
use crate::infra::llm::GeminiClient;

/// Exit status when a sync run left some issues uncreated.
const PARTIAL_SYNC_EXIT: u8 = 2;
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser)]
#[command(
    name = "genie",
    author,
    version,
    about = "Turn requirements into Jira epics, stories and subtasks"
)]
struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence per target).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze requirement files and print the generated ticket tree.
    Generate(GenerateArgs),
    /// Create a previously generated ticket tree in Jira.
    Sync(SyncArgs),
    /// Analyze requirement files and create the tickets in Jira in one go.
    Create(CreateArgs),
    /// Show which Epic fields the Jira project requires.
    Probe(ProbeArgs),
    /// Manage CLI configuration.
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tokio::select! {
        outcome = run(cli.command) => match outcome {
            Ok(code) => code,
            Err(error) => {
                eprintln!("Error: {error}");
                if error.is_retryable() {
                    eprintln!("The model service may be temporarily unavailable; try again later.");
                } else if let AppError::Normalization { .. } = &error {
                    eprintln!("The log above shows the start and end of the unreadable response.");
                }
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning the in-flight request");
            eprintln!("Interrupted. Issues created so far remain in Jira.");
            ExitCode::from(INTERRUPTED_EXIT)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

async fn run(command: Commands) -> AppResult<ExitCode> {
    match command {
        Commands::Config(args) => {
            config_cmd::run(args.command)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Generate(args) => {
            let ctx = build_context()?;
            generate::run(&ctx, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Probe(args) => {
            let ctx = build_context()?;
            probe::run(&ctx, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync(args) => {
            let ctx = build_context()?;
            let result = sync_cmd::run_sync(&ctx, args).await?;
            finish_sync(&result)
        }
        Commands::Create(args) => {
            let ctx = build_context()?;
            let result = sync_cmd::run_create(&ctx, args).await?;
            finish_sync(&result)
        }
    }
}

fn finish_sync(result: &SyncResult) -> AppResult<ExitCode> {
    sync_cmd::print_report(result)?;
    if result.errors().is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(PARTIAL_SYNC_EXIT))
    }
}

fn build_context() -> AppResult<AppContext> {
    let config = AppConfig::load()?;

    if config.jira_base_url.is_none() {
        warn!("Jira base URL not configured; ticket creation will fail");
    }
    if config.jira_email.is_none() {
        warn!("Jira email not configured; ticket creation will fail");
    }
    if config.jira_token.is_none() {
        warn!("Jira API token not configured; ticket creation will fail");
    }
    if config.gemini_api_key.is_none() {
        warn!("Gemini API key not configured; requirement analysis will fail");
    }
    info!(model = %config.gemini_model, "configuration loaded");

    let language_model = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.model_timeout,
    )?);
    let issue_tracker = Arc::new(JiraClient::new(
        config.jira_base_url.clone(),
        config.jira_email.clone(),
        config.jira_token.clone(),
        config.tracker_timeout,
    )?);

    Ok(AppContext::new(
        config,
        issue_tracker,
        language_model,
        Arc::new(CapabilityCache::new()),
    ))
}
