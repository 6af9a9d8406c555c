//! Tally CLI - Run aggregation requests against JSON datasets
//!
//! Usage:
//!   tally query --request <request.json> [--tz <iana>] [--config <tally.toml>] [--now <rfc3339>]
//!   tally check --request <request.json> [--tz <iana>] [--storage <aware|naive>]
//!   tally sources [--config <tally.toml>]
//!
//! Examples:
//!   tally query --request monthly_sales.json --tz America/Sao_Paulo
//!   tally check --request monthly_sales.json --now 2024-03-15T12:00:00Z
//!   RUST_LOG=tally=debug tally query --request monthly_sales.json

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tally::config::{parse_timezone, Settings};
use tally::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - Declarative metric aggregation for charts")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to $TALLY_CONFIG or ./tally.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a request and print the response
    Query {
        /// Path to the request JSON file
        #[arg(short, long)]
        request: PathBuf,

        /// Display timezone (overrides the configured one)
        #[arg(long)]
        tz: Option<String>,

        /// Reference time for relative periods (RFC 3339)
        #[arg(long)]
        now: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Plan a request without executing it and print the plan
    Check {
        /// Path to the request JSON file
        #[arg(short, long)]
        request: PathBuf,

        /// Display timezone (overrides the configured one)
        #[arg(long)]
        tz: Option<String>,

        /// Reference time for relative periods (RFC 3339)
        #[arg(long)]
        now: Option<String>,

        /// Storage mode to plan for (overrides the configured one)
        #[arg(long)]
        storage: Option<StorageArg>,
    },

    /// List the models served by the configured sources
    Sources,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Indented JSON
    Pretty,
}

#[derive(Clone, ValueEnum)]
enum StorageArg {
    Aware,
    Naive,
}

impl From<StorageArg> for StorageMode {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Aware => StorageMode::Aware,
            StorageArg::Naive => StorageMode::Naive,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tally=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Query {
            request,
            tz,
            now,
            output,
        } => cmd_query(&settings, &request, tz, now, output).await,
        Commands::Check {
            request,
            tz,
            now,
            storage,
        } => cmd_check(&settings, &request, tz, now, storage),
        Commands::Sources => cmd_sources(&settings).await,
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, tally::config::SettingsError> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
}

async fn cmd_query(
    settings: &Settings,
    request: &Path,
    tz: Option<String>,
    now: Option<String>,
    output: OutputFormat,
) -> ExitCode {
    let Some((request, timezone, now)) = prepare(settings, request, tz, now) else {
        return ExitCode::FAILURE;
    };

    let catalog = match settings.build_catalog().await {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error loading sources: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::new(catalog).with_options(settings.engine.options());
    let response = match engine.execute_at(&request, timezone, now).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            eprintln!("Unknown model: {}", request.model);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Query error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let rendered = match output {
        OutputFormat::Json => serde_json::to_string(&response),
        OutputFormat::Pretty => serde_json::to_string_pretty(&response),
    };
    match rendered {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error serializing response: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_check(
    settings: &Settings,
    request: &Path,
    tz: Option<String>,
    now: Option<String>,
    storage: Option<StorageArg>,
) -> ExitCode {
    let Some((request, timezone, now)) = prepare(settings, request, tz, now) else {
        return ExitCode::FAILURE;
    };

    let storage = storage
        .map(StorageMode::from)
        .or_else(|| settings.sources.get(&request.model).and_then(|s| s.storage))
        .unwrap_or(settings.engine.storage);

    let ctx = PlanContext::new(timezone, now, storage).with_max_limit(settings.engine.max_limit);
    match PlanBuilder::new(&ctx).build(&request) {
        Ok(planned) => {
            println!("{}", planned.plan);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Planning error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_sources(settings: &Settings) -> ExitCode {
    let catalog = match settings.build_catalog().await {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error loading sources: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if catalog.is_empty() {
        println!("No sources configured.");
        return ExitCode::SUCCESS;
    }

    println!("Sources:");
    for model in catalog.models() {
        if let Some(source) = catalog.resolve(model) {
            println!("  - {} ({})", model, source.storage());
        }
    }
    ExitCode::SUCCESS
}

/// Read the request and resolve timezone and reference time.
fn prepare(
    settings: &Settings,
    request: &Path,
    tz: Option<String>,
    now: Option<String>,
) -> Option<(AggregateRequest, chrono_tz::Tz, DateTime<Utc>)> {
    let text = match fs::read_to_string(request) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", request.display(), e);
            return None;
        }
    };
    let request: AggregateRequest = match serde_json::from_str(&text) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Invalid request: {}", e);
            return None;
        }
    };

    let timezone = match tz {
        Some(name) => parse_timezone(&name),
        None => settings.engine.timezone(),
    };
    let timezone = match timezone {
        Ok(timezone) => timezone,
        Err(e) => {
            eprintln!("{}", e);
            return None;
        }
    };

    let now = match now.as_deref().map(DateTime::parse_from_rfc3339) {
        None => Utc::now(),
        Some(Ok(now)) => now.with_timezone(&Utc),
        Some(Err(e)) => {
            eprintln!("Invalid --now value: {}", e);
            return None;
        }
    };

    Some((request, timezone, now))
}
