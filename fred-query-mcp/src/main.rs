//! `fred-mcp`: MCP stdio server exposing FRED economic data tools.
//!
//! Bootstrap order matters: environment first (`.env` then process env),
//! configuration next (missing FRED_API_KEY is fatal), logging to stderr so
//! stdout stays clean for the MCP framing, then the shared application
//! context, then serve.

mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fred_query::{AppContext, Config, LogFormat};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fred-mcp", version, about = "MCP server for FRED economic data")]
struct Cli {
    /// Transport to serve on. Only stdio is implemented.
    #[arg(long, default_value = "stdio")]
    transport: String,

    /// Optional .env file to load before reading the environment
    #[arg(long)]
    env_file: Option<String>,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_ascii_lowercase()));
    // stdout carries MCP JSON-RPC framing; all logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.env_file.as_deref() {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file '{path}'"))?;
        }
        None => {
            // A missing .env is fine; the process environment may be complete
            let _ = dotenvy::dotenv();
        }
    }

    if cli.transport != "stdio" {
        anyhow::bail!("unsupported transport '{}', only stdio is implemented", cli.transport);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // CONFIG errors are fatal before logging is even up
            eprintln!("fred-mcp: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    let validate_tables = config.validate_series_at_startup;
    let ctx = Arc::new(AppContext::new(config).await?);

    if validate_tables {
        tracing::info!("validating reference series tables against FRED");
        if let Err(e) = fred_query::workflows::validate_reference_tables(&ctx).await {
            eprintln!("fred-mcp: reference table validation failed: {e}");
            std::process::exit(1);
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fred-mcp serving on stdio");
    server::serve_stdio(ctx).await
}
