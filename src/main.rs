//! Grok MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server for xAI's Grok API.
//! Speaks JSON-RPC over stdio; logs go to stderr.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use grok_mcp_server::config::Config;
use grok_mcp_server::grok::client::GrokClient;
use grok_mcp_server::grok::types::ModelSource;
use grok_mcp_server::mcp::server::McpServer;
use grok_mcp_server::metrics::Metrics;

/// Grok MCP Server
#[derive(Parser)]
#[command(name = "grok-mcp-server")]
#[command(author, version, about = "Grok MCP Server - A Model Context Protocol server for xAI's Grok")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Grok API is reachable with the configured key
    Check,

    /// List the models available to the configured key
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine; variables may come from the environment
    let _ = dotenvy::dotenv();
    let config = Config::from_env().context("failed to load configuration")?;

    // Initialize logging; RUST_LOG overrides LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid LOG_LEVEL")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?config, "configuration loaded");
    let client = Arc::new(GrokClient::new(config).context("failed to build Grok client")?);

    match cli.command {
        Some(Commands::Check) => {
            if client.test_connection().await {
                eprintln!("Connected to Grok API at {}", client.config().base_url);
                std::process::exit(0);
            }
            eprintln!("Could not reach Grok API at {}", client.config().base_url);
            std::process::exit(1);
        }
        Some(Commands::Models) => {
            let list = client.get_models().await;
            if list.source == ModelSource::Fallback {
                eprintln!("Model listing failed; showing known models");
            }
            for model in list.models {
                println!("{}", model);
            }
        }
        None => run_server(client).await?,
    }

    Ok(())
}

async fn run_server(client: Arc<GrokClient>) -> anyhow::Result<()> {
    tracing::info!(
        name = %client.config().server_name,
        version = %client.config().server_version,
        auth = client.config().auth_enabled(),
        "starting MCP server on stdio"
    );

    let server = Arc::new(McpServer::new(client, Arc::new(Metrics::new())));
    server.run_stdio().await.context("MCP server stopped")?;

    tracing::info!("MCP server shut down");
    Ok(())
}
