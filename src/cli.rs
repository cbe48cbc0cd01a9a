//! CLI interface for inference-gateway

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::access::KeyStore;
use crate::admin;
use crate::config::{self, Config};

#[derive(Parser)]
#[command(name = "inference-gateway")]
#[command(about = "OpenAI-compatible gateway routing between local and remote LLM backends", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "INFERENCE_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage API keys
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Check a running gateway and the local backend
    Health {
        /// Gateway base URL (defaults to the configured listen address)
        #[arg(long)]
        url: Option<String>,
    },
    /// Show or initialize configuration
    Config {
        /// Show the effective configuration (secrets masked)
        #[arg(long)]
        show: bool,
        /// Write a default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new API key
    Create {
        /// Key owner or purpose
        name: String,
        /// Free-form description
        #[arg(short, long, default_value = "")]
        description: String,
        /// Requests allowed per rate-limit window
        #[arg(short, long, default_value = "100")]
        rate_limit: u32,
    },
    /// List keys (masked)
    List,
    /// Deactivate the key starting with the given prefix
    Deactivate {
        /// Unique key prefix
        prefix: String,
    },
    /// Show usage statistics
    Stats,
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Config { show, init } => {
            if init {
                let path = Config::default().save(config_file)?;
                println!("✓ Wrote default configuration to {}", path.display());
            } else if show {
                config::show_config(&Config::load(config_file)?)?;
            } else {
                println!("Use --show or --init");
            }
        }
        Commands::Serve { host, port } => {
            let mut config = Config::load(config_file)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            crate::init_tracing(&config.logging)?;
            crate::server::start(config).await?;
        }
        Commands::Keys { command } => {
            let config = Config::load(config_file)?;
            let store = KeyStore::open(config.keys_file()?)?;
            let output = match command {
                KeyCommands::Create { name, description, rate_limit } => {
                    admin::create_key(&store, &name, &description, rate_limit)?
                }
                KeyCommands::List => admin::list_keys(&store),
                KeyCommands::Deactivate { prefix } => admin::deactivate_key(&store, &prefix),
                KeyCommands::Stats => admin::stats(&store),
            };
            print_json(&output)?;
            if output["status"] == "error" {
                bail!("command failed");
            }
        }
        Commands::Health { url } => {
            let config = Config::load(config_file)?;
            let url = url.unwrap_or_else(|| admin::default_gateway_url(&config));
            let report = admin::health_check(&config, &url).await;
            print_json(&report)?;
            if report["status"] != "ok" {
                bail!("gateway at {} is not healthy", url);
            }
        }
    }

    Ok(())
}
