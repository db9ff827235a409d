//! chat-relay - Multi-provider failover relay for streaming chat completions
//!
//! Accepts chat requests from a frontend and streams back the answer of the
//! first upstream provider that accepts them.

use std::path::PathBuf;

use anyhow::Context;
use chat_relay::config::{Config, EnvSnapshot};
use chat_relay::pool::load_credential_pool;
use chat_relay::relay::run_server;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Multi-provider failover relay for streaming chat completions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and credential discovery
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show configured providers and discovered credentials
    Providers {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chat_relay={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = Config::load(path.map(PathBuf::as_path))
        .with_context(|| match path {
            Some(p) => format!("loading {}", p.display()),
            None => "loading built-in configuration".to_string(),
        })?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = load_config(config.as_ref())?;
            init_tracing(&config.logging.level);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            let env = EnvSnapshot::from_process();
            let pool = load_credential_pool(&config.providers, &env)?;
            if pool.is_empty() {
                tracing::warn!("No credentials discovered - requests without userApiKey will fail");
            } else {
                tracing::info!(credentials = pool.len(), "Credential pool ready");
            }

            run_server(config, env).await
        }

        Commands::Check { config } => {
            let config = load_config(config.as_ref())?;
            init_tracing(&config.logging.level);

            let env = EnvSnapshot::from_process();
            let pool = load_credential_pool(&config.providers, &env)?;

            println!(
                "Configuration OK: {} provider(s), {} credential(s), attempt timeout {:?}",
                config.providers.len(),
                pool.len(),
                config.relay.attempt_timeout()
            );
            if pool.is_empty() {
                println!("warning: no credentials found; only userApiKey requests can succeed");
            }
            Ok(())
        }

        Commands::Providers { config } => {
            let config = load_config(config.as_ref())?;
            init_tracing(&config.logging.level);

            let env = EnvSnapshot::from_process();
            let pool = load_credential_pool(&config.providers, &env)?;

            for provider in &config.providers {
                let keys: Vec<_> = pool
                    .as_slice()
                    .iter()
                    .filter(|c| c.provider == provider.name)
                    .collect();
                println!(
                    "{} ({:?}) model={} endpoint={} credentials={}",
                    provider.name,
                    provider.format,
                    provider.model,
                    provider.endpoint,
                    keys.len()
                );
                for credential in keys {
                    println!("  {} via {}", credential.key, credential.source);
                }
            }
            Ok(())
        }
    }
}
