use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use chat_relay::{server, RelayConfig};

/// Streaming chat gateway for local and hosted backends.
#[derive(Debug, Parser)]
#[command(name = "chat-relay", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(long, default_value = "chat-relay.toml")]
    config: PathBuf,

    /// Listen address, overrides the configured one
    #[arg(long)]
    bind: Option<String>,

    /// Conversation directory, overrides the configured one
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = RelayConfig::load_optional(&args.config)?.unwrap_or_default();
    config.apply_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    tracing::debug!(?config, "resolved config");

    let gateway = server::build_gateway(&config)
        .await
        .context("failed to initialise gateway")?;

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %listener.local_addr()?, "chat-relay listening");

    server::serve(listener, Arc::new(gateway))
        .await
        .context("server error")?;
    Ok(())
}
