//! apiserver-gateway
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ request id ─▶ trace ─▶ timeout ─▶ CORS ─▶ body filter
//!                                                                  │
//!                                                                  ▼
//!                                  ┌──────────── proxy engine ───────────┐
//!                                  │ resolve (group, version)            │
//!                                  │ client registry (one per surface)   │──▶ API server
//!                                  │ replay request, read response       │
//!                                  │ optional jq transform               │
//!                                  └─────────────────────────────────────┘
//!   Client Response ◀──────────────────────────────────┘
//! ```

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::net::TcpListener;

use apiserver_gateway::config::loader::{load_config_or_default, override_bind_address};
use apiserver_gateway::kube::kubeconfig::default_kubeconfig_path;
use apiserver_gateway::observability::{logging, metrics};
use apiserver_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "apiserver-gateway")]
#[command(about = "HTTP gateway for a Kubernetes API server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway server
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long, env = "GATEWAY_CONFIG")]
        config: Option<PathBuf>,

        /// Override the listener bind address
        #[arg(short, long, env = "GATEWAY_BIND")]
        bind: Option<String>,

        /// Kubeconfig used when no backend host is configured
        /// (default: ~/.kube/config)
        #[arg(short, long, env = "GATEWAY_KUBECONFIG")]
        kubeconfig: Option<PathBuf>,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            kubeconfig,
        } => serve(config, bind, kubeconfig).await,
        Commands::Version => {
            for (key, value) in versions() {
                println!("{}: {}", key, value);
            }
            Ok(())
        }
    }
}

fn versions() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("name", env!("CARGO_PKG_NAME")),
        ("version", env!("CARGO_PKG_VERSION")),
        ("os", std::env::consts::OS),
        ("arch", std::env::consts::ARCH),
    ])
}

async fn serve(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    kubeconfig: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_default(config_path.as_deref())?;
    if let Some(bind) = bind {
        config = override_bind_address(config, bind)?;
    }
    if let Some(path) = kubeconfig {
        config.backend.kubeconfig = Some(path.display().to_string());
    } else if config.backend.kubeconfig.is_none() {
        config.backend.kubeconfig =
            default_kubeconfig_path().map(|path| path.display().to_string());
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "apiserver-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        backend = config
            .backend
            .host
            .as_deref()
            .or(config.backend.kubeconfig.as_deref())
            .unwrap_or("in-cluster"),
        cors_enabled = config.cors.enabled,
        body_filter_enabled = config.body_filter.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
