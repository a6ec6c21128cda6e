//! Cloud Webhooks Server
//!
//! Hosts the bundled cloud handlers behind the webhook adapter:
//! - Webhook routes: `/<hookKind>_<identifier>`, authenticated by `X-Parse-Webhook-Key`
//! - Health: `GET /health` (unauthenticated)
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CW_CONFIG` | - | Path to a TOML config file |
//! | `CW_HOST` | `0.0.0.0` | Bind host |
//! | `CW_PORT` | `8080` | Bind port |
//! | `PARSE_WEBHOOK_KEY` | - | Shared webhook secret (required) |
//! | `CW_LOG_LEVEL` | `info` | Default log directive |
//! | `CW_LOG_FORMAT` | `pretty` | `pretty` or `json` |
//! | `RUST_LOG` | - | Overrides `CW_LOG_LEVEL` |

mod cloud;

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use clap::Parser;
use std::path::PathBuf;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cw_adapter::WebhookRouter;
use cw_common::HookKind;
use cw_config::{AppConfig, LogFormat, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "cw-server")]
#[command(about = "Cloud Webhooks server")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "CW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    init_tracing(&config.logging);
    info!("Starting Cloud Webhooks Server");

    let mut webhooks = WebhookRouter::new(config.webhook_key()?)?;
    cloud::register(&mut webhooks)?;

    for kind in HookKind::ALL {
        let identifiers = webhooks.registrations().get(kind);
        if !identifiers.is_empty() {
            info!(hook = %kind, identifiers = ?identifiers, "Hooks registered");
        }
    }

    let app = Router::new()
        .merge(webhooks.into_router())
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Webhook server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Cloud Webhooks Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received...");
}
