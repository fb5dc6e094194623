//! Conveyor worker agent.
//!
//! Entry point that loads configuration from the environment, wires the
//! auth session, queue client, storage uploader, and handler registry
//! together, and runs the worker loop until idle timeout or Ctrl-C.

mod handlers;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use conveyor_auth::{AuthSession, Credentials, HttpAuthTransport};
use conveyor_client::{JobClient, metadata};
use conveyor_core::AppResult;
use conveyor_core::config::AgentConfig;
use conveyor_storage::ResultUploader;
use conveyor_worker::{HandlerRegistry, WorkerRunner};

use crate::handlers::ProbeHandler;

#[tokio::main]
async fn main() {
    let config = match AgentConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging();

    if let Err(e) = run(config).await {
        tracing::error!("Worker error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Wire all components together and run the worker loop.
async fn run(config: AgentConfig) -> AppResult<()> {
    tracing::info!(
        "Starting Conveyor worker v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.api_endpoint
    );

    let http = reqwest::Client::new();

    let identity = metadata::task_identity_or_unknown(&http).await;
    match &identity.arn {
        Some(arn) => tracing::info!("Running as task {}", arn),
        None => tracing::info!("No task metadata available, running standalone"),
    }

    let transport = Arc::new(HttpAuthTransport::new(
        http.clone(),
        config.api_endpoint.clone(),
    ));
    let session = Arc::new(AuthSession::new(
        transport,
        Credentials {
            email: config.worker_username.clone(),
            password: config.worker_password.clone(),
        },
    ));

    let client = Arc::new(JobClient::new(
        http.clone(),
        config.api_endpoint.clone(),
        session,
        identity.clone(),
    ));

    let uploader = Arc::new(
        ResultUploader::new(config.aws_region.clone(), config.s3_endpoint.clone()).await,
    );

    let mut registry = HandlerRegistry::new();
    registry.register(ProbeHandler::new(uploader));

    let runner = WorkerRunner::new(client, registry, &config, identity);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping worker");
            let _ = stop_tx.send(true);
        }
    });

    runner.run(stop_rx).await;

    tracing::info!("Worker exited");
    Ok(())
}
