use anyhow::Result;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    disk_bucket::DiskBucket, mime_map::MimeMap, storage_gateway::StorageGateway,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting image-gateway with config: {:?}", cfg);

    // --- Open the bucket; failure here aborts startup ---
    let bucket = match DiskBucket::open(&cfg.bucket, &cfg.storage_dir, &cfg.database_url).await
    {
        Ok(bucket) => bucket,
        Err(err) => {
            tracing::error!("failed to create client: {}", err);
            return Err(err.into());
        }
    };
    let gateway: Arc<dyn StorageGateway> = Arc::new(bucket);

    let state = AppState::new(gateway.clone(), MimeMap::new(cfg.allowed_types.clone()));
    let app = routes::routes::app(state, cfg.static_dir.clone(), cfg.max_upload_bytes);

    // --- Serve, then release the gateway whatever the outcome ---
    let served = serve(&cfg, app).await;

    if let Err(err) = gateway.close().await {
        tracing::warn!("failed to close storage gateway: {}", err);
    }

    served
}

async fn serve(cfg: &config::AppConfig, app: axum::Router) -> Result<()> {
    let listener = bind(cfg).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on(tokio::signal::ctrl_c()))
        .await?;
    Ok(())
}

/// Bind the configured address. A wildcard host that the process may not
/// bind is retried on loopback.
async fn bind(cfg: &config::AppConfig) -> std::io::Result<TcpListener> {
    let addr = cfg.addr();
    let err = match TcpListener::bind(&addr).await {
        Ok(listener) => return Ok(listener),
        Err(err) => err,
    };
    let wildcard = matches!(cfg.host.as_str(), "0.0.0.0" | "::");
    if err.kind() != ErrorKind::PermissionDenied || !wildcard {
        return Err(err);
    }

    let loopback = format!("127.0.0.1:{}", cfg.port);
    tracing::warn!("cannot bind {} ({}), using {} instead", addr, err, loopback);
    TcpListener::bind(&loopback).await
}

/// Resolves once `signal` fires. If the handler could not be installed the
/// server keeps running instead of shutting down at once.
async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(err) => {
            tracing::error!("failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, time::Duration};
    use tokio::time::timeout;

    #[tokio::test]
    async fn signal_triggers_shutdown() {
        timeout(Duration::from_secs(1), shutdown_on(async { Ok(()) }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_signal_handler_keeps_serving() {
        let failed = async { Err(io::Error::other("no signal handler")) };
        assert!(
            timeout(Duration::from_millis(100), shutdown_on(failed))
                .await
                .is_err()
        );
    }
}
