use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use tracing::info;

use geocache::cache::RedisStore;
use geocache::config::Config;
use geocache::geocode::NominatimClient;
use geocache::resolver::Resolver;
use geocache::{Server, api, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing()
        .map_err(|e| anyhow!(e))
        .context("failed to initialize logging")?;

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        local = config.local,
        store = %config.store.address,
        upstream = %config.upstream_url,
        "starting server"
    );

    let store = RedisStore::connect(&config.store)
        .await
        .with_context(|| format!("failed to connect to redis at {}", config.store.address))?;
    let geocoder = NominatimClient::new(config.upstream_url.as_str(), config.upstream_timeout)
        .context("failed to build upstream client")?;

    let resolver = Resolver::new(Arc::new(store), Arc::new(geocoder))
        .with_store_timeout(config.store_timeout);
    let router = Arc::new(api::router(Arc::new(resolver)));

    let server = Server::bind(config.listen_addr()).await?;
    server
        .run_until(
            move |req| {
                let router = Arc::clone(&router);
                async move { router.route(req).await }
            },
            shutdown_signal(),
        )
        .await?;

    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where that exists.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
}
