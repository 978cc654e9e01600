//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::SharedVendor;
use api::config::{Config, LogFormat};
use fulfillment::{
    HttpVendorClient, InMemoryCatalog, InMemoryVendorClient, TimeoutVendorClient, VendorError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn build_vendor(config: &Config) -> Result<SharedVendor, VendorError> {
    match &config.vendor_api_url {
        Some(url) => {
            let client =
                HttpVendorClient::new(url, config.vendor_api_key.clone(), config.vendor_timeout)?;
            tracing::info!(%url, "using vendor API");
            Ok(Arc::new(TimeoutVendorClient::new(client, config.vendor_timeout)))
        }
        None => {
            tracing::warn!("VENDOR_API_URL not set, using in-memory vendor");
            Ok(Arc::new(TimeoutVendorClient::new(
                InMemoryVendorClient::new(),
                config.vendor_timeout,
            )))
        }
    }
}

async fn load_catalog(config: &Config) -> Result<InMemoryCatalog, Box<dyn Error>> {
    let Some(path) = &config.catalog_path else {
        tracing::warn!("CATALOG_PATH not set, starting with an empty catalog");
        return Ok(InMemoryCatalog::new());
    };
    let json = tokio::fs::read_to_string(path).await?;
    let catalog = InMemoryCatalog::from_json(&json)?;
    tracing::info!(%path, "catalog loaded");
    Ok(catalog)
}

async fn serve<S: Store>(
    config: Config,
    store: S,
    vendor: SharedVendor,
    catalog: InMemoryCatalog,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>> {
    api::register_catalog_stock(&store, &catalog).await?;
    let state = api::create_state(store, vendor, catalog, &config);

    let scheduler = config
        .batch_interval
        .map(|period| api::scheduler::spawn(state.clone(), period));
    if scheduler.is_none() {
        tracing::info!("vendor batch scheduler disabled");
    }

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Vendor client and catalog
    let vendor = build_vendor(&config)?;
    let catalog = load_catalog(&config).await?;

    // 4. Store, then serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await?;
            let store = PostgresStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL");
            serve(config, store, vendor, catalog, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve(config, InMemoryStore::new(), vendor, catalog, metrics_handle).await
        }
    }
}
