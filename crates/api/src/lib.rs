//! HTTP API server with observability for the order fulfillment engine.
//!
//! Provides REST endpoints for checkout, payment notifications,
//! cancellation and the vendor order batch, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod context;
pub mod error;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::StockLevels;
use fulfillment::{
    BatchReport, CancellationHandler, FulfillmentSaga, InMemoryCatalog, OrderService,
    ReservationCoordinator, VendorClient, VendorOrderBatch,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{StockLedger, Store};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Vendor client shared by every service.
pub type SharedVendor = Arc<dyn VendorClient>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderService<S, InMemoryCatalog>,
    pub saga: FulfillmentSaga<S, SharedVendor>,
    pub cancellation: CancellationHandler<S, SharedVendor>,
    pub reservations: ReservationCoordinator<S, SharedVendor>,
    batch: VendorOrderBatch<S, SharedVendor>,
    /// Held for the duration of a batch run.
    batch_lock: Mutex<()>,
}

impl<S: Store> AppState<S> {
    /// Runs the vendor order batch, or returns `None` if a run is already
    /// in progress.
    pub async fn run_vendor_batch(&self) -> Option<fulfillment::Result<BatchReport>> {
        let Ok(_running) = self.batch_lock.try_lock() else {
            metrics::counter!("vendor_batch_runs_skipped_total").increment(1);
            return None;
        };
        Some(self.batch.run().await)
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/payment/success",
            post(routes::orders::payment_success::<S>),
        )
        .route(
            "/orders/{id}/payment/failure",
            post(routes::orders::payment_failure::<S>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/reservations",
            get(routes::orders::reservations::<S>),
        )
        .route(
            "/admin/vendor-orders/run",
            post(routes::admin::run_vendor_batch::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the services on top of a store and vendor client.
pub fn create_state<S: Store>(
    store: S,
    vendor: SharedVendor,
    catalog: InMemoryCatalog,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        orders: OrderService::new(store.clone(), catalog, config.orders),
        saga: FulfillmentSaga::new(store.clone(), vendor.clone()),
        cancellation: CancellationHandler::new(store.clone(), vendor.clone()),
        reservations: ReservationCoordinator::new(store.clone(), vendor.clone()),
        batch: VendorOrderBatch::new(store, vendor, config.vendor.clone()),
        batch_lock: Mutex::new(()),
    })
}

/// Registers every catalog product with the stock ledger.
///
/// Products the ledger already knows keep their counters.
pub async fn register_catalog_stock<S: Store>(
    store: &S,
    catalog: &InMemoryCatalog,
) -> store::Result<usize> {
    let entries = catalog.entries().await;
    for entry in &entries {
        store
            .register_product(StockLevels::new(entry.product_id.clone(), entry.initial_stock))
            .await?;
    }
    tracing::info!(products = entries.len(), "catalog registered with stock ledger");
    Ok(entries.len())
}
