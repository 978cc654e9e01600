//! Back-office endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use fulfillment::BatchReport;
use store::Store;

use crate::AppState;
use crate::context::Ctx;
use crate::error::ApiError;
use crate::routes::orders::require_privileged;

/// POST /admin/vendor-orders/run: trigger the vendor order batch now.
#[tracing::instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn run_vendor_batch<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Ctx(ctx): Ctx,
) -> Result<Json<BatchReport>, ApiError> {
    require_privileged(&ctx)?;
    let report = state
        .run_vendor_batch()
        .await
        .ok_or_else(|| ApiError::Conflict("A vendor order batch is already running".to_string()))??;
    Ok(Json(report))
}
