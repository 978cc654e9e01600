//! Checkout, order details, payment notification and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Caller, OrderId, RequestContext};
use domain::{Reservation, ReservationSummary};
use fulfillment::{CreateOrder, OrderCreated, OrderView, PaymentOutcome};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::context::Ctx;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PaymentSuccessRequest {
    pub transaction_id: String,
}

#[derive(Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct ReservationsResponse {
    pub order_id: OrderId,
    pub summary: ReservationSummary,
    pub reservations: Vec<Reservation>,
}

// -- Handlers --

/// POST /orders: price the cart and store a pending order.
#[tracing::instrument(skip(state, ctx, req), fields(request_id = %ctx.request_id))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Ctx(ctx): Ctx,
    Json(req): Json<CreateOrder>,
) -> Result<(StatusCode, Json<OrderCreated>), ApiError> {
    let created = state.orders.create_order(&ctx, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /orders/{id}: order details, with internal data for privileged callers.
#[tracing::instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let view = state.orders.get_order_details(&ctx, order_id).await?;
    Ok(Json(view))
}

/// POST /orders/{id}/payment/success: payment captured, secure the goods.
#[tracing::instrument(skip(state, ctx, req), fields(request_id = %ctx.request_id))]
pub async fn payment_success<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    Json(req): Json<PaymentSuccessRequest>,
) -> Result<Json<PaymentOutcome>, ApiError> {
    require_privileged(&ctx)?;
    let order_id = parse_order_id(&id)?;
    let outcome = state
        .saga
        .process_payment_success(&ctx, order_id, &req.transaction_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /orders/{id}/payment/failure: payment failed, cancel the order.
#[tracing::instrument(skip(state, ctx, req), fields(request_id = %ctx.request_id))]
pub async fn payment_failure<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<StatusCode, ApiError> {
    require_privileged(&ctx)?;
    let order_id = parse_order_id(&id)?;
    state
        .cancellation
        .process_payment_failure(&ctx, order_id, &req.reason)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /orders/{id}/cancel: cancel an order that has not shipped.
#[tracing::instrument(skip(state, ctx, req), fields(request_id = %ctx.request_id))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_order_id(&id)?;
    if let Caller::Customer(_) = ctx.caller {
        // customers may only cancel their own orders
        state.orders.get_order_details(&ctx, order_id).await?;
    }
    state
        .cancellation
        .cancel_order(&ctx, order_id, &req.reason)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /orders/{id}/reservations: vendor reservation status of an order.
#[tracing::instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn reservations<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<ReservationsResponse>, ApiError> {
    require_privileged(&ctx)?;
    let order_id = parse_order_id(&id)?;
    // 404 for unknown orders rather than an empty list
    state.orders.get_order_details(&ctx, order_id).await?;

    let reservations = state.reservations.reservations(order_id).await?;
    Ok(Json(ReservationsResponse {
        order_id,
        summary: ReservationSummary::from_reservations(&reservations),
        reservations,
    }))
}

pub(crate) fn require_privileged(ctx: &RequestContext) -> Result<(), ApiError> {
    if ctx.is_privileged() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "This operation requires a privileged caller".to_string(),
        ))
    }
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
