//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The caller may not perform this operation.
    Forbidden(String),
    /// The request conflicts with work already in progress.
    Conflict(String),
    /// Fulfillment service error.
    Fulfillment(FulfillmentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    let status = match &err {
        FulfillmentError::Validation(_) | FulfillmentError::InvalidOrder(_) => {
            StatusCode::BAD_REQUEST
        }
        FulfillmentError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        FulfillmentError::NotAvailable { .. }
        | FulfillmentError::ConsistencyViolation(_)
        | FulfillmentError::FulfillmentAborted { .. } => StatusCode::CONFLICT,
        FulfillmentError::VendorApi(_) | FulfillmentError::ReservationFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        FulfillmentError::Persistence(_) => {
            tracing::error!(error = %err, "persistence failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use fulfillment::VendorError;

    use super::*;

    fn status_of(err: FulfillmentError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_fulfillment_errors_map_to_status_codes() {
        assert_eq!(
            status_of(FulfillmentError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FulfillmentError::OrderNotFound(OrderId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(FulfillmentError::ConsistencyViolation("shipped".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FulfillmentError::VendorApi(VendorError::Timeout(500))),
            StatusCode::BAD_GATEWAY
        );
    }
}
