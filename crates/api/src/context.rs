//! Request context extraction.
//!
//! Authentication happens in front of this service; it forwards the caller's
//! role in `x-caller-role` and a signed-in customer's id in `x-customer-id`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{Caller, CustomerId, RequestContext};
use uuid::Uuid;

use crate::error::ApiError;

pub const CALLER_ROLE_HEADER: &str = "x-caller-role";
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The [`RequestContext`] of an HTTP request.
#[derive(Debug, Clone, Copy)]
pub struct Ctx(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for Ctx {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = caller_from_headers(&parts.headers)?;
        let request_id = header(&parts.headers, REQUEST_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Ctx(RequestContext { request_id, caller }))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    match header(headers, CALLER_ROLE_HEADER) {
        Some("admin" | "staff") => return Ok(Caller::Staff),
        Some("system") => return Ok(Caller::System),
        _ => {}
    }

    match header(headers, CUSTOMER_ID_HEADER) {
        Some(raw) => Uuid::parse_str(raw)
            .map(|id| Caller::Customer(CustomerId::from_uuid(id)))
            .map_err(|e| ApiError::BadRequest(format!("Invalid customer id: {e}"))),
        None => Ok(Caller::Anonymous),
    }
}
