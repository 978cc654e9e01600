//! Shared identifiers and the explicit request context.

pub mod context;
pub mod types;

pub use context::{Caller, RequestContext};
pub use types::{CustomerId, OrderId, OrderItemId, ProductId, ReservationId};
