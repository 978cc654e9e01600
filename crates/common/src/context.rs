//! Request context passed explicitly through every service call.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::CustomerId;

/// Who is invoking an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "customer_id")]
pub enum Caller {
    /// Unauthenticated storefront visitor (guest checkout).
    Anonymous,
    /// Signed-in storefront customer.
    Customer(CustomerId),
    /// Back-office staff.
    Staff,
    /// Scheduled jobs and other internal callers.
    System,
}

impl Caller {
    /// Returns true if the caller may see internal order data.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Caller::Staff | Caller::System)
    }
}

/// Per-request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub caller: Caller,
}

impl RequestContext {
    /// Creates a context with a fresh request id.
    pub fn new(caller: Caller) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            caller,
        }
    }

    /// Context for internal, scheduled work.
    pub fn system() -> Self {
        Self::new(Caller::System)
    }

    pub fn is_privileged(&self) -> bool {
        self.caller.is_privileged()
    }
}
