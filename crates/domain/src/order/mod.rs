//! Order records, statuses and state derivation.

mod derivation;
mod record;
mod state;
mod value_objects;

pub use derivation::{DerivedState, LegOutcome, Resolution, resolve};
pub use record::{ItemSource, Order, OrderItem, PlaceOrder, PricedLine};
pub use state::{FulfillmentStatus, ItemFulfillmentStatus, OrderStatus, PaymentStatus};
pub use value_objects::{Address, CustomerIdentity, Money};
