//! Value objects for the order domain.

use common::CustomerId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Postal address used for shipping and billing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub postal_code: String,
    pub city: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

/// Who placed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomerIdentity {
    /// A registered customer account.
    Registered { customer_id: CustomerId },
    /// Guest checkout, identified only by contact email.
    Guest { email: String },
}

impl CustomerIdentity {
    /// Validates the identity.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            CustomerIdentity::Registered { .. } => Ok(()),
            CustomerIdentity::Guest { email } if email.trim().contains('@') => Ok(()),
            CustomerIdentity::Guest { .. } => Err(DomainError::MissingGuestContact),
        }
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            CustomerIdentity::Registered { customer_id } => Some(*customer_id),
            CustomerIdentity::Guest { .. } => None,
        }
    }

    pub fn guest_email(&self) -> Option<&str> {
        match self {
            CustomerIdentity::Guest { email } => Some(email),
            CustomerIdentity::Registered { .. } => None,
        }
    }
}
