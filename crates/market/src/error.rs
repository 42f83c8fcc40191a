//! Unified error handling for the market crate.
//!
//! Domain failures get their own typed variants so callers and tests can
//! match on them; infrastructure failures convert in via `#[from]`. Nothing
//! here knows about HTTP - the transport collaborator maps [`ErrorCode`]
//! onto whatever status scheme it speaks.

use bazaar_core::{OrderStatus, ProductId};
use thiserror::Error;

use crate::cache::CacheError;
use crate::db::RepositoryError;
use crate::services::notify::NotifyError;

/// Transport-facing classification of a [`MarketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    Forbidden,
    BadRequest,
    Conflict,
    Internal,
}

/// Application-level error type for the marketplace core.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(RepositoryError),

    /// Cart cache operation failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Notification could not be queued.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Actor is not allowed to touch this resource.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// Input failed validation before any mutation.
    #[error("validation: {0}")]
    Validation(String),

    /// Unique constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Checkout was attempted with no cart.
    #[error("cart is empty")]
    EmptyCart,

    /// Delivery address does not belong to the buyer.
    #[error("address does not belong to this user")]
    ForbiddenAddress,

    /// No manager user exists to service the order.
    #[error("no manager available to service orders")]
    NoManagerAvailable,

    /// Requested quantity exceeds available stock.
    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// Cart quantity is invalid for the product's current stock.
    #[error("invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// Order status transition is not in the transition table.
    #[error("invalid order status transition {from} -> {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Target shop is not activated.
    #[error("shop is not active")]
    ShopInactive,

    /// A storage call exceeded its deadline mid-checkout.
    #[error("storage call timed out")]
    StorageTimeout,
}

impl From<RepositoryError> for MarketError {
    /// Constraint violations are domain outcomes (duplicate email, second
    /// shop for one user), so they surface as [`MarketError::Conflict`]
    /// rather than as an opaque storage failure.
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Repository(other),
        }
    }
}

impl MarketError {
    /// Classify this error for the transport layer.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Forbidden(_) | Self::ForbiddenAddress => ErrorCode::Forbidden,
            Self::Validation(_)
            | Self::EmptyCart
            | Self::NoManagerAvailable
            | Self::InvalidQuantity { .. }
            | Self::InvalidTransition { .. }
            | Self::ShopInactive => ErrorCode::BadRequest,
            Self::Conflict(_) | Self::InsufficientStock { .. } => ErrorCode::Conflict,
            Self::Repository(_) | Self::Cache(_) | Self::Notify(_) | Self::StorageTimeout => {
                ErrorCode::Internal
            }
        }
    }
}
