//! Order aggregate models.

use bazaar_core::{AddressId, OrderId, OrderLineId, OrderStatus, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A placed order with its line items.
///
/// Lines are immutable once the order exists; only `status` changes over the
/// order's life. The line snapshot is the source of truth for how much stock
/// to release on cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

/// Immutable snapshot of one product + quantity within a placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Input for one order line at creation time.
#[derive(Debug, Clone, Copy)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}
