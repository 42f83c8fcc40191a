//! Cart snapshot types.

use bazaar_core::ProductId;
use serde::{Deserialize, Serialize};

/// One product line in a user's in-progress cart.
///
/// Carts are ephemeral: they live in the cache as a JSON list of entries,
/// unique by `product_id`, keyed by the owning user. Loss is acceptable -
/// the buyer re-adds items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub product_id: ProductId,
    pub quantity: u32,
}
