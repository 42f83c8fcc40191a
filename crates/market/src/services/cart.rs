//! Per-user shopping carts.
//!
//! Carts are ephemeral: a JSON list of `{product_id, quantity}` entries
//! stored in the cart cache under `cart:{user_id}` with a TTL. Losing a
//! cart is acceptable; stock is only committed at checkout.

use bazaar_core::{ProductId, UserId};
use tracing::instrument;

use crate::cache::{CacheError, CartCache};
use crate::db::{ProductStore, UserStore};
use crate::error::MarketError;
use crate::models::CartEntry;

fn cart_key(user_id: UserId) -> String {
    format!("cart:{user_id}")
}

/// Cart operations over a product store and a cart cache.
#[derive(Debug, Clone)]
pub struct CartService<S, C> {
    store: S,
    cache: C,
}

impl<S, C> CartService<S, C>
where
    S: ProductStore + UserStore,
    C: CartCache,
{
    pub const fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }

    /// Fetch a user's cart. A missing key reads as an empty cart.
    ///
    /// # Errors
    ///
    /// `Cache` if the backend fails or the stored payload does not parse.
    pub async fn get(&self, user_id: UserId) -> Result<Vec<CartEntry>, MarketError> {
        let Some(bytes) = self.cache.get(&cart_key(user_id)).await? else {
            return Ok(Vec::new());
        };
        let entries = serde_json::from_slice(&bytes)
            .map_err(|err| CacheError::Backend(format!("corrupt cart payload: {err}")))?;
        Ok(entries)
    }

    /// Add `quantity` units of a product to the cart, merging with any
    /// existing entry for the same product.
    ///
    /// A zero quantity removes the entry (and is a no-op when the product
    /// is not in the cart). When the last entry is removed the cart key is
    /// deleted rather than left holding an empty list.
    ///
    /// The resulting in-cart quantity is validated against the product's
    /// current remainder. Stock can still move between this check and
    /// checkout; checkout revalidates atomically.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown product, `ShopInactive` when the owning
    /// shop is deactivated, `InvalidQuantity` when the cart would hold more
    /// than the current remainder.
    #[instrument(skip(self))]
    pub async fn add_or_update(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Vec<CartEntry>, MarketError> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(MarketError::NotFound("product"))?;
        let shop = self
            .store
            .get_shop(product.shop_id)
            .await?
            .ok_or(MarketError::NotFound("shop"))?;
        if !shop.active {
            return Err(MarketError::ShopInactive);
        }

        let mut entries = self.get(user_id).await?;
        let existing = entries.iter().position(|e| e.product_id == product_id);
        match (existing, quantity) {
            (Some(pos), 0) => {
                entries.remove(pos);
            }
            (Some(pos), added) => {
                let total = entries[pos]
                    .quantity
                    .checked_add(added)
                    .filter(|&q| q <= product.remainder)
                    .ok_or(MarketError::InvalidQuantity { product_id })?;
                entries[pos].quantity = total;
            }
            (None, 0) => {}
            (None, added) => {
                if added > product.remainder {
                    return Err(MarketError::InvalidQuantity { product_id });
                }
                entries.push(CartEntry {
                    product_id,
                    quantity: added,
                });
            }
        }

        self.persist(user_id, &entries).await?;
        Ok(entries)
    }

    /// Drop the user's cart entirely.
    ///
    /// # Errors
    ///
    /// `Cache` if the backend fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), MarketError> {
        self.cache.delete(&cart_key(user_id)).await?;
        Ok(())
    }

    async fn persist(&self, user_id: UserId, entries: &[CartEntry]) -> Result<(), MarketError> {
        let key = cart_key(user_id);
        if entries.is_empty() {
            self.cache.delete(&key).await?;
        } else {
            let bytes = serde_json::to_vec(entries)
                .map_err(|err| CacheError::Backend(err.to_string()))?;
            self.cache.set(&key, bytes).await?;
        }
        Ok(())
    }
}
