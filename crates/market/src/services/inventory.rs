//! Inventory ledger.
//!
//! Owns every product's available quantity. Consumption is an atomic
//! conditional decrement at the storage layer; the non-negative floor is
//! enforced there, not here, so the ledger stays correct under arbitrary
//! concurrent checkouts and shop-owner restocks on the same row.

use bazaar_core::ProductId;
use tracing::instrument;

use crate::db::ProductStore;
use crate::error::MarketError;

/// Ledger over a product store.
#[derive(Debug, Clone)]
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: ProductStore> InventoryLedger<S> {
    /// Create a ledger over the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Atomically consume `quantity` units of a product.
    ///
    /// A zero quantity is a no-op. Callers that consume for several lines
    /// must treat any failure as aborting the whole batch and release what
    /// they already consumed - the ledger itself knows nothing about orders.
    ///
    /// # Errors
    ///
    /// `InsufficientStock` if the decrement would cross the floor,
    /// `NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn try_consume(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), MarketError> {
        if quantity == 0 {
            return Ok(());
        }
        if self.store.try_consume(product_id, quantity).await? {
            return Ok(());
        }
        // Zero rows matched: missing product and short stock look the same
        // to the conditional update, so look the product up to tell them apart.
        match self.store.get_product(product_id).await? {
            Some(_) => Err(MarketError::InsufficientStock { product_id }),
            None => Err(MarketError::NotFound("product")),
        }
    }

    /// Return `quantity` units to a product's stock.
    ///
    /// Unconditional increment; only ever called with quantities previously
    /// consumed for the same order, per that order's line snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product does not exist, `Conflict` if the
    /// increment would overflow the stock counter.
    #[instrument(skip(self))]
    pub async fn release(&self, product_id: ProductId, quantity: u32) -> Result<(), MarketError> {
        if quantity == 0 {
            return Ok(());
        }
        self.store.release(product_id, quantity).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bazaar_core::{Price, ShopId};
    use rust_decimal::Decimal;

    use crate::db::MemoryStore;
    use crate::models::NewProduct;

    async fn seed(store: &MemoryStore, remainder: u32) -> ProductId {
        store
            .insert_product(&NewProduct {
                shop_id: ShopId::new(1),
                name: "widget".into(),
                price: Price::new(Decimal::ONE).expect("positive"),
                remainder,
                categories: vec![],
                parameters: vec![],
            })
            .await
            .expect("insert")
            .id
    }

    #[tokio::test]
    async fn test_consume_and_release() {
        let store = MemoryStore::new();
        let ledger = InventoryLedger::new(store.clone());
        let id = seed(&store, 10).await;

        ledger.try_consume(id, 4).await.expect("consume");
        let product = store.get_product(id).await.expect("get").expect("exists");
        assert_eq!(product.remainder, 6);

        ledger.release(id, 4).await.expect("release");
        let product = store.get_product(id).await.expect("get").expect("exists");
        assert_eq!(product.remainder, 10);
    }

    #[tokio::test]
    async fn test_insufficient_stock() {
        let store = MemoryStore::new();
        let ledger = InventoryLedger::new(store.clone());
        let id = seed(&store, 3).await;

        let err = ledger.try_consume(id, 5).await.expect_err("short stock");
        assert!(matches!(
            err,
            MarketError::InsufficientStock { product_id } if product_id == id
        ));

        // Nothing was consumed
        let product = store.get_product(id).await.expect("get").expect("exists");
        assert_eq!(product.remainder, 3);
    }

    #[tokio::test]
    async fn test_missing_product() {
        let store = MemoryStore::new();
        let ledger = InventoryLedger::new(store);

        let err = ledger
            .try_consume(ProductId::new(999), 1)
            .await
            .expect_err("missing");
        assert!(matches!(err, MarketError::NotFound("product")));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_noop() {
        let store = MemoryStore::new();
        let ledger = InventoryLedger::new(store.clone());
        let id = seed(&store, 2).await;

        ledger.try_consume(id, 0).await.expect("noop");
        ledger.release(id, 0).await.expect("noop");
        let product = store.get_product(id).await.expect("get").expect("exists");
        assert_eq!(product.remainder, 2);
    }
}
