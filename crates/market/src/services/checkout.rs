//! Checkout orchestration.
//!
//! Converts a cart into an order, all or nothing. Stock is consumed line by
//! line through the inventory ledger first; any failure releases what was
//! already consumed, leaving the cart untouched so the user can retry. The
//! order row is written only once every line is covered, so no one can ever
//! observe (or cancel) an order whose stock is not yet consumed. Only then
//! is the cart cleared and the managers notified.

use std::time::Duration;

use tracing::instrument;

use bazaar_core::{AddressId, UserId};

use crate::cache::CartCache;
use crate::db::MarketStore;
use crate::error::MarketError;
use crate::models::{NewOrderLine, Order};
use crate::services::cart::CartService;
use crate::services::inventory::InventoryLedger;
use crate::services::notify::{Notification, Notifier};

/// Cart-to-order conversion over a store, a cart cache and a notifier.
#[derive(Debug, Clone)]
pub struct CheckoutService<S, C, N> {
    store: S,
    carts: CartService<S, C>,
    ledger: InventoryLedger<S>,
    notifier: N,
    storage_timeout: Duration,
}

impl<S, C, N> CheckoutService<S, C, N>
where
    S: MarketStore,
    C: CartCache,
    N: Notifier,
{
    pub fn new(store: S, cache: C, notifier: N, storage_timeout: Duration) -> Self {
        Self {
            carts: CartService::new(store.clone(), cache),
            ledger: InventoryLedger::new(store.clone()),
            store,
            notifier,
            storage_timeout,
        }
    }

    /// Convert the user's cart into an `IN_PROGRESS` order.
    ///
    /// On success the cart is cleared, the order's line snapshot captures
    /// the purchased quantities, and every manager is notified. On any
    /// failure no stock stays consumed, no order survives, and the cart is
    /// left as it was.
    ///
    /// # Errors
    ///
    /// `EmptyCart`, `NotFound`/`ForbiddenAddress` for a bad delivery
    /// address, `NoManagerAvailable` when nobody can be notified,
    /// `InsufficientStock` when a line cannot be covered, `StorageTimeout`
    /// when a storage call exceeds the configured deadline.
    #[instrument(skip(self))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Order, MarketError> {
        let entries = self.carts.get(user_id).await?;
        if entries.is_empty() {
            return Err(MarketError::EmptyCart);
        }

        let address = self
            .store
            .get_address(address_id)
            .await?
            .ok_or(MarketError::NotFound("address"))?;
        if address.user_id != user_id {
            return Err(MarketError::ForbiddenAddress);
        }

        // Resolve the recipients up front: an order nobody will process is
        // worse than a refused checkout.
        let managers = self.store.manager_emails().await?;
        if managers.is_empty() {
            return Err(MarketError::NoManagerAvailable);
        }

        let lines: Vec<NewOrderLine> = entries
            .iter()
            .map(|e| NewOrderLine {
                product_id: e.product_id,
                quantity: e.quantity,
            })
            .collect();

        // Stock first, order row second: an order must never be visible
        // with unconsumed lines, or a concurrent cancellation would release
        // stock that was never taken.
        self.consume_lines(&lines).await?;
        let order = match self.store.create_order(user_id, address_id, &lines).await {
            Ok(order) => order,
            Err(err) => {
                self.release_lines(&lines).await;
                return Err(err.into());
            }
        };

        // The order is committed from here on; cache and mail hiccups must
        // not fail the checkout.
        if let Err(err) = self.carts.clear(user_id).await {
            tracing::warn!(%user_id, order_id = %order.id, error = %err, "Failed to clear cart after checkout");
        }
        let notification = Notification::new(
            managers,
            "New order placed",
            format!("Order {} is awaiting confirmation.", order.id),
        );
        if let Err(err) = self.notifier.enqueue(notification).await {
            tracing::warn!(order_id = %order.id, error = %err, "Failed to queue manager notification");
        }

        tracing::info!(order_id = %order.id, %user_id, lines = order.lines.len(), "Checkout complete");
        Ok(order)
    }

    /// Consume stock for each line in turn, releasing the lines already
    /// consumed if one fails. Each storage call runs under the configured
    /// deadline.
    async fn consume_lines(&self, lines: &[NewOrderLine]) -> Result<(), MarketError> {
        for (idx, line) in lines.iter().enumerate() {
            let consume = self.ledger.try_consume(line.product_id, line.quantity);
            let result = tokio::time::timeout(self.storage_timeout, consume)
                .await
                .map_err(|_| MarketError::StorageTimeout)
                .and_then(|inner| inner);
            if let Err(err) = result {
                self.release_lines(&lines[..idx]).await;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Best-effort release of already-consumed lines. A release that fails
    /// here leaves stock under-counted; log loudly and keep going so the
    /// remaining lines are still returned.
    async fn release_lines(&self, lines: &[NewOrderLine]) {
        for line in lines {
            if let Err(err) = self.ledger.release(line.product_id, line.quantity).await {
                tracing::error!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %err,
                    "Failed to release stock during rollback"
                );
            }
        }
    }
}
