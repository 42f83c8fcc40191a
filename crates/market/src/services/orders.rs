//! Order lifecycle.
//!
//! Status moves forward only: `IN_PROGRESS` -> `CONFIRMED` -> `ASSEMBLED`
//! -> `SENT` -> `DELIVERED`, with `CANCELED` reachable from any state not
//! yet handed to delivery. The transition table itself lives on
//! [`OrderStatus`]; this service adds authorization, the stock release on
//! cancellation and the resulting notifications.

use tracing::instrument;

use bazaar_core::{OrderId, OrderStatus, UserId, UserRole};

use crate::db::MarketStore;
use crate::error::MarketError;
use crate::models::{Order, User};
use crate::services::inventory::InventoryLedger;
use crate::services::notify::{Notification, Notifier};

/// Order queries and status management over a store and a notifier.
#[derive(Debug, Clone)]
pub struct OrderService<S, N> {
    store: S,
    ledger: InventoryLedger<S>,
    notifier: N,
}

impl<S, N> OrderService<S, N>
where
    S: MarketStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
            notifier,
        }
    }

    /// Fetch one order. Managers see any order, everyone else only their own.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing actor or order, `Forbidden` for someone
    /// else's order.
    pub async fn get_order(
        &self,
        actor_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, MarketError> {
        let actor = self.actor(actor_id).await?;
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(MarketError::NotFound("order"))?;
        if actor.role != UserRole::Manager && order.user_id != actor_id {
            return Err(MarketError::Forbidden("order belongs to another user"));
        }
        Ok(order)
    }

    /// List all orders, optionally filtered by status. Managers only.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-managers.
    pub async fn list_orders(
        &self,
        actor_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, MarketError> {
        let actor = self.actor(actor_id).await?;
        if actor.role != UserRole::Manager {
            return Err(MarketError::Forbidden("only managers may list all orders"));
        }
        Ok(self.store.list_orders(status).await?)
    }

    /// List the caller's own orders.
    ///
    /// # Errors
    ///
    /// `Repository` on storage failure.
    pub async fn list_own(&self, user_id: UserId) -> Result<Vec<Order>, MarketError> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }

    /// Move an order to `next`. Managers only.
    ///
    /// Moving to `CANCELED` releases every line's quantity back to stock.
    /// The order's owner is notified of the new status.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-managers, `NotFound` for a missing order,
    /// `InvalidTransition` when the move is not allowed from the current
    /// status, `Conflict` when another writer moved the order first.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        actor_id: UserId,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, MarketError> {
        let actor = self.actor(actor_id).await?;
        if actor.role != UserRole::Manager {
            return Err(MarketError::Forbidden(
                "only managers may update order status",
            ));
        }

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(MarketError::NotFound("order"))?;
        if !order.status.can_transition_to(next) {
            return Err(MarketError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }

        let Some(updated) = self
            .store
            .transition_order_status(order_id, order.status, next)
            .await?
        else {
            return Err(self.lost_transition(order_id, next).await);
        };
        if next == OrderStatus::Canceled {
            self.release_lines(&updated).await;
        }

        if let Ok(Some(owner)) = self.store.get_user(updated.user_id).await {
            let notification = Notification::new(
                vec![owner.email],
                format!("Order {next}"),
                format!("Your order {order_id} is now {next}."),
            );
            if let Err(err) = self.notifier.enqueue(notification).await {
                tracing::warn!(%order_id, error = %err, "Failed to queue status notification");
            }
        }

        tracing::info!(%order_id, from = %order.status, to = %next, "Order status updated");
        Ok(updated)
    }

    /// Cancel the caller's own order.
    ///
    /// Allowed while the order has not yet been handed to delivery, i.e.
    /// from `IN_PROGRESS`, `CONFIRMED` or `ASSEMBLED`. Releases every
    /// line's quantity back to stock and notifies the managers.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing order, `Forbidden` for someone else's
    /// order, `InvalidTransition` once the order is `SENT` or later,
    /// `NoManagerAvailable` when nobody can be notified, `Conflict` when
    /// another writer moved the order first.
    #[instrument(skip(self))]
    pub async fn cancel_own(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, MarketError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(MarketError::NotFound("order"))?;
        if order.user_id != user_id {
            return Err(MarketError::Forbidden("order belongs to another user"));
        }
        if !order.status.is_cancelable() {
            return Err(MarketError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Canceled,
            });
        }

        let managers = self.store.manager_emails().await?;
        if managers.is_empty() {
            return Err(MarketError::NoManagerAvailable);
        }

        let Some(updated) = self
            .store
            .transition_order_status(order_id, order.status, OrderStatus::Canceled)
            .await?
        else {
            return Err(self.lost_transition(order_id, OrderStatus::Canceled).await);
        };
        self.release_lines(&updated).await;

        let notification = Notification::new(
            managers,
            "Order canceled",
            format!("Order {order_id} was canceled by its owner."),
        );
        if let Err(err) = self.notifier.enqueue(notification).await {
            tracing::warn!(%order_id, error = %err, "Failed to queue cancellation notification");
        }

        tracing::info!(%order_id, %user_id, "Order canceled by owner");
        Ok(updated)
    }

    /// The conditional status update matched no row: the order moved (or
    /// vanished) between our read and the write. Report against what is
    /// there now, so stock is only ever released by the writer that won.
    async fn lost_transition(&self, order_id: OrderId, to: OrderStatus) -> MarketError {
        match self.store.get_order(order_id).await {
            Ok(Some(current)) if current.status.can_transition_to(to) => {
                MarketError::Conflict("order status changed concurrently".into())
            }
            Ok(Some(current)) => MarketError::InvalidTransition {
                from: current.status,
                to,
            },
            Ok(None) => MarketError::NotFound("order"),
            Err(err) => err.into(),
        }
    }

    async fn actor(&self, id: UserId) -> Result<User, MarketError> {
        self.store
            .get_user(id)
            .await?
            .ok_or(MarketError::NotFound("user"))
    }

    /// Best-effort return of a canceled order's lines to stock. A missing
    /// product means there is nothing left to restore; log and move on.
    async fn release_lines(&self, order: &Order) {
        for line in &order.lines {
            if let Err(err) = self.ledger.release(line.product_id, line.quantity).await {
                tracing::error!(
                    order_id = %order.id,
                    product_id = %line.product_id,
                    error = %err,
                    "Failed to release stock for canceled order"
                );
            }
        }
    }
}
