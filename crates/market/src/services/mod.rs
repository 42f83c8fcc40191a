//! Domain services.
//!
//! Each service owns its collaborators by constructor injection and is
//! generic over the store traits, so the whole stack runs unchanged against
//! Postgres or the in-memory store.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod inventory;
pub mod notify;
pub mod orders;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use inventory::InventoryLedger;
pub use notify::{Notification, Notifier, RecordingNotifier, SmtpNotifier};
pub use orders::OrderService;
