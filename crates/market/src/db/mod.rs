//! Repository boundary.
//!
//! All durable state lives behind the traits in this module. Services take a
//! store by constructor injection and stay generic over it, so the same code
//! runs against [`PgStore`] in production and [`MemoryStore`] in tests.
//!
//! # Tables (Postgres)
//!
//! - `users`, `user_address`, `shop`
//! - `product`, `category`, `category_product`, `product_parameter`
//! - `orders`, `order_line`
//!
//! Migrations live in `crates/market/migrations/` and are applied by the
//! deployment tooling; this library never runs them.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bazaar_core::{
    AddressId, CategoryId, Email, OrderId, OrderStatus, ProductId, ShopId, UserId,
};

use crate::models::{
    Address, Category, NewAddress, NewOrderLine, NewProduct, NewShop, NewUser, Order, Product,
    ProductParameter, ProductPatch, Shop, ShopPatch, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g. unique email, unique shop per user).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Product and category storage.
#[allow(async_fn_in_trait)]
pub trait ProductStore {
    /// Fetch a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// List all products for one shop.
    async fn list_products_for_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Insert a product (without categories/parameters - those are attached
    /// separately).
    async fn insert_product(&self, input: &NewProduct) -> Result<Product, RepositoryError>;

    /// Apply a partial update. Fails with `NotFound` if the row is missing.
    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError>;

    /// Delete a product. Returns `true` if a row was deleted. Fails with
    /// `Conflict` while an order line still references the product.
    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// Atomically decrement `remainder` by `quantity`, refusing to go below
    /// zero. Returns `Ok(false)` when the conditional update matched no row
    /// (insufficient stock or missing product - callers disambiguate).
    async fn try_consume(&self, id: ProductId, quantity: u32) -> Result<bool, RepositoryError>;

    /// Atomically increment `remainder` by `quantity`. Fails with `NotFound`
    /// if the product is missing and with `Conflict` if the increment would
    /// overflow the stock counter.
    async fn release(&self, id: ProductId, quantity: u32) -> Result<(), RepositoryError>;

    /// Insert a category. Fails with `Conflict` on a duplicate title.
    async fn insert_category(&self, title: &str) -> Result<Category, RepositoryError>;

    /// Fetch the categories whose IDs are in `ids` (missing IDs are simply
    /// absent from the result).
    async fn get_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, RepositoryError>;

    /// List every category, sorted by ID.
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;

    /// Replace the full category set of a product.
    async fn set_product_categories(
        &self,
        product_id: ProductId,
        categories: &[CategoryId],
    ) -> Result<(), RepositoryError>;

    /// Upsert key/value parameters on a product.
    async fn set_product_parameters(
        &self,
        product_id: ProductId,
        parameters: &[(String, String)],
    ) -> Result<(), RepositoryError>;

    /// Fetch a product's key/value parameters, sorted by name.
    async fn get_product_parameters(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductParameter>, RepositoryError>;
}

/// Order storage.
#[allow(async_fn_in_trait)]
pub trait OrderStore {
    /// Create an order in `IN_PROGRESS` with its line snapshot.
    async fn create_order(
        &self,
        user_id: UserId,
        address_id: AddressId,
        lines: &[NewOrderLine],
    ) -> Result<Order, RepositoryError>;

    /// Fetch an order together with its lines.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Conditionally update the status column: the write applies only while
    /// the current status still equals `from`. `None` means another writer
    /// moved the order first, or the order no longer exists; callers must
    /// not act on the transition in that case.
    async fn transition_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;

    /// List orders, optionally filtered by status.
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// List one user's orders.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;
}

/// User, shop and address storage.
#[allow(async_fn_in_trait)]
pub trait UserStore {
    /// Fetch a user by ID.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Fetch a user by unique email.
    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Insert a user. Fails with `Conflict` on a duplicate email.
    async fn insert_user(&self, input: &NewUser) -> Result<User, RepositoryError>;

    /// Emails of every user with the `MANAGER` role.
    async fn manager_emails(&self) -> Result<Vec<Email>, RepositoryError>;

    /// Fetch a delivery address by ID.
    async fn get_address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError>;

    /// Insert a delivery address.
    async fn insert_address(&self, input: &NewAddress) -> Result<Address, RepositoryError>;

    /// Fetch a shop by ID.
    async fn get_shop(&self, id: ShopId) -> Result<Option<Shop>, RepositoryError>;

    /// Fetch the shop owned by a user, if any.
    async fn shop_for_user(&self, user_id: UserId) -> Result<Option<Shop>, RepositoryError>;

    /// Insert a shop. Fails with `Conflict` if the user already owns one.
    async fn insert_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError>;

    /// Apply a partial update. Fails with `NotFound` if the row is missing.
    async fn update_shop(&self, id: ShopId, patch: &ShopPatch) -> Result<Shop, RepositoryError>;
}

/// Convenience supertrait for services that touch several entity families.
pub trait MarketStore: ProductStore + OrderStore + UserStore + Clone + Send + Sync {}

impl<T: ProductStore + OrderStore + UserStore + Clone + Send + Sync> MarketStore for T {}
