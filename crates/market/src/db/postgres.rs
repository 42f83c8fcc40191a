//! `PostgreSQL` store.
//!
//! Runtime-checked queries bound against the schema in
//! `crates/market/migrations/`. Row structs decode into the flat models via
//! `TryFrom`, so a damaged row surfaces as `DataCorruption` instead of a
//! panic. The stock decrement is a single conditional UPDATE - that one
//! statement is the whole concurrency story for inventory.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bazaar_core::{
    AddressId, CategoryId, Email, OrderId, OrderLineId, OrderStatus, Price, ProductId, ShopId,
    UserId,
};

use super::{OrderStore, ProductStore, RepositoryError, UserStore};
use crate::models::{
    Address, Category, NewAddress, NewOrderLine, NewProduct, NewShop, NewUser, Order, OrderLine,
    Product, ProductParameter, ProductPatch, Shop, ShopPatch, User,
};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    shop_id: ShopId,
    name: String,
    price: Price,
    remainder: i32,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let remainder = u32::try_from(row.remainder).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "product {} has negative remainder {}",
                row.id, row.remainder
            ))
        })?;
        Ok(Self {
            id: row.id,
            shop_id: row.shop_id,
            name: row.name,
            price: row.price,
            remainder,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: CategoryId,
    title: String,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    address_id: AddressId,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    id: OrderLineId,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = RepositoryError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "order line {} has negative quantity {}",
                row.id, row.quantity
            ))
        })?;
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: Email,
    password_hash: String,
    role: bazaar_core::UserRole,
    active: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role,
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ShopRow {
    id: ShopId,
    user_id: UserId,
    title: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<ShopRow> for Shop {
    fn from(row: ShopRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AddressRow {
    id: AddressId,
    user_id: UserId,
    city: String,
    street: String,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            city: row.city,
            street: row.street,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductParameterRow {
    product_id: ProductId,
    name: String,
    value: String,
}

impl From<ProductParameterRow> for ProductParameter {
    fn from(row: ProductParameterRow) -> Self {
        Self {
            product_id: row.product_id,
            name: row.name,
            value: row.value,
        }
    }
}

/// Map a unique-violation database error onto `Conflict`, keeping everything
/// else as `Database`.
fn map_unique_violation(err: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(err)
}

fn map_foreign_key_violation(err: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(err)
}

/// SQLSTATE 22003, `numeric_value_out_of_range`.
fn map_out_of_range(err: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some("22003")
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(err)
}

// =============================================================================
// Store
// =============================================================================

/// `PostgreSQL` implementation of the store traits.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store backed by the given pool. The pool is cheap to clone;
    /// every service can own its own `PgStore`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lines_for_orders(
        &self,
        order_ids: &[OrderId],
    ) -> Result<Vec<OrderLine>, RepositoryError> {
        let ids: Vec<i32> = order_ids.iter().map(|id| id.as_i32()).collect();
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r"
            SELECT id, order_id, product_id, quantity
            FROM order_line
            WHERE order_id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Attach lines to their orders, preserving order.
    fn assemble(order_rows: Vec<OrderRow>, lines: Vec<OrderLine>) -> Vec<Order> {
        let mut orders: Vec<Order> = order_rows
            .into_iter()
            .map(|row| Order {
                id: row.id,
                user_id: row.user_id,
                address_id: row.address_id,
                status: row.status,
                created_at: row.created_at,
                lines: Vec::new(),
            })
            .collect();
        for line in lines {
            if let Some(order) = orders.iter_mut().find(|o| o.id == line.order_id) {
                order.lines.push(line);
            }
        }
        orders
    }
}

impl ProductStore for PgStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, shop_id, name, price, remainder
            FROM product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_products_for_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, shop_id, name, price, remainder
            FROM product
            WHERE shop_id = $1
            ORDER BY id
            ",
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO product (shop_id, name, price, remainder)
            VALUES ($1, $2, $3, $4)
            RETURNING id, shop_id, name, price, remainder
            ",
        )
        .bind(input.shop_id)
        .bind(&input.name)
        .bind(input.price)
        .bind(i64::from(input.remainder))
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            UPDATE product
            SET name = COALESCE($2, name),
                price = COALESCE($3, price)
            WHERE id = $1
            RETURNING id, shop_id, name, price, remainder
            ",
        )
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.price)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        // order_line.product_id has no ON DELETE clause, so the foreign key
        // refuses the delete while any order still references the product.
        let result = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_foreign_key_violation(e, "product is referenced by existing orders"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn try_consume(&self, id: ProductId, quantity: u32) -> Result<bool, RepositoryError> {
        // Single conditional update: the WHERE clause is the non-negative
        // floor invariant. Zero rows means insufficient stock (or no row).
        let result = sqlx::query(
            r"
            UPDATE product
            SET remainder = remainder - $2
            WHERE id = $1 AND remainder >= $2
            ",
        )
        .bind(id)
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, id: ProductId, quantity: u32) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE product
            SET remainder = remainder + $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await
        .map_err(|e| map_out_of_range(e, "stock counter overflow"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn insert_category(&self, title: &str) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r"
            INSERT INTO category (title)
            VALUES ($1)
            RETURNING id, title
            ",
        )
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "category title already exists"))?;

        Ok(row.into())
    }

    async fn get_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(|id| id.as_i32()).collect();
        let rows = sqlx::query_as::<_, CategoryRow>(
            r"
            SELECT id, title
            FROM category
            WHERE id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            r"
            SELECT id, title
            FROM category
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_product_categories(
        &self,
        product_id: ProductId,
        categories: &[CategoryId],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM category_product WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        for category_id in categories {
            sqlx::query(
                r"
                INSERT INTO category_product (category_id, product_id)
                VALUES ($1, $2)
                ",
            )
            .bind(category_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_product_parameters(
        &self,
        product_id: ProductId,
        parameters: &[(String, String)],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (name, value) in parameters {
            sqlx::query(
                r"
                INSERT INTO product_parameter (product_id, name, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (product_id, name) DO UPDATE SET value = EXCLUDED.value
                ",
            )
            .bind(product_id)
            .bind(name)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_product_parameters(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductParameter>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductParameterRow>(
            r"
            SELECT product_id, name, value
            FROM product_parameter
            WHERE product_id = $1
            ORDER BY name
            ",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

impl OrderStore for PgStore {
    async fn create_order(
        &self,
        user_id: UserId,
        address_id: AddressId,
        lines: &[NewOrderLine],
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order_row = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO orders (user_id, address_id, status)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, address_id, status, created_at
            ",
        )
        .bind(user_id)
        .bind(address_id)
        .bind(OrderStatus::InProgress)
        .fetch_one(&mut *tx)
        .await?;

        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            let line_row = sqlx::query_as::<_, OrderLineRow>(
                r"
                INSERT INTO order_line (order_id, product_id, quantity)
                VALUES ($1, $2, $3)
                RETURNING id, order_id, product_id, quantity
                ",
            )
            .bind(order_row.id)
            .bind(line.product_id)
            .bind(i64::from(line.quantity))
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(line_row.try_into()?);
        }

        tx.commit().await?;

        Ok(Order {
            id: order_row.id,
            user_id: order_row.user_id,
            address_id: order_row.address_id,
            status: order_row.status,
            created_at: order_row.created_at,
            lines: inserted,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, address_id, status, created_at
            FROM orders
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let lines = self.lines_for_orders(&[row.id]).await?;
        Ok(Self::assemble(vec![row], lines).into_iter().next())
    }

    async fn transition_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        // Compare-and-swap on the status column. Zero rows means another
        // writer moved the order first (or it is gone); the caller must not
        // act on the transition then.
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            UPDATE orders
            SET status = $2
            WHERE id = $1 AND status = $3
            RETURNING id, user_id, address_id, status, created_at
            ",
        )
        .bind(id)
        .bind(to)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let lines = self.lines_for_orders(&[row.id]).await?;
        Ok(Self::assemble(vec![row], lines).into_iter().next())
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, address_id, status, created_at
            FROM orders
            WHERE $1::text IS NULL OR status = $1
            ORDER BY id
            ",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<OrderId> = rows.iter().map(|r| r.id).collect();
        let lines = self.lines_for_orders(&ids).await?;
        Ok(Self::assemble(rows, lines))
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, address_id, status, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<OrderId> = rows.iter().map(|r| r.id).collect();
        let lines = self.lines_for_orders(&ids).await?;
        Ok(Self::assemble(rows, lines))
    }
}

impl UserStore for PgStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, password_hash, role, active
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, password_hash, role, active
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO users (email, password_hash, role, active)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, role, active
            ",
        )
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(input.role)
        .bind(input.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email already registered"))?;

        Ok(row.into())
    }

    async fn manager_emails(&self) -> Result<Vec<Email>, RepositoryError> {
        let emails = sqlx::query_scalar::<_, Email>(
            r"
            SELECT email
            FROM users
            WHERE role = $1
            ORDER BY email
            ",
        )
        .bind(bazaar_core::UserRole::Manager)
        .fetch_all(&self.pool)
        .await?;

        Ok(emails)
    }

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        let row = sqlx::query_as::<_, AddressRow>(
            r"
            SELECT id, user_id, city, street
            FROM user_address
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_address(&self, input: &NewAddress) -> Result<Address, RepositoryError> {
        let row = sqlx::query_as::<_, AddressRow>(
            r"
            INSERT INTO user_address (user_id, city, street)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, city, street
            ",
        )
        .bind(input.user_id)
        .bind(&input.city)
        .bind(&input.street)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_shop(&self, id: ShopId) -> Result<Option<Shop>, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(
            r"
            SELECT id, user_id, title, active, created_at
            FROM shop
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn shop_for_user(&self, user_id: UserId) -> Result<Option<Shop>, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(
            r"
            SELECT id, user_id, title, active, created_at
            FROM shop
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(
            r"
            INSERT INTO shop (user_id, title, active)
            VALUES ($1, $2, FALSE)
            RETURNING id, user_id, title, active, created_at
            ",
        )
        .bind(input.user_id)
        .bind(&input.title)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "user already owns a shop"))?;

        Ok(row.into())
    }

    async fn update_shop(&self, id: ShopId, patch: &ShopPatch) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(
            r"
            UPDATE shop
            SET title = COALESCE($2, title),
                active = COALESCE($3, active)
            WHERE id = $1
            RETURNING id, user_id, title, active, created_at
            ",
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }
}
