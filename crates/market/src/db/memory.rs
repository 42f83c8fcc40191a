//! In-memory store.
//!
//! Mutex-guarded maps implementing the same contracts as [`super::PgStore`],
//! including the atomic conditional stock decrement (one lock acquisition
//! per operation stands in for the row-level serialization Postgres gives
//! us). Used by the test suites and handy for local development.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use bazaar_core::{
    AddressId, CategoryId, Email, OrderId, OrderLineId, OrderStatus, ProductId, ShopId, UserId,
};

use super::{OrderStore, ProductStore, RepositoryError, UserStore};
use crate::models::{
    Address, Category, NewAddress, NewOrderLine, NewProduct, NewShop, NewUser, Order, OrderLine,
    Product, ProductParameter, ProductPatch, Shop, ShopPatch, User,
};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    addresses: HashMap<AddressId, Address>,
    shops: HashMap<ShopId, Shop>,
    products: HashMap<ProductId, Product>,
    categories: HashMap<CategoryId, Category>,
    product_categories: HashMap<ProductId, Vec<CategoryId>>,
    product_parameters: HashMap<ProductId, Vec<(String, String)>>,
    orders: HashMap<OrderId, Order>,
    next_id: i32,
}

impl Inner {
    fn next(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of the store traits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a panicking test; the data is still fine.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProductStore for MemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn list_products_for_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self
            .lock()
            .products
            .values()
            .filter(|p| p.shop_id == shop_id)
            .cloned()
            .collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn insert_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        let mut inner = self.lock();
        let id = ProductId::new(inner.next());
        let product = Product {
            id,
            shop_id: input.shop_id,
            name: input.name.clone(),
            price: input.price,
            remainder: input.remainder,
        };
        inner.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        let mut inner = self.lock();
        let product = inner.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = &patch.name {
            product.name.clone_from(name);
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        let referenced = inner
            .orders
            .values()
            .any(|o| o.lines.iter().any(|l| l.product_id == id));
        if referenced {
            return Err(RepositoryError::Conflict(format!(
                "product {id} is referenced by existing orders"
            )));
        }
        inner.product_categories.remove(&id);
        inner.product_parameters.remove(&id);
        Ok(inner.products.remove(&id).is_some())
    }

    async fn try_consume(&self, id: ProductId, quantity: u32) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        match inner.products.get_mut(&id) {
            Some(product) if product.remainder >= quantity => {
                product.remainder -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: ProductId, quantity: u32) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        let product = inner.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        product.remainder = product.remainder.checked_add(quantity).ok_or_else(|| {
            RepositoryError::Conflict(format!(
                "releasing {quantity} units would overflow the stock counter of product {id}"
            ))
        })?;
        Ok(())
    }

    async fn insert_category(&self, title: &str) -> Result<Category, RepositoryError> {
        let mut inner = self.lock();
        if inner.categories.values().any(|c| c.title == title) {
            return Err(RepositoryError::Conflict(format!(
                "category {title} already exists"
            )));
        }
        let id = CategoryId::new(inner.next());
        let category = Category {
            id,
            title: title.to_owned(),
        };
        inner.categories.insert(id, category.clone());
        Ok(category)
    }

    async fn get_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, RepositoryError> {
        let inner = self.lock();
        let mut categories: Vec<Category> = ids
            .iter()
            .filter_map(|id| inner.categories.get(id).cloned())
            .collect();
        categories.sort_by_key(|c| c.id);
        categories.dedup_by_key(|c| c.id);
        Ok(categories)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let mut categories: Vec<Category> = self.lock().categories.values().cloned().collect();
        categories.sort_by_key(|c| c.id);
        Ok(categories)
    }

    async fn set_product_categories(
        &self,
        product_id: ProductId,
        categories: &[CategoryId],
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if !inner.products.contains_key(&product_id) {
            return Err(RepositoryError::NotFound);
        }
        inner
            .product_categories
            .insert(product_id, categories.to_vec());
        Ok(())
    }

    async fn set_product_parameters(
        &self,
        product_id: ProductId,
        parameters: &[(String, String)],
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if !inner.products.contains_key(&product_id) {
            return Err(RepositoryError::NotFound);
        }
        let existing = inner.product_parameters.entry(product_id).or_default();
        for (name, value) in parameters {
            if let Some(slot) = existing.iter_mut().find(|(n, _)| n == name) {
                slot.1.clone_from(value);
            } else {
                existing.push((name.clone(), value.clone()));
            }
        }
        Ok(())
    }

    async fn get_product_parameters(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductParameter>, RepositoryError> {
        let inner = self.lock();
        let mut parameters: Vec<ProductParameter> = inner
            .product_parameters
            .get(&product_id)
            .into_iter()
            .flatten()
            .map(|(name, value)| ProductParameter {
                product_id,
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        parameters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(parameters)
    }
}

impl OrderStore for MemoryStore {
    async fn create_order(
        &self,
        user_id: UserId,
        address_id: AddressId,
        lines: &[NewOrderLine],
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.lock();
        let order_id = OrderId::new(inner.next());
        let lines = lines
            .iter()
            .map(|line| OrderLine {
                id: OrderLineId::new(inner.next()),
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect();
        let order = Order {
            id: order_id,
            user_id,
            address_id,
            status: OrderStatus::InProgress,
            created_at: Utc::now(),
            lines,
        };
        inner.orders.insert(order_id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.lock().orders.get(&id).cloned())
    }

    async fn transition_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut inner = self.lock();
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status != from {
            return Ok(None);
        }
        order.status = to;
        Ok(Some(order.clone()))
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }
}

impl UserStore for MemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| &u.email == email)
            .cloned())
    }

    async fn insert_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        let mut inner = self.lock();
        if inner.users.values().any(|u| u.email == input.email) {
            return Err(RepositoryError::Conflict(format!(
                "email {} already registered",
                input.email
            )));
        }
        let id = UserId::new(inner.next());
        let user = User {
            id,
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            role: input.role,
            active: input.active,
        };
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn manager_emails(&self) -> Result<Vec<Email>, RepositoryError> {
        let mut emails: Vec<Email> = self
            .lock()
            .users
            .values()
            .filter(|u| u.role == bazaar_core::UserRole::Manager)
            .map(|u| u.email.clone())
            .collect();
        emails.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(emails)
    }

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        Ok(self.lock().addresses.get(&id).cloned())
    }

    async fn insert_address(&self, input: &NewAddress) -> Result<Address, RepositoryError> {
        let mut inner = self.lock();
        let id = AddressId::new(inner.next());
        let address = Address {
            id,
            user_id: input.user_id,
            city: input.city.clone(),
            street: input.street.clone(),
        };
        inner.addresses.insert(id, address.clone());
        Ok(address)
    }

    async fn get_shop(&self, id: ShopId) -> Result<Option<Shop>, RepositoryError> {
        Ok(self.lock().shops.get(&id).cloned())
    }

    async fn shop_for_user(&self, user_id: UserId) -> Result<Option<Shop>, RepositoryError> {
        Ok(self
            .lock()
            .shops
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn insert_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError> {
        let mut inner = self.lock();
        if inner.shops.values().any(|s| s.user_id == input.user_id) {
            return Err(RepositoryError::Conflict(format!(
                "user {} already owns a shop",
                input.user_id
            )));
        }
        let id = ShopId::new(inner.next());
        let shop = Shop {
            id,
            user_id: input.user_id,
            title: input.title.clone(),
            active: false,
            created_at: Utc::now(),
        };
        inner.shops.insert(id, shop.clone());
        Ok(shop)
    }

    async fn update_shop(&self, id: ShopId, patch: &ShopPatch) -> Result<Shop, RepositoryError> {
        let mut inner = self.lock();
        let shop = inner.shops.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(title) = &patch.title {
            shop.title.clone_from(title);
        }
        if let Some(active) = patch.active {
            shop.active = active;
        }
        Ok(shop.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{Price, UserRole};
    use rust_decimal::Decimal;

    async fn new_product(store: &MemoryStore, remainder: u32) -> Product {
        store
            .insert_product(&NewProduct {
                shop_id: ShopId::new(1),
                name: "widget".into(),
                price: Price::new(Decimal::new(100, 2)).expect("positive"),
                remainder,
                categories: vec![],
                parameters: vec![],
            })
            .await
            .expect("insert")
    }

    #[tokio::test]
    async fn test_try_consume_floor() {
        let store = MemoryStore::new();
        let product = new_product(&store, 3).await;

        assert!(store.try_consume(product.id, 2).await.expect("consume"));
        assert!(!store.try_consume(product.id, 2).await.expect("consume"));

        let remaining = store
            .get_product(product.id)
            .await
            .expect("get")
            .expect("exists")
            .remainder;
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_release_roundtrip() {
        let store = MemoryStore::new();
        let product = new_product(&store, 5).await;

        assert!(store.try_consume(product.id, 5).await.expect("consume"));
        store.release(product.id, 5).await.expect("release");

        let remaining = store
            .get_product(product.id)
            .await
            .expect("get")
            .expect("exists")
            .remainder;
        assert_eq!(remaining, 5);
    }

    #[tokio::test]
    async fn test_concurrent_consume_never_negative() {
        let store = MemoryStore::new();
        let product = new_product(&store, 50).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            let id = product.id;
            handles.push(tokio::spawn(async move {
                let mut consumed = 0_u32;
                for _ in 0..10 {
                    if store.try_consume(id, 1).await.expect("consume") {
                        consumed += 1;
                    }
                }
                consumed
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.expect("join");
        }

        let remaining = store
            .get_product(product.id)
            .await
            .expect("get")
            .expect("exists")
            .remainder;
        assert_eq!(total, 50);
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_unique_shop_per_user() {
        let store = MemoryStore::new();
        let user = store
            .insert_user(&NewUser {
                email: Email::parse("owner@example.com").expect("email"),
                password_hash: "x".into(),
                role: UserRole::Shop,
                active: true,
            })
            .await
            .expect("user");

        store
            .insert_shop(&NewShop {
                user_id: user.id,
                title: "first".into(),
            })
            .await
            .expect("shop");

        let dup = store
            .insert_shop(&NewShop {
                user_id: user.id,
                title: "second".into(),
            })
            .await;
        assert!(matches!(dup, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_transition_applies_only_from_expected_status() {
        let store = MemoryStore::new();
        let product = new_product(&store, 5).await;
        let order = store
            .create_order(
                UserId::new(1),
                AddressId::new(1),
                &[NewOrderLine {
                    product_id: product.id,
                    quantity: 2,
                }],
            )
            .await
            .expect("order");

        let won = store
            .transition_order_status(order.id, OrderStatus::InProgress, OrderStatus::Confirmed)
            .await
            .expect("transition");
        assert_eq!(won.expect("won").status, OrderStatus::Confirmed);

        // A second writer holding the stale status loses
        let lost = store
            .transition_order_status(order.id, OrderStatus::InProgress, OrderStatus::Canceled)
            .await
            .expect("transition");
        assert!(lost.is_none());
        let current = store.get_order(order.id).await.expect("get").expect("exists");
        assert_eq!(current.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_transition_on_missing_order_is_none() {
        let store = MemoryStore::new();
        let lost = store
            .transition_order_status(
                OrderId::new(99),
                OrderStatus::InProgress,
                OrderStatus::Canceled,
            )
            .await
            .expect("transition");
        assert!(lost.is_none());
    }

    #[tokio::test]
    async fn test_release_overflow_rejected() {
        let store = MemoryStore::new();
        let product = new_product(&store, u32::MAX).await;

        let err = store.release(product.id, 1).await;
        assert!(matches!(err, Err(RepositoryError::Conflict(_))));
        let remaining = store
            .get_product(product.id)
            .await
            .expect("get")
            .expect("exists")
            .remainder;
        assert_eq!(remaining, u32::MAX);
    }

    #[tokio::test]
    async fn test_delete_product_referenced_by_order_refused() {
        let store = MemoryStore::new();
        let product = new_product(&store, 5).await;
        store
            .create_order(
                UserId::new(1),
                AddressId::new(1),
                &[NewOrderLine {
                    product_id: product.id,
                    quantity: 1,
                }],
            )
            .await
            .expect("order");

        let err = store.delete_product(product.id).await;
        assert!(matches!(err, Err(RepositoryError::Conflict(_))));
        assert!(store.get_product(product.id).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_duplicate_category_title() {
        let store = MemoryStore::new();
        store.insert_category("tools").await.expect("insert");
        let dup = store.insert_category("tools").await;
        assert!(matches!(dup, Err(RepositoryError::Conflict(_))));
    }
}
