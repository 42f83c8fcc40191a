//! End-to-end order lifecycle over the in-memory store: cart to checkout
//! to status progression, with cancellation restoring stock.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;

use bazaar_core::{
    AddressId, CategoryId, Email, OrderId, OrderStatus, Price, ProductId, ShopId, UserId, UserRole,
};
use bazaar_market::cache::MokaCartCache;
use bazaar_market::db::{MemoryStore, OrderStore, ProductStore, RepositoryError, UserStore};
use bazaar_market::models::{
    Address, Category, NewAddress, NewOrderLine, NewProduct, NewShop, NewUser, Order, Product,
    ProductParameter, ProductPatch, Shop, ShopPatch, User,
};
use bazaar_market::services::notify::RecordingNotifier;
use bazaar_market::services::{
    CartService, CatalogService, CheckoutService, OrderService,
};
use bazaar_market::MarketError;

struct World {
    store: MemoryStore,
    carts: CartService<MemoryStore, MokaCartCache>,
    checkout: CheckoutService<MemoryStore, MokaCartCache, RecordingNotifier>,
    orders: OrderService<MemoryStore, RecordingNotifier>,
    catalog: CatalogService<MemoryStore>,
    notifier: RecordingNotifier,
    buyer: UserId,
    manager: UserId,
    seller: UserId,
    address: AddressId,
}

async fn world() -> World {
    let store = MemoryStore::new();
    let cache = MokaCartCache::new(1_000, Duration::from_secs(3600));
    let notifier = RecordingNotifier::new();
    let catalog = CatalogService::new(store.clone());

    let buyer = new_user(&store, "buyer@example.com", UserRole::Buyer).await;
    let manager = new_user(&store, "manager@example.com", UserRole::Manager).await;
    let seller = new_user(&store, "seller@example.com", UserRole::Shop).await;

    let shop = catalog.create_shop(seller, "stall".into()).await.unwrap();
    catalog
        .update_shop(
            manager,
            shop.id,
            &ShopPatch {
                title: None,
                active: Some(true),
            },
        )
        .await
        .unwrap();

    let address = catalog
        .add_address(buyer, "Riga".into(), "Brivibas 1".into())
        .await
        .unwrap()
        .id;

    World {
        carts: CartService::new(store.clone(), cache.clone()),
        checkout: CheckoutService::new(
            store.clone(),
            cache,
            notifier.clone(),
            Duration::from_secs(5),
        ),
        orders: OrderService::new(store.clone(), notifier.clone()),
        catalog,
        store,
        notifier,
        buyer,
        manager,
        seller,
        address,
    }
}

async fn new_user(store: &MemoryStore, email: &str, role: UserRole) -> UserId {
    store
        .insert_user(&NewUser {
            email: email.parse::<Email>().unwrap(),
            password_hash: "hash".into(),
            role,
            active: true,
        })
        .await
        .unwrap()
        .id
}

async fn new_product(world: &World, name: &str, remainder: u32) -> ProductId {
    world
        .catalog
        .create_product(
            world.seller,
            &NewProduct {
                shop_id: world.store.shop_for_user(world.seller).await.unwrap().unwrap().id,
                name: name.into(),
                price: Price::new(Decimal::new(1999, 2)).unwrap(),
                remainder,
                categories: vec![],
                parameters: vec![],
            },
        )
        .await
        .unwrap()
        .id
}

async fn remainder_of(world: &World, id: ProductId) -> u32 {
    world.store.get_product(id).await.unwrap().unwrap().remainder
}

#[tokio::test]
async fn test_full_happy_path() {
    let w = world().await;
    let product = new_product(&w, "widget", 10).await;

    w.carts.add_or_update(w.buyer, product, 5).await.unwrap();
    let order = w.checkout.checkout(w.buyer, w.address).await.unwrap();

    assert_eq!(order.status, OrderStatus::InProgress);
    assert_eq!(remainder_of(&w, product).await, 5);
    assert!(w.carts.get(w.buyer).await.unwrap().is_empty());

    // Manager walks the order to delivery
    for next in [
        OrderStatus::Confirmed,
        OrderStatus::Assembled,
        OrderStatus::Sent,
        OrderStatus::Delivered,
    ] {
        let updated = w.orders.set_status(w.manager, order.id, next).await.unwrap();
        assert_eq!(updated.status, next);
    }

    // One checkout notification to the manager, four status updates to
    // the buyer
    let sent = w.notifier.sent();
    assert_eq!(sent.len(), 5);
    assert_eq!(
        sent[0].recipients,
        vec!["manager@example.com".parse::<Email>().unwrap()]
    );
    assert!(sent[1..].iter().all(|n| {
        n.recipients == vec!["buyer@example.com".parse::<Email>().unwrap()]
    }));

    // Delivered is terminal
    let err = w
        .orders
        .set_status(w.manager, order.id, OrderStatus::Canceled)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_insufficient_stock_leaves_world_unchanged() {
    let w = world().await;
    let product = new_product(&w, "widget", 5).await;

    w.carts.add_or_update(w.buyer, product, 5).await.unwrap();
    // Another buyer grabs some stock before this one checks out
    assert!(w.store.try_consume(product, 3).await.unwrap());

    let err = w.checkout.checkout(w.buyer, w.address).await.unwrap_err();
    assert!(matches!(err, MarketError::InsufficientStock { .. }));

    assert_eq!(remainder_of(&w, product).await, 2);
    assert_eq!(w.carts.get(w.buyer).await.unwrap().len(), 1);
    assert!(w.store.list_orders(None).await.unwrap().is_empty());
    assert!(w.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_multi_line_rollback_releases_consumed_lines() {
    let w = world().await;
    let first = new_product(&w, "first", 10).await;
    let second = new_product(&w, "second", 10).await;
    let third = new_product(&w, "third", 1).await;

    w.carts.add_or_update(w.buyer, first, 4).await.unwrap();
    w.carts.add_or_update(w.buyer, second, 4).await.unwrap();
    w.carts.add_or_update(w.buyer, third, 1).await.unwrap();
    assert!(w.store.try_consume(third, 1).await.unwrap());

    let err = w.checkout.checkout(w.buyer, w.address).await.unwrap_err();
    assert!(matches!(
        err,
        MarketError::InsufficientStock { product_id } if product_id == third
    ));

    // The two consumed lines were released
    assert_eq!(remainder_of(&w, first).await, 10);
    assert_eq!(remainder_of(&w, second).await, 10);
    assert!(w.store.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancellation_restores_every_line() {
    let w = world().await;
    let first = new_product(&w, "first", 10).await;
    let second = new_product(&w, "second", 10).await;

    w.carts.add_or_update(w.buyer, first, 3).await.unwrap();
    w.carts.add_or_update(w.buyer, second, 7).await.unwrap();
    let order = w.checkout.checkout(w.buyer, w.address).await.unwrap();
    assert_eq!(remainder_of(&w, first).await, 7);
    assert_eq!(remainder_of(&w, second).await, 3);

    let canceled = w.orders.cancel_own(w.buyer, order.id).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(remainder_of(&w, first).await, 10);
    assert_eq!(remainder_of(&w, second).await, 10);

    // Canceled is a dead end
    let err = w
        .orders
        .set_status(w.manager, order.id, OrderStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_two_buyers_race_for_the_last_units() {
    let w = world().await;
    let product = new_product(&w, "widget", 6).await;
    let rival = new_user(&w.store, "rival@example.com", UserRole::Buyer).await;
    let rival_address = w
        .catalog
        .add_address(rival, "Riga".into(), "Other 2".into())
        .await
        .map(|a| a.id)
        .unwrap();

    w.carts.add_or_update(w.buyer, product, 4).await.unwrap();
    w.carts.add_or_update(rival, product, 4).await.unwrap();

    let first = w.checkout.checkout(w.buyer, w.address).await;
    let second = w.checkout.checkout(rival, rival_address).await;

    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(MarketError::InsufficientStock { .. })
    ));
    assert_eq!(remainder_of(&w, product).await, 2);
    // The loser keeps their cart and can retry with a smaller quantity
    assert_eq!(w.carts.get(rival).await.unwrap().len(), 1);
}

/// Store wrapper that parks the task before every call, letting two tasks
/// interleave their reads and writes the way they would over a real
/// connection pool. Also records each line's stock level at the moment the
/// order row is inserted.
#[derive(Clone)]
struct InterleavedStore {
    inner: MemoryStore,
    stock_at_order_insert: Arc<Mutex<Vec<(ProductId, u32)>>>,
}

impl InterleavedStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            stock_at_order_insert: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ProductStore for InterleavedStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_product(id).await
    }

    async fn list_products_for_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Vec<Product>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.list_products_for_shop(shop_id).await
    }

    async fn insert_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.insert_product(input).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.update_product(id, patch).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.delete_product(id).await
    }

    async fn try_consume(&self, id: ProductId, quantity: u32) -> Result<bool, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.try_consume(id, quantity).await
    }

    async fn release(&self, id: ProductId, quantity: u32) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.release(id, quantity).await
    }

    async fn insert_category(&self, title: &str) -> Result<Category, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.insert_category(title).await
    }

    async fn get_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_categories(ids).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.list_categories().await
    }

    async fn set_product_categories(
        &self,
        product_id: ProductId,
        categories: &[CategoryId],
    ) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.set_product_categories(product_id, categories).await
    }

    async fn set_product_parameters(
        &self,
        product_id: ProductId,
        parameters: &[(String, String)],
    ) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.set_product_parameters(product_id, parameters).await
    }

    async fn get_product_parameters(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductParameter>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_product_parameters(product_id).await
    }
}

impl OrderStore for InterleavedStore {
    async fn create_order(
        &self,
        user_id: UserId,
        address_id: AddressId,
        lines: &[NewOrderLine],
    ) -> Result<Order, RepositoryError> {
        tokio::task::yield_now().await;
        for line in lines {
            if let Some(product) = self.inner.get_product(line.product_id).await? {
                self.stock_at_order_insert
                    .lock()
                    .unwrap()
                    .push((line.product_id, product.remainder));
            }
        }
        self.inner.create_order(user_id, address_id, lines).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_order(id).await
    }

    async fn transition_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.transition_order_status(id, from, to).await
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.list_orders(status).await
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.list_orders_for_user(user_id).await
    }
}

impl UserStore for InterleavedStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_user_by_email(email).await
    }

    async fn insert_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.insert_user(input).await
    }

    async fn manager_emails(&self) -> Result<Vec<Email>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.manager_emails().await
    }

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_address(id).await
    }

    async fn insert_address(&self, input: &NewAddress) -> Result<Address, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.insert_address(input).await
    }

    async fn get_shop(&self, id: ShopId) -> Result<Option<Shop>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_shop(id).await
    }

    async fn shop_for_user(&self, user_id: UserId) -> Result<Option<Shop>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.shop_for_user(user_id).await
    }

    async fn insert_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.insert_shop(input).await
    }

    async fn update_shop(&self, id: ShopId, patch: &ShopPatch) -> Result<Shop, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.update_shop(id, patch).await
    }
}

#[tokio::test]
async fn test_concurrent_cancellations_release_stock_once() {
    let inner = MemoryStore::new();
    let store = InterleavedStore::new(inner.clone());
    let notifier = RecordingNotifier::new();
    let orders = OrderService::new(store, notifier);

    let buyer = new_user(&inner, "buyer@example.com", UserRole::Buyer).await;
    let manager = new_user(&inner, "manager@example.com", UserRole::Manager).await;
    let address = inner
        .insert_address(&NewAddress {
            user_id: buyer,
            city: "Riga".into(),
            street: "Brivibas 1".into(),
        })
        .await
        .unwrap()
        .id;
    let product = inner
        .insert_product(&NewProduct {
            shop_id: ShopId::new(1),
            name: "widget".into(),
            price: Price::new(Decimal::TEN).unwrap(),
            remainder: 10,
            categories: vec![],
            parameters: vec![],
        })
        .await
        .unwrap()
        .id;
    assert!(inner.try_consume(product, 4).await.unwrap());
    let order = inner
        .create_order(
            buyer,
            address,
            &[NewOrderLine {
                product_id: product,
                quantity: 4,
            }],
        )
        .await
        .unwrap();

    // Owner and manager cancel the same order at once; both read it as
    // IN_PROGRESS before either writes
    let (by_owner, by_manager) = tokio::join!(
        orders.cancel_own(buyer, order.id),
        orders.set_status(manager, order.id, OrderStatus::Canceled),
    );

    assert!(
        by_owner.is_ok() != by_manager.is_ok(),
        "exactly one cancellation must win: owner {by_owner:?}, manager {by_manager:?}"
    );
    let current = inner.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Canceled);
    // The 4 consumed units came back exactly once
    assert_eq!(
        inner.get_product(product).await.unwrap().unwrap().remainder,
        10
    );
}

#[tokio::test]
async fn test_order_row_written_only_after_stock_consumed() {
    let inner = MemoryStore::new();
    let store = InterleavedStore::new(inner.clone());
    let cache = MokaCartCache::new(100, Duration::from_secs(60));
    let notifier = RecordingNotifier::new();
    let carts = CartService::new(store.clone(), cache.clone());
    let checkout = CheckoutService::new(store.clone(), cache, notifier, Duration::from_secs(5));

    let buyer = new_user(&inner, "buyer@example.com", UserRole::Buyer).await;
    new_user(&inner, "manager@example.com", UserRole::Manager).await;
    let seller = new_user(&inner, "seller@example.com", UserRole::Shop).await;
    let shop = inner
        .insert_shop(&NewShop {
            user_id: seller,
            title: "stall".into(),
        })
        .await
        .unwrap();
    inner
        .update_shop(
            shop.id,
            &ShopPatch {
                title: None,
                active: Some(true),
            },
        )
        .await
        .unwrap();
    let product = inner
        .insert_product(&NewProduct {
            shop_id: shop.id,
            name: "widget".into(),
            price: Price::new(Decimal::TEN).unwrap(),
            remainder: 10,
            categories: vec![],
            parameters: vec![],
        })
        .await
        .unwrap()
        .id;
    let address = inner
        .insert_address(&NewAddress {
            user_id: buyer,
            city: "Riga".into(),
            street: "Brivibas 1".into(),
        })
        .await
        .unwrap()
        .id;

    carts.add_or_update(buyer, product, 4).await.unwrap();
    checkout.checkout(buyer, address).await.unwrap();

    // By the time the order row went in, its stock was already consumed,
    // so a cancellation can never observe an unconsumed line.
    let seen = store.stock_at_order_insert.lock().unwrap().clone();
    assert_eq!(seen, vec![(product, 6)]);
}

#[tokio::test]
async fn test_zero_quantity_update_then_checkout_refused() {
    let w = world().await;
    let product = new_product(&w, "widget", 10).await;

    w.carts.add_or_update(w.buyer, product, 2).await.unwrap();
    w.carts.add_or_update(w.buyer, product, 0).await.unwrap();

    let err = w.checkout.checkout(w.buyer, w.address).await.unwrap_err();
    assert!(matches!(err, MarketError::EmptyCart));
    assert_eq!(remainder_of(&w, product).await, 10);
}
