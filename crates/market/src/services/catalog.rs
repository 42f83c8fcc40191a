//! Catalog management.
//!
//! Products, categories, shops and delivery addresses. Sellers manage the
//! products of their own shop; shop activation and the category taxonomy
//! are manager-only. Restocking goes through the inventory ledger so it
//! serializes with concurrent checkouts on the same product row.

use tracing::instrument;

use bazaar_core::{CategoryId, ProductId, ShopId, UserId, UserRole};

use crate::db::MarketStore;
use crate::error::MarketError;
use crate::models::{
    Address, Category, NewAddress, NewProduct, NewShop, Product, ProductParameter, ProductPatch,
    Shop, ShopPatch, User,
};
use crate::services::inventory::InventoryLedger;

/// Catalog operations over a store.
#[derive(Debug, Clone)]
pub struct CatalogService<S> {
    store: S,
    ledger: InventoryLedger<S>,
}

impl<S: MarketStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
        }
    }

    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// `NotFound` if missing.
    pub async fn get_product(&self, id: ProductId) -> Result<Product, MarketError> {
        self.store
            .get_product(id)
            .await?
            .ok_or(MarketError::NotFound("product"))
    }

    /// Fetch a product's key/value parameters, sorted by name.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown product.
    pub async fn product_parameters(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductParameter>, MarketError> {
        self.get_product(product_id).await?;
        Ok(self.store.get_product_parameters(product_id).await?)
    }

    /// List a shop's products.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown shop.
    pub async fn list_products(&self, shop_id: ShopId) -> Result<Vec<Product>, MarketError> {
        self.store
            .get_shop(shop_id)
            .await?
            .ok_or(MarketError::NotFound("shop"))?;
        Ok(self.store.list_products_for_shop(shop_id).await?)
    }

    /// Create a product in the caller's shop.
    ///
    /// Nonexistent category IDs are dropped rather than rejected; the
    /// attached set is whatever actually exists.
    ///
    /// # Errors
    ///
    /// `Forbidden` when the shop belongs to another user, `ShopInactive`
    /// when the shop has not been activated yet, `NotFound` for an unknown
    /// shop.
    #[instrument(skip(self, input), fields(shop_id = %input.shop_id, name = %input.name))]
    pub async fn create_product(
        &self,
        actor_id: UserId,
        input: &NewProduct,
    ) -> Result<Product, MarketError> {
        let shop = self
            .store
            .get_shop(input.shop_id)
            .await?
            .ok_or(MarketError::NotFound("shop"))?;
        if shop.user_id != actor_id {
            return Err(MarketError::Forbidden("shop belongs to another user"));
        }
        if !shop.active {
            return Err(MarketError::ShopInactive);
        }

        let product = self.store.insert_product(input).await?;
        let existing: Vec<CategoryId> = self
            .store
            .get_categories(&input.categories)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if !existing.is_empty() {
            self.store
                .set_product_categories(product.id, &existing)
                .await?;
        }
        if !input.parameters.is_empty() {
            self.store
                .set_product_parameters(product.id, &input.parameters)
                .await?;
        }

        tracing::info!(product_id = %product.id, shop_id = %shop.id, "Product created");
        Ok(product)
    }

    /// Apply a partial update to one of the caller's products.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing product, `Forbidden` when it belongs to
    /// another user's shop.
    pub async fn update_product(
        &self,
        actor_id: UserId,
        product_id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, MarketError> {
        self.owned_product(actor_id, product_id).await?;
        let updated = self.store.update_product(product_id, patch).await?;
        if let Some(categories) = &patch.categories {
            let existing: Vec<CategoryId> = self
                .store
                .get_categories(categories)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect();
            self.store
                .set_product_categories(product_id, &existing)
                .await?;
        }
        Ok(updated)
    }

    /// Delete one of the caller's products.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing product, `Forbidden` when it belongs to
    /// another user's shop, `Conflict` while an order still references it.
    pub async fn delete_product(
        &self,
        actor_id: UserId,
        product_id: ProductId,
    ) -> Result<(), MarketError> {
        self.owned_product(actor_id, product_id).await?;
        if !self.store.delete_product(product_id).await? {
            return Err(MarketError::NotFound("product"));
        }
        tracing::info!(%product_id, "Product deleted");
        Ok(())
    }

    /// Add stock to one of the caller's products.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing product, `Forbidden` when it belongs to
    /// another user's shop, `Conflict` when the increment would overflow
    /// the stock counter.
    #[instrument(skip(self))]
    pub async fn restock(
        &self,
        actor_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Product, MarketError> {
        self.owned_product(actor_id, product_id).await?;
        self.ledger.release(product_id, quantity).await?;
        self.get_product(product_id).await
    }

    /// Open a shop for the caller. Shops start inactive until a manager
    /// activates them.
    ///
    /// # Errors
    ///
    /// `Forbidden` for users without the seller role, `Conflict` when the
    /// caller already owns a shop.
    pub async fn create_shop(&self, actor_id: UserId, title: String) -> Result<Shop, MarketError> {
        let actor = self.actor(actor_id).await?;
        if actor.role != UserRole::Shop {
            return Err(MarketError::Forbidden("only sellers may open a shop"));
        }
        let shop = self
            .store
            .insert_shop(&NewShop {
                user_id: actor_id,
                title,
            })
            .await?;
        tracing::info!(shop_id = %shop.id, user_id = %actor_id, "Shop created");
        Ok(shop)
    }

    /// Update a shop. The owner may rename it; flipping `active` is
    /// manager-only.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing shop, `Forbidden` for anyone else or for an
    /// owner touching the activation flag.
    pub async fn update_shop(
        &self,
        actor_id: UserId,
        shop_id: ShopId,
        patch: &ShopPatch,
    ) -> Result<Shop, MarketError> {
        let actor = self.actor(actor_id).await?;
        let shop = self
            .store
            .get_shop(shop_id)
            .await?
            .ok_or(MarketError::NotFound("shop"))?;
        if actor.role != UserRole::Manager {
            if shop.user_id != actor_id {
                return Err(MarketError::Forbidden("shop belongs to another user"));
            }
            if patch.active.is_some() {
                return Err(MarketError::Forbidden(
                    "only managers may change shop activation",
                ));
            }
        }
        Ok(self.store.update_shop(shop_id, patch).await?)
    }

    /// Create a category. Managers only; titles are globally unique.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-managers, `Conflict` on a duplicate title.
    pub async fn create_category(
        &self,
        actor_id: UserId,
        title: &str,
    ) -> Result<Category, MarketError> {
        let actor = self.actor(actor_id).await?;
        if actor.role != UserRole::Manager {
            return Err(MarketError::Forbidden("only managers may create categories"));
        }
        Ok(self.store.insert_category(title).await?)
    }

    /// List every category, sorted by ID.
    ///
    /// # Errors
    ///
    /// `Repository` on storage failure.
    pub async fn list_categories(&self) -> Result<Vec<Category>, MarketError> {
        Ok(self.store.list_categories().await?)
    }

    /// Add a delivery address for the caller.
    ///
    /// # Errors
    ///
    /// `Validation` when the city or street is blank.
    pub async fn add_address(
        &self,
        user_id: UserId,
        city: String,
        street: String,
    ) -> Result<Address, MarketError> {
        if city.trim().is_empty() || street.trim().is_empty() {
            return Err(MarketError::Validation(
                "city and street must not be blank".into(),
            ));
        }
        Ok(self
            .store
            .insert_address(&NewAddress {
                user_id,
                city,
                street,
            })
            .await?)
    }

    async fn actor(&self, id: UserId) -> Result<User, MarketError> {
        self.store
            .get_user(id)
            .await?
            .ok_or(MarketError::NotFound("user"))
    }

    /// Fetch a product and verify the actor owns the shop it belongs to.
    async fn owned_product(
        &self,
        actor_id: UserId,
        product_id: ProductId,
    ) -> Result<Product, MarketError> {
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
        if shop.user_id != actor_id {
            return Err(MarketError::Forbidden("product belongs to another shop"));
        }
        Ok(product)
    }
}
