//! Product catalog models.

use bazaar_core::{CategoryId, Price, ProductId, ShopId};
use serde::{Deserialize, Serialize};

/// A listed product.
///
/// `remainder` is the available stock count. It is owned by the inventory
/// ledger: every mutation goes through an atomic conditional update and the
/// value never drops below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub shop_id: ShopId,
    pub name: String,
    pub price: Price,
    pub remainder: u32,
}

/// A product category. Titles are globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
}

/// A key/value parameter attached to a product (e.g. "color" = "red").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductParameter {
    pub product_id: ProductId,
    pub name: String,
    pub value: String,
}

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub shop_id: ShopId,
    pub name: String,
    pub price: Price,
    pub remainder: u32,
    /// Category IDs to attach; nonexistent IDs are dropped.
    pub categories: Vec<CategoryId>,
    /// Key/value parameters, e.g. `("color", "red")`.
    pub parameters: Vec<(String, String)>,
}

/// Partial update for a product. `None` fields are left untouched.
///
/// Stock is deliberately absent: restocking goes through the inventory
/// ledger so it serializes with concurrent checkouts on the same row.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Price>,
    /// Replaces the full category set when present.
    pub categories: Option<Vec<CategoryId>>,
}
