//! User, shop and address models.

use bazaar_core::{AddressId, Email, ShopId, UserId, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user.
///
/// `password_hash` is opaque data owned by the auth collaborator; this crate
/// stores and returns it but never interprets it. `active` is the
/// verified-by-email flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub active: bool,
}

/// A seller account. Each user owns at most one shop; only an active shop
/// may list products or receive orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub user_id: UserId,
    pub title: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A delivery address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub city: String,
    pub street: String,
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub role: UserRole,
    pub active: bool,
}

/// Input for creating a shop. Shops start inactive until a manager flips
/// the flag.
#[derive(Debug, Clone)]
pub struct NewShop {
    pub user_id: UserId,
    pub title: String,
}

/// Partial update for a shop. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ShopPatch {
    pub title: Option<String>,
    pub active: Option<bool>,
}

/// Input for creating a delivery address.
#[derive(Debug, Clone)]
pub struct NewAddress {
    pub user_id: UserId,
    pub city: String,
    pub street: String,
}
