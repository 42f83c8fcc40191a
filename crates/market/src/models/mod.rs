//! Entity models.
//!
//! All models are flat DTOs: cross-entity references are foreign-key ID
//! fields resolved with explicit repository lookups, never live object
//! graphs with back-pointers.

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::CartEntry;
pub use order::{NewOrderLine, Order, OrderLine};
pub use product::{Category, NewProduct, Product, ProductParameter, ProductPatch};
pub use user::{Address, NewAddress, NewShop, NewUser, Shop, ShopPatch, User};
