//! Bazaar Market - marketplace domain library.
//!
//! This crate owns the order lifecycle and inventory reservation core of the
//! marketplace: the ephemeral cart, the inventory ledger with its
//! non-negative floor, the order state machine, and the checkout
//! orchestration that ties them together. Transport (HTTP routing,
//! authentication, request validation) lives in collaborator binaries built
//! on top of this library.
//!
//! # Architecture
//!
//! - [`db`] - repository traits plus `PostgreSQL` and in-memory
//!   implementations; all durable state lives behind this boundary
//! - [`cache`] - byte-oriented key-value cache holding in-progress carts
//! - [`services`] - the domain services; each one takes its collaborators
//!   by constructor injection and is generic over the store traits
//! - [`models`] - flat entity DTOs with foreign-key fields, no object graphs
//!
//! # Security
//!
//! This crate never sees plaintext passwords or tokens; `User` carries an
//! opaque `password_hash` owned by the auth collaborator.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use error::{ErrorCode, MarketError};
