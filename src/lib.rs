//! bookstore-rs: backend for an online bookstore.
//!
//! This crate provides the HTTP API behind a bookstore storefront: a public
//! catalog of books, authors and publishers, per-user carts and wishlists,
//! checkout through a card payment processor, and an admin surface for
//! managing the catalog, users and orders. Accounts are mirrored from an
//! external identity provider through signed webhooks.
//!
//! # Features
//!
//! - Catalog search, filtering, sorting and pagination
//! - Cart and wishlist management
//! - Checkout with server-side totals and payment confirmation
//! - Reviews with ratings and helpfulness votes
//! - Identity-provider user sync via signed webhooks
//! - Admin catalog, user and order management

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain operations behind the HTTP handlers.
pub mod actions;
/// Session authentication.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Identity-provider webhooks.
pub mod identity;
/// Payment processor client.
pub mod payment;
/// Order total computation.
pub mod pricing;
/// HTTP server.
pub mod server;
/// Request payload schemas.
pub mod validation;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
