//! Stride E-commerce Platform
//!
//! Self-hosted storefront and admin back-office service.
//!
//! ## Features
//! - Product and brand catalog with per-size stock
//! - Guest (cookie) and signed-in (database) carts, reconciled on
//!   login/logout
//! - Checkout with cash-on-delivery and payment-gateway redirect flows
//! - Order lifecycle management
//! - Admin CRUD for products, brands, orders and users; image uploads

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;

pub mod cart;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod models;
pub mod orders;
pub mod payment;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub nats: Option<async_nats::Client>,
    pub config: Arc<AppConfig>,
}
