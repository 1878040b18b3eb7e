//! HTTP surface: route assembly and the per-area handler modules.

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod auth;
pub mod brands;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payment;
pub mod products;
pub mod uploads;
pub mod users;

pub fn router(state: AppState) -> Router {
    let public_dir = state.config.public_dir.clone();
    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/products", products::router())
        .nest("/brands", brands::router())
        .nest("/cart", cart::router())
        .nest("/checkout", checkout::router())
        .nest("/payment", payment::router())
        .nest("/orders", orders::router())
        .merge(users::router())
        .merge(uploads::router());
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "stride-ecommerce"})) }),
        )
        .nest("/api/v1", api)
        .nest_service("/public", ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
