//! Checkout: convert a selected subset of the cart into an order.
//!
//! Cash-on-delivery places the order immediately (status `pending`).
//! The gateway path defers creation: the full order payload rides in
//! the `pendingOrder` cookie through the redirect and the order is
//! materialized at the return endpoint once payment is confirmed.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::cart::cookie::{self, PendingOrder, PendingOrderItem};
use crate::domain::pricing;
use crate::error::Result;
use crate::events;
use crate::models::{Order, PaymentMethod};
use crate::orders::service::{self as orders, LineSnapshot, NewOrder};
use crate::payment::gateway::{self, PaymentRequest};
use crate::routes::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    pub voucher_code: Option<String>,
    #[validate(length(min = 1))]
    pub recipient: String,
    #[validate(length(min = 1))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub province: String,
    #[validate(length(min = 1))]
    pub district: String,
    #[validate(length(min = 1))]
    pub ward: String,
    #[validate(length(min = 1))]
    pub street: String,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "select at least one cart item"))]
    pub cart_item_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CheckoutResponse {
    Placed { order: Order },
    Redirect { payment_url: String, order_number: String },
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

async fn checkout(
    State(s): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, CookieJar, Json<CheckoutResponse>)> {
    req.validate()?;
    let lines = orders::load_selected_lines(&s.db, user.id, &req.cart_item_ids).await?;
    // Price drift between add-to-cart and checkout is captured here:
    // totals come from the catalog rows as of right now.
    let total = pricing::order_total(
        lines.iter().map(|l| (l.unit_price, l.discount_percent, l.quantity as u32)),
    );
    let order_id = Uuid::now_v7();
    let order_number = orders::generate_order_number();

    match req.payment_method {
        PaymentMethod::Cod => {
            let new = NewOrder {
                id: order_id,
                order_number,
                user_id: user.id,
                status: "pending",
                payment_method: PaymentMethod::Cod.as_str().to_string(),
                total,
                voucher_code: req.voucher_code,
                recipient: req.recipient,
                phone: req.phone,
                province: req.province,
                district: req.district,
                ward: req.ward,
                street: req.street,
                notes: req.notes,
            };
            let snapshots: Vec<LineSnapshot> = lines.iter().map(LineSnapshot::from).collect();
            let order = orders::place_order(&s.db, &new, &snapshots).await?;
            events::publish(
                &s.nats,
                events::SUBJECT_ORDER_CREATED,
                &events::OrderCreated {
                    order_id: order.id,
                    order_number: &order.order_number,
                    user_id: order.user_id,
                    total: order.total,
                    payment_method: &order.payment_method,
                },
            )
            .await;
            Ok((StatusCode::CREATED, jar, Json(CheckoutResponse::Placed { order })))
        }
        PaymentMethod::Gateway => {
            let pending = PendingOrder {
                order_id,
                order_number: order_number.clone(),
                user_id: user.id,
                payment_method: PaymentMethod::Gateway.as_str().to_string(),
                voucher_code: req.voucher_code,
                recipient: req.recipient,
                phone: req.phone,
                province: req.province,
                district: req.district,
                ward: req.ward,
                street: req.street,
                notes: req.notes,
                items: lines
                    .iter()
                    .map(|l| PendingOrderItem {
                        cart_item_id: l.cart_item_id,
                        size_id: l.size_id,
                        product_id: l.product_id,
                        product_name: l.product_name.clone(),
                        size_label: l.size_label.clone(),
                        unit_price: l.unit_price,
                        discount_percent: l.discount_percent,
                        quantity: l.quantity,
                    })
                    .collect(),
                total,
            };
            let payment_url = gateway::build_payment_url(
                &s.config.gateway,
                &PaymentRequest {
                    order_ref: order_id.to_string(),
                    amount: total,
                    order_info: format!("Payment for order {order_number}"),
                    client_ip: client_ip(&headers),
                    created_at: Utc::now(),
                },
            );
            let jar = cookie::write_pending_order(jar, &pending);
            Ok((
                StatusCode::OK,
                jar,
                Json(CheckoutResponse::Redirect { payment_url, order_number }),
            ))
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}
