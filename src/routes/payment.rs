//! Payment-gateway callbacks: the user-facing return redirect and the
//! server-to-server instant payment notification.
//!
//! Both carry the same signed field set. A bad signature means the
//! payload is untrusted: the return path redirects to the invalid-result
//! page and the IPN answers code 97, and neither touches order state.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::cart::cookie::{self, PendingOrder};
use crate::error::{AppError, Result};
use crate::events;
use crate::models::Order;
use crate::orders::service::{self as orders, LineSnapshot, NewOrder};
use crate::payment::gateway::{
    self, IpnAck, PARAM_AMOUNT, PARAM_RESPONSE_CODE, PARAM_TXN_REF, RSP_SUCCESS,
};
use crate::AppState;

const RESULT_INVALID: &str = "/payment/result/invalid";
const RESULT_FAILURE: &str = "/payment/result/failure";
const RESULT_SUCCESS: &str = "/payment/result/success";

/// Materialize the order the shopper paid for from the pending-order
/// cookie payload. Safe to call twice: a replayed return for an order
/// that already exists resolves to the existing row.
async fn create_from_pending(s: &AppState, pending: &PendingOrder) -> Result<Order> {
    let new = NewOrder {
        id: pending.order_id,
        order_number: pending.order_number.clone(),
        user_id: pending.user_id,
        status: "confirmed",
        payment_method: pending.payment_method.clone(),
        total: pending.total,
        voucher_code: pending.voucher_code.clone(),
        recipient: pending.recipient.clone(),
        phone: pending.phone.clone(),
        province: pending.province.clone(),
        district: pending.district.clone(),
        ward: pending.ward.clone(),
        street: pending.street.clone(),
        notes: pending.notes.clone(),
    };
    let snapshots: Vec<LineSnapshot> = pending
        .items
        .iter()
        .map(|item| LineSnapshot {
            cart_item_id: Some(item.cart_item_id),
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            size_label: item.size_label.clone(),
            unit_price: item.unit_price,
            discount_percent: item.discount_percent,
            quantity: item.quantity,
        })
        .collect();
    match orders::place_order(&s.db, &new, &snapshots).await {
        Ok(order) => {
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
            Ok(order)
        }
        Err(AppError::Conflict(_)) => {
            let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
                .bind(pending.order_id)
                .fetch_optional(&s.db)
                .await?
                .ok_or(AppError::NotFound("order"))?;
            Ok(order)
        }
        Err(e) => Err(e),
    }
}

async fn payment_return(
    State(s): State<AppState>,
    jar: CookieJar,
    Query(params): Query<HashMap<String, String>>,
) -> (CookieJar, Redirect) {
    if !gateway::verify_signature(&s.config.gateway, &params) {
        tracing::warn!("payment return rejected: invalid signature");
        return (jar, Redirect::to(RESULT_INVALID));
    }
    let code = params.get(PARAM_RESPONSE_CODE).map(String::as_str).unwrap_or_default();
    if code != RSP_SUCCESS {
        tracing::info!("payment return with response code {code}");
        return (jar, Redirect::to(RESULT_FAILURE));
    }
    let Some(pending) = cookie::read_pending_order(&jar) else {
        // The cookie expired or was cleared mid-redirect; the order is
        // unrecoverable on our side.
        tracing::warn!("payment return with no pending order cookie");
        return (jar, Redirect::to(RESULT_FAILURE));
    };
    let txn_ref = params.get(PARAM_TXN_REF).map(String::as_str).unwrap_or_default();
    if txn_ref != pending.order_id.to_string() {
        tracing::warn!("payment return txnRef {txn_ref} does not match pending order");
        return (jar, Redirect::to(RESULT_INVALID));
    }
    let amount = params.get(PARAM_AMOUNT).and_then(|a| a.parse::<i64>().ok());
    if amount != Some(pending.total) {
        tracing::warn!("payment return amount mismatch for order {}", pending.order_number);
        return (jar, Redirect::to(RESULT_FAILURE));
    }
    match create_from_pending(&s, &pending).await {
        Ok(order) => {
            let jar = cookie::clear_pending_order(jar);
            (jar, Redirect::to(&format!("{RESULT_SUCCESS}?order={}", order.order_number)))
        }
        Err(e) => {
            tracing::error!("failed to create order from pending payload: {e}");
            (jar, Redirect::to(RESULT_FAILURE))
        }
    }
}

async fn handle_ipn(s: &AppState, params: HashMap<String, String>) -> IpnAck {
    if !gateway::verify_signature(&s.config.gateway, &params) {
        tracing::warn!("ipn rejected: invalid signature");
        return IpnAck::invalid_signature();
    }
    let Some(order_id) = params.get(PARAM_TXN_REF).and_then(|v| Uuid::parse_str(v).ok()) else {
        return IpnAck::unknown_error();
    };
    let order = match sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&s.db)
        .await
    {
        Ok(Some(order)) => order,
        Ok(None) => {
            // The gateway can notify before the shopper reaches the
            // return endpoint, in which case no order row exists yet.
            tracing::warn!("ipn for unknown order {order_id}");
            return IpnAck::unknown_error();
        }
        Err(e) => {
            tracing::error!("ipn order lookup failed: {e}");
            return IpnAck::unknown_error();
        }
    };
    let amount = params.get(PARAM_AMOUNT).and_then(|a| a.parse::<i64>().ok());
    if amount != Some(order.total) {
        tracing::warn!("ipn amount mismatch for order {}", order.order_number);
        return IpnAck::unknown_error();
    }
    let code = params.get(PARAM_RESPONSE_CODE).map(String::as_str).unwrap_or_default();
    if code == RSP_SUCCESS && order.status == "pending" {
        let res = sqlx::query("UPDATE orders SET status = 'confirmed', updated_at = NOW() WHERE id = $1")
            .bind(order.id)
            .execute(&s.db)
            .await;
        match res {
            Ok(_) => {
                events::publish(
                    &s.nats,
                    events::SUBJECT_ORDER_STATUS_CHANGED,
                    &events::OrderStatusChanged {
                        order_id: order.id,
                        from: "pending",
                        to: "confirmed",
                    },
                )
                .await;
            }
            Err(e) => {
                tracing::error!("ipn failed to confirm order: {e}");
                return IpnAck::unknown_error();
            }
        }
    }
    IpnAck::ok()
}

async fn ipn_get(
    State(s): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<IpnAck> {
    Json(handle_ipn(&s, params).await)
}

/// The gateway posts the same field set as JSON; scalars are accepted
/// whether they arrive as strings or numbers.
fn params_from_json(value: serde_json::Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let v = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn ipn_post(State(s): State<AppState>, Json(body): Json<serde_json::Value>) -> Json<IpnAck> {
    Json(handle_ipn(&s, params_from_json(body)).await)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/return", get(payment_return))
        .route("/ipn", get(ipn_get).post(ipn_post))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_params_accept_mixed_scalars() {
        let params = params_from_json(serde_json::json!({
            "txnRef": "abc",
            "amount": 1250000,
            "responseCode": "00"
        }));
        assert_eq!(params["txnRef"], "abc");
        assert_eq!(params["amount"], "1250000");
        assert_eq!(params["responseCode"], "00");
    }
}
