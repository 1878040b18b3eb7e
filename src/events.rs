//! Order lifecycle events, published to NATS when configured.

use serde::Serialize;
use uuid::Uuid;

pub const SUBJECT_ORDER_CREATED: &str = "orders.created";
pub const SUBJECT_ORDER_STATUS_CHANGED: &str = "orders.status_changed";

#[derive(Debug, Serialize)]
pub struct OrderCreated<'a> {
    pub order_id: Uuid,
    pub order_number: &'a str,
    pub user_id: Uuid,
    pub total: i64,
    pub payment_method: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusChanged<'a> {
    pub order_id: Uuid,
    pub from: &'a str,
    pub to: &'a str,
}

/// Fire-and-forget publish; eventing is optional and never fails a
/// request.
pub async fn publish<T: Serialize>(nats: &Option<async_nats::Client>, subject: &str, event: &T) {
    let Some(client) = nats else { return };
    let payload = match serde_json::to_vec(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("failed to serialize {subject} event: {e}");
            return;
        }
    };
    if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
        tracing::warn!("failed to publish {subject}: {e}");
    }
}
