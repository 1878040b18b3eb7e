//! Cookie codecs for the guest cart and the pending gateway order.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::cart::GuestCart;

/// Guest cart: URL-encoded JSON, flat `{ sizeId: quantity }`.
pub const CART_COOKIE: &str = "cart-items";
/// Pending gateway order: base64 JSON, dropped once the order exists.
pub const PENDING_ORDER_COOKIE: &str = "pendingOrder";

const CART_COOKIE_MAX_AGE_DAYS: i64 = 30;
const PENDING_ORDER_MAX_AGE_SECS: i64 = 3600;

/// Read the guest cart from the jar. Missing or malformed cookies read
/// as an empty cart; referenced size ids are validated later, when the
/// cart is resolved against the catalog.
pub fn read_guest_cart(jar: &CookieJar) -> GuestCart {
    let Some(cookie) = jar.get(CART_COOKIE) else {
        return GuestCart::new();
    };
    let decoded = match urlencoding::decode(cookie.value()) {
        Ok(v) => v.into_owned(),
        Err(_) => return GuestCart::new(),
    };
    match serde_json::from_str(&decoded) {
        Ok(cart) => cart,
        Err(e) => {
            tracing::warn!("discarding unparseable cart cookie: {e}");
            GuestCart::new()
        }
    }
}

/// Serialize the guest cart back into the jar.
pub fn write_guest_cart(jar: CookieJar, cart: &GuestCart) -> CookieJar {
    let json = serde_json::to_string(cart).unwrap_or_else(|_| "{}".to_string());
    let cookie = Cookie::build((CART_COOKIE, urlencoding::encode(&json).into_owned()))
        .path("/")
        .max_age(time::Duration::days(CART_COOKIE_MAX_AGE_DAYS))
        .build();
    jar.add(cookie)
}

pub fn clear_guest_cart(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build((CART_COOKIE, "")).path("/").build())
}

/// Snapshot line carried through the gateway redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrderItem {
    pub cart_item_id: Uuid,
    pub size_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size_label: String,
    pub unit_price: i64,
    pub discount_percent: i32,
    pub quantity: i32,
}

/// Everything needed to materialize the order once the gateway confirms
/// payment. Held client-side for the duration of the redirect; an
/// expired or cleared cookie loses the pending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub payment_method: String,
    pub voucher_code: Option<String>,
    pub recipient: String,
    pub phone: String,
    pub province: String,
    pub district: String,
    pub ward: String,
    pub street: String,
    pub notes: Option<String>,
    pub items: Vec<PendingOrderItem>,
    pub total: i64,
}

pub fn write_pending_order(jar: CookieJar, pending: &PendingOrder) -> CookieJar {
    let json = serde_json::to_string(pending).unwrap_or_else(|_| "{}".to_string());
    let cookie = Cookie::build((PENDING_ORDER_COOKIE, BASE64_STANDARD.encode(json)))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(PENDING_ORDER_MAX_AGE_SECS))
        .build();
    jar.add(cookie)
}

pub fn read_pending_order(jar: &CookieJar) -> Option<PendingOrder> {
    let cookie = jar.get(PENDING_ORDER_COOKIE)?;
    let bytes = BASE64_STANDARD.decode(cookie.value()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn clear_pending_order(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build((PENDING_ORDER_COOKIE, "")).path("/").build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn guest_cart_round_trips() {
        let cart = GuestCart::from([(sid(1), 2), (sid(2), 5)]);
        let jar = write_guest_cart(CookieJar::new(), &cart);
        assert_eq!(read_guest_cart(&jar), cart);
    }

    #[test]
    fn missing_cookie_reads_as_empty() {
        assert!(read_guest_cart(&CookieJar::new()).is_empty());
    }

    #[test]
    fn garbage_cookie_reads_as_empty() {
        let jar = CookieJar::new().add(Cookie::new(CART_COOKIE, "not%20json"));
        assert!(read_guest_cart(&jar).is_empty());
    }

    #[test]
    fn nested_legacy_shape_is_rejected() {
        // The old by-product nesting is not parseable as the flat shape.
        let nested = r#"{"11111111-1111-1111-1111-111111111111":{"22222222-2222-2222-2222-222222222222":1}}"#;
        let jar = CookieJar::new()
            .add(Cookie::new(CART_COOKIE, urlencoding::encode(nested).into_owned()));
        assert!(read_guest_cart(&jar).is_empty());
    }

    #[test]
    fn pending_order_round_trips() {
        let pending = PendingOrder {
            order_id: sid(7),
            order_number: "ORD-00000007".into(),
            user_id: sid(9),
            payment_method: "gateway".into(),
            voucher_code: None,
            recipient: "A. Shopper".into(),
            phone: "0900000000".into(),
            province: "P".into(),
            district: "D".into(),
            ward: "W".into(),
            street: "1 Main St".into(),
            notes: Some("leave at door".into()),
            items: vec![PendingOrderItem {
                cart_item_id: sid(1),
                size_id: sid(2),
                product_id: sid(3),
                product_name: "Runner".into(),
                size_label: "42".into(),
                unit_price: 100_000,
                discount_percent: 10,
                quantity: 2,
            }],
            total: 180_000,
        };
        let jar = write_pending_order(CookieJar::new(), &pending);
        let read = read_pending_order(&jar).unwrap();
        assert_eq!(read.order_id, pending.order_id);
        assert_eq!(read.items.len(), 1);
        assert_eq!(read.total, 180_000);
    }

    #[test]
    fn cleared_pending_order_is_gone() {
        let pending_jar = write_pending_order(CookieJar::new(), &PendingOrder {
            order_id: sid(1),
            order_number: "ORD-00000001".into(),
            user_id: sid(2),
            payment_method: "gateway".into(),
            voucher_code: None,
            recipient: String::new(),
            phone: String::new(),
            province: String::new(),
            district: String::new(),
            ward: String::new(),
            street: String::new(),
            notes: None,
            items: vec![],
            total: 0,
        });
        let jar = clear_pending_order(pending_jar);
        assert!(read_pending_order(&jar).is_none());
    }
}
