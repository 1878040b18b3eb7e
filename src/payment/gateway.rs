//! Hosted-payment-page redirect flow.
//!
//! The gateway authenticates both directions with an HMAC-SHA512 digest
//! over the lexicographically sorted, form-encoded request parameters.
//! The sort-then-encode step is load-bearing: the verifier must
//! reproduce the byte-identical canonical string or every legitimate
//! callback is rejected, so both sides share [`canonical_query`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::config::GatewayConfig;

type HmacSha512 = Hmac<Sha512>;

/// Signature parameter appended to outbound requests and stripped before
/// verifying inbound ones.
pub const PARAM_SECURE_HASH: &str = "secureHash";
pub const PARAM_SECURE_HASH_TYPE: &str = "secureHashType";

/// Inbound callback fields (return redirect and IPN share the set).
pub const PARAM_RESPONSE_CODE: &str = "responseCode";
pub const PARAM_TXN_REF: &str = "txnRef";
pub const PARAM_AMOUNT: &str = "amount";
pub const PARAM_TRANSACTION_NO: &str = "transactionNo";

/// Gateway response code for a successful payment.
pub const RSP_SUCCESS: &str = "00";

/// What the service wants the shopper to pay for.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Our order reference; echoed back as `txnRef`.
    pub order_ref: String,
    /// Minor currency units.
    pub amount: i64,
    pub order_info: String,
    pub client_ip: String,
    pub created_at: DateTime<Utc>,
}

/// Acknowledgment body the IPN endpoint must answer with; the shape and
/// codes are dictated by the gateway.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IpnAck {
    #[serde(rename = "RspCode")]
    pub rsp_code: &'static str,
    #[serde(rename = "Message")]
    pub message: &'static str,
}

impl IpnAck {
    pub fn ok() -> Self {
        Self { rsp_code: "00", message: "Confirm Success" }
    }
    pub fn invalid_signature() -> Self {
        Self { rsp_code: "97", message: "Invalid Signature" }
    }
    pub fn unknown_error() -> Self {
        Self { rsp_code: "99", message: "Unknown Error" }
    }
}

/// Form-encode a single component: percent-encoding with `+` for spaces,
/// matching what the gateway hashes on its side.
fn form_encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// Sorted, encoded `k=v&…` string over the non-empty parameters. This is
/// both the hashed payload and the literal query string sent out.
pub fn canonical_query<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> =
        params.into_iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac_hex(secret: &str, data: &str) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build the signed redirect URL for the hosted payment page.
pub fn build_payment_url(cfg: &GatewayConfig, req: &PaymentRequest) -> String {
    let amount = req.amount.to_string();
    let create_date = req.created_at.format("%Y%m%d%H%M%S").to_string();
    let params: Vec<(&str, &str)> = vec![
        ("merchantCode", cfg.merchant_code.as_str()),
        ("amount", amount.as_str()),
        ("currency", cfg.currency.as_str()),
        ("orderRef", req.order_ref.as_str()),
        ("orderInfo", req.order_info.as_str()),
        ("ipAddress", req.client_ip.as_str()),
        ("locale", cfg.locale.as_str()),
        ("createDate", create_date.as_str()),
        ("returnUrl", cfg.return_url.as_str()),
    ];
    let query = canonical_query(params);
    let hash = hmac_hex(&cfg.secret_key, &query);
    format!("{}?{}&{}={}", cfg.pay_url, query, PARAM_SECURE_HASH, hash)
}

/// Verify an inbound parameter set from the return redirect or the IPN.
///
/// Strips the signature fields, recomputes the digest over the rest and
/// compares in constant time. `false` means the whole payload is
/// untrusted and order state must not change because of it.
pub fn verify_signature(cfg: &GatewayConfig, params: &HashMap<String, String>) -> bool {
    let Some(supplied) = params.get(PARAM_SECURE_HASH) else {
        return false;
    };
    let Ok(supplied) = hex::decode(supplied) else {
        return false;
    };
    let query = canonical_query(
        params
            .iter()
            .filter(|(k, _)| k.as_str() != PARAM_SECURE_HASH && k.as_str() != PARAM_SECURE_HASH_TYPE)
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );
    let mut mac = HmacSha512::new_from_slice(cfg.secret_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    mac.verify_slice(&supplied).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            merchant_code: "MERCH01".into(),
            secret_key: "topsecretkey".into(),
            pay_url: "https://gateway.example/pay".into(),
            return_url: "https://shop.example/payment/return".into(),
            currency: "VND".into(),
            locale: "vn".into(),
        }
    }

    fn signed_params(cfg: &GatewayConfig) -> HashMap<String, String> {
        let mut params = HashMap::from([
            (PARAM_TXN_REF.to_string(), "ORD-00000042".to_string()),
            (PARAM_AMOUNT.to_string(), "1250000".to_string()),
            (PARAM_RESPONSE_CODE.to_string(), "00".to_string()),
            (PARAM_TRANSACTION_NO.to_string(), "13863891".to_string()),
            ("payDate".to_string(), "20240105143000".to_string()),
        ]);
        let query =
            canonical_query(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let hash = hmac_hex(&cfg.secret_key, &query);
        params.insert(PARAM_SECURE_HASH.to_string(), hash);
        params
    }

    #[test]
    fn canonical_query_sorts_keys() {
        let q = canonical_query([("b", "2"), ("a", "1"), ("c", "3")]);
        assert_eq!(q, "a=1&b=2&c=3");
    }

    #[test]
    fn canonical_query_drops_empty_values_and_form_encodes() {
        let q = canonical_query([("orderInfo", "Order for shoes #42"), ("empty", "")]);
        assert_eq!(q, "orderInfo=Order+for+shoes+%2342");
    }

    #[test]
    fn verify_accepts_own_signature() {
        let cfg = test_config();
        let params = signed_params(&cfg);
        assert!(verify_signature(&cfg, &params));
    }

    #[test]
    fn verify_rejects_any_tampered_value() {
        let cfg = test_config();
        for key in [PARAM_TXN_REF, PARAM_AMOUNT, PARAM_RESPONSE_CODE, PARAM_TRANSACTION_NO] {
            let mut params = signed_params(&cfg);
            let v = params.get_mut(key).unwrap();
            // Flip one character of one value.
            let flipped = if v.ends_with('0') { "1" } else { "0" };
            v.truncate(v.len() - 1);
            v.push_str(flipped);
            assert!(!verify_signature(&cfg, &params), "tampered {key} must not verify");
        }
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let cfg = test_config();
        let mut params = signed_params(&cfg);
        let sig = params.get_mut(PARAM_SECURE_HASH).unwrap();
        let flipped = if sig.ends_with('a') { "b" } else { "a" };
        sig.truncate(sig.len() - 1);
        sig.push_str(flipped);
        assert!(!verify_signature(&cfg, &params));
    }

    #[test]
    fn verify_rejects_missing_or_garbage_signature() {
        let cfg = test_config();
        let mut params = signed_params(&cfg);
        params.remove(PARAM_SECURE_HASH);
        assert!(!verify_signature(&cfg, &params));
        params.insert(PARAM_SECURE_HASH.to_string(), "not-hex".to_string());
        assert!(!verify_signature(&cfg, &params));
    }

    #[test]
    fn verify_ignores_hash_type_field() {
        let cfg = test_config();
        let mut params = signed_params(&cfg);
        params.insert(PARAM_SECURE_HASH_TYPE.to_string(), "HmacSHA512".to_string());
        assert!(verify_signature(&cfg, &params));
    }

    #[test]
    fn payment_url_round_trips_through_verification() {
        let cfg = test_config();
        let req = PaymentRequest {
            order_ref: "ORD-00000042".into(),
            amount: 1_250_000,
            order_info: "Order ORD-00000042".into(),
            client_ip: "203.0.113.9".into(),
            created_at: DateTime::from_timestamp(1_704_465_000, 0).unwrap(),
        };
        let url = build_payment_url(&cfg, &req);
        let query = url.split_once('?').unwrap().1;
        let params: HashMap<String, String> = query
            .split('&')
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap();
                (
                    urlencoding::decode(k).unwrap().into_owned(),
                    urlencoding::decode(&v.replace('+', "%20")).unwrap().into_owned(),
                )
            })
            .collect();
        assert_eq!(params["merchantCode"], "MERCH01");
        assert_eq!(params["amount"], "1250000");
        assert_eq!(params["createDate"], "20240105143000");
        assert!(verify_signature(&cfg, &params));
    }
}
