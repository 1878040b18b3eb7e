//! Process configuration, read once at startup.

use anyhow::{Context, Result};

/// Top-level service configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// Root of the statically-served directory; uploads land under it.
    pub public_dir: String,
    pub jwt_secret: String,
    pub nats_url: Option<String>,
    pub gateway: GatewayConfig,
}

/// Payment-gateway credentials and endpoints.
///
/// Threaded explicitly into the signing/verification component so it can be
/// exercised in tests without touching process environment.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub merchant_code: String,
    pub secret_key: String,
    /// Hosted payment page the customer is redirected to.
    pub pay_url: String,
    /// Where the gateway sends the customer back after payment.
    pub return_url: String,
    pub currency: String,
    pub locale: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .context("PORT must be a number")?;
        let public_dir = std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string());
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET is required")?;
        let nats_url = std::env::var("NATS_URL").ok();

        let gateway = GatewayConfig {
            merchant_code: std::env::var("GATEWAY_MERCHANT_CODE")
                .context("GATEWAY_MERCHANT_CODE is required")?,
            secret_key: std::env::var("GATEWAY_SECRET_KEY")
                .context("GATEWAY_SECRET_KEY is required")?,
            pay_url: std::env::var("GATEWAY_PAY_URL").context("GATEWAY_PAY_URL is required")?,
            return_url: std::env::var("GATEWAY_RETURN_URL")
                .context("GATEWAY_RETURN_URL is required")?,
            currency: std::env::var("GATEWAY_CURRENCY").unwrap_or_else(|_| "VND".to_string()),
            locale: std::env::var("GATEWAY_LOCALE").unwrap_or_else(|_| "vn".to_string()),
        };

        Ok(Self { database_url, port, public_dir, jwt_secret, nats_url, gateway })
    }
}
