//! Payment-gateway integration: redirect URL construction and callback
//! signature verification.

pub mod gateway;
