use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";
pub const CURRENCY: &str = "INR";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway credentials are not configured")]
    MissingCredentials,
    #[error("Payment gateway rejected the configured credentials")]
    InvalidCredentials,
    #[error("Payment gateway is unreachable")]
    Unreachable,
    #[error("Payment gateway request failed with status {0}")]
    RequestFailed(u16),
    #[error("Payment verification failed")]
    SignatureMismatch,
}

/// Payment-intent record created with the gateway before the user pays.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(http: reqwest::Client, config: &crate::core::config::RazorpayConfig) -> Self {
        Self {
            http,
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Publishable key id, echoed to the client so it can open the hosted
    /// checkout widget.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }

    /// Create a payment order with the gateway. `amount` is in minor
    /// currency units (paise).
    pub async fn create_order(&self, amount: i64, receipt: &str) -> Result<GatewayOrder, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::MissingCredentials);
        }

        let res = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderBody {
                amount,
                currency: CURRENCY,
                receipt,
            })
            .send()
            .await
            .map_err(|_| GatewayError::Unreachable)?;

        let status = res.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(GatewayError::RequestFailed(status.as_u16()));
        }

        res.json()
            .await
            .map_err(|_| GatewayError::RequestFailed(status.as_u16()))
    }

    /// Recompute the callback signature from `(order_id, payment_id)` with
    /// the shared secret and compare it to the gateway-supplied one. The
    /// comparison is constant-time.
    pub fn verify_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<(), GatewayError> {
        if self.key_secret.is_empty() {
            return Err(GatewayError::MissingCredentials);
        }
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .map_err(|_| GatewayError::MissingCredentials)?;
        mac.update(format!("{gateway_order_id}|{gateway_payment_id}").as_bytes());
        let provided = hex::decode(signature).map_err(|_| GatewayError::SignatureMismatch)?;
        mac.verify_slice(&provided)
            .map_err(|_| GatewayError::SignatureMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RazorpayConfig;

    fn test_client(secret: &str) -> RazorpayClient {
        RazorpayClient::new(
            reqwest::Client::new(),
            &RazorpayConfig {
                key_id: "rzp_test_key".into(),
                key_secret: secret.into(),
                base_url: DEFAULT_BASE_URL.into(),
            },
        )
    }

    fn sign(order_id: &str, payment_id: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let client = test_client("test_secret_456");
        let signature = sign("order_N9yO4qwJ2x", "pay_M8xP3rvI1w", "test_secret_456");
        assert!(
            client
                .verify_signature("order_N9yO4qwJ2x", "pay_M8xP3rvI1w", &signature)
                .is_ok()
        );
    }

    #[test]
    fn signature_from_wrong_secret_is_rejected() {
        let client = test_client("test_secret_456");
        let signature = sign("order_N9yO4qwJ2x", "pay_M8xP3rvI1w", "wrong_secret");
        assert!(matches!(
            client.verify_signature("order_N9yO4qwJ2x", "pay_M8xP3rvI1w", &signature),
            Err(GatewayError::SignatureMismatch)
        ));
    }

    #[test]
    fn tampered_payment_id_is_rejected() {
        let client = test_client("test_secret_456");
        let signature = sign("order_N9yO4qwJ2x", "pay_M8xP3rvI1w", "test_secret_456");
        assert!(matches!(
            client.verify_signature("order_N9yO4qwJ2x", "pay_FORGED", &signature),
            Err(GatewayError::SignatureMismatch)
        ));
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        let client = test_client("test_secret_456");
        assert!(matches!(
            client.verify_signature("order_N9yO4qwJ2x", "pay_M8xP3rvI1w", "not-hex!!"),
            Err(GatewayError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn create_order_without_credentials_fails_fast() {
        let client = test_client("");
        assert!(matches!(
            client.create_order(100_000, "rcpt_1").await,
            Err(GatewayError::MissingCredentials)
        ));
    }
}
