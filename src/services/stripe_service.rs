use std::time::Duration;

use serde_json::Value;

use crate::config::BillingConfig;
use crate::error::{AppError, AppResult};

/// Lightweight Stripe client wrapping raw HTTP calls.
/// This avoids compile-time complexity of async-stripe while providing
/// all the Stripe operations needed by the application.
#[derive(Clone)]
pub struct StripeClient {
    secret_key: String,
    webhook_secret: String,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: &BillingConfig) -> Option<Self> {
        if config.stripe_secret_key.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to build Stripe HTTP client");
        Some(Self {
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            client,
        })
    }

    async fn post(&self, path: &str, params: &[(&str, &str)]) -> AppResult<Value> {
        let url = format!("https://api.stripe.com/v1{}", path);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::PaymentFailed(format!("Stripe request failed: {}", e)))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::PaymentFailed(format!("Stripe response parse failed: {}", e)))?;

        if !status.is_success() {
            let msg = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown Stripe error");
            return Err(AppError::PaymentFailed(msg.to_string()));
        }
        Ok(body)
    }

    pub async fn create_customer(&self, email: &str, name: &str, user_id: &str) -> AppResult<Value> {
        self.post(
            "/customers",
            &[
                ("email", email),
                ("name", name),
                ("metadata[userId]", user_id),
            ],
        )
        .await
    }

    pub async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> AppResult<Value> {
        self.post(
            &format!("/payment_methods/{}/attach", payment_method_id),
            &[("customer", customer_id)],
        )
        .await
    }

    pub async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> AppResult<Value> {
        self.post(
            &format!("/customers/{}", customer_id),
            &[(
                "invoice_settings[default_payment_method]",
                payment_method_id,
            )],
        )
        .await
    }

    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: &str,
    ) -> AppResult<Value> {
        self.post(
            "/subscriptions",
            &[
                ("customer", customer_id),
                ("items[0][price]", price_id),
                ("metadata[userId]", user_id),
            ],
        )
        .await
    }

    pub async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<Value> {
        self.post(
            &format!("/subscriptions/{}", subscription_id),
            &[("cancel_at_period_end", "true")],
        )
        .await
    }

    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> AppResult<Value> {
        verify_signature(payload, signature_header, &self.webhook_secret)
    }
}

/// Verify a Stripe signature header (`t=timestamp,v1=signature`) against the
/// signing secret and return the parsed event payload.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &str) -> AppResult<Value> {
    let mut timestamp = "";
    let mut sig = "";
    for part in signature_header.split(',') {
        let mut kv = part.splitn(2, '=');
        match kv.next() {
            Some("t") => timestamp = kv.next().unwrap_or(""),
            Some("v1") => sig = kv.next().unwrap_or(""),
            _ => {}
        }
    }

    if timestamp.is_empty() || sig.is_empty() {
        return Err(AppError::InvalidSignature);
    }

    // Verify HMAC-SHA256
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC key error".into()))?;
    mac.update(signed_payload.as_bytes());

    let expected = hex::encode(mac.finalize().into_bytes());
    if expected != sig {
        return Err(AppError::InvalidSignature);
    }

    // Check timestamp is within 5 minutes
    let ts: i64 = timestamp.parse().unwrap_or(0);
    let now = chrono::Utc::now().timestamp();
    if (now - ts).abs() > 300 {
        return Err(AppError::InvalidSignature);
    }

    serde_json::from_slice(payload).map_err(|_| AppError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap());
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn payload() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_test_123",
            "type": "invoice.paid",
            "data": { "object": { "subscription": "sub_test_123" } }
        }))
        .unwrap()
    }

    #[test]
    fn accepts_valid_signature() {
        let body = payload();
        let header = sign(&body, SECRET, chrono::Utc::now().timestamp());
        let event = verify_signature(&body, &header, SECRET).unwrap();
        assert_eq!(event["type"], "invoice.paid");
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = payload();
        let header = sign(&body, "whsec_other", chrono::Utc::now().timestamp());
        assert!(matches!(
            verify_signature(&body, &header, SECRET),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        let body = payload();
        let header = sign(&body, SECRET, chrono::Utc::now().timestamp());
        let mut tampered = body.clone();
        tampered[0] = b' ';
        assert!(matches!(
            verify_signature(&tampered, &header, SECRET),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = payload();
        let header = sign(&body, SECRET, chrono::Utc::now().timestamp() - 400);
        assert!(matches!(
            verify_signature(&body, &header, SECRET),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_malformed_header() {
        let body = payload();
        for header in ["", "t=123", "v1=deadbeef", "nonsense"] {
            assert!(matches!(
                verify_signature(&body, header, SECRET),
                Err(AppError::InvalidSignature)
            ));
        }
    }
}
