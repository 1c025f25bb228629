use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::services::subscription;
use crate::AppState;

/// Stripe delivers events here regardless of any in-flight user request.
/// Anything other than 2xx makes Stripe retry, so signature failures reject
/// and store failures answer 500; every verified event, including no-ops,
/// acknowledges with 200.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let stripe = match &state.stripe {
        Some(s) => s,
        None => {
            tracing::warn!("Stripe webhook received but Stripe is not configured");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let sig = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let event = match stripe.verify_webhook_signature(&body, sig) {
        Ok(e) => e,
        Err(_) => return Err(StatusCode::BAD_REQUEST),
    };

    let event_type = event["type"].as_str().unwrap_or("");
    tracing::info!("Stripe webhook event: {event_type}");

    let action = subscription::classify_event(&event);
    match subscription::apply_event(&state.db, &state.config.billing, action).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::error!("Webhook processing failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
