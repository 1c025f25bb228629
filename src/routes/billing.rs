use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::subscription::*;
use crate::models::user::User;
use crate::services::entitlement::{self, AllowReason};
use crate::services::subscription;
use crate::AppState;

async fn load_user(state: &AppState, auth: &AuthUser) -> AppResult<User> {
    sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn subscribe(
    State(state): State<AppState>,
    auth: Extension<AuthUser>,
    Json(body): Json<SubscribeRequest>,
) -> AppResult<Json<Value>> {
    if body.payment_method_id.is_empty() {
        return Err(AppError::BadRequest("paymentMethodId required".into()));
    }

    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| AppError::Internal("Stripe not configured".into()))?;

    let user = load_user(&state, &auth).await?;
    let sub = subscription::create_direct_subscription(
        &state.db,
        stripe,
        &state.config.billing,
        &user,
        &body.payment_method_id,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Subscription created successfully!",
        "subscriptionId": sub.stripe_subscription_id,
        "endDate": sub.end_date,
    })))
}

pub async fn redeem_promo(
    State(state): State<AppState>,
    auth: Extension<AuthUser>,
    Json(body): Json<RedeemPromoRequest>,
) -> AppResult<Json<Value>> {
    if body.promo_code.is_empty() {
        return Err(AppError::BadRequest("promoCode required".into()));
    }

    let user = load_user(&state, &auth).await?;
    let sub = subscription::redeem_promo_code(
        &state.db,
        &state.config.billing,
        &user,
        &body.promo_code,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Subscription created successfully using promo code!",
        "subscriptionId": sub.id,
        "endDate": sub.end_date,
    })))
}

pub async fn subscription_status(
    State(state): State<AppState>,
    auth: Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let user = load_user(&state, &auth).await?;
    let now = Utc::now();
    let trial_end = entitlement::trial_end_date(user.created_at, state.config.billing.trial_days);
    let live = entitlement::find_live_subscription(&state.db, user.id, now).await?;

    Ok(Json(json!({
        "premium": user.premium,
        "trialEndDate": trial_end.to_rfc3339(),
        "trialActive": now < trial_end,
        "subscription": live,
    })))
}

/// Sits behind `premium_guard`; reaching the handler means the gate allowed
/// the request, so this only reports how.
pub async fn entitlement(
    user: Extension<User>,
    reason: Extension<AllowReason>,
) -> AppResult<Json<Value>> {
    let subscription_id = match *reason {
        AllowReason::Subscription(id) => Some(id),
        _ => None,
    };
    Ok(Json(json!({
        "entitled": true,
        "source": reason.as_str(),
        "subscriptionId": subscription_id,
        "user": crate::models::user::UserPublic::from(&*user),
    })))
}

pub async fn cancel(
    State(state): State<AppState>,
    auth: Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| AppError::Internal("Stripe not configured".into()))?;

    let sub: Option<Subscription> = sqlx::query_as(
        "SELECT * FROM subscriptions WHERE user_id = $1 AND status = $2 ORDER BY end_date DESC LIMIT 1",
    )
    .bind(auth.id)
    .bind(SubscriptionStatus::Active.as_str())
    .fetch_optional(&state.db)
    .await?;

    let sub = sub.ok_or_else(|| AppError::NotFound("No active subscription found".into()))?;
    let gateway_ref = sub
        .stripe_subscription_id
        .as_deref()
        .ok_or_else(|| AppError::NotFound("No active subscription found".into()))?;

    stripe.cancel_subscription(gateway_ref).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(sub.id)
        .bind(SubscriptionStatus::Deactive.as_str())
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET premium = false WHERE id = $1")
        .bind(auth.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(json!({
        "success": true,
        "message": "Subscription will be canceled at the end of the billing period",
    })))
}
