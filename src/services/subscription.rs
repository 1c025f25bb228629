use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{AppError, AppResult};
use crate::models::subscription::{PromoCode, PromoCodeStatus, Subscription, SubscriptionStatus};
use crate::models::user::User;
use crate::services::entitlement::find_live_subscription;
use crate::services::stripe_service::StripeClient;

/// Create a gateway-managed subscription paid with `payment_method_id`.
///
/// The local row is written only after Stripe confirms the subscription, so
/// a gateway failure or timeout leaves no partial local state.
pub async fn create_direct_subscription(
    db: &PgPool,
    stripe: &StripeClient,
    billing: &BillingConfig,
    user: &User,
    payment_method_id: &str,
) -> AppResult<Subscription> {
    let now = Utc::now();
    if find_live_subscription(db, user.id, now).await?.is_some() {
        return Err(AppError::AlreadySubscribed);
    }

    // Create the Stripe customer lazily on first payment attempt.
    let customer_id = match &user.stripe_customer_id {
        Some(cid) if !cid.is_empty() => cid.clone(),
        _ => {
            let customer = stripe
                .create_customer(&user.email, &user.name, &user.id.to_string())
                .await?;
            let cid = customer["id"].as_str().unwrap_or("").to_string();

            sqlx::query("UPDATE users SET stripe_customer_id = $1 WHERE id = $2")
                .bind(&cid)
                .bind(user.id)
                .execute(db)
                .await?;
            cid
        }
    };

    stripe
        .attach_payment_method(payment_method_id, &customer_id)
        .await?;
    stripe
        .set_default_payment_method(&customer_id, payment_method_id)
        .await?;

    let gateway_sub = stripe
        .create_subscription(&customer_id, &billing.monthly_price_id, &user.id.to_string())
        .await?;
    let gateway_sub_id = gateway_sub["id"].as_str().unwrap_or("").to_string();

    let mut tx = db.begin().await?;
    let sub: Subscription = sqlx::query_as(
        r#"INSERT INTO subscriptions (id, user_id, status, start_date, end_date, price_cents, stripe_subscription_id, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(SubscriptionStatus::Active.as_str())
    .bind(now)
    .bind(now + Duration::days(billing.subscription_days))
    .bind(billing.plan_price_cents)
    .bind(&gateway_sub_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET current_subscription_id = $2, premium = true WHERE id = $1")
        .bind(user.id)
        .bind(sub.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Created subscription {} for user {}", gateway_sub_id, user.id);
    Ok(sub)
}

/// Redeem a one-shot promo code for a free 30-day grant. The code flip,
/// subscription insert and user update commit as one transaction.
/// Never touches Stripe.
pub async fn redeem_promo_code(
    db: &PgPool,
    billing: &BillingConfig,
    user: &User,
    code: &str,
) -> AppResult<Subscription> {
    let now = Utc::now();
    if find_live_subscription(db, user.id, now).await?.is_some() {
        return Err(AppError::AlreadySubscribed);
    }

    let mut tx = db.begin().await?;
    let flipped = sqlx::query("UPDATE promo_codes SET status = $2 WHERE code = $1 AND status = $3")
        .bind(code)
        .bind(PromoCodeStatus::Used.as_str())
        .bind(PromoCodeStatus::Active.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if flipped == 0 {
        return Err(AppError::InvalidPromoCode);
    }

    let sub: Subscription = sqlx::query_as(
        r#"INSERT INTO subscriptions (id, user_id, status, start_date, end_date, price_cents, stripe_subscription_id, updated_at)
        VALUES ($1, $2, $3, $4, $5, 0, NULL, NOW())
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(SubscriptionStatus::Active.as_str())
    .bind(now)
    .bind(now + Duration::days(billing.subscription_days))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET current_subscription_id = $2, premium = true WHERE id = $1")
        .bind(user.id)
        .bind(sub.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(sub)
}

/// Typed form of the webhook events the ledger consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    InvoicePaid {
        subscription_ref: String,
    },
    PaymentFailed {
        subscription_ref: String,
    },
    SubscriptionDeleted {
        subscription_ref: String,
        ended_at: Option<DateTime<Utc>>,
    },
    Ignored,
}

pub fn classify_event(event: &Value) -> WebhookAction {
    let object = &event["data"]["object"];
    match event["type"].as_str().unwrap_or("") {
        "invoice.paid" => match object["subscription"].as_str() {
            Some(sub_ref) if !sub_ref.is_empty() => WebhookAction::InvoicePaid {
                subscription_ref: sub_ref.to_string(),
            },
            _ => WebhookAction::Ignored,
        },
        "invoice.payment_failed" => match object["subscription"].as_str() {
            Some(sub_ref) if !sub_ref.is_empty() => WebhookAction::PaymentFailed {
                subscription_ref: sub_ref.to_string(),
            },
            _ => WebhookAction::Ignored,
        },
        "customer.subscription.deleted" => match object["id"].as_str() {
            Some(sub_ref) if !sub_ref.is_empty() => WebhookAction::SubscriptionDeleted {
                subscription_ref: sub_ref.to_string(),
                ended_at: object["current_period_end"]
                    .as_i64()
                    .and_then(|t| DateTime::from_timestamp(t, 0)),
            },
            _ => WebhookAction::Ignored,
        },
        _ => WebhookAction::Ignored,
    }
}

/// Apply a classified webhook event. Lookups key on the gateway subscription
/// reference, so re-delivery is safe: no duplicate rows, and a repeated
/// `invoice.paid` re-extends the end date to the same or a later value.
/// Events referencing unknown subscriptions are acknowledged as no-ops.
pub async fn apply_event(
    db: &PgPool,
    billing: &BillingConfig,
    action: WebhookAction,
) -> AppResult<()> {
    match action {
        WebhookAction::InvoicePaid { subscription_ref } => {
            let new_end = Utc::now() + Duration::days(billing.subscription_days);
            let user_id: Option<Uuid> = sqlx::query_scalar(
                "UPDATE subscriptions SET status = $2, end_date = $3, updated_at = NOW() WHERE stripe_subscription_id = $1 RETURNING user_id",
            )
            .bind(&subscription_ref)
            .bind(SubscriptionStatus::Active.as_str())
            .bind(new_end)
            .fetch_optional(db)
            .await?;

            if let Some(uid) = user_id {
                sqlx::query("UPDATE users SET premium = true WHERE id = $1")
                    .bind(uid)
                    .execute(db)
                    .await?;
            } else {
                tracing::warn!("invoice.paid for unknown subscription {}", subscription_ref);
            }
        }
        WebhookAction::PaymentFailed { subscription_ref } => {
            let user_id: Option<Uuid> = sqlx::query_scalar(
                "UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE stripe_subscription_id = $1 RETURNING user_id",
            )
            .bind(&subscription_ref)
            .bind(SubscriptionStatus::Deactive.as_str())
            .fetch_optional(db)
            .await?;

            if let Some(uid) = user_id {
                sqlx::query("UPDATE users SET premium = false WHERE id = $1")
                    .bind(uid)
                    .execute(db)
                    .await?;
            }
        }
        WebhookAction::SubscriptionDeleted {
            subscription_ref,
            ended_at,
        } => {
            let now = Utc::now();
            let end_date = ended_at.unwrap_or(now);
            let user_id: Option<Uuid> = sqlx::query_scalar(
                "UPDATE subscriptions SET status = $2, end_date = $3, updated_at = NOW() WHERE stripe_subscription_id = $1 RETURNING user_id",
            )
            .bind(&subscription_ref)
            .bind(SubscriptionStatus::Deactive.as_str())
            .bind(end_date)
            .fetch_optional(db)
            .await?;

            // The grant may run to its gateway-reported end; only a past
            // end date revokes access immediately.
            if let (Some(uid), true) = (user_id, end_date <= now) {
                sqlx::query("UPDATE users SET premium = false WHERE id = $1")
                    .bind(uid)
                    .execute(db)
                    .await?;
            }
        }
        WebhookAction::Ignored => {}
    }
    Ok(())
}

/// Random 4-6 digit numeric redemption code.
pub fn generate_promo_code() -> String {
    rand::thread_rng().gen_range(1_000..=999_999).to_string()
}

/// Mint a fresh ACTIVE promo code. Uniqueness rides on the store's unique
/// constraint; a collision surfaces as `CodeCollision` for the caller to
/// retry.
pub async fn issue_promo_code(db: &PgPool) -> AppResult<PromoCode> {
    let code = generate_promo_code();
    let promo: PromoCode = sqlx::query_as(
        "INSERT INTO promo_codes (id, code, status, created_at) VALUES ($1, $2, $3, NOW()) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&code)
    .bind(PromoCodeStatus::Active.as_str())
    .fetch_one(db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::CodeCollision
        } else {
            AppError::from(e)
        }
    })?;

    Ok(promo)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_invoice_paid() {
        let event = json!({
            "type": "invoice.paid",
            "data": { "object": { "subscription": "sub_123" } }
        });
        assert_eq!(
            classify_event(&event),
            WebhookAction::InvoicePaid {
                subscription_ref: "sub_123".into()
            }
        );
    }

    #[test]
    fn classifies_payment_failed() {
        let event = json!({
            "type": "invoice.payment_failed",
            "data": { "object": { "subscription": "sub_123" } }
        });
        assert_eq!(
            classify_event(&event),
            WebhookAction::PaymentFailed {
                subscription_ref: "sub_123".into()
            }
        );
    }

    #[test]
    fn classifies_subscription_deleted_with_period_end() {
        let period_end = Utc::now().timestamp();
        let event = json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_123", "current_period_end": period_end } }
        });
        assert_eq!(
            classify_event(&event),
            WebhookAction::SubscriptionDeleted {
                subscription_ref: "sub_123".into(),
                ended_at: DateTime::from_timestamp(period_end, 0),
            }
        );
    }

    #[test]
    fn deleted_without_period_end_still_applies() {
        let event = json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_123" } }
        });
        assert_eq!(
            classify_event(&event),
            WebhookAction::SubscriptionDeleted {
                subscription_ref: "sub_123".into(),
                ended_at: None,
            }
        );
    }

    #[test]
    fn unknown_and_malformed_events_are_ignored() {
        for event in [
            json!({ "type": "customer.created", "data": { "object": {} } }),
            json!({ "type": "invoice.paid", "data": { "object": {} } }),
            json!({ "type": "invoice.paid", "data": { "object": { "subscription": "" } } }),
            json!({ "type": "invoice.payment_failed", "data": { "object": { "subscription": null } } }),
            json!({ "data": { "object": { "subscription": "sub_123" } } }),
        ] {
            assert_eq!(classify_event(&event), WebhookAction::Ignored);
        }
    }

    #[test]
    fn classification_is_deterministic_for_redelivery() {
        let event = json!({
            "id": "evt_1",
            "type": "invoice.paid",
            "data": { "object": { "subscription": "sub_123" } }
        });
        assert_eq!(classify_event(&event), classify_event(&event));
    }

    #[test]
    fn promo_codes_are_short_numeric() {
        for _ in 0..200 {
            let code = generate_promo_code();
            assert!(code.len() >= 4 && code.len() <= 6, "bad length: {code}");
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
