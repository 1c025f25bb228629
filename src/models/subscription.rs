use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted subscription states. "Expired" is never stored: an ACTIVE row
/// with a past end date stays ACTIVE until a sweep transitions it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Deactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Deactive => "DEACTIVE",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ACTIVE" => SubscriptionStatus::Active,
            _ => SubscriptionStatus::Deactive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoCodeStatus {
    Active,
    Used,
}

impl PromoCodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromoCodeStatus::Active => "ACTIVE",
            PromoCodeStatus::Used => "USED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub start_date: DateTime<Utc>,
    /// Authoritative expiry instant.
    pub end_date: DateTime<Utc>,
    /// Amount charged, in cents. 0 for promo-code grants.
    pub price_cents: i32,
    /// Present only for gateway-managed subscriptions.
    pub stripe_subscription_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::parse(&self.status)
    }

    /// A subscription currently granting access: ACTIVE with a future end date.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status() == SubscriptionStatus::Active && self.end_date > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    #[serde(rename = "paymentMethodId")]
    pub payment_method_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RedeemPromoRequest {
    #[serde(rename = "promoCode")]
    pub promo_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ListPromoQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sub(status: &str, end_offset_hours: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: status.to_string(),
            start_date: now - Duration::days(10),
            end_date: now + Duration::hours(end_offset_hours),
            price_cents: 2200,
            stripe_subscription_id: None,
            updated_at: now,
        }
    }

    #[test]
    fn live_requires_active_and_future_end() {
        let now = Utc::now();
        assert!(sub("ACTIVE", 1).is_live(now));
        assert!(!sub("ACTIVE", -1).is_live(now));
        assert!(!sub("DEACTIVE", 1).is_live(now));
        assert!(!sub("DEACTIVE", -1).is_live(now));
    }

    #[test]
    fn unknown_status_is_treated_as_deactive() {
        assert_eq!(SubscriptionStatus::parse("expired"), SubscriptionStatus::Deactive);
        assert_eq!(SubscriptionStatus::parse("ACTIVE"), SubscriptionStatus::Active);
    }
}
