use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::subscription::{Subscription, SubscriptionStatus};
use crate::models::user::{User, UserRole};

pub fn trial_end_date(created_at: DateTime<Utc>, trial_days: i64) -> DateTime<Utc> {
    created_at + Duration::days(trial_days)
}

/// Outcome of the entitlement ladder, evaluated in fixed priority order:
/// admin, then trial window, then live subscription, then expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AdminBypass,
    InTrial,
    Subscribed { subscription_id: Uuid },
    Expired { trial_end: DateTime<Utc> },
}

/// Pure decision ladder. `live` is the most-future live subscription, if the
/// caller has fetched one; passing `None` means "not looked up yet", which
/// can only yield `Expired` when admin and trial both fail to match.
pub fn evaluate(
    role: UserRole,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    trial_days: i64,
    live: Option<&Subscription>,
) -> Decision {
    if role == UserRole::Admin {
        return Decision::AdminBypass;
    }

    let trial_end = trial_end_date(created_at, trial_days);
    if now < trial_end {
        return Decision::InTrial;
    }

    match live {
        Some(sub) if sub.is_live(now) => Decision::Subscribed {
            subscription_id: sub.id,
        },
        _ => Decision::Expired { trial_end },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    Admin,
    Trial,
    Subscription(Uuid),
}

impl AllowReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllowReason::Admin => "admin",
            AllowReason::Trial => "trial",
            AllowReason::Subscription(_) => "subscription",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Gate {
    Allow {
        reason: AllowReason,
    },
    Deny {
        trial_end_date: DateTime<Utc>,
        swept_expired: bool,
    },
}

pub async fn find_live_subscription(
    db: &PgPool,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Option<Subscription>> {
    let sub: Option<Subscription> = sqlx::query_as(
        "SELECT * FROM subscriptions WHERE user_id = $1 AND status = $2 AND end_date > $3 ORDER BY end_date DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(SubscriptionStatus::Active.as_str())
    .bind(now)
    .fetch_optional(db)
    .await?;
    Ok(sub)
}

/// Evaluate whether `user` currently holds premium entitlement, persisting
/// the cached `premium` flag when the answer changed since it was last
/// written. On denial, expired ACTIVE subscriptions are deactivated first.
///
/// Never calls the payment gateway. Store errors on the deny path are hard
/// failures; the allow-path flag sync is a convenience write and is only
/// logged on failure.
pub async fn check_entitlement(db: &PgPool, user: &User, trial_days: i64) -> AppResult<Gate> {
    let now = Utc::now();

    // Admin and trial outcomes don't need the subscription row; fetch it
    // only once the trial has elapsed.
    let decision = match evaluate(user.role(), user.created_at, now, trial_days, None) {
        Decision::Expired { .. } => {
            let live = find_live_subscription(db, user.id, now).await?;
            evaluate(user.role(), user.created_at, now, trial_days, live.as_ref())
        }
        decided => decided,
    };

    match decision {
        Decision::AdminBypass => Ok(Gate::Allow {
            reason: AllowReason::Admin,
        }),
        Decision::InTrial => {
            if !user.premium {
                if let Err(e) = mark_premium(db, user.id, None).await {
                    tracing::warn!("Failed to sync premium flag for user {}: {e}", user.id);
                }
            }
            Ok(Gate::Allow {
                reason: AllowReason::Trial,
            })
        }
        Decision::Subscribed { subscription_id } => {
            if !user.premium || user.current_subscription_id != Some(subscription_id) {
                if let Err(e) = mark_premium(db, user.id, Some(subscription_id)).await {
                    tracing::warn!("Failed to sync premium flag for user {}: {e}", user.id);
                }
            }
            Ok(Gate::Allow {
                reason: AllowReason::Subscription(subscription_id),
            })
        }
        Decision::Expired { trial_end } => {
            let swept = deactivate_expired(db, user.id, now).await? > 0;
            sqlx::query(
                "UPDATE users SET premium = false, current_subscription_id = NULL WHERE id = $1",
            )
            .bind(user.id)
            .execute(db)
            .await?;

            Ok(Gate::Deny {
                trial_end_date: trial_end,
                swept_expired: swept,
            })
        }
    }
}

async fn mark_premium(db: &PgPool, user_id: Uuid, subscription_id: Option<Uuid>) -> AppResult<()> {
    sqlx::query(
        "UPDATE users SET premium = true, current_subscription_id = COALESCE($2, current_subscription_id) WHERE id = $1",
    )
    .bind(user_id)
    .bind(subscription_id)
    .execute(db)
    .await?;
    Ok(())
}

/// Transition every ACTIVE-but-expired subscription of this user to
/// DEACTIVE. Idempotent; safe to run on every denied request.
pub async fn deactivate_expired(db: &PgPool, user_id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE subscriptions SET status = $3, updated_at = NOW() WHERE user_id = $1 AND status = $2 AND end_date <= $4",
    )
    .bind(user_id)
    .bind(SubscriptionStatus::Active.as_str())
    .bind(SubscriptionStatus::Deactive.as_str())
    .bind(now)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIAL_DAYS: i64 = 3;

    fn sub(status: &str, user_id: Uuid, end: DateTime<Utc>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id,
            status: status.to_string(),
            start_date: end - Duration::days(30),
            end_date: end,
            price_cents: 2200,
            stripe_subscription_id: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_bypasses_regardless_of_age_and_subscriptions() {
        let now = Utc::now();
        let created = now - Duration::days(365);
        assert_eq!(
            evaluate(UserRole::Admin, created, now, TRIAL_DAYS, None),
            Decision::AdminBypass
        );

        // Even an expired subscription doesn't change the admin outcome.
        let dead = sub("DEACTIVE", Uuid::new_v4(), now - Duration::days(1));
        assert_eq!(
            evaluate(UserRole::Admin, created, now, TRIAL_DAYS, Some(&dead)),
            Decision::AdminBypass
        );
    }

    #[test]
    fn trial_allows_regardless_of_subscription_state() {
        let now = Utc::now();
        let created = now - Duration::days(1);
        let dead = sub("ACTIVE", Uuid::new_v4(), now - Duration::hours(1));
        assert_eq!(
            evaluate(UserRole::User, created, now, TRIAL_DAYS, Some(&dead)),
            Decision::InTrial
        );
        assert_eq!(
            evaluate(UserRole::User, created, now, TRIAL_DAYS, None),
            Decision::InTrial
        );
    }

    #[test]
    fn trial_boundary_is_exclusive() {
        let now = Utc::now();
        let created = now - Duration::days(TRIAL_DAYS);
        // now == trial end: the trial has elapsed.
        assert_eq!(
            evaluate(UserRole::User, created, now, TRIAL_DAYS, None),
            Decision::Expired {
                trial_end: trial_end_date(created, TRIAL_DAYS)
            }
        );
        // One second earlier it still allows.
        let just_inside = created + Duration::days(TRIAL_DAYS) - Duration::seconds(1);
        assert_eq!(
            evaluate(UserRole::User, created, just_inside, TRIAL_DAYS, None),
            Decision::InTrial
        );
    }

    #[test]
    fn live_subscription_allows_after_trial() {
        let now = Utc::now();
        let created = now - Duration::days(10);
        let user_id = Uuid::new_v4();
        let live = sub("ACTIVE", user_id, now + Duration::days(20));
        assert_eq!(
            evaluate(UserRole::User, created, now, TRIAL_DAYS, Some(&live)),
            Decision::Subscribed {
                subscription_id: live.id
            }
        );
    }

    #[test]
    fn expired_or_deactivated_subscription_denies() {
        let now = Utc::now();
        let created = now - Duration::days(10);
        let trial_end = trial_end_date(created, TRIAL_DAYS);

        let stale = sub("ACTIVE", Uuid::new_v4(), now - Duration::hours(1));
        assert_eq!(
            evaluate(UserRole::User, created, now, TRIAL_DAYS, Some(&stale)),
            Decision::Expired { trial_end }
        );

        let cancelled = sub("DEACTIVE", Uuid::new_v4(), now + Duration::days(5));
        assert_eq!(
            evaluate(UserRole::User, created, now, TRIAL_DAYS, Some(&cancelled)),
            Decision::Expired { trial_end }
        );

        assert_eq!(
            evaluate(UserRole::User, created, now, TRIAL_DAYS, None),
            Decision::Expired { trial_end }
        );
    }

    #[test]
    fn end_to_end_timeline() {
        // User created at T0 with a 3-day trial.
        let t0 = Utc::now() - Duration::days(40);
        let user_id = Uuid::new_v4();

        // T0+1d: in trial.
        assert_eq!(
            evaluate(UserRole::User, t0, t0 + Duration::days(1), TRIAL_DAYS, None),
            Decision::InTrial
        );

        // T0+4d, no subscription: denied, trial end reported as T0+3d.
        assert_eq!(
            evaluate(UserRole::User, t0, t0 + Duration::days(4), TRIAL_DAYS, None),
            Decision::Expired {
                trial_end: t0 + Duration::days(3)
            }
        );

        // Promo redemption grants a 30-day subscription at T0+4d.
        let granted = sub("ACTIVE", user_id, t0 + Duration::days(34));
        assert_eq!(
            evaluate(
                UserRole::User,
                t0,
                t0 + Duration::days(4),
                TRIAL_DAYS,
                Some(&granted)
            ),
            Decision::Subscribed {
                subscription_id: granted.id
            }
        );

        // One second past the grant's end date: denied again.
        assert_eq!(
            evaluate(
                UserRole::User,
                t0,
                t0 + Duration::days(34) + Duration::seconds(1),
                TRIAL_DAYS,
                Some(&granted)
            ),
            Decision::Expired {
                trial_end: t0 + Duration::days(3)
            }
        );
    }
}
