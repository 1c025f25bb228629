use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::subscription::SubscriptionStatus;

/// Periodic cleanup of stale subscription state. The entitlement gate already
/// deactivates a user's expired rows on every denied request; this pass keeps
/// the table tidy for users who stop sending requests altogether.
pub fn spawn(db: PgPool, interval_secs: u64, trial_days: i64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match run_once(&db, trial_days).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Deactivated {n} expired subscriptions"),
                Err(e) => tracing::error!("Subscription sweep failed: {e}"),
            }
        }
    });
}

pub async fn run_once(db: &PgPool, trial_days: i64) -> AppResult<u64> {
    let swept = sqlx::query(
        "UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE status = $1 AND end_date <= NOW()",
    )
    .bind(SubscriptionStatus::Active.as_str())
    .bind(SubscriptionStatus::Deactive.as_str())
    .execute(db)
    .await?
    .rows_affected();

    // Users still inside the trial window keep their cached flag.
    sqlx::query(
        r#"UPDATE users SET premium = false, current_subscription_id = NULL
        WHERE premium = true
          AND created_at + make_interval(days => $1) <= NOW()
          AND NOT EXISTS (
              SELECT 1 FROM subscriptions s
              WHERE s.user_id = users.id AND s.status = $2 AND s.end_date > NOW()
          )"#,
    )
    .bind(trial_days as i32)
    .bind(SubscriptionStatus::Active.as_str())
    .execute(db)
    .await?;

    Ok(swept)
}
