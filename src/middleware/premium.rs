use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::user::User;
use crate::services::entitlement::{self, Gate};
use crate::AppState;

/// Middleware gating premium features: admins pass unconditionally, then the
/// trial window, then a live subscription. Denial answers 403 carrying the
/// trial end date; a missing identity is 401, never 403.
pub async fn premium_guard(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    match entitlement::check_entitlement(&state.db, &user, state.config.billing.trial_days).await? {
        Gate::Allow { reason } => {
            req.extensions_mut().insert(reason);
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        Gate::Deny {
            trial_end_date,
            swept_expired,
        } => Err(AppError::PremiumRequired {
            trial_end_date,
            swept_expired,
        }),
    }
}
