use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::user::UserRole;
use crate::AppState;

/// Middleware: requires the ADMIN role, read from the users table rather
/// than the token.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?;

    let role = role.ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;
    if UserRole::parse(&role) != UserRole::Admin {
        return Err(AppError::Unauthorized("Admin role required".into()));
    }

    req.extensions_mut().insert(AuthUser {
        id: auth.id,
        role: Some(role),
    });

    Ok(next.run(req).await)
}
