use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("User already has an active subscription")]
    AlreadySubscribed,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Invalid or already used promo code")]
    InvalidPromoCode,

    #[error("Promo code collision, retry")]
    CodeCollision,

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    /// Entitlement denial: trial elapsed and no live subscription.
    #[error("Premium subscription required")]
    PremiumRequired {
        trial_end_date: DateTime<Utc>,
        swept_expired: bool,
    },

    #[error("Rate limited")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::AlreadySubscribed => (
                StatusCode::CONFLICT,
                json!({ "error": "User already has an active subscription" }),
            ),
            AppError::PaymentFailed(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Payment failed", "gatewayMessage": msg }),
            ),
            AppError::InvalidPromoCode => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid or already used promo code" }),
            ),
            AppError::CodeCollision => (
                StatusCode::CONFLICT,
                json!({ "error": "Generated promo code already exists, retry" }),
            ),
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Webhook signature verification failed" }),
            ),
            AppError::PremiumRequired {
                trial_end_date,
                swept_expired,
            } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "Premium subscription required",
                    "trialEnded": true,
                    "trialEndDate": trial_end_date.to_rfc3339(),
                    "sweptExpired": swept_expired,
                    "upgradeUrl": "/subscribe",
                }),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "Too many requests" }),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, json!({ "error": "Invalid token" })),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn domain_errors_map_to_expected_statuses() {
        assert_eq!(status_of(AppError::AlreadySubscribed), StatusCode::CONFLICT);
        assert_eq!(
            status_of(AppError::PaymentFailed("card declined".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(AppError::InvalidPromoCode), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AppError::CodeCollision), StatusCode::CONFLICT);
        assert_eq!(status_of(AppError::InvalidSignature), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn premium_denial_is_forbidden_not_unauthorized() {
        let deny = AppError::PremiumRequired {
            trial_end_date: chrono::Utc::now(),
            swept_expired: true,
        };
        assert_eq!(status_of(deny), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(AppError::Unauthorized("no token".into())),
            StatusCode::UNAUTHORIZED
        );
    }
}
