use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::subscription::{ListPromoQuery, PromoCode};
use crate::services::subscription;
use crate::AppState;

pub async fn create_promo_code(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let promo = subscription::issue_promo_code(&state.db).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Promo code created successfully",
            "promoCode": promo,
        })),
    ))
}

pub async fn list_promo_codes(
    State(state): State<AppState>,
    Query(query): Query<ListPromoQuery>,
) -> AppResult<Json<Value>> {
    let page = query.page.unwrap_or(1).max(1) as i64;
    let limit = query.limit.unwrap_or(10).clamp(1, 100) as i64;
    let offset = (page - 1) * limit;
    let search = format!("%{}%", query.search.unwrap_or_default());

    let rows: Vec<PromoCode> = sqlx::query_as(
        r#"SELECT * FROM promo_codes
        WHERE code ILIKE $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC LIMIT $3 OFFSET $4"#,
    )
    .bind(&search)
    .bind(&query.status)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM promo_codes WHERE code ILIKE $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(&search)
    .bind(&query.status)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "promoCodes": rows,
        "pagination": {
            "total": total,
            "page": page,
            "limit": limit,
            "totalPages": (total + limit - 1) / limit,
        },
    })))
}

pub async fn delete_promo_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let deleted = sqlx::query("DELETE FROM promo_codes WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("Promo code not found".into()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Promo code deleted successfully",
    })))
}
