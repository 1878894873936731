use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::{
    auth::{assert_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::AppResult,
    repository::table_service::{count_rows, delete_row, list_rows, update_row},
    schemas::{clamp_limit_in_range, sort_ascending, NotificationPath, NotificationsQuery},
    services::reminders::{due_summary, run_reminder_check},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/notifications", axum::routing::get(list_notifications))
        .route(
            "/notifications/check",
            axum::routing::post(check_notifications),
        )
        .route(
            "/notifications/due-summary",
            axum::routing::get(notification_due_summary),
        )
        .route(
            "/notifications/{notification_id}/read",
            axum::routing::patch(mark_read),
        )
        .route(
            "/notifications/{notification_id}",
            axum::routing::delete(delete_notification),
        )
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let mut filters = Map::new();
    if let Some(is_read) = query.is_read {
        filters.insert("is_read".to_string(), Value::Bool(is_read));
    }
    if let Some(tenant_id) = query.tenant_id.as_deref().filter(|s| !s.is_empty()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id.to_string()));
    }

    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let rows = list_rows(
        pool,
        "notifications",
        Some(&filters),
        limit,
        query.offset.max(0),
        &query.sort_by,
        sort_ascending(&query.sort_order),
    )
    .await?;
    let total = count_rows(pool, "notifications", Some(&filters)).await?;

    Ok(Json(json!({ "data": rows, "total": total })))
}

/// Run the due-date reminder sweep for today. Safe to call repeatedly.
async fn check_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let today = Utc::now()
        .with_timezone(&state.config.report_timezone)
        .date_naive();
    let result = run_reminder_check(pool, today).await?;
    Ok(Json(json!({ "date": today.to_string(), "result": result })))
}

async fn notification_due_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let bills = list_rows(pool, "bills", None, 10_000, 0, "created_at", true).await?;
    let today = Utc::now()
        .with_timezone(&state.config.report_timezone)
        .date_naive();
    Ok(Json(json!(due_summary(&bills, today))))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(path): Path<NotificationPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let mut patch = Map::new();
    patch.insert("is_read".to_string(), Value::Bool(true));
    let updated = update_row(pool, "notifications", &path.notification_id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_notification(
    State(state): State<AppState>,
    Path(path): Path<NotificationPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let deleted = delete_row(pool, "notifications", &path.notification_id).await?;
    Ok(Json(deleted))
}
