use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use crate::{
    auth::{assert_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, sort_ascending, validate_input, CreateTenantInput,
        TenantBillsQuery, TenantPath, TenantsQuery, UpdateTenantInput,
    },
    services::billing::{status_inconsistency, STATUS_UNPAID},
    services::period::{months_to_show, preview_window, MonthKey},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
        .route(
            "/tenants/{tenant_id}/bills",
            axum::routing::get(tenant_bills),
        )
        .route(
            "/tenants/{tenant_id}/payment-preview",
            axum::routing::get(payment_preview),
        )
}

async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let mut filters = Map::new();
    if let Some(active) = query.is_active {
        filters.insert("is_active".to_string(), Value::Bool(active));
    }
    if let Some(room_id) = query.room_id.as_deref().filter(|s| !s.is_empty()) {
        filters.insert("room_id".to_string(), Value::String(room_id.to_string()));
    }

    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let rows = list_rows(
        pool,
        "tenants",
        Some(&filters),
        limit,
        query.offset.max(0),
        &query.sort_by,
        sort_ascending(&query.sort_order),
    )
    .await?;
    let total = count_rows(pool, "tenants", Some(&filters)).await?;

    // Each tenant carries the 3-month payment preview around today.
    let bills = list_rows(pool, "bills", None, 10_000, 0, "month", true).await?;
    let today = today_in_report_tz(&state);
    let window = preview_window(today);
    let data: Vec<Value> = rows
        .into_iter()
        .map(|tenant| {
            let tenant_id = value_str(&tenant, "id");
            let tenant_bills: Vec<Value> = bills
                .iter()
                .filter(|bill| value_str(bill, "tenant_id") == tenant_id)
                .cloned()
                .collect();
            let preview: Vec<Value> = window
                .iter()
                .map(|key| month_entry(*key, &tenant_bills))
                .collect();
            json!({ "tenant": tenant, "bill_preview": preview })
        })
        .collect();

    Ok(Json(json!({ "data": data, "total": total })))
}

async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    validate_input(&payload)?;
    parse_move_date(&payload.move_in_date)?;
    let pool = state.pool()?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "tenants", &record).await?;

    if let Some(room_id) = payload.room_id.as_deref().filter(|s| !s.is_empty()) {
        mark_room(pool, room_id, "occupied").await?;
    }

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let tenant = get_row(pool, "tenants", &path.tenant_id).await?;
    Ok(Json(tenant))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTenantInput>,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let existing = get_row(pool, "tenants", &path.tenant_id).await?;
    let previous_room = value_str(&existing, "room_id");

    let patch = remove_nulls(serialize_to_map(&payload));
    if let Some(date) = patch.get("move_in_date").and_then(Value::as_str) {
        parse_move_date(date)?;
    }
    let updated = update_row(pool, "tenants", &path.tenant_id, &patch).await?;

    // Keep room statuses in step with assignment changes.
    let next_room = value_str(&updated, "room_id");
    let deactivated = payload.is_active == Some(false);
    if !previous_room.is_empty() && (previous_room != next_room || deactivated) {
        mark_room(pool, &previous_room, "available").await?;
    }
    if !next_room.is_empty() && !deactivated && previous_room != next_room {
        mark_room(pool, &next_room, "occupied").await?;
    }

    Ok(Json(updated))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let deleted = delete_row(pool, "tenants", &path.tenant_id).await?;
    let room_id = value_str(&deleted, "room_id");
    if !room_id.is_empty() {
        mark_room(pool, &room_id, "available").await?;
    }

    Ok(Json(deleted))
}

/// Per-month payment status for one tenant's year, starting at the
/// move-in month for the move-in year and at January otherwise.
async fn tenant_bills(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    Query(query): Query<TenantBillsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let tenant = get_row(pool, "tenants", &path.tenant_id).await?;
    let today = today_in_report_tz(&state);
    let year = query.year.unwrap_or_else(|| today.year());
    let move_in = parse_move_date(&value_str(&tenant, "move_in_date"))
        .unwrap_or_else(|_| NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(today));

    let bills = tenant_bill_rows(pool, &path.tenant_id).await?;

    let months: Vec<Value> = months_to_show(move_in, year)
        .into_iter()
        .filter_map(|month| MonthKey::new(year, month).ok())
        .map(|key| month_entry(key, &bills))
        .collect();

    Ok(Json(json!({
        "tenant": tenant,
        "year": year,
        "months": months,
    })))
}

/// Previous, current and next month relative to today, each with the
/// tenant's bill for that month if one exists.
async fn payment_preview(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    get_row(pool, "tenants", &path.tenant_id).await?;
    let bills = tenant_bill_rows(pool, &path.tenant_id).await?;

    let today = today_in_report_tz(&state);
    let window: Vec<Value> = preview_window(today)
        .into_iter()
        .map(|key| month_entry(key, &bills))
        .collect();

    Ok(Json(json!({ "data": window })))
}

fn month_entry(key: MonthKey, bills: &[Value]) -> Value {
    let month_key = key.to_string();
    let bill = bills
        .iter()
        .find(|bill| value_str(bill, "month") == month_key)
        .cloned();

    let (status, warning) = match &bill {
        Some(bill) => {
            let charged = bill.get("amount_charged").and_then(Value::as_i64).unwrap_or(0);
            let paid = bill.get("amount_paid").and_then(Value::as_i64).unwrap_or(0);
            let status = value_str(bill, "status");
            let warning = status_inconsistency(charged, paid, &status);
            (status, warning)
        }
        None => (STATUS_UNPAID.to_string(), None),
    };

    json!({
        "month": month_key,
        "month_number": key.month(),
        "has_bill": bill.is_some(),
        "bill": bill,
        "status": status,
        "warning": warning,
    })
}

async fn tenant_bill_rows(pool: &sqlx::PgPool, tenant_id: &str) -> AppResult<Vec<Value>> {
    let mut filter = Map::new();
    filter.insert("tenant_id".to_string(), Value::String(tenant_id.to_string()));
    list_rows(pool, "bills", Some(&filter), 1000, 0, "month", true).await
}

async fn mark_room(pool: &sqlx::PgPool, room_id: &str, status: &str) -> AppResult<()> {
    let mut patch = Map::new();
    patch.insert("status".to_string(), Value::String(status.to_string()));
    update_row(pool, "rooms", room_id, &patch).await?;
    Ok(())
}

fn today_in_report_tz(state: &AppState) -> NaiveDate {
    Utc::now()
        .with_timezone(&state.config.report_timezone)
        .date_naive()
}

fn parse_move_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{raw}'. Expected YYYY-MM-DD.")))
}

fn value_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
