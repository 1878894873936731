use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::{assert_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, sort_ascending, validate_input,
        BillPath, BillsQuery, CreateBillInput, GenerateBillsInput, PaymentUpdateInput,
        UpdateBillInput,
    },
    services::billing::{
        run_monthly_billing, status_inconsistency, BILL_STATUSES, RECEIVER_OPTIONS, STATUS_PAID,
        STATUS_PARTIAL,
    },
    services::period::MonthKey,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/bills", axum::routing::get(list_bills).post(create_bill))
        .route("/bills/generate", axum::routing::post(generate_bills))
        .route(
            "/bills/receiver-options",
            axum::routing::get(receiver_options),
        )
        .route(
            "/bills/fix-paid-amounts",
            axum::routing::post(fix_paid_amounts),
        )
        .route(
            "/bills/{bill_id}",
            axum::routing::get(get_bill)
                .patch(update_bill)
                .delete(delete_bill),
        )
        .route(
            "/bills/{bill_id}/payment",
            axum::routing::patch(update_payment),
        )
}

async fn list_bills(
    State(state): State<AppState>,
    Query(query): Query<BillsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let mut filters = Map::new();
    if let Some(month) = query.month.as_deref().filter(|s| !s.is_empty()) {
        month.parse::<MonthKey>()?;
        filters.insert("month".to_string(), Value::String(month.to_string()));
    }
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        validate_bill_status(status)?;
        filters.insert("status".to_string(), Value::String(status.to_string()));
    }
    if let Some(tenant_id) = query.tenant_id.as_deref().filter(|s| !s.is_empty()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id.to_string()));
    }
    if let Some(kind) = query.kind.as_deref().filter(|s| !s.is_empty()) {
        filters.insert("kind".to_string(), Value::String(kind.to_string()));
    }

    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let rows = list_rows(
        pool,
        "bills",
        Some(&filters),
        limit,
        query.offset.max(0),
        &query.sort_by,
        sort_ascending(&query.sort_order),
    )
    .await?;
    let total = count_rows(pool, "bills", Some(&filters)).await?;

    Ok(Json(json!({ "data": rows, "total": total })))
}

async fn create_bill(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBillInput>,
) -> AppResult<impl IntoResponse> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    validate_input(&payload)?;
    payload.month.parse::<MonthKey>()?;
    validate_bill_status(&payload.status)?;
    let pool = state.pool()?;

    // Duplicate (tenant_id, month, kind) surfaces as 409 from the database.
    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "bills", &record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

/// Create one bill per active tenant for the given month. Re-running the
/// same month only fills gaps.
async fn generate_bills(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerateBillsInput>,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    validate_input(&payload)?;
    let month: MonthKey = payload.month.parse()?;
    let pool = state.pool()?;

    let result = run_monthly_billing(pool, month).await?;
    Ok(Json(json!({ "month": month.to_string(), "result": result })))
}

async fn receiver_options(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let options: Vec<Value> = RECEIVER_OPTIONS
        .iter()
        .map(|(value, label)| json!({ "value": value, "label": label }))
        .collect();
    Ok(Json(json!({ "data": options })))
}

/// Backfill for rows recorded as paid before amounts were tracked:
/// any paid bill with a zero paid amount gets the charged amount.
async fn fix_paid_amounts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN])?;
    let pool = state.pool()?;

    let mut filter = Map::new();
    filter.insert("status".to_string(), Value::String(STATUS_PAID.to_string()));
    let paid_bills = list_rows(pool, "bills", Some(&filter), 10_000, 0, "created_at", true).await?;

    let mut fixed = 0_u32;
    for bill in &paid_bills {
        let charged = bill.get("amount_charged").and_then(Value::as_i64).unwrap_or(0);
        let paid = bill.get("amount_paid").and_then(Value::as_i64).unwrap_or(0);
        if paid != 0 || charged == 0 {
            continue;
        }
        let bill_id = value_str(bill, "id");
        if bill_id.is_empty() {
            continue;
        }
        let mut patch = Map::new();
        patch.insert("amount_paid".to_string(), json!(charged));
        update_row(pool, "bills", &bill_id, &patch).await?;
        fixed += 1;
    }

    tracing::info!(fixed, "paid-amount backfill completed");
    Ok(Json(json!({ "fixed": fixed })))
}

async fn get_bill(
    State(state): State<AppState>,
    Path(path): Path<BillPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let bill = get_row(pool, "bills", &path.bill_id).await?;
    Ok(Json(with_warning(bill)))
}

async fn update_bill(
    State(state): State<AppState>,
    Path(path): Path<BillPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateBillInput>,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let patch = remove_nulls(serialize_to_map(&payload));
    if let Some(month) = patch.get("month").and_then(Value::as_str) {
        month.parse::<MonthKey>()?;
    }
    if let Some(status) = patch.get("status").and_then(Value::as_str) {
        validate_bill_status(status)?;
    }

    let updated = update_row(pool, "bills", &path.bill_id, &patch).await?;
    Ok(Json(with_warning(updated)))
}

/// Record a payment. Marking a bill paid or partial requires who received
/// the money and when. Status is whatever the operator sets; mismatches
/// against the amounts are surfaced as a warning, not rejected.
async fn update_payment(
    State(state): State<AppState>,
    Path(path): Path<BillPath>,
    headers: HeaderMap,
    Json(payload): Json<PaymentUpdateInput>,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    validate_bill_status(&payload.status)?;
    if payload.amount_paid < 0 {
        return Err(AppError::BadRequest(
            "amount_paid cannot be negative.".to_string(),
        ));
    }
    let pool = state.pool()?;

    let mut patch = remove_nulls(serialize_to_map(&payload));
    if payload.status == STATUS_PAID || payload.status == STATUS_PARTIAL {
        let received_by = payload.received_by.as_deref().unwrap_or_default().trim();
        let payment_date = payload.payment_date.as_deref().unwrap_or_default().trim();
        if received_by.is_empty() || payment_date.is_empty() {
            return Err(AppError::UnprocessableEntity(
                "received_by and payment_date are required when marking a bill paid or partial."
                    .to_string(),
            ));
        }
        if !RECEIVER_OPTIONS.iter().any(|(value, _)| *value == received_by) {
            return Err(AppError::BadRequest(format!(
                "Unknown receiver '{received_by}'."
            )));
        }
        chrono::NaiveDate::parse_from_str(payment_date, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid payment_date '{payment_date}'. Expected YYYY-MM-DD."
            ))
        })?;
    } else {
        // Back to unpaid clears the payment trail.
        patch.insert("payment_date".to_string(), Value::Null);
        patch.insert("received_by".to_string(), Value::Null);
    }

    let updated = update_row(pool, "bills", &path.bill_id, &patch).await?;
    Ok(Json(with_warning(updated)))
}

async fn delete_bill(
    State(state): State<AppState>,
    Path(path): Path<BillPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let deleted = delete_row(pool, "bills", &path.bill_id).await?;
    Ok(Json(deleted))
}

fn with_warning(bill: Value) -> Value {
    let charged = bill.get("amount_charged").and_then(Value::as_i64).unwrap_or(0);
    let paid = bill.get("amount_paid").and_then(Value::as_i64).unwrap_or(0);
    let status = value_str(&bill, "status");
    let warning = status_inconsistency(charged, paid, &status);
    json!({ "bill": bill, "warning": warning })
}

fn validate_bill_status(status: &str) -> Result<(), AppError> {
    if BILL_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Unknown bill status '{status}'. Expected one of: {}.",
            BILL_STATUSES.join(", ")
        )))
    }
}

fn value_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
