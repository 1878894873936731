use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::{
    auth::{assert_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, sort_ascending, validate_input,
        CreateTransactionInput, TransactionPath, TransactionsQuery, UpdateTransactionInput,
    },
    services::finance::{KIND_EXPENSE, KIND_INCOME},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/transactions",
            axum::routing::get(list_transactions).post(create_transaction),
        )
        .route(
            "/transactions/{transaction_id}",
            axum::routing::get(get_transaction)
                .patch(update_transaction)
                .delete(delete_transaction),
        )
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let mut filters = Map::new();
    if let Some(kind) = query.kind.as_deref().filter(|s| !s.is_empty()) {
        validate_kind(kind)?;
        filters.insert("kind".to_string(), Value::String(kind.to_string()));
    }
    if let Some(category) = query.category.as_deref().filter(|s| !s.is_empty()) {
        filters.insert("category".to_string(), Value::String(category.to_string()));
    }
    if let Some(from) = query.date_from.as_deref().filter(|s| !s.is_empty()) {
        parse_date(from)?;
        filters.insert(
            "transaction_date__gte".to_string(),
            Value::String(from.to_string()),
        );
    }
    if let Some(to) = query.date_to.as_deref().filter(|s| !s.is_empty()) {
        parse_date(to)?;
        filters.insert(
            "transaction_date__lte".to_string(),
            Value::String(to.to_string()),
        );
    }

    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let rows = list_rows(
        pool,
        "transactions",
        Some(&filters),
        limit,
        query.offset.max(0),
        &query.sort_by,
        sort_ascending(&query.sort_order),
    )
    .await?;
    let total = count_rows(pool, "transactions", Some(&filters)).await?;

    Ok(Json(json!({ "data": rows, "total": total })))
}

async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTransactionInput>,
) -> AppResult<impl IntoResponse> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    validate_input(&payload)?;
    validate_kind(&payload.kind)?;
    parse_date(&payload.transaction_date)?;
    let pool = state.pool()?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "transactions", &record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(path): Path<TransactionPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let transaction = get_row(pool, "transactions", &path.transaction_id).await?;
    Ok(Json(transaction))
}

async fn update_transaction(
    State(state): State<AppState>,
    Path(path): Path<TransactionPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTransactionInput>,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let patch = remove_nulls(serialize_to_map(&payload));
    if let Some(kind) = patch.get("kind").and_then(Value::as_str) {
        validate_kind(kind)?;
    }
    if let Some(date) = patch.get("transaction_date").and_then(Value::as_str) {
        parse_date(date)?;
    }
    if let Some(amount) = patch.get("amount").and_then(Value::as_i64) {
        if amount < 0 {
            return Err(AppError::BadRequest(
                "amount cannot be negative.".to_string(),
            ));
        }
    }

    let updated = update_row(pool, "transactions", &path.transaction_id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_transaction(
    State(state): State<AppState>,
    Path(path): Path<TransactionPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let deleted = delete_row(pool, "transactions", &path.transaction_id).await?;
    Ok(Json(deleted))
}

fn validate_kind(kind: &str) -> Result<(), AppError> {
    if kind == KIND_INCOME || kind == KIND_EXPENSE {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Unknown transaction kind '{kind}'. Expected '{KIND_INCOME}' or '{KIND_EXPENSE}'."
        )))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{raw}'. Expected YYYY-MM-DD.")))
}
