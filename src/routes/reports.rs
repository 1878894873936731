use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::{
    auth::{assert_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::list_rows,
    schemas::{CashFlowQuery, DateRangeQuery, YearQuery},
    services::finance::{cash_flow_projection, detail_report, monthly_report, yearly_report},
    services::period::MonthKey,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/reports/monthly", axum::routing::get(monthly))
        .route("/reports/yearly", axum::routing::get(yearly))
        .route("/reports/detail", axum::routing::get(detail))
        .route("/reports/cashflow", axum::routing::get(cashflow))
}

async fn monthly(
    State(state): State<AppState>,
    Query(query): Query<YearQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let year = query.year.unwrap_or_else(|| report_today(&state).year());
    let transactions = list_rows(pool, "transactions", None, 10_000, 0, "created_at", true).await?;
    let bills = list_rows(pool, "bills", None, 10_000, 0, "created_at", true).await?;

    let rows = monthly_report(year, &transactions, &bills);
    Ok(Json(json!({ "year": year, "months": rows })))
}

async fn yearly(
    State(state): State<AppState>,
    Query(query): Query<YearQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let year = query.year.unwrap_or_else(|| report_today(&state).year());
    let transactions = list_rows(pool, "transactions", None, 10_000, 0, "created_at", true).await?;
    let bills = list_rows(pool, "bills", None, 10_000, 0, "created_at", true).await?;
    let rooms = list_rows(pool, "rooms", None, 1000, 0, "created_at", true).await?;

    Ok(Json(json!(yearly_report(year, &transactions, &bills, &rooms))))
}

async fn detail(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let from = parse_date(&query.date_from)?;
    let to = parse_date(&query.date_to)?;
    if from > to {
        return Err(AppError::BadRequest(
            "date_from must not be after date_to.".to_string(),
        ));
    }

    let bills = list_rows(pool, "bills", None, 10_000, 0, "created_at", true).await?;
    let transactions = list_rows(pool, "transactions", None, 10_000, 0, "created_at", true).await?;

    let entries = detail_report(from, to, &bills, &transactions);
    let total_income: i64 = entries
        .iter()
        .filter(|entry| entry.kind == "income")
        .map(|entry| entry.amount)
        .sum();
    let total_expense: i64 = entries
        .iter()
        .filter(|entry| entry.kind == "expense")
        .map(|entry| entry.amount)
        .sum();

    Ok(Json(json!({
        "date_from": from.to_string(),
        "date_to": to.to_string(),
        "total_income": total_income,
        "total_expense": total_expense,
        "net": total_income - total_expense,
        "entries": entries,
    })))
}

async fn cashflow(
    State(state): State<AppState>,
    Query(query): Query<CashFlowQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let months_ahead = query
        .months_ahead
        .unwrap_or(state.config.cashflow_months_ahead)
        .clamp(1, 24);
    let start = MonthKey::from_date(report_today(&state));

    let rooms = list_rows(pool, "rooms", None, 1000, 0, "created_at", true).await?;
    let transactions = list_rows(pool, "transactions", None, 10_000, 0, "created_at", true).await?;

    let rows = cash_flow_projection(
        start,
        months_ahead,
        state.config.cashflow_expense_window_months,
        &rooms,
        &transactions,
    );
    Ok(Json(json!({ "start": start.to_string(), "months": rows })))
}

fn report_today(state: &AppState) -> NaiveDate {
    Utc::now()
        .with_timezone(&state.config.report_timezone)
        .date_naive()
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{raw}'. Expected YYYY-MM-DD.")))
}
