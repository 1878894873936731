use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user,
    error::AppResult,
    repository::table_service::{count_rows, list_rows},
    services::billing::STATUS_PAID,
    services::finance::{occupancy_snapshot, revenue_by_month},
    services::period::MonthKey,
    services::reminders::due_summary,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/dashboard", axum::routing::get(dashboard))
}

/// One-call overview: occupancy, this month's collection progress, the
/// paid-revenue series and outstanding-balance buckets.
async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let today = Utc::now()
        .with_timezone(&state.config.report_timezone)
        .date_naive();
    let current_month = MonthKey::from_date(today);

    let rooms = list_rows(pool, "rooms", None, 1000, 0, "created_at", true).await?;
    let bills = list_rows(pool, "bills", None, 10_000, 0, "created_at", true).await?;

    let mut active_filter = Map::new();
    active_filter.insert("is_active".to_string(), Value::Bool(true));
    let active_tenants = count_rows(pool, "tenants", Some(&active_filter)).await?;

    let month_key = current_month.to_string();
    let mut month_paid = 0_i64;
    let mut month_unpaid = 0_i64;
    let mut month_collected = 0_i64;
    for bill in &bills {
        if bill.get("month").and_then(Value::as_str) != Some(month_key.as_str()) {
            continue;
        }
        let paid = bill.get("amount_paid").and_then(Value::as_i64).unwrap_or(0);
        if bill.get("status").and_then(Value::as_str) == Some(STATUS_PAID) {
            month_paid += 1;
        } else {
            month_unpaid += 1;
        }
        month_collected += paid;
    }

    let revenue_series: Vec<Value> = revenue_by_month(&bills)
        .into_iter()
        .map(|(month, revenue)| json!({ "month": month, "revenue": revenue }))
        .collect();

    Ok(Json(json!({
        "current_month": month_key,
        "occupancy": occupancy_snapshot(&rooms),
        "active_tenant_count": active_tenants,
        "bills_this_month": {
            "paid": month_paid,
            "unpaid": month_unpaid,
            "collected_amount": month_collected,
        },
        "revenue_by_month": revenue_series,
        "due": due_summary(&bills, today),
    })))
}
