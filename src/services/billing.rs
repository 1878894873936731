use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::AppError;
use crate::repository::table_service::{create_row, list_rows};
use crate::services::period::MonthKey;

pub const STATUS_PAID: &str = "paid";
pub const STATUS_UNPAID: &str = "unpaid";
pub const STATUS_PARTIAL: &str = "partial";

pub const BILL_STATUSES: &[&str] = &[STATUS_PAID, STATUS_UNPAID, STATUS_PARTIAL];

pub const KIND_MONTHLY_RENT: &str = "monthly_rent";

/// Fixed payment-receiver choices offered by the payment form. Constant
/// configuration, not computed.
pub const RECEIVER_OPTIONS: &[(&str, &str)] = &[
    ("manager", "Pengurus kos"),
    ("owner", "Pemilik kos"),
    ("other", "Lainnya"),
];

/// Result of one monthly generation batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BillingRunResult {
    pub created_bills: u32,
    pub skipped_bills: u32,
    pub failed_bills: u32,
}

/// Decide, per tenant, whether a bill for `month` must be created.
///
/// Pure planning step: tenants with an existing (tenant, month) bill are
/// skipped, tenants whose room cannot be resolved are failures, everyone
/// else gets a draft bill at the room's current price. Input order is
/// preserved; tenants are independent of each other.
pub fn plan_monthly_bills(
    tenants: &[Value],
    rooms: &[Value],
    existing_bills: &[Value],
    month: MonthKey,
) -> (Vec<Map<String, Value>>, u32, u32) {
    let month_key = month.to_string();
    let mut drafts = Vec::new();
    let mut skipped = 0_u32;
    let mut failed = 0_u32;

    for tenant in tenants {
        let tenant_id = val_str(tenant, "id");
        if tenant_id.is_empty() {
            failed += 1;
            continue;
        }

        let already_billed = existing_bills.iter().any(|bill| {
            val_str(bill, "tenant_id") == tenant_id && val_str(bill, "month") == month_key
        });
        if already_billed {
            skipped += 1;
            continue;
        }

        let room_id = val_str(tenant, "room_id");
        let Some(room) = rooms.iter().find(|room| val_str(room, "id") == room_id) else {
            warn!(tenant_id = %tenant_id, "Tenant has no resolvable room, bill not generated");
            failed += 1;
            continue;
        };

        let mut draft = Map::new();
        draft.insert("tenant_id".to_string(), Value::String(tenant_id));
        draft.insert("room_id".to_string(), Value::String(room_id));
        draft.insert("month".to_string(), Value::String(month_key.clone()));
        draft.insert("amount_charged".to_string(), json!(val_i64(room, "monthly_price")));
        draft.insert("amount_paid".to_string(), json!(0));
        draft.insert(
            "status".to_string(),
            Value::String(STATUS_UNPAID.to_string()),
        );
        draft.insert(
            "kind".to_string(),
            Value::String(KIND_MONTHLY_RENT.to_string()),
        );
        drafts.push(draft);
    }

    (drafts, skipped, failed)
}

/// Generate rent bills for every tenant for `month`, best-effort.
///
/// The read-then-write check makes reruns cheap; the store's unique
/// constraint on (tenant, month, kind) closes the race between concurrent
/// callers, whose losers surface here as Conflict and are counted as skips.
pub async fn run_monthly_billing(
    pool: &PgPool,
    month: MonthKey,
) -> Result<BillingRunResult, AppError> {
    let mut active_filter = Map::new();
    active_filter.insert("is_active".to_string(), Value::Bool(true));
    let tenants =
        list_rows(pool, "tenants", Some(&active_filter), 1000, 0, "created_at", true).await?;
    let rooms = list_rows(pool, "rooms", None, 1000, 0, "created_at", true).await?;

    let mut month_filter = Map::new();
    month_filter.insert("month".to_string(), Value::String(month.to_string()));
    let existing = list_rows(pool, "bills", Some(&month_filter), 1000, 0, "created_at", true).await?;

    let (drafts, mut skipped, mut failed) = plan_monthly_bills(&tenants, &rooms, &existing, month);

    let mut created = 0_u32;
    for draft in &drafts {
        match create_row(pool, "bills", draft).await {
            Ok(_) => created += 1,
            Err(AppError::Conflict(_)) => skipped += 1,
            Err(error) => {
                warn!(
                    tenant_id = %draft.get("tenant_id").and_then(serde_json::Value::as_str).unwrap_or_default(),
                    error = %error,
                    "Failed to create bill"
                );
                failed += 1;
            }
        }
    }

    info!(
        month = %month,
        created = created,
        skipped = skipped,
        failed = failed,
        "Monthly billing run completed"
    );

    Ok(BillingRunResult {
        created_bills: created,
        skipped_bills: skipped,
        failed_bills: failed,
    })
}

/// Status is set by a human through the payment form and is authoritative;
/// this only flags combinations worth surfacing in the UI, it never rejects.
pub fn status_inconsistency(amount_charged: i64, amount_paid: i64, status: &str) -> Option<String> {
    match status {
        STATUS_PAID if amount_paid < amount_charged => Some(format!(
            "Marked paid but only {amount_paid} of {amount_charged} recorded."
        )),
        STATUS_UNPAID if amount_paid > 0 => Some(format!(
            "Marked unpaid but {amount_paid} already recorded."
        )),
        STATUS_PARTIAL if amount_paid >= amount_charged && amount_charged > 0 => Some(
            "Marked partial but the recorded amount covers the full charge.".to_string(),
        ),
        _ => None,
    }
}

fn val_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

fn val_i64(row: &Value, key: &str) -> i64 {
    match row.as_object().and_then(|obj| obj.get(key)) {
        Some(Value::Number(number)) => number.as_i64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{
        plan_monthly_bills, status_inconsistency, RECEIVER_OPTIONS, STATUS_PAID, STATUS_UNPAID,
    };
    use crate::services::period::MonthKey;

    fn tenant(id: &str, room_id: &str) -> Value {
        json!({ "id": id, "name": "Penyewa", "room_id": room_id })
    }

    fn room(id: &str, price: i64) -> Value {
        json!({ "id": id, "name": "Kamar", "monthly_price": price, "status": "occupied" })
    }

    fn fixtures() -> (Vec<Value>, Vec<Value>) {
        let tenants = vec![
            tenant("t1", "r1"),
            tenant("t2", "r2"),
            tenant("t3", "r3"),
        ];
        let rooms = vec![room("r1", 500_000), room("r2", 750_000), room("r3", 600_000)];
        (tenants, rooms)
    }

    #[test]
    fn first_run_creates_one_bill_per_tenant() {
        let (tenants, rooms) = fixtures();
        let month = MonthKey::new(2025, 1).expect("valid");

        let (drafts, skipped, failed) = plan_monthly_bills(&tenants, &rooms, &[], month);
        assert_eq!(drafts.len(), 3);
        assert_eq!(skipped, 0);
        assert_eq!(failed, 0);

        let first = &drafts[0];
        assert_eq!(first.get("month"), Some(&json!("2025-01")));
        assert_eq!(first.get("amount_charged"), Some(&json!(500_000)));
        assert_eq!(first.get("amount_paid"), Some(&json!(0)));
        assert_eq!(first.get("status"), Some(&json!(STATUS_UNPAID)));
        assert_eq!(first.get("kind"), Some(&json!("monthly_rent")));
    }

    #[test]
    fn second_run_skips_everything() {
        let (tenants, rooms) = fixtures();
        let month = MonthKey::new(2025, 1).expect("valid");

        let (drafts, _, _) = plan_monthly_bills(&tenants, &rooms, &[], month);
        let existing: Vec<Value> = drafts.into_iter().map(Value::Object).collect();

        let (rerun, skipped, failed) = plan_monthly_bills(&tenants, &rooms, &existing, month);
        assert!(rerun.is_empty());
        assert_eq!(skipped, 3);
        assert_eq!(failed, 0);
    }

    #[test]
    fn bills_for_other_months_do_not_cause_skips() {
        let (tenants, rooms) = fixtures();
        let existing = vec![json!({ "tenant_id": "t1", "month": "2024-12" })];

        let month = MonthKey::new(2025, 1).expect("valid");
        let (drafts, skipped, _) = plan_monthly_bills(&tenants, &rooms, &existing, month);
        assert_eq!(drafts.len(), 3);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn unresolvable_room_is_a_failure_not_a_skip() {
        let tenants = vec![tenant("t1", "r1"), tenant("t2", "missing")];
        let rooms = vec![room("r1", 500_000)];

        let month = MonthKey::new(2025, 1).expect("valid");
        let (drafts, skipped, failed) = plan_monthly_bills(&tenants, &rooms, &[], month);
        assert_eq!(drafts.len(), 1);
        assert_eq!(skipped, 0);
        assert_eq!(failed, 1);
    }

    #[test]
    fn inconsistencies_are_surfaced_not_rejected() {
        assert!(status_inconsistency(500_000, 500_000, STATUS_PAID).is_none());
        assert!(status_inconsistency(500_000, 100_000, STATUS_PAID).is_some());
        assert!(status_inconsistency(500_000, 0, STATUS_UNPAID).is_none());
        assert!(status_inconsistency(500_000, 100_000, STATUS_UNPAID).is_some());
        assert!(status_inconsistency(500_000, 100_000, "partial").is_none());
        assert!(status_inconsistency(500_000, 500_000, "partial").is_some());
    }

    #[test]
    fn receiver_options_are_fixed() {
        assert_eq!(
            RECEIVER_OPTIONS,
            &[
                ("manager", "Pengurus kos"),
                ("owner", "Pemilik kos"),
                ("other", "Lainnya"),
            ]
        );
    }
}
