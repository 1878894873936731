use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::repository::table_service;
use crate::services::billing::STATUS_PAID;
use crate::services::period::MonthKey;

pub const REMINDER_7_DAYS: &str = "due_7_days";
pub const REMINDER_3_DAYS: &str = "due_3_days";
pub const REMINDER_1_DAY: &str = "due_1_day";
pub const REMINDER_OVERDUE: &str = "overdue";

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReminderRunResult {
    pub created_notifications: u32,
    pub skipped_notifications: u32,
}

/// Outstanding bills bucketed by urgency. Buckets are disjoint: a bill
/// lands in the tightest window it fits.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DueSummary {
    pub due_7_days_count: i64,
    pub due_7_days_amount: i64,
    pub due_3_days_count: i64,
    pub due_3_days_amount: i64,
    pub due_1_day_count: i64,
    pub due_1_day_amount: i64,
    pub overdue_count: i64,
    pub overdue_amount: i64,
}

/// A bill for month M falls due on the last day of M.
pub fn due_date(month: MonthKey) -> NaiveDate {
    month.last_day()
}

/// Which reminder fires today, if any. The fixed-offset reminders fire on
/// exactly D-7, D-3 and D-1; overdue applies any day after the due date.
pub fn classify(month: MonthKey, today: NaiveDate) -> Option<&'static str> {
    let days_left = (due_date(month) - today).num_days();
    match days_left {
        7 => Some(REMINDER_7_DAYS),
        3 => Some(REMINDER_3_DAYS),
        1 => Some(REMINDER_1_DAY),
        left if left < 0 => Some(REMINDER_OVERDUE),
        _ => None,
    }
}

pub fn reminder_message(reminder_type: &str, tenant_name: &str, month: &str, outstanding: i64) -> String {
    match reminder_type {
        REMINDER_7_DAYS => format!(
            "Hi {tenant_name}, your rent for {month} (Rp {outstanding}) is due in 7 days."
        ),
        REMINDER_3_DAYS => format!(
            "Hi {tenant_name}, your rent for {month} (Rp {outstanding}) is due in 3 days."
        ),
        REMINDER_1_DAY => format!(
            "Hi {tenant_name}, your rent for {month} (Rp {outstanding}) is due tomorrow."
        ),
        _ => format!(
            "Hi {tenant_name}, your rent for {month} (Rp {outstanding}) is overdue. Please settle it as soon as possible."
        ),
    }
}

/// Build the notification drafts a check run would insert. Pure: the caller
/// supplies the bills still carrying a balance, the tenant roster and the
/// notifications already sent. One notification per (bill, reminder type).
pub fn plan_reminders(
    bills: &[Value],
    tenants: &[Value],
    existing_notifications: &[Value],
    today: NaiveDate,
) -> (Vec<Map<String, Value>>, u32) {
    let already_sent: std::collections::HashSet<(String, String)> = existing_notifications
        .iter()
        .map(|row| (val_str(row, "bill_id"), val_str(row, "reminder_type")))
        .collect();

    let mut drafts = Vec::new();
    let mut skipped = 0_u32;

    for bill in bills {
        if val_str(bill, "status") == STATUS_PAID {
            continue;
        }
        let Ok(month) = val_str(bill, "month").parse::<MonthKey>() else {
            continue;
        };
        let Some(reminder_type) = classify(month, today) else {
            continue;
        };

        let bill_id = val_str(bill, "id");
        if bill_id.is_empty() {
            continue;
        }
        if already_sent.contains(&(bill_id.clone(), reminder_type.to_string())) {
            skipped += 1;
            continue;
        }

        let tenant_id = val_str(bill, "tenant_id");
        let tenant_name = tenants
            .iter()
            .find(|tenant| val_str(tenant, "id") == tenant_id)
            .map(|tenant| val_str(tenant, "full_name"))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "tenant".to_string());
        let outstanding = (val_i64(bill, "amount_charged") - val_i64(bill, "amount_paid")).max(0);

        let mut draft = Map::new();
        draft.insert("tenant_id".into(), json!(tenant_id));
        draft.insert("bill_id".into(), json!(bill_id));
        draft.insert("reminder_type".into(), json!(reminder_type));
        draft.insert(
            "message".into(),
            json!(reminder_message(
                reminder_type,
                &tenant_name,
                &month.to_string(),
                outstanding
            )),
        );
        draft.insert("is_read".into(), json!(false));
        draft.insert("sent_date".into(), json!(today.to_string()));
        drafts.push(draft);
    }

    (drafts, skipped)
}

/// Fetch open bills, plan today's reminders and insert the new ones.
/// Safe to call repeatedly within a day.
pub async fn run_reminder_check(pool: &PgPool, today: NaiveDate) -> AppResult<ReminderRunResult> {
    let bills = table_service::list_rows(pool, "bills", None, 10_000, 0, "created_at", true).await?;
    let tenants =
        table_service::list_rows(pool, "tenants", None, 10_000, 0, "created_at", true).await?;
    let notifications =
        table_service::list_rows(pool, "notifications", None, 10_000, 0, "created_at", true).await?;

    let (drafts, mut skipped) = plan_reminders(&bills, &tenants, &notifications, today);
    let mut created = 0_u32;
    for draft in drafts {
        match table_service::create_row(pool, "notifications", &draft).await {
            Ok(_) => created += 1,
            Err(AppError::Conflict(_)) => skipped += 1,
            Err(error) => return Err(error),
        }
    }

    tracing::info!(created, skipped, date = %today, "reminder check completed");
    Ok(ReminderRunResult {
        created_notifications: created,
        skipped_notifications: skipped,
    })
}

pub fn due_summary(bills: &[Value], today: NaiveDate) -> DueSummary {
    let mut summary = DueSummary::default();

    for bill in bills {
        if val_str(bill, "status") == STATUS_PAID {
            continue;
        }
        let Ok(month) = val_str(bill, "month").parse::<MonthKey>() else {
            continue;
        };
        let outstanding = (val_i64(bill, "amount_charged") - val_i64(bill, "amount_paid")).max(0);
        match (due_date(month) - today).num_days() {
            left if left < 0 => {
                summary.overdue_count += 1;
                summary.overdue_amount += outstanding;
            }
            0..=1 => {
                summary.due_1_day_count += 1;
                summary.due_1_day_amount += outstanding;
            }
            2..=3 => {
                summary.due_3_days_count += 1;
                summary.due_3_days_amount += outstanding;
            }
            4..=7 => {
                summary.due_7_days_count += 1;
                summary.due_7_days_amount += outstanding;
            }
            _ => {}
        }
    }

    summary
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
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    use super::{
        classify, due_date, due_summary, plan_reminders, REMINDER_1_DAY, REMINDER_3_DAYS,
        REMINDER_7_DAYS, REMINDER_OVERDUE,
    };
    use crate::services::period::MonthKey;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn bill(id: &str, tenant_id: &str, month: &str, status: &str, charged: i64, paid: i64) -> Value {
        json!({
            "id": id,
            "tenant_id": tenant_id,
            "month": month,
            "status": status,
            "amount_charged": charged,
            "amount_paid": paid,
        })
    }

    #[test]
    fn due_date_is_the_last_day_of_the_month() {
        assert_eq!(due_date(MonthKey::new(2025, 2).expect("valid")), date(2025, 2, 28));
        assert_eq!(due_date(MonthKey::new(2024, 2).expect("valid")), date(2024, 2, 29));
        assert_eq!(due_date(MonthKey::new(2025, 1).expect("valid")), date(2025, 1, 31));
    }

    #[test]
    fn classify_fires_on_fixed_offsets_and_after_due() {
        let month = MonthKey::new(2025, 1).expect("valid"); // due 2025-01-31
        assert_eq!(classify(month, date(2025, 1, 24)), Some(REMINDER_7_DAYS));
        assert_eq!(classify(month, date(2025, 1, 28)), Some(REMINDER_3_DAYS));
        assert_eq!(classify(month, date(2025, 1, 30)), Some(REMINDER_1_DAY));
        assert_eq!(classify(month, date(2025, 1, 31)), None); // due day itself
        assert_eq!(classify(month, date(2025, 2, 1)), Some(REMINDER_OVERDUE));
        assert_eq!(classify(month, date(2025, 2, 20)), Some(REMINDER_OVERDUE));
        assert_eq!(classify(month, date(2025, 1, 10)), None);
    }

    #[test]
    fn planning_is_idempotent_per_bill_and_type() {
        let bills = vec![
            bill("b1", "t1", "2025-01", "unpaid", 500_000, 0),
            bill("b2", "t2", "2025-01", "paid", 500_000, 500_000),
        ];
        let tenants = vec![json!({ "id": "t1", "full_name": "Budi" })];
        let today = date(2025, 1, 24);

        let (drafts, skipped) = plan_reminders(&bills, &tenants, &[], today);
        assert_eq!(drafts.len(), 1);
        assert_eq!(skipped, 0);
        assert_eq!(drafts[0]["reminder_type"], json!(REMINDER_7_DAYS));
        assert!(drafts[0]["message"]
            .as_str()
            .expect("message")
            .contains("Budi"));

        let sent = vec![json!({ "bill_id": "b1", "reminder_type": REMINDER_7_DAYS })];
        let (rerun, rerun_skipped) = plan_reminders(&bills, &tenants, &sent, today);
        assert!(rerun.is_empty());
        assert_eq!(rerun_skipped, 1);
    }

    #[test]
    fn overdue_repeats_daily_only_until_first_sent() {
        let bills = vec![bill("b1", "t1", "2025-01", "partial", 500_000, 200_000)];
        let sent = vec![json!({ "bill_id": "b1", "reminder_type": REMINDER_OVERDUE })];

        let (drafts, _) = plan_reminders(&bills, &[], &[], date(2025, 2, 5));
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0]["message"]
            .as_str()
            .expect("message")
            .contains("300000"));

        let (rerun, skipped) = plan_reminders(&bills, &[], &sent, date(2025, 2, 6));
        assert!(rerun.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn due_summary_buckets_are_disjoint() {
        let bills = vec![
            bill("b1", "t1", "2025-01", "unpaid", 500_000, 0), // due 01-31: 6 days out
            bill("b2", "t2", "2025-01", "partial", 500_000, 200_000), // 6 days out, 300k open
            bill("b3", "t3", "2024-12", "unpaid", 400_000, 0), // overdue
            bill("b4", "t4", "2025-01", "paid", 500_000, 500_000), // never counted
        ];

        let summary = due_summary(&bills, date(2025, 1, 25));
        assert_eq!(summary.due_7_days_count, 2);
        assert_eq!(summary.due_7_days_amount, 800_000);
        assert_eq!(summary.due_3_days_count, 0);
        assert_eq!(summary.due_1_day_count, 0);
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.overdue_amount, 400_000);

        let tighter = due_summary(&bills, date(2025, 1, 30));
        assert_eq!(tighter.due_7_days_count, 0);
        assert_eq!(tighter.due_1_day_count, 2);
    }
}
