use chrono::NaiveDate;
use serde_json::Value;

use crate::services::billing::STATUS_PAID;
use crate::services::period::MonthKey;

pub const KIND_INCOME: &str = "income";
pub const KIND_EXPENSE: &str = "expense";

#[derive(Debug, Clone, serde::Serialize)]
pub struct MonthlyReportRow {
    pub month: String,
    pub income: i64,
    pub expense: i64,
    pub net_profit: i64,
    pub paid_bill_count: i64,
    pub unpaid_bill_count: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OccupancySnapshot {
    pub occupied_room_count: i64,
    pub total_room_count: i64,
    pub occupancy_rate: f64,
    pub insufficient_data: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct YearlyReport {
    pub period: String,
    pub total_income: i64,
    pub total_expense: i64,
    pub net_profit: i64,
    pub total_paid_bills: i64,
    pub total_unpaid_bills: i64,
    #[serde(flatten)]
    pub occupancy: OccupancySnapshot,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerEntry {
    pub kind: String,
    pub description: String,
    pub amount: i64,
    pub date: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CashFlowRow {
    pub month: String,
    pub estimated_income: i64,
    pub estimated_expense: i64,
    pub net_projection: i64,
}

/// One row per calendar month of `year`: transaction sums by kind plus
/// bill counts by status, each bucketed into its own month.
pub fn monthly_report(year: i32, transactions: &[Value], bills: &[Value]) -> Vec<MonthlyReportRow> {
    (1..=12)
        .filter_map(|month| MonthKey::new(year, month).ok())
        .map(|key| {
            let month_key = key.to_string();

            let mut income = 0_i64;
            let mut expense = 0_i64;
            for transaction in transactions {
                if transaction_month(transaction).as_deref() != Some(month_key.as_str()) {
                    continue;
                }
                match val_str(transaction, "kind").as_str() {
                    KIND_INCOME => income += val_i64(transaction, "amount"),
                    KIND_EXPENSE => expense += val_i64(transaction, "amount"),
                    _ => {}
                }
            }

            let mut paid = 0_i64;
            let mut unpaid = 0_i64;
            for bill in bills {
                if val_str(bill, "month") != month_key {
                    continue;
                }
                if val_str(bill, "status") == STATUS_PAID {
                    paid += 1;
                } else {
                    unpaid += 1;
                }
            }

            MonthlyReportRow {
                month: month_key,
                income,
                expense,
                net_profit: income - expense,
                paid_bill_count: paid,
                unpaid_bill_count: unpaid,
            }
        })
        .collect()
}

/// Yearly totals are exactly the sum of the 12 monthly rows, plus a
/// point-in-time room occupancy snapshot.
pub fn yearly_report(
    year: i32,
    transactions: &[Value],
    bills: &[Value],
    rooms: &[Value],
) -> YearlyReport {
    let months = monthly_report(year, transactions, bills);

    YearlyReport {
        period: year.to_string(),
        total_income: months.iter().map(|row| row.income).sum(),
        total_expense: months.iter().map(|row| row.expense).sum(),
        net_profit: months.iter().map(|row| row.net_profit).sum(),
        total_paid_bills: months.iter().map(|row| row.paid_bill_count).sum(),
        total_unpaid_bills: months.iter().map(|row| row.unpaid_bill_count).sum(),
        occupancy: occupancy_snapshot(rooms),
    }
}

/// Occupancy with an explicit zero-room guard: the rate is 0 and the
/// snapshot carries an `insufficient_data` flag rather than a masked
/// denominator.
pub fn occupancy_snapshot(rooms: &[Value]) -> OccupancySnapshot {
    let total = rooms.len() as i64;
    let occupied = rooms
        .iter()
        .filter(|room| val_str(room, "status") == "occupied")
        .count() as i64;

    let (rate, insufficient) = if total == 0 {
        (0.0, true)
    } else {
        (occupied as f64 / total as f64, false)
    };

    OccupancySnapshot {
        occupied_room_count: occupied,
        total_room_count: total,
        occupancy_rate: round4(rate),
        insufficient_data: insufficient,
    }
}

/// Flat income/expense ledger over a date range: paid bills enter by their
/// payment date, transactions by their transaction date.
pub fn detail_report(
    from: NaiveDate,
    to: NaiveDate,
    bills: &[Value],
    transactions: &[Value],
) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();

    for bill in bills {
        if val_str(bill, "status") != STATUS_PAID {
            continue;
        }
        let Some(paid_on) = parse_date(&val_str(bill, "payment_date")) else {
            continue;
        };
        if paid_on < from || paid_on > to {
            continue;
        }
        entries.push(LedgerEntry {
            kind: KIND_INCOME.to_string(),
            description: format!("Bill payment - {}", val_str(bill, "month")),
            amount: val_i64(bill, "amount_paid"),
            date: paid_on.to_string(),
        });
    }

    for transaction in transactions {
        let Some(on) = parse_date(&val_str(transaction, "transaction_date")) else {
            continue;
        };
        if on < from || on > to {
            continue;
        }
        let category = val_str(transaction, "category");
        entries.push(LedgerEntry {
            kind: val_str(transaction, "kind"),
            description: if category.is_empty() {
                "Uncategorized".to_string()
            } else {
                category
            },
            amount: val_i64(transaction, "amount"),
            date: on.to_string(),
        });
    }

    entries.sort_by(|left, right| left.date.cmp(&right.date));
    entries
}

/// Naive forward projection. Deterministic given the snapshots it is fed:
/// estimated income is the sum of occupied-room prices (rent roll),
/// estimated expense is the average of expense transactions over the
/// `expense_window_months` months before `start`. Both are held constant
/// across the horizon.
pub fn cash_flow_projection(
    start: MonthKey,
    months_ahead: u32,
    expense_window_months: u32,
    rooms: &[Value],
    transactions: &[Value],
) -> Vec<CashFlowRow> {
    let estimated_income: i64 = rooms
        .iter()
        .filter(|room| val_str(room, "status") == "occupied")
        .map(|room| val_i64(room, "monthly_price"))
        .sum();

    let window = expense_window_months.max(1);
    let window_keys: Vec<String> = (1..=window)
        .map(|back| start.add_months(-(back as i32)).to_string())
        .collect();
    let window_total: i64 = transactions
        .iter()
        .filter(|transaction| val_str(transaction, "kind") == KIND_EXPENSE)
        .filter(|transaction| {
            transaction_month(transaction)
                .is_some_and(|month| window_keys.contains(&month))
        })
        .map(|transaction| val_i64(transaction, "amount"))
        .sum();
    let estimated_expense = window_total / window as i64;

    (0..months_ahead)
        .map(|offset| {
            let month = start.add_months(offset as i32);
            CashFlowRow {
                month: month.to_string(),
                estimated_income,
                estimated_expense,
                net_projection: estimated_income - estimated_expense,
            }
        })
        .collect()
}

/// Month key -> paid revenue, ascending, for the dashboard chart.
pub fn revenue_by_month(bills: &[Value]) -> Vec<(String, i64)> {
    let mut totals: std::collections::BTreeMap<String, i64> = std::collections::BTreeMap::new();
    for bill in bills {
        if val_str(bill, "status") != STATUS_PAID {
            continue;
        }
        let month = val_str(bill, "month");
        if month.is_empty() {
            continue;
        }
        *totals.entry(month).or_insert(0) += val_i64(bill, "amount_paid");
    }
    totals.into_iter().collect()
}

fn transaction_month(transaction: &Value) -> Option<String> {
    parse_date(&val_str(transaction, "transaction_date"))
        .map(|date| MonthKey::from_date(date).to_string())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
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
        cash_flow_projection, detail_report, monthly_report, occupancy_snapshot, revenue_by_month,
        yearly_report,
    };
    use crate::services::period::MonthKey;

    fn transaction(kind: &str, amount: i64, date: &str) -> Value {
        json!({ "kind": kind, "category": "listrik", "amount": amount, "transaction_date": date })
    }

    fn bill(month: &str, status: &str, paid: i64, payment_date: Option<&str>) -> Value {
        json!({
            "tenant_id": "t1",
            "month": month,
            "amount_charged": 500_000,
            "amount_paid": paid,
            "status": status,
            "payment_date": payment_date,
        })
    }

    fn room(status: &str, price: i64) -> Value {
        json!({ "status": status, "monthly_price": price })
    }

    #[test]
    fn monthly_rows_bucket_by_month() {
        let transactions = vec![
            transaction("income", 100_000, "2025-01-05"),
            transaction("expense", 40_000, "2025-01-20"),
            transaction("expense", 60_000, "2025-02-02"),
            transaction("income", 999_999, "2024-12-31"), // other year, ignored
        ];
        let bills = vec![
            bill("2025-01", "paid", 500_000, Some("2025-01-10")),
            bill("2025-01", "unpaid", 0, None),
            bill("2025-02", "partial", 100_000, Some("2025-02-12")),
        ];

        let rows = monthly_report(2025, &transactions, &bills);
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].month, "2025-01");
        assert_eq!(rows[0].income, 100_000);
        assert_eq!(rows[0].expense, 40_000);
        assert_eq!(rows[0].net_profit, 60_000);
        assert_eq!(rows[0].paid_bill_count, 1);
        assert_eq!(rows[0].unpaid_bill_count, 1);
        // partial counts as not-yet-paid
        assert_eq!(rows[1].unpaid_bill_count, 1);
        assert_eq!(rows[1].expense, 60_000);
        assert!(rows[2..].iter().all(|row| row.income == 0 && row.expense == 0));
    }

    #[test]
    fn yearly_totals_equal_monthly_sums() {
        let transactions = vec![
            transaction("income", 100_000, "2025-01-05"),
            transaction("income", 250_000, "2025-06-15"),
            transaction("expense", 75_000, "2025-06-20"),
            transaction("expense", 20_000, "2025-12-31"),
        ];
        let bills = vec![
            bill("2025-01", "paid", 500_000, Some("2025-01-10")),
            bill("2025-06", "unpaid", 0, None),
        ];
        let rooms = vec![room("occupied", 500_000), room("available", 450_000)];

        let months = monthly_report(2025, &transactions, &bills);
        let year = yearly_report(2025, &transactions, &bills, &rooms);

        assert_eq!(year.total_income, months.iter().map(|r| r.income).sum::<i64>());
        assert_eq!(year.total_expense, months.iter().map(|r| r.expense).sum::<i64>());
        assert_eq!(year.net_profit, year.total_income - year.total_expense);
        assert_eq!(year.total_paid_bills, 1);
        assert_eq!(year.total_unpaid_bills, 1);
        assert_eq!(year.occupancy.occupied_room_count, 1);
        assert_eq!(year.occupancy.total_room_count, 2);
    }

    #[test]
    fn occupancy_is_guarded_and_bounded() {
        let empty = occupancy_snapshot(&[]);
        assert_eq!(empty.occupancy_rate, 0.0);
        assert!(empty.insufficient_data);

        let rooms = vec![
            room("occupied", 1),
            room("occupied", 1),
            room("available", 1),
            room("under_repair", 1),
        ];
        let snapshot = occupancy_snapshot(&rooms);
        assert_eq!(snapshot.occupancy_rate, 0.5);
        assert!(!snapshot.insufficient_data);
        assert!((0.0..=1.0).contains(&snapshot.occupancy_rate));
    }

    #[test]
    fn detail_report_respects_the_date_range() {
        let bills = vec![
            bill("2025-01", "paid", 500_000, Some("2025-01-10")),
            bill("2024-12", "paid", 500_000, Some("2024-12-28")), // before range
            bill("2025-01", "unpaid", 0, None),                   // never listed
        ];
        let transactions = vec![
            transaction("expense", 40_000, "2025-01-20"),
            transaction("expense", 40_000, "2025-03-01"), // after range
        ];

        let from = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");
        let to = NaiveDate::from_ymd_opt(2025, 1, 31).expect("date");
        let entries = detail_report(from, to, &bills, &transactions);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, "income");
        assert_eq!(entries[0].amount, 500_000);
        assert_eq!(entries[1].kind, "expense");
        assert_eq!(entries[1].description, "listrik");
    }

    #[test]
    fn projection_is_deterministic_and_rolls_years() {
        let rooms = vec![
            room("occupied", 500_000),
            room("occupied", 700_000),
            room("available", 450_000),
        ];
        let transactions = vec![
            transaction("expense", 90_000, "2024-10-05"),
            transaction("expense", 60_000, "2024-11-12"),
            transaction("expense", 30_000, "2024-12-20"),
            transaction("income", 999_999, "2024-12-20"), // income never enters the expense window
        ];

        let start = MonthKey::new(2025, 1).expect("valid");
        let rows = cash_flow_projection(start, 6, 3, &rooms, &transactions);

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].month, "2025-01");
        assert_eq!(rows[5].month, "2025-06");
        assert!(rows.iter().all(|row| row.estimated_income == 1_200_000));
        assert!(rows.iter().all(|row| row.estimated_expense == 60_000));
        assert!(rows.iter().all(|row| row.net_projection == 1_140_000));

        let again = cash_flow_projection(start, 6, 3, &rooms, &transactions);
        assert_eq!(rows[0].net_projection, again[0].net_projection);
    }

    #[test]
    fn revenue_series_sums_paid_bills_per_month() {
        let bills = vec![
            bill("2025-01", "paid", 500_000, Some("2025-01-10")),
            bill("2025-01", "paid", 700_000, Some("2025-01-11")),
            bill("2025-02", "paid", 500_000, Some("2025-02-09")),
            bill("2025-02", "unpaid", 0, None),
        ];
        let series = revenue_by_month(&bills);
        assert_eq!(
            series,
            vec![
                ("2025-01".to_string(), 1_200_000),
                ("2025-02".to_string(), 500_000)
            ]
        );
    }
}
