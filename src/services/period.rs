use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::error::AppError;

/// A calendar month, canonically rendered as `"YYYY-MM"`.
///
/// Months are 1-based throughout; the zero-indexed representation some date
/// libraries use never leaks past this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::BadRequest(format!(
                "Month must be 1-12, got {month}."
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Shift by `n` months (negative allowed), rolling years as needed.
    pub fn add_months(self, n: i32) -> Self {
        let total = self.year as i64 * 12 + (self.month as i64 - 1) + n as i64;
        Self {
            year: total.div_euclid(12) as i32,
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    pub fn first_day(self) -> NaiveDate {
        // month is validated to 1-12, so this cannot fail
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(self.year, 1, 1).unwrap_or_default())
    }

    pub fn last_day(self) -> NaiveDate {
        self.add_months(1).first_day().pred_opt().unwrap_or_else(|| self.first_day())
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let invalid =
            || AppError::BadRequest(format!("Invalid month key '{trimmed}', expected YYYY-MM."));

        let (year_part, month_part) = trimmed.split_once('-').ok_or_else(invalid)?;
        if year_part.len() != 4 || month_part.len() != 2 {
            return Err(invalid());
        }
        let year = year_part.parse::<i32>().map_err(|_| invalid())?;
        let month = month_part.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

/// Lazy, finite, restartable (Clone) ascending range of month keys.
#[derive(Debug, Clone)]
pub struct MonthRange {
    next: Option<MonthKey>,
    last: MonthKey,
}

impl Iterator for MonthRange {
    type Item = MonthKey;

    fn next(&mut self) -> Option<MonthKey> {
        let current = self.next?;
        self.next = if current < self.last {
            Some(current.add_months(1))
        } else {
            None
        };
        Some(current)
    }
}

/// Months from the one containing `start` through the one containing
/// `end_inclusive`; empty when `start` is after `end_inclusive`.
pub fn months_between(start: NaiveDate, end_inclusive: NaiveDate) -> MonthRange {
    let first = MonthKey::from_date(start);
    let last = MonthKey::from_date(end_inclusive);
    MonthRange {
        next: (first <= last).then_some(first),
        last,
    }
}

/// The {previous, current, next} months around a reference date, used for
/// the tenant payment preview.
pub fn preview_window(reference: NaiveDate) -> [MonthKey; 3] {
    let current = MonthKey::from_date(reference);
    [current.add_months(-1), current, current.add_months(1)]
}

/// Month numbers (1-12) a tenant can be billed for in `selected_year`:
/// nothing before the move-in year, every month after it, and move-in month
/// through December within it.
pub fn months_to_show(move_in: NaiveDate, selected_year: i32) -> Vec<u32> {
    let entry_year = move_in.year();
    let entry_month = move_in.month();

    if selected_year < entry_year {
        Vec::new()
    } else if selected_year > entry_year {
        (1..=12).collect()
    } else {
        (entry_month..=12).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{months_between, months_to_show, preview_window, MonthKey};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn canonical_form_is_zero_padded() {
        let key: MonthKey = "2024-03".parse().expect("parse");
        assert_eq!(key.to_string(), "2024-03");
        assert_eq!(MonthKey::from_date(date(2024, 3, 15)).to_string(), "2024-03");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("2024-00".parse::<MonthKey>().is_err());
        assert!("2024-3".parse::<MonthKey>().is_err());
        assert!("24-03".parse::<MonthKey>().is_err());
        assert!("2024/03".parse::<MonthKey>().is_err());
        assert!("".parse::<MonthKey>().is_err());
    }

    #[test]
    fn add_months_rolls_over_year_boundaries() {
        let december = MonthKey::new(2024, 12).expect("valid");
        assert_eq!(december.add_months(1).to_string(), "2025-01");
        let january = MonthKey::new(2025, 1).expect("valid");
        assert_eq!(january.add_months(-1).to_string(), "2024-12");
        assert_eq!(january.add_months(-13).to_string(), "2023-12");
        assert_eq!(december.add_months(25).to_string(), "2027-01");
        assert_eq!(december.add_months(0), december);
    }

    #[test]
    fn last_day_handles_month_lengths() {
        assert_eq!(
            MonthKey::new(2024, 2).expect("valid").last_day(),
            date(2024, 2, 29)
        );
        assert_eq!(
            MonthKey::new(2024, 12).expect("valid").last_day(),
            date(2024, 12, 31)
        );
    }

    #[test]
    fn months_between_is_inclusive_and_ordered() {
        let range: Vec<String> = months_between(date(2024, 11, 20), date(2025, 2, 3))
            .map(|key| key.to_string())
            .collect();
        assert_eq!(range, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn months_between_is_empty_when_reversed_and_restartable() {
        assert_eq!(months_between(date(2025, 2, 1), date(2025, 1, 31)).count(), 0);

        let range = months_between(date(2025, 1, 1), date(2025, 3, 1));
        assert_eq!(range.clone().count(), 3);
        // cloning restarts the walk
        assert_eq!(range.count(), 3);

        let single = months_between(date(2025, 6, 1), date(2025, 6, 30));
        assert_eq!(single.map(|key| key.to_string()).collect::<Vec<_>>(), vec!["2025-06"]);
    }

    #[test]
    fn preview_window_spans_year_boundaries() {
        let window = preview_window(date(2025, 1, 10));
        assert_eq!(
            window.map(|key| key.to_string()),
            ["2024-12".to_string(), "2025-01".to_string(), "2025-02".to_string()]
        );
        let window = preview_window(date(2024, 12, 31));
        assert_eq!(
            window.map(|key| key.to_string()),
            ["2024-11".to_string(), "2024-12".to_string(), "2025-01".to_string()]
        );
    }

    #[test]
    fn months_to_show_cases() {
        let move_in = date(2024, 3, 15);
        assert_eq!(months_to_show(move_in, 2023), Vec::<u32>::new());
        assert_eq!(months_to_show(move_in, 2025), (1..=12).collect::<Vec<_>>());
        assert_eq!(
            months_to_show(move_in, 2024),
            vec![3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
        );
        // 13 - entry_month months in the entry year
        assert_eq!(months_to_show(move_in, 2024).len(), 13 - 3);
        assert_eq!(months_to_show(date(2024, 12, 1), 2024), vec![12]);
        assert_eq!(months_to_show(date(2024, 1, 1), 2024).len(), 12);
    }
}
