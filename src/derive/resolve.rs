//! Spaced-repetition scheduling for re-solves

use chrono::{Days, NaiveDate};

use crate::store::ProgressRecord;

/// Days until the first re-solve after a solve
pub const FIRST_RESOLVE_DAYS: u64 = 3;

/// Days until each later re-solve
// Older product copy says "48-72 hours" and "3-4 weeks"; the intervals are fixed.
pub const LATER_RESOLVE_DAYS: u64 = 25;

/// Due date of the next re-solve
pub fn schedule_resolve(last_date: NaiveDate, resolve_count: usize) -> NaiveDate {
    let days = if resolve_count == 0 {
        FIRST_RESOLVE_DAYS
    } else {
        LATER_RESOLVE_DAYS
    };
    last_date
        .checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX)
}

/// Problems whose re-solve is due on or before `today`, in id order
pub fn due_resolves(record: &ProgressRecord, today: NaiveDate) -> Vec<String> {
    record
        .problem_records
        .iter()
        .filter(|(_, p)| p.next_resolve_due.is_some_and(|due| due <= today))
        .map(|(id, _)| id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProblemRecord;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn test_first_resolve_three_days_out() {
        assert_eq!(schedule_resolve(date(1, 30), 0), date(2, 2));
    }

    #[test]
    fn test_later_resolves_twenty_five_days_out() {
        assert_eq!(schedule_resolve(date(1, 1), 1), date(1, 26));
        assert_eq!(schedule_resolve(date(1, 1), 4), date(1, 26));
    }

    #[test]
    fn test_due_resolves_inclusive_of_today() {
        let mut record = ProgressRecord::default();
        for (id, due) in [("b", Some(date(3, 1))), ("a", Some(date(3, 2))), ("c", Some(date(3, 3))), ("d", None)] {
            record.problem_records.insert(
                id.into(),
                ProblemRecord {
                    solved: true,
                    next_resolve_due: due,
                    ..Default::default()
                },
            );
        }

        assert_eq!(due_resolves(&record, date(3, 2)), vec!["a", "b"]);
    }
}
