//! Daily activity streak
//!
//! Days are compared as calendar dates (UTC), not elapsed hours: activity at
//! 23:59 and again at 00:01 counts as two consecutive days.

use chrono::NaiveDate;

use crate::store::{ProgressRecord, Streak};

/// Record activity on `today`
///
/// - first activity starts a streak of 1
/// - same day (or a clock that moved backwards) changes nothing
/// - the next day extends the streak
/// - a longer gap restarts at 1 unless `freeze_until` covered the missed days
pub fn advance_streak(record: ProgressRecord, today: NaiveDate) -> ProgressRecord {
    let streak = &record.streak;

    let next = match streak.last_active_date {
        None => Streak {
            current_length: 1,
            longest_length: streak.longest_length.max(1),
            last_active_date: Some(today),
            ..streak.clone()
        },
        Some(last) => {
            let gap = (today - last).num_days();
            if gap <= 0 {
                return record;
            }

            let continues = gap == 1 || frozen_through(streak, today);
            if continues {
                let current = streak.current_length + 1;
                Streak {
                    current_length: current,
                    longest_length: streak.longest_length.max(current),
                    last_active_date: Some(today),
                    ..streak.clone()
                }
            } else {
                Streak {
                    current_length: 1,
                    last_active_date: Some(today),
                    ..streak.clone()
                }
            }
        }
    };

    ProgressRecord {
        streak: next,
        ..record
    }
}

/// A freeze protects every day up to and including yesterday
fn frozen_through(streak: &Streak, today: NaiveDate) -> bool {
    match (streak.freeze_until, today.pred_opt()) {
        (Some(until), Some(yesterday)) => until >= yesterday,
        _ => false,
    }
}
