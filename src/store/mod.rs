//! Progress Store - the versioned, serializable user record
//!
//! Pure data: types, (de)serialization, migration. No I/O.

mod migrate;
mod record;

pub use migrate::{migrate, normalize};
pub use record::*;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Serialize a record to its persisted JSON form
pub fn serialize(record: &ProgressRecord) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Parse a persisted record, migrating older layouts
///
/// Only fails when `raw` is not JSON at all; structural damage inside the
/// document is repaired by [`migrate`].
pub fn deserialize(raw: &str) -> Result<ProgressRecord> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(migrate(value))
}

/// Pretty-printed backup stamped with the export time
pub fn export_json(record: &ProgressRecord, now: DateTime<Utc>) -> Result<String> {
    let mut exported = record.clone();
    exported.exported_at = Some(now);
    Ok(serde_json::to_string_pretty(&exported)?)
}

/// Parse a user-supplied backup
pub fn import_json(raw: &str) -> Result<ProgressRecord> {
    deserialize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn populated_record() -> ProgressRecord {
        let mut record = ProgressRecord::default();
        record.profile.display_name = "Grace".into();
        record.profile.start_date = Some(Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap());
        record.completed_weeks.insert(1);
        record.completed_days.entry(1).or_default().extend([1, 2]);
        record.watched_resources.insert("sliding-window".into(), true);
        record.xp = 57;
        record.level = crate::derive::xp::level_for(57);
        record.streak = Streak {
            current_length: 2,
            longest_length: 5,
            last_active_date: NaiveDate::from_ymd_opt(2024, 2, 3),
            freeze_until: None,
        };
        record.achievements = vec!["first-blood".into(), "first-hard".into()];
        record.problem_records.insert(
            "lru-cache".into(),
            ProblemRecord {
                solved: true,
                solved_at: Some(Utc.with_ymd_and_hms(2024, 2, 3, 18, 45, 12).unwrap()),
                attempt_count: 2,
                time_spent: 2400,
                difficulty: Difficulty::Hard,
                first_attempt_success: false,
                resolves: vec![ResolveAttempt {
                    date: Utc.with_ymd_and_hms(2024, 2, 6, 7, 0, 0).unwrap(),
                    success: true,
                }],
                next_resolve_due: NaiveDate::from_ymd_opt(2024, 3, 2),
            },
        );
        record.mock_interviews.push(MockInterview {
            id: "mock-1".into(),
            date: NaiveDate::from_ymd_opt(2024, 2, 4).unwrap(),
            duration: 45,
            problems: vec!["lru-cache".into()],
            passed: true,
            notes: "ok".into(),
        });
        let date = NaiveDate::from_ymd_opt(2024, 2, 3).unwrap();
        record.daily_logs.insert(
            date,
            DailyLog {
                date,
                problems_solved: 1,
                time_spent: 2400,
                energy_score: 7,
                streak_maintained: true,
            },
        );
        record.topic_mastery.insert(
            "design".into(),
            TopicMastery {
                tier: MasteryTier::Bronze,
                problems_solved: 1,
                resolves_completed: 1,
                first_attempt_rate: 0.0,
            },
        );
        record
    }

    #[test]
    fn test_serialize_deserialize_is_lossless() {
        let record = populated_record();
        let raw = serialize(&record).unwrap();
        assert_eq!(deserialize(&raw).unwrap(), record);
    }

    #[test]
    fn test_fractional_mastery_rates_survive_round_trip() {
        let mut record = populated_record();
        for n in 1..=60u32 {
            for k in 0..=n {
                record.topic_mastery.insert(
                    format!("topic-{}-{}", k, n),
                    TopicMastery {
                        tier: MasteryTier::Silver,
                        problems_solved: n,
                        resolves_completed: 1,
                        first_attempt_rate: f64::from(k) / f64::from(n),
                    },
                );
            }
        }

        let raw = serialize(&record).unwrap();
        let back = deserialize(&raw).unwrap();
        assert_eq!(back.topic_mastery["topic-1-11"].first_attempt_rate, 1.0 / 11.0);
        assert_eq!(back, record);
    }

    #[test]
    fn test_persisted_document_is_tagged() {
        let raw = serialize(&ProgressRecord::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(value["cursor"]["currentDay"], 1);
    }

    #[test]
    fn test_export_stamps_time_and_imports_back() {
        let record = populated_record();
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap();

        let exported = export_json(&record, now).unwrap();
        let imported = import_json(&exported).unwrap();

        assert_eq!(imported.exported_at, Some(now));
        assert_eq!(imported.problem_records, record.problem_records);
    }

    #[test]
    fn test_import_rejects_non_json() {
        assert!(import_json("definitely not json").is_err());
    }
}
