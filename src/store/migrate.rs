//! Schema migration with per-field coercion
//!
//! Accepts any JSON value and produces a record in the current schema.
//! Two layouts are understood:
//!
//! - current (`schemaVersion` tag, camelCase names, seconds)
//! - legacy `2.0` and earlier (`version` tag, `problems`, `watchedVideos`,
//!   top-level `currentWeek`/`currentDay`, daily logs as an array)
//!
//! `timeSpent` is seconds in every layout and is carried over unscaled.
//!
//! Wrong-typed scalars fall back to defaults; unparseable collection entries
//! are dropped with a warning and the rest of the collection survives.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::record::*;
use crate::derive::xp::level_for;

/// Migrate a raw document of unknown vintage into the current schema
pub fn migrate(raw: Value) -> ProgressRecord {
    let obj = match raw {
        Value::Object(obj) => obj,
        other => {
            warn!(kind = value_kind(&other), "Progress document is not an object, using defaults");
            return ProgressRecord::default();
        }
    };

    if obj.get("schemaVersion").and_then(Value::as_str) == Some(SCHEMA_VERSION) {
        match serde_json::from_value::<ProgressRecord>(Value::Object(obj.clone())) {
            Ok(record) => return normalize(record),
            Err(e) => debug!(error = %e, "Current-schema document failed strict parse, coercing fields"),
        }
    }

    if !obj.contains_key("schemaVersion") {
        let version = obj.get("version").and_then(serde_json::Value::as_str).unwrap_or("unknown");
        debug!(version, "Migrating legacy progress layout");
    }

    normalize(coerce(&obj))
}

/// Re-establish the record invariants after any load
pub fn normalize(mut record: ProgressRecord) -> ProgressRecord {
    record.schema_version = SCHEMA_VERSION.to_string();
    record.level = level_for(record.xp);
    if record.streak.longest_length < record.streak.current_length {
        record.streak.longest_length = record.streak.current_length;
    }
    let mut seen = BTreeSet::new();
    record.achievements.retain(|id| seen.insert(id.clone()));
    record
}

fn coerce(obj: &Map<String, Value>) -> ProgressRecord {
    let defaults = ProgressRecord::default();

    ProgressRecord {
        schema_version: SCHEMA_VERSION.to_string(),
        exported_at: as_datetime(field(obj, &["exportedAt"])),
        profile: coerce_profile(field(obj, &["profile"]), defaults.profile),
        cursor: coerce_cursor(obj),
        completed_weeks: as_array(field(obj, &["completedWeeks"]))
            .iter()
            .filter_map(|v| as_u32(Some(v)))
            .collect(),
        completed_days: coerce_completed_days(field(obj, &["completedDays"])),
        watched_resources: as_object(field(obj, &["watchedResources", "watchedVideos"]))
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| as_bool(Some(v)).map(|b| (k.clone(), b)))
                    .collect()
            })
            .unwrap_or_default(),
        xp: as_u64(field(obj, &["xp"])).unwrap_or(0),
        level: 1,
        streak: coerce_streak(field(obj, &["streak"])),
        achievements: as_array(field(obj, &["achievements"]))
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        problem_records: coerce_problems(field(obj, &["problemRecords", "problems"])),
        postmortems: coerce_list(field(obj, &["postmortems"]), "postmortem", coerce_postmortem),
        mock_interviews: coerce_list(field(obj, &["mockInterviews"]), "mock interview", coerce_mock),
        daily_logs: coerce_daily_logs(field(obj, &["dailyLogs"])),
        topic_mastery: coerce_topic_mastery(field(obj, &["topicMastery"])),
        settings: coerce_settings(field(obj, &["settings"])),
    }
}

fn coerce_profile(value: Option<&Value>, defaults: Profile) -> Profile {
    let Some(obj) = as_object(value) else {
        return defaults;
    };

    Profile {
        display_name: field(obj, &["displayName", "name"])
            .map(coerce_name)
            .unwrap_or_default(),
        track_preference: field(obj, &["trackPreference", "preferredTrack"])
            .and_then(Value::as_str)
            .and_then(Track::parse)
            .unwrap_or_default(),
        language_preference: field(obj, &["languagePreference", "language"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(defaults.language_preference),
        start_date: as_datetime(field(obj, &["startDate"])),
    }
}

/// A name that was once written as an object keeps its inner `name`
fn coerce_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(inner) => {
            warn!("Repairing corrupted profile name");
            inner.get("name").map(coerce_name).unwrap_or_default()
        }
        _ => String::new(),
    }
}

fn coerce_cursor(obj: &Map<String, Value>) -> Cursor {
    let defaults = Cursor::default();
    let source = as_object(field(obj, &["cursor"])).unwrap_or(obj);
    Cursor {
        current_week: as_u32(field(source, &["currentWeek"])).unwrap_or(defaults.current_week),
        current_day: as_u32(field(source, &["currentDay"])).unwrap_or(defaults.current_day),
    }
}

fn coerce_completed_days(value: Option<&Value>) -> BTreeMap<u32, BTreeSet<u32>> {
    let Some(obj) = as_object(value) else {
        return BTreeMap::new();
    };
    obj.iter()
        .filter_map(|(week, days)| {
            let week: u32 = week.parse().ok()?;
            let days = as_array(Some(days))
                .iter()
                .filter_map(|d| as_u32(Some(d)))
                .collect();
            Some((week, days))
        })
        .collect()
}

fn coerce_streak(value: Option<&Value>) -> Streak {
    let Some(obj) = as_object(value) else {
        return Streak::default();
    };
    Streak {
        current_length: as_u32(field(obj, &["currentLength", "current"])).unwrap_or(0),
        longest_length: as_u32(field(obj, &["longestLength", "longest"])).unwrap_or(0),
        last_active_date: as_date(field(obj, &["lastActiveDate"])),
        freeze_until: as_date(field(obj, &["freezeUntil", "frozenUntil"])),
    }
}

fn coerce_problems(value: Option<&Value>) -> BTreeMap<String, ProblemRecord> {
    let Some(obj) = as_object(value) else {
        return BTreeMap::new();
    };
    let mut problems = BTreeMap::new();
    for (id, entry) in obj {
        let Some(p) = entry.as_object() else {
            warn!(problem_id = %id, "Dropping malformed problem record");
            continue;
        };
        let resolves = as_array(field(p, &["resolves"]))
            .iter()
            .filter_map(|r| {
                let r = r.as_object()?;
                Some(ResolveAttempt {
                    date: as_datetime(field(r, &["date"]))?,
                    success: as_bool(field(r, &["success"])).unwrap_or(false),
                })
            })
            .collect();
        problems.insert(
            id.clone(),
            ProblemRecord {
                solved: as_bool(field(p, &["solved"])).unwrap_or(false),
                solved_at: as_datetime(field(p, &["solvedAt"])),
                attempt_count: as_u32(field(p, &["attemptCount", "attempts"])).unwrap_or(0),
                time_spent: as_u64(field(p, &["timeSpent"])).unwrap_or(0),
                difficulty: field(p, &["difficulty"])
                    .and_then(Value::as_str)
                    .and_then(Difficulty::parse)
                    .unwrap_or_default(),
                first_attempt_success: as_bool(field(p, &["firstAttemptSuccess"])).unwrap_or(false),
                resolves,
                next_resolve_due: as_date(field(
                    p,
                    &["nextResolveDue", "nextResolveDueDate", "nextResolveDate"],
                )),
            },
        );
    }
    problems
}

fn coerce_list<T>(
    value: Option<&Value>,
    what: &str,
    parse: fn(&Map<String, Value>) -> Option<T>,
) -> Vec<T> {
    as_array(value)
        .iter()
        .filter_map(|entry| {
            let parsed = entry.as_object().and_then(parse);
            if parsed.is_none() {
                warn!(entry = what, "Dropping malformed entry");
            }
            parsed
        })
        .collect()
}

fn coerce_postmortem(obj: &Map<String, Value>) -> Option<Postmortem> {
    Some(Postmortem {
        id: as_string(field(obj, &["id"]))?,
        problem_id: as_string(field(obj, &["problemId"]))?,
        problem_title: as_string(field(obj, &["problemTitle"])).unwrap_or_default(),
        date: as_date(field(obj, &["date"]))?,
        pattern: as_string(field(obj, &["pattern"])).unwrap_or_default(),
        first_attempt: as_string(field(obj, &["firstAttempt"])).unwrap_or_default(),
        where_i_froze: as_string(field(obj, &["whereIFroze"])).unwrap_or_default(),
        correct_idea: as_string(field(obj, &["correctIdea"])).unwrap_or_default(),
        time_complexity: as_string(field(obj, &["timeComplexity"])).unwrap_or_default(),
        space_complexity: as_string(field(obj, &["spaceComplexity"])).unwrap_or_default(),
        edge_cases: as_string(field(obj, &["edgeCases"])).unwrap_or_default(),
        mistake_category: field(obj, &["mistakeCategory"])
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        resolve_dates: as_array(field(obj, &["resolveDates"]))
            .iter()
            .filter_map(|d| as_date(Some(d)))
            .collect(),
    })
}

fn coerce_mock(obj: &Map<String, Value>) -> Option<MockInterview> {
    Some(MockInterview {
        id: as_string(field(obj, &["id"]))?,
        date: as_date(field(obj, &["date"]))?,
        duration: as_u32(field(obj, &["duration"])).unwrap_or(0),
        problems: as_array(field(obj, &["problems"]))
            .iter()
            .filter_map(|p| p.as_str().map(str::to_string))
            .collect(),
        passed: as_bool(field(obj, &["passed"])).unwrap_or(false),
        notes: as_string(field(obj, &["notes"])).unwrap_or_default(),
    })
}

fn coerce_daily_logs(value: Option<&Value>) -> BTreeMap<NaiveDate, DailyLog> {
    let parse = |key_date: Option<NaiveDate>, entry: &Value| -> Option<DailyLog> {
        let obj = entry.as_object()?;
        Some(DailyLog {
            date: as_date(field(obj, &["date"])).or(key_date)?,
            problems_solved: as_u32(field(obj, &["problemsSolved"])).unwrap_or(0),
            time_spent: as_u64(field(obj, &["timeSpent"])).unwrap_or(0),
            energy_score: as_u64(field(obj, &["energyScore"]))
                .map(|e| e.clamp(1, 10) as u8)
                .unwrap_or(1),
            streak_maintained: as_bool(field(obj, &["streakMaintained"])).unwrap_or(false),
        })
    };

    let mut logs = BTreeMap::new();
    match value {
        // Legacy array: later entries for the same date win
        Some(Value::Array(entries)) => {
            for entry in entries {
                match parse(None, entry) {
                    Some(log) => {
                        logs.insert(log.date, log);
                    }
                    None => warn!("Dropping malformed daily log"),
                }
            }
        }
        Some(Value::Object(entries)) => {
            for (key, entry) in entries {
                match parse(NaiveDate::parse_from_str(key, "%Y-%m-%d").ok(), entry) {
                    Some(log) => {
                        logs.insert(log.date, log);
                    }
                    None => warn!(date = %key, "Dropping malformed daily log"),
                }
            }
        }
        _ => {}
    }
    logs
}

fn coerce_topic_mastery(value: Option<&Value>) -> BTreeMap<String, TopicMastery> {
    let Some(obj) = as_object(value) else {
        return BTreeMap::new();
    };
    obj.iter()
        .filter_map(|(topic, entry)| {
            let m = entry.as_object()?;
            Some((
                topic.clone(),
                TopicMastery {
                    tier: field(m, &["tier", "level"])
                        .and_then(|v| serde_json::from_value(v.clone()).ok())
                        .unwrap_or_default(),
                    problems_solved: as_u32(field(m, &["problemsSolved"])).unwrap_or(0),
                    resolves_completed: as_u32(field(m, &["resolvesCompleted"])).unwrap_or(0),
                    first_attempt_rate: field(m, &["firstAttemptRate"])
                        .and_then(Value::as_f64)
                        .filter(|r| r.is_finite())
                        .map(|r| r.clamp(0.0, 1.0))
                        .unwrap_or(0.0),
                },
            ))
        })
        .collect()
}

fn coerce_settings(value: Option<&Value>) -> Settings {
    let defaults = Settings::default();
    let Some(obj) = as_object(value) else {
        return defaults;
    };
    Settings {
        sound_enabled: as_bool(field(obj, &["soundEnabled"])).unwrap_or(defaults.sound_enabled),
        notifications_enabled: as_bool(field(obj, &["notificationsEnabled"]))
            .unwrap_or(defaults.notifications_enabled),
        pomodoro_minutes: as_u32(field(obj, &["pomodoroMinutes", "pomodoroLength"]))
            .unwrap_or(defaults.pomodoro_minutes),
        break_minutes: as_u32(field(obj, &["breakMinutes", "breakLength"]))
            .unwrap_or(defaults.break_minutes),
    }
}

// ============================================================================
// Scalar coercion
// ============================================================================

/// First non-null value among a field's names
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn as_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value.and_then(Value::as_object)
}

fn as_array(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_bool(value: Option<&Value>) -> Option<bool> {
    value?.as_bool()
}

fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: Option<&Value>) -> Option<u32> {
    as_u64(value).and_then(|n| u32::try_from(n).ok())
}

/// `YYYY-MM-DD`, or the date part of an RFC 3339 timestamp
fn as_date(value: Option<&Value>) -> Option<NaiveDate> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc).date_naive()))
}

/// RFC 3339 timestamp, or a bare date taken as midnight UTC
fn as_datetime(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_document() -> Value {
        json!({
            "version": "2.0",
            "profile": {
                "name": { "name": "Ada" },
                "startDate": "2024-01-02T10:00:00.000Z",
                "preferredTrack": "3-week",
                "language": "rust"
            },
            "currentWeek": 2,
            "currentDay": 4,
            "completedWeeks": [0, 1],
            "completedDays": { "1": [1, 2, 3] },
            "watchedVideos": { "two-pointers": true },
            "xp": 130,
            "level": 1,
            "streak": { "current": 3, "longest": 2, "lastActiveDate": "2024-01-05" },
            "achievements": ["first-blood", "first-blood"],
            "problems": {
                "two-sum": {
                    "solved": true,
                    "solvedAt": "2024-01-05T08:30:00.000Z",
                    "attempts": 1,
                    "timeSpent": 900,
                    "difficulty": "easy",
                    "firstAttemptSuccess": true,
                    "resolves": [],
                    "nextResolveDate": "2024-01-08"
                },
                "broken": "not an object"
            },
            "postmortems": [],
            "mockInterviews": [],
            "dailyLogs": [
                { "date": "2024-01-05", "problemsSolved": 1, "timeSpent": 900, "energyScore": 6, "streakMaintained": true },
                { "date": "2024-01-05", "problemsSolved": 2, "timeSpent": 1800, "energyScore": 8, "streakMaintained": true }
            ],
            "topicMastery": {},
            "dailyQuests": { "date": "2024-01-05", "quests": [] },
            "settings": { "soundEnabled": false, "notificationsEnabled": true, "pomodoroLength": 25, "breakLength": 5 }
        })
    }

    #[test]
    fn test_legacy_layout_is_migrated() {
        let record = migrate(legacy_document());

        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert_eq!(record.profile.display_name, "Ada");
        assert_eq!(record.profile.track_preference, Track::ThreeWeek);
        assert_eq!(record.profile.language_preference, "rust");
        assert!(record.profile.start_date.is_some());
        assert_eq!(record.cursor, Cursor { current_week: 2, current_day: 4 });
        assert_eq!(record.watched_resources.get("two-pointers"), Some(&true));
        assert_eq!(record.completed_days[&1].len(), 3);
        assert_eq!(record.settings.pomodoro_minutes, 25);
        assert!(!record.settings.sound_enabled);
    }

    #[test]
    fn test_legacy_times_kept_as_seconds() {
        let record = migrate(legacy_document());
        let two_sum = &record.problem_records["two-sum"];
        assert_eq!(two_sum.time_spent, 900);
        assert_eq!(
            two_sum.next_resolve_due,
            NaiveDate::from_ymd_opt(2024, 1, 8)
        );

        let log = &record.daily_logs[&NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()];
        assert_eq!(log.problems_solved, 2, "last log for a date wins");
        assert_eq!(log.time_spent, 1800);
    }

    #[test]
    fn test_invariants_restored() {
        let record = migrate(legacy_document());

        // 130 xp clears the 100 and 114 thresholds
        assert_eq!(record.level, 3);
        assert_eq!(record.streak.longest_length, 3);
        assert_eq!(record.achievements, vec!["first-blood".to_string()]);
        assert!(!record.problem_records.contains_key("broken"));
    }

    #[test]
    fn test_corrupted_scalars_fall_back() {
        let record = migrate(json!({
            "version": "1.0",
            "profile": { "name": 42, "preferredTrack": { "x": 1 } },
            "xp": "not a number",
            "completedWeeks": "nope",
            "streak": [],
        }));

        assert_eq!(record.profile.display_name, "");
        assert_eq!(record.profile.track_preference, Track::TwoWeek);
        assert_eq!(record.xp, 0);
        assert_eq!(record.level, 1);
        assert!(record.completed_weeks.is_empty());
        assert_eq!(record.streak, Streak::default());
    }

    #[test]
    fn test_non_object_yields_default() {
        assert_eq!(migrate(json!([1, 2, 3])), ProgressRecord::default());
        assert_eq!(migrate(Value::Null), ProgressRecord::default());
    }

    #[test]
    fn test_current_schema_round_trips_through_migrate() {
        let mut record = ProgressRecord::default();
        record.xp = 340;
        record.level = level_for(340);
        record.achievements.push("first-blood".into());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(migrate(value), record);
    }
}
