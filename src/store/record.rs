//! Progress record - the durable aggregate of one user's learning state

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current persisted schema tag
pub const SCHEMA_VERSION: &str = "3.0";

/// Study track length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Track {
    #[default]
    #[serde(rename = "2-week")]
    TwoWeek,
    #[serde(rename = "3-week")]
    ThreeWeek,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::TwoWeek => "2-week",
            Track::ThreeWeek => "3-week",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "2-week" => Some(Track::TwoWeek),
            "3-week" => Some(Track::ThreeWeek),
            _ => None,
        }
    }
}

/// Problem difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Where a postmortem says the attempt went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MistakeCategory {
    #[default]
    Pattern,
    Implementation,
    Tests,
    Language,
}

/// Derived per-topic rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MasteryTier {
    #[default]
    Unranked,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl MasteryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryTier::Unranked => "unranked",
            MasteryTier::Bronze => "bronze",
            MasteryTier::Silver => "silver",
            MasteryTier::Gold => "gold",
            MasteryTier::Platinum => "platinum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub track_preference: Track,
    pub language_preference: String,
    /// Set once by the first profile write, never changed afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
}

/// Last visited position in the curriculum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub current_week: u32,
    pub current_day: u32,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            current_week: 0,
            current_day: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub current_length: u32,
    pub longest_length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAttempt {
    pub date: DateTime<Utc>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRecord {
    pub solved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    /// Seconds
    pub time_spent: u64,
    pub difficulty: Difficulty,
    /// Fixed by the first solve
    pub first_attempt_success: bool,
    #[serde(default)]
    pub resolves: Vec<ResolveAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_resolve_due: Option<NaiveDate>,
}

impl ProblemRecord {
    pub fn successful_resolves(&self) -> usize {
        self.resolves.iter().filter(|r| r.success).count()
    }
}

/// Structured reflection on a problem attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Postmortem {
    pub id: String,
    pub problem_id: String,
    #[serde(default)]
    pub problem_title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub first_attempt: String,
    #[serde(default)]
    pub where_i_froze: String,
    #[serde(default)]
    pub correct_idea: String,
    #[serde(default)]
    pub time_complexity: String,
    #[serde(default)]
    pub space_complexity: String,
    #[serde(default)]
    pub edge_cases: String,
    #[serde(default)]
    pub mistake_category: MistakeCategory,
    #[serde(default)]
    pub resolve_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockInterview {
    pub id: String,
    pub date: NaiveDate,
    /// Minutes
    pub duration: u32,
    #[serde(default)]
    pub problems: Vec<String>,
    pub passed: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    pub date: NaiveDate,
    pub problems_solved: u32,
    /// Seconds
    pub time_spent: u64,
    pub energy_score: u8,
    pub streak_maintained: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TopicMastery {
    pub tier: MasteryTier,
    pub problems_solved: u32,
    pub resolves_completed: u32,
    pub first_attempt_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub sound_enabled: bool,
    pub notifications_enabled: bool,
    pub pomodoro_minutes: u32,
    pub break_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            notifications_enabled: true,
            pomodoro_minutes: 50,
            break_minutes: 10,
        }
    }
}

/// Root aggregate of all durable user state
///
/// Owned by one identity at a time. Mutated only through
/// [`ProgressService`](crate::service::ProgressService); `level` is always
/// `level_for(xp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    pub profile: Profile,
    pub cursor: Cursor,
    pub completed_weeks: BTreeSet<u32>,
    pub completed_days: BTreeMap<u32, BTreeSet<u32>>,
    pub watched_resources: BTreeMap<String, bool>,
    pub xp: u64,
    pub level: u32,
    pub streak: Streak,
    /// Unique, in unlock order
    pub achievements: Vec<String>,
    pub problem_records: BTreeMap<String, ProblemRecord>,
    pub postmortems: Vec<Postmortem>,
    pub mock_interviews: Vec<MockInterview>,
    pub daily_logs: BTreeMap<NaiveDate, DailyLog>,
    pub topic_mastery: BTreeMap<String, TopicMastery>,
    pub settings: Settings,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            exported_at: None,
            profile: Profile {
                language_preference: "python".to_string(),
                ..Default::default()
            },
            cursor: Cursor::default(),
            completed_weeks: BTreeSet::new(),
            completed_days: BTreeMap::new(),
            watched_resources: BTreeMap::new(),
            xp: 0,
            level: 1,
            streak: Streak::default(),
            achievements: Vec::new(),
            problem_records: BTreeMap::new(),
            postmortems: Vec::new(),
            mock_interviews: Vec::new(),
            daily_logs: BTreeMap::new(),
            topic_mastery: BTreeMap::new(),
            settings: Settings::default(),
        }
    }
}

impl ProgressRecord {
    pub fn solved_count(&self) -> usize {
        self.problem_records.values().filter(|p| p.solved).count()
    }

    pub fn hard_solved_count(&self) -> usize {
        self.problem_records
            .values()
            .filter(|p| p.solved && p.difficulty == Difficulty::Hard)
            .count()
    }

    /// Most recently unlocked achievement
    pub fn latest_achievement(&self) -> Option<&str> {
        self.achievements.last().map(String::as_str)
    }

    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.iter().any(|a| a == id)
    }

    /// Whether this record carries any earned progress
    pub fn has_progress(&self) -> bool {
        self.xp > 0
    }
}
