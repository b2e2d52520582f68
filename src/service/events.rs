//! Mutation requests and their outcomes

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{Difficulty, MistakeCategory, Track};

/// Postmortem as submitted; the service assigns the id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPostmortem {
    pub problem_id: String,
    #[serde(default)]
    pub problem_title: String,
    /// Defaults to today
    #[serde(default)]
    pub date: Option<NaiveDate>,
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

/// Mock interview as submitted; the service assigns the id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMockInterview {
    /// Defaults to today
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Minutes
    pub duration: u32,
    #[serde(default)]
    pub problems: Vec<String>,
    pub passed: bool,
    #[serde(default)]
    pub notes: String,
}

/// One queued state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    SetProfile {
        display_name: String,
        track: Track,
        language: String,
    },
    SetCurrentWeek(u32),
    SetCurrentDay(u32),
    CompleteWeek(u32),
    MarkProblemSolved {
        problem_id: String,
        difficulty: Difficulty,
        time_spent_secs: u64,
        first_attempt: bool,
    },
    MarkResolve {
        problem_id: String,
        success: bool,
    },
    AddPostmortem(NewPostmortem),
    AddMockInterview(NewMockInterview),
    LogDaily {
        energy_score: u8,
    },
    MarkDayComplete {
        week: u32,
        day: u32,
        completed: bool,
    },
    MarkVideoWatched {
        resource_id: String,
        watched: bool,
    },
    ClearNotifications,
}

/// What a mutation did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    /// False when the record was left as it was and nothing was persisted
    pub changed: bool,
    pub leveled_up: Option<u32>,
    /// In catalogue order
    pub unlocked: Vec<String>,
}

impl MutationOutcome {
    pub fn unchanged() -> Self {
        Self::default()
    }
}
