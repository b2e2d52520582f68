//! Achievement catalogue and unlock evaluation

use serde::Serialize;

use crate::error::{ProgressError, Result};
use crate::store::{MasteryTier, ProgressRecord};

/// Condition that unlocks an achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AchievementRule {
    SolvedAtLeast(usize),
    HardSolvedAtLeast(usize),
    StreakAtLeast(u32),
    MocksAtLeast(usize),
    AnyTopicAt(MasteryTier),
}

impl AchievementRule {
    pub fn is_satisfied(&self, record: &ProgressRecord) -> bool {
        match *self {
            AchievementRule::SolvedAtLeast(n) => record.solved_count() >= n,
            AchievementRule::HardSolvedAtLeast(n) => record.hard_solved_count() >= n,
            AchievementRule::StreakAtLeast(n) => record.streak.current_length >= n,
            AchievementRule::MocksAtLeast(n) => record.mock_interviews.len() >= n,
            AchievementRule::AnyTopicAt(tier) => {
                record.topic_mastery.values().any(|m| m.tier >= tier)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub rule: AchievementRule,
}

/// All achievements, in evaluation order
pub const ACHIEVEMENTS: &[Achievement] = &[
    Achievement {
        id: "first-blood",
        title: "First Blood",
        description: "Solve your first problem",
        rule: AchievementRule::SolvedAtLeast(1),
    },
    Achievement {
        id: "problems-10",
        title: "Double Digits",
        description: "Solve 10 problems",
        rule: AchievementRule::SolvedAtLeast(10),
    },
    Achievement {
        id: "problems-50",
        title: "Half Century",
        description: "Solve 50 problems",
        rule: AchievementRule::SolvedAtLeast(50),
    },
    Achievement {
        id: "problems-100",
        title: "Century Club",
        description: "Solve 100 problems",
        rule: AchievementRule::SolvedAtLeast(100),
    },
    Achievement {
        id: "first-hard",
        title: "Hard Mode",
        description: "Solve your first Hard problem",
        rule: AchievementRule::HardSolvedAtLeast(1),
    },
    Achievement {
        id: "streak-7",
        title: "Week Warrior",
        description: "7-day streak",
        rule: AchievementRule::StreakAtLeast(7),
    },
    Achievement {
        id: "streak-30",
        title: "Monthly Master",
        description: "30-day streak",
        rule: AchievementRule::StreakAtLeast(30),
    },
    Achievement {
        id: "first-mock",
        title: "Mock Initiate",
        description: "Complete first mock interview",
        rule: AchievementRule::MocksAtLeast(1),
    },
    Achievement {
        id: "mock-10",
        title: "Mock Veteran",
        description: "Complete 10 mock interviews",
        rule: AchievementRule::MocksAtLeast(10),
    },
    Achievement {
        id: "platinum",
        title: "Platinum Status",
        description: "Reach Platinum mastery in any topic",
        rule: AchievementRule::AnyTopicAt(MasteryTier::Platinum),
    },
];

/// Look up an achievement by id
pub fn achievement(id: &str) -> Result<&'static Achievement> {
    ACHIEVEMENTS
        .iter()
        .find(|a| a.id == id)
        .ok_or_else(|| ProgressError::UnknownAchievement(id.to_string()))
}

/// Outcome of [`evaluate_achievements`]
#[derive(Debug, Clone)]
pub struct AchievementUnlock {
    pub record: ProgressRecord,
    /// In catalogue order
    pub newly_unlocked: Vec<String>,
}

/// Unlock every achievement whose rule now holds and is not yet held
pub fn evaluate_achievements(record: ProgressRecord) -> AchievementUnlock {
    let newly_unlocked: Vec<String> = ACHIEVEMENTS
        .iter()
        .filter(|a| !record.has_achievement(a.id) && a.rule.is_satisfied(&record))
        .map(|a| a.id.to_string())
        .collect();

    if newly_unlocked.is_empty() {
        return AchievementUnlock {
            record,
            newly_unlocked,
        };
    }

    let mut achievements = record.achievements.clone();
    achievements.extend(newly_unlocked.iter().cloned());

    AchievementUnlock {
        record: ProgressRecord {
            achievements,
            ..record
        },
        newly_unlocked,
    }
}
