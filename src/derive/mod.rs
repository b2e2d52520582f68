//! Derivation Engine - pure functions over a [`ProgressRecord`]
//!
//! Each function takes the record by value and returns the next one. None of
//! them read the clock; `today` is always passed in by the caller.
//!
//! [`ProgressRecord`]: crate::store::ProgressRecord

pub mod achievements;
pub mod mastery;
pub mod resolve;
pub mod streak;
pub mod xp;

pub use achievements::{achievement, evaluate_achievements, Achievement, AchievementRule, AchievementUnlock, ACHIEVEMENTS};
pub use mastery::{mastery_tier, recompute_topic_mastery};
pub use resolve::{due_resolves, schedule_resolve};
pub use streak::advance_streak;
pub use xp::{apply_xp, level_for, level_info, xp_threshold, LevelInfo, XpGain, MAX_LEVEL};
