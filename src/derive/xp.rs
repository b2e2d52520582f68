//! XP rewards and the level curve
//!
//! One curve is used everywhere a level is computed or displayed:
//! leaving level `L` requires `floor(100 × 1.15^(L-1))` cumulative XP.

use serde::Serialize;

use crate::store::{Difficulty, ProgressRecord};

/// Level cap
pub const MAX_LEVEL: u32 = 50;

pub const XP_EASY: u64 = 5;
pub const XP_MEDIUM: u64 = 12;
pub const XP_HARD: u64 = 25;
pub const XP_RESOLVE: u64 = 8;
pub const XP_MOCK: u64 = 20;
pub const XP_POSTMORTEM: u64 = 5;
pub const XP_DAILY_GOAL: u64 = 10;
pub const XP_RESOURCE_WATCHED: u64 = 15;
pub const XP_FIRST_ATTEMPT_BONUS: u64 = 5;

/// XP for a first solve of a problem
pub fn solve_xp(difficulty: Difficulty, first_attempt: bool) -> u64 {
    let base = match difficulty {
        Difficulty::Easy => XP_EASY,
        Difficulty::Medium => XP_MEDIUM,
        Difficulty::Hard => XP_HARD,
    };
    if first_attempt {
        base + XP_FIRST_ATTEMPT_BONUS
    } else {
        base
    }
}

/// Cumulative XP needed to leave `level`
pub fn xp_threshold(level: u32) -> u64 {
    let exponent = f64::from(level.max(1) - 1);
    (100.0 * 1.15_f64.powf(exponent)).floor() as u64
}

/// Level reached with `xp` total experience
pub fn level_for(xp: u64) -> u32 {
    climb(1, xp)
}

fn climb(from: u32, xp: u64) -> u32 {
    let mut level = from.clamp(1, MAX_LEVEL);
    while level < MAX_LEVEL && xp >= xp_threshold(level) {
        level += 1;
    }
    level
}

/// Outcome of [`apply_xp`]
#[derive(Debug, Clone)]
pub struct XpGain {
    pub record: ProgressRecord,
    pub leveled_up: bool,
    pub new_level: Option<u32>,
}

/// Add experience and climb levels; levels never go down
pub fn apply_xp(record: ProgressRecord, amount: u64) -> XpGain {
    let previous = record.level;
    let xp = record.xp.saturating_add(amount);
    let level = climb(previous, xp);
    let leveled_up = level > previous;

    XpGain {
        record: ProgressRecord { xp, level, ..record },
        leveled_up,
        new_level: leveled_up.then_some(level),
    }
}

/// Display metadata for a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelInfo {
    pub level: u32,
    pub title: &'static str,
    /// XP at which this level was reached
    pub xp_floor: u64,
    /// XP at which the next level is reached (`None` at the cap)
    pub xp_next: Option<u64>,
}

pub fn level_title(level: u32) -> &'static str {
    match level {
        0..=5 => "Novice",
        6..=10 => "Apprentice",
        11..=15 => "Practitioner",
        16..=20 => "Adept",
        21..=25 => "Expert",
        26..=30 => "Master",
        31..=35 => "Grandmaster",
        36..=40 => "Legend",
        41..=45 => "Mythic",
        _ => "Transcendent",
    }
}

pub fn level_info(xp: u64) -> LevelInfo {
    let level = level_for(xp);
    LevelInfo {
        level,
        title: level_title(level),
        xp_floor: if level == 1 { 0 } else { xp_threshold(level - 1) },
        xp_next: (level < MAX_LEVEL).then(|| xp_threshold(level)),
    }
}
