//! Topic mastery projection
//!
//! Recomputable at any time from `problem_records` and the catalogue.

use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::store::{MasteryTier, ProgressRecord, TopicMastery};

/// Tier for a topic's counters
pub fn mastery_tier(problems_solved: u32, resolves_completed: u32, first_attempt_rate: f64) -> MasteryTier {
    if problems_solved == 0 {
        MasteryTier::Unranked
    } else if problems_solved >= 5 && first_attempt_rate >= 0.8 && resolves_completed >= 3 {
        MasteryTier::Platinum
    } else if problems_solved >= 5 && first_attempt_rate >= 0.6 {
        MasteryTier::Gold
    } else if problems_solved >= 3 && resolves_completed >= 1 {
        MasteryTier::Silver
    } else {
        MasteryTier::Bronze
    }
}

#[derive(Default)]
struct Counters {
    solved: u32,
    resolves: u32,
    first_attempts: u32,
}

/// Rebuild `topic_mastery` from solved problems
///
/// Problems the catalogue does not know are skipped.
pub fn recompute_topic_mastery(record: ProgressRecord, catalog: &dyn Catalog) -> ProgressRecord {
    let mut counters: BTreeMap<String, Counters> = BTreeMap::new();

    for (problem_id, problem) in record.problem_records.iter().filter(|(_, p)| p.solved) {
        let Some(topic) = catalog.topic_of(problem_id) else {
            continue;
        };
        let entry = counters.entry(topic.to_string()).or_default();
        entry.solved += 1;
        entry.resolves += problem.successful_resolves() as u32;
        if problem.first_attempt_success {
            entry.first_attempts += 1;
        }
    }

    let topic_mastery = counters
        .into_iter()
        .map(|(topic, c)| {
            let rate = f64::from(c.first_attempts) / f64::from(c.solved);
            (
                topic,
                TopicMastery {
                    tier: mastery_tier(c.solved, c.resolves, rate),
                    problems_solved: c.solved,
                    resolves_completed: c.resolves,
                    first_attempt_rate: rate,
                },
            )
        })
        .collect();

    ProgressRecord {
        topic_mastery,
        ..record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::store::{ProblemRecord, ResolveAttempt};
    use chrono::Utc;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(mastery_tier(0, 10, 1.0), MasteryTier::Unranked);
        assert_eq!(mastery_tier(1, 0, 0.0), MasteryTier::Bronze);
        assert_eq!(mastery_tier(3, 1, 0.0), MasteryTier::Silver);
        assert_eq!(mastery_tier(5, 0, 0.6), MasteryTier::Gold);
        assert_eq!(mastery_tier(5, 3, 0.8), MasteryTier::Platinum);
        assert_eq!(mastery_tier(5, 2, 0.9), MasteryTier::Gold);
    }

    #[test]
    fn test_recompute_counts_solved_problems_per_topic() {
        let catalog = StaticCatalog::from_topics([
            ("arrays", vec!["a1", "a2", "a3"]),
            ("graphs", vec!["g1"]),
        ]);

        let mut record = ProgressRecord::default();
        let resolve = ResolveAttempt {
            date: Utc::now(),
            success: true,
        };
        for (id, first, resolves) in [("a1", true, 1), ("a2", false, 0), ("a3", true, 0)] {
            record.problem_records.insert(
                id.into(),
                ProblemRecord {
                    solved: true,
                    first_attempt_success: first,
                    resolves: vec![resolve.clone(); resolves],
                    ..Default::default()
                },
            );
        }
        record.problem_records.insert("g1".into(), ProblemRecord::default());
        record.problem_records.insert("unknown".into(), ProblemRecord {
            solved: true,
            ..Default::default()
        });

        let record = recompute_topic_mastery(record, &catalog);

        let arrays = &record.topic_mastery["arrays"];
        assert_eq!(arrays.problems_solved, 3);
        assert_eq!(arrays.resolves_completed, 1);
        assert!((arrays.first_attempt_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(arrays.tier, MasteryTier::Silver);
        assert!(!record.topic_mastery.contains_key("graphs"));
        assert_eq!(record.topic_mastery.len(), 1);
    }
}
