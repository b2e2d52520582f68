//! Progress service: one owned record, every mutation as a method.
//!
//! Each mutation builds the next record from the current one, runs the
//! derivations in a fixed order, and commits. A commit that leaves the record
//! unchanged persists nothing. Otherwise the full record is written to the
//! local cache, and while attached, an upsert of the same snapshot is queued
//! for the remote store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use super::events::{Mutation, MutationOutcome, NewMockInterview, NewPostmortem};
use crate::cache::{LocalCache, Theme};
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::derive::xp::{
    solve_xp, XP_DAILY_GOAL, XP_MOCK, XP_POSTMORTEM, XP_RESOLVE, XP_RESOURCE_WATCHED,
};
use crate::derive::{
    advance_streak, apply_xp, due_resolves, evaluate_achievements, level_info, recompute_topic_mastery,
    schedule_resolve, LevelInfo,
};
use crate::error::{ProgressError, Result};
use crate::store::{
    self, DailyLog, Difficulty, MockInterview, Postmortem, ProblemRecord, Profile, ProgressRecord,
    ResolveAttempt, Track,
};
use crate::sync::{
    fetch_remote, FetchOutcome, FollowUp, Identity, ReconcileSource, ReconcileTicket, RemoteStore,
    RemoteWriter, SessionAction, SessionEvent, SyncCoordinator, SyncPhase, WriteKind,
};

/// Deadline for the reconcile fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ProgressService {
    record: ProgressRecord,
    cache: LocalCache,
    coordinator: SyncCoordinator,
    remote: Option<Arc<dyn RemoteStore>>,
    writer: Option<RemoteWriter>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    last_achievement: Option<String>,
    last_level_up: Option<u32>,
}

impl ProgressService {
    /// Start in guest mode from whatever the local cache holds
    pub fn new(cache: LocalCache, catalog: Arc<dyn Catalog>, clock: Arc<dyn Clock>) -> Self {
        let record = cache.load();
        Self {
            record,
            cache,
            coordinator: SyncCoordinator::new(),
            remote: None,
            writer: None,
            catalog,
            clock,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            last_achievement: None,
            last_level_up: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.writer = Some(RemoteWriter::new(Arc::clone(&remote), self.coordinator.epoch_counter()));
        self.remote = Some(remote);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    // ==================== Reads ====================

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn phase(&self) -> SyncPhase {
        self.coordinator.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.coordinator.is_loading()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.coordinator.identity()
    }

    pub fn last_achievement(&self) -> Option<&str> {
        self.last_achievement.as_deref()
    }

    pub fn last_level_up(&self) -> Option<u32> {
        self.last_level_up
    }

    pub fn level_info(&self) -> LevelInfo {
        level_info(self.record.xp)
    }

    /// Problem ids whose re-solve is due today or earlier
    pub fn due_resolves(&self) -> Vec<String> {
        due_resolves(&self.record, self.clock.today())
    }

    pub fn theme(&self) -> Theme {
        self.cache.load_theme()
    }

    pub fn set_theme(&self, theme: Theme) {
        self.cache.save_theme(theme);
    }

    pub fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote.clone()
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Pretty JSON of the current record, stamped with the export time
    pub fn export(&self) -> Result<String> {
        store::export_json(&self.record, self.clock.now())
    }

    // ==================== Mutations ====================

    pub fn apply(&mut self, mutation: Mutation) -> Result<MutationOutcome> {
        match mutation {
            Mutation::SetProfile {
                display_name,
                track,
                language,
            } => Ok(self.set_profile(&display_name, track, &language)),
            Mutation::SetCurrentWeek(week) => Ok(self.set_current_week(week)),
            Mutation::SetCurrentDay(day) => Ok(self.set_current_day(day)),
            Mutation::CompleteWeek(week) => Ok(self.complete_week(week)),
            Mutation::MarkProblemSolved {
                problem_id,
                difficulty,
                time_spent_secs,
                first_attempt,
            } => self.mark_problem_solved(&problem_id, difficulty, time_spent_secs, first_attempt),
            Mutation::MarkResolve { problem_id, success } => self.mark_resolve(&problem_id, success),
            Mutation::AddPostmortem(entry) => self.add_postmortem(entry),
            Mutation::AddMockInterview(entry) => Ok(self.add_mock_interview(entry)),
            Mutation::LogDaily { energy_score } => self.log_daily(energy_score),
            Mutation::MarkDayComplete { week, day, completed } => {
                Ok(self.mark_day_complete(week, day, completed))
            }
            Mutation::MarkVideoWatched { resource_id, watched } => {
                self.mark_video_watched(&resource_id, watched)
            }
            Mutation::ClearNotifications => {
                self.clear_notifications();
                Ok(MutationOutcome::unchanged())
            }
        }
    }

    /// Update the profile; the start date is stamped by the first call only
    pub fn set_profile(&mut self, display_name: &str, track: Track, language: &str) -> MutationOutcome {
        let mut next = self.record.clone();
        next.profile = Profile {
            display_name: display_name.to_string(),
            track_preference: track,
            language_preference: language.to_string(),
            start_date: self.record.profile.start_date.or_else(|| Some(self.clock.now())),
        };
        self.commit(next, None, Vec::new())
    }

    pub fn set_current_week(&mut self, week: u32) -> MutationOutcome {
        let mut next = self.record.clone();
        next.cursor.current_week = week;
        self.commit(next, None, Vec::new())
    }

    pub fn set_current_day(&mut self, day: u32) -> MutationOutcome {
        let mut next = self.record.clone();
        next.cursor.current_day = day;
        self.commit(next, None, Vec::new())
    }

    pub fn complete_week(&mut self, week: u32) -> MutationOutcome {
        let mut next = self.record.clone();
        next.completed_weeks.insert(week);
        self.commit(next, None, Vec::new())
    }

    /// Record a solve: problem, then streak, then XP (first solve only),
    /// then mastery, then achievements
    pub fn mark_problem_solved(
        &mut self,
        problem_id: &str,
        difficulty: Difficulty,
        time_spent_secs: u64,
        first_attempt: bool,
    ) -> Result<MutationOutcome> {
        require_id("problem id", problem_id)?;
        let now = self.clock.now();
        let today = self.clock.today();

        let mut next = self.record.clone();
        let existing = next.problem_records.remove(problem_id);
        let is_new_solve = !existing.as_ref().is_some_and(|p| p.solved);

        let problem = match existing {
            Some(p) => ProblemRecord {
                solved: true,
                solved_at: Some(now),
                attempt_count: p.attempt_count.saturating_add(1),
                time_spent: p.time_spent.saturating_add(time_spent_secs),
                difficulty,
                next_resolve_due: if is_new_solve {
                    Some(schedule_resolve(today, 0))
                } else {
                    p.next_resolve_due
                },
                ..p
            },
            None => ProblemRecord {
                solved: true,
                solved_at: Some(now),
                attempt_count: 1,
                time_spent: time_spent_secs,
                difficulty,
                first_attempt_success: first_attempt,
                resolves: Vec::new(),
                next_resolve_due: Some(schedule_resolve(today, 0)),
            },
        };
        next.problem_records.insert(problem_id.to_string(), problem);

        let next = advance_streak(next, today);
        let (next, leveled_up) = if is_new_solve {
            gain(next, solve_xp(difficulty, first_attempt))
        } else {
            (next, None)
        };
        let next = recompute_topic_mastery(next, self.catalog.as_ref());
        let unlock = evaluate_achievements(next);

        debug!(problem_id, new_solve = is_new_solve, "Problem solved");
        Ok(self.commit(unlock.record, leveled_up, unlock.newly_unlocked))
    }

    /// Record a re-solve attempt of a problem that already has a record
    pub fn mark_resolve(&mut self, problem_id: &str, success: bool) -> Result<MutationOutcome> {
        let mut problem = self
            .record
            .problem_records
            .get(problem_id)
            .cloned()
            .ok_or_else(|| ProgressError::UnknownProblem(problem_id.to_string()))?;

        problem.resolves.push(ResolveAttempt {
            date: self.clock.now(),
            success,
        });
        if success {
            problem.next_resolve_due = Some(schedule_resolve(self.clock.today(), problem.resolves.len()));
        }

        let mut next = self.record.clone();
        next.problem_records.insert(problem_id.to_string(), problem);

        let (next, leveled_up) = if success {
            gain(next, XP_RESOLVE)
        } else {
            (next, None)
        };
        let next = recompute_topic_mastery(next, self.catalog.as_ref());
        let unlock = evaluate_achievements(next);

        Ok(self.commit(unlock.record, leveled_up, unlock.newly_unlocked))
    }

    pub fn add_postmortem(&mut self, entry: NewPostmortem) -> Result<MutationOutcome> {
        require_id("problem id", &entry.problem_id)?;

        let mut next = self.record.clone();
        next.postmortems.push(Postmortem {
            id: format!("pm-{}", Uuid::new_v4()),
            problem_id: entry.problem_id,
            problem_title: entry.problem_title,
            date: entry.date.unwrap_or_else(|| self.clock.today()),
            pattern: entry.pattern,
            first_attempt: entry.first_attempt,
            where_i_froze: entry.where_i_froze,
            correct_idea: entry.correct_idea,
            time_complexity: entry.time_complexity,
            space_complexity: entry.space_complexity,
            edge_cases: entry.edge_cases,
            mistake_category: entry.mistake_category,
            resolve_dates: entry.resolve_dates,
        });

        let (next, leveled_up) = gain(next, XP_POSTMORTEM);
        Ok(self.commit(next, leveled_up, Vec::new()))
    }

    pub fn add_mock_interview(&mut self, entry: NewMockInterview) -> MutationOutcome {
        let mut next = self.record.clone();
        next.mock_interviews.push(MockInterview {
            id: format!("mock-{}", Uuid::new_v4()),
            date: entry.date.unwrap_or_else(|| self.clock.today()),
            duration: entry.duration,
            problems: entry.problems,
            passed: entry.passed,
            notes: entry.notes,
        });

        let (next, leveled_up) = gain(next, XP_MOCK);
        let unlock = evaluate_achievements(next);
        self.commit(unlock.record, leveled_up, unlock.newly_unlocked)
    }

    /// Write today's log; a second call the same day replaces the first
    pub fn log_daily(&mut self, energy_score: u8) -> Result<MutationOutcome> {
        if !(1..=10).contains(&energy_score) {
            return Err(ProgressError::InvalidEnergyScore(energy_score));
        }
        let today = self.clock.today();

        let (problems_solved, time_spent) = self
            .record
            .problem_records
            .values()
            .filter(|p| p.solved_at.is_some_and(|at| at.date_naive() == today))
            .fold((0u32, 0u64), |(count, secs), p| {
                (count + 1, secs.saturating_add(p.time_spent))
            });

        let mut next = self.record.clone();
        next.daily_logs.insert(
            today,
            DailyLog {
                date: today,
                problems_solved,
                time_spent,
                energy_score,
                streak_maintained: self.record.streak.current_length > 0,
            },
        );
        Ok(self.commit(next, None, Vec::new()))
    }

    /// Toggle a curriculum day; completing one advances the streak and pays
    /// the daily goal bonus
    pub fn mark_day_complete(&mut self, week: u32, day: u32, completed: bool) -> MutationOutcome {
        let already = self
            .record
            .completed_days
            .get(&week)
            .is_some_and(|days| days.contains(&day));
        if already == completed {
            return MutationOutcome::unchanged();
        }

        let mut next = self.record.clone();
        if !completed {
            if let Some(days) = next.completed_days.get_mut(&week) {
                days.remove(&day);
                if days.is_empty() {
                    next.completed_days.remove(&week);
                }
            }
            return self.commit(next, None, Vec::new());
        }

        next.completed_days.entry(week).or_default().insert(day);
        let next = advance_streak(next, self.clock.today());
        let (next, leveled_up) = gain(next, XP_DAILY_GOAL);
        let unlock = evaluate_achievements(next);
        self.commit(unlock.record, leveled_up, unlock.newly_unlocked)
    }

    pub fn mark_video_watched(&mut self, resource_id: &str, watched: bool) -> Result<MutationOutcome> {
        require_id("resource id", resource_id)?;
        if self.record.watched_resources.get(resource_id) == Some(&watched) {
            return Ok(MutationOutcome::unchanged());
        }

        let mut next = self.record.clone();
        next.watched_resources.insert(resource_id.to_string(), watched);
        let (next, leveled_up) = if watched {
            gain(next, XP_RESOURCE_WATCHED)
        } else {
            (next, None)
        };
        Ok(self.commit(next, leveled_up, Vec::new()))
    }

    pub fn clear_notifications(&mut self) {
        self.last_achievement = None;
        self.last_level_up = None;
    }

    /// Replace the record with an exported document
    pub fn import(&mut self, raw: &str) -> Result<MutationOutcome> {
        let record = store::import_json(raw)?;
        info!(xp = record.xp, "Importing progress");
        Ok(self.commit(record, None, Vec::new()))
    }

    // ==================== Session ====================

    /// Feed a session event to the coordinator
    ///
    /// Sign-out adopts the local cache here. A reconcile ticket must be
    /// finished with [`finish_reconcile`](Self::finish_reconcile).
    pub fn begin_session(&mut self, event: &SessionEvent) -> SessionAction {
        let action = self.coordinator.on_session_event(event);
        if action == SessionAction::Detach {
            self.record = self.cache.load();
            debug!(xp = self.record.xp, "Adopted local progress");
        }
        action
    }

    /// Apply a finished fetch; stale tickets are dropped and return `None`
    ///
    /// The reconciled record is in place when this returns. A heal or insert
    /// write-back is queued on the writer under the ticket's epoch, never
    /// awaited here.
    pub fn finish_reconcile(&mut self, ticket: &ReconcileTicket, outcome: FetchOutcome) -> Option<ReconcileSource> {
        let local = self.cache.load();
        let reconciliation = self.coordinator.complete(ticket, outcome, local)?;

        self.record = reconciliation.record;
        self.cache.save(&self.record);

        let kind = match reconciliation.follow_up {
            FollowUp::None => None,
            FollowUp::Upsert => Some(WriteKind::Upsert),
            FollowUp::Insert => Some(WriteKind::Insert),
        };
        if let (Some(kind), Some(writer)) = (kind, self.writer.as_mut()) {
            debug!(user_id = %ticket.identity.user_id, ?kind, "Queueing reconcile write-back");
            writer.schedule(kind, &ticket.identity.user_id, &self.record, ticket.epoch);
        }

        Some(reconciliation.source)
    }

    /// Run a whole session transition inline, fetch and write-back included
    pub async fn handle_session_event(&mut self, event: SessionEvent) -> Option<ReconcileSource> {
        match self.begin_session(&event) {
            SessionAction::Reconcile(ticket) => {
                let outcome = fetch_for(self.remote(), &ticket.identity.user_id, self.fetch_timeout).await;
                let source = self.finish_reconcile(&ticket, outcome);
                self.settle().await;
                source
            }
            SessionAction::Detach | SessionAction::Ignore => None,
        }
    }

    /// Release the loading state for `epoch`; see [`SyncCoordinator::release_ui_guard`]
    pub fn release_ui_guard(&mut self, epoch: u64) -> bool {
        self.coordinator.release_ui_guard(epoch)
    }

    /// Wait for queued remote writes
    pub async fn settle(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.settle().await;
        }
    }

    // ==================== Helpers ====================

    fn commit(
        &mut self,
        next: ProgressRecord,
        leveled_up: Option<u32>,
        unlocked: Vec<String>,
    ) -> MutationOutcome {
        if next == self.record {
            return MutationOutcome::unchanged();
        }

        if let Some(level) = leveled_up {
            info!(level, "Level up");
            self.last_level_up = Some(level);
        }
        if let Some(first) = unlocked.first() {
            info!(achievement = %first, "Achievement unlocked");
            self.last_achievement = Some(first.clone());
        }

        self.record = next;
        self.persist();

        MutationOutcome {
            changed: true,
            leveled_up,
            unlocked,
        }
    }

    fn persist(&mut self) {
        self.cache.save(&self.record);

        if let (Some(writer), Some(identity)) =
            (self.writer.as_mut(), self.coordinator.attached_identity())
        {
            writer.schedule_upsert(&identity.user_id, &self.record, self.coordinator.epoch());
        }
    }
}

/// Fetch for a reconcile, treating a missing remote as a failed fetch
pub(crate) async fn fetch_for(
    remote: Option<Arc<dyn RemoteStore>>,
    user_id: &str,
    timeout: Duration,
) -> FetchOutcome {
    match remote {
        Some(remote) => fetch_remote(remote.as_ref(), user_id, timeout).await,
        None => FetchOutcome::Failed("no remote store configured".to_string()),
    }
}

fn gain(record: ProgressRecord, amount: u64) -> (ProgressRecord, Option<u32>) {
    let gain = apply_xp(record, amount);
    (gain.record, gain.new_level)
}

fn require_id(what: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(ProgressError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(())
}
