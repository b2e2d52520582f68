//! Sync coordinator: identity state machine and reconciliation policy.
//!
//! The coordinator never touches I/O itself. It decides what an incoming
//! session event means, hands out a [`ReconcileTicket`] for each accepted
//! identity change, and turns a finished fetch into the record to adopt plus
//! the remote write (if any) that should follow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::remote::RemoteStore;
use super::session::{Identity, SessionEvent, SessionEventKind};
use crate::store::{migrate, ProgressRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No identity; local cache only
    Detached,
    /// Identity attached, remote read in flight
    Reconciling,
    /// Identity stable; mutations write through to remote
    Attached,
}

/// Monotonic reconciliation epoch, shared with the remote writer
#[derive(Debug, Clone, Default)]
pub struct EpochCounter(Arc<AtomicU64>);

impl EpochCounter {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Permission to apply one reconciliation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileTicket {
    pub epoch: u64,
    pub identity: Identity,
}

/// What the caller should do with a session event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Same identity as last time; nothing to do
    Ignore,
    /// Signed out: adopt the local cache
    Detach,
    /// Fetch the remote record, then call [`SyncCoordinator::complete`]
    Reconcile(ReconcileTicket),
}

/// Result of reading the remote record
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Row present; document already migrated
    Found(ProgressRecord),
    /// No row for this user
    Missing,
    /// Network error, server error or timeout
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileSource {
    Remote,
    /// Local cache was richer and backfills the remote
    Healed,
    /// Remote unreachable
    LocalFallback,
    /// Brand new user
    Fresh,
}

/// Remote write owed after adoption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    Upsert,
    Insert,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub record: ProgressRecord,
    pub source: ReconcileSource,
    pub follow_up: FollowUp,
}

/// Identity state machine
#[derive(Debug)]
pub struct SyncCoordinator {
    phase: SyncPhase,
    identity: Option<Identity>,
    last_processed: Option<String>,
    bootstrapped: bool,
    loading: bool,
    epoch: EpochCounter,
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Detached,
            identity: None,
            last_processed: None,
            bootstrapped: false,
            loading: false,
            epoch: EpochCounter::default(),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Identity remote writes go to, only while attached
    pub fn attached_identity(&self) -> Option<&Identity> {
        match self.phase {
            SyncPhase::Attached => self.identity.as_ref(),
            _ => None,
        }
    }

    /// Whether callers should show a loading state
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.current()
    }

    pub fn epoch_counter(&self) -> EpochCounter {
        self.epoch.clone()
    }

    /// Classify a session event and move the state machine
    pub fn on_session_event(&mut self, event: &SessionEvent) -> SessionAction {
        let incoming = event.user_id();

        if self.bootstrapped
            && event.kind != SessionEventKind::InitialSession
            && incoming == self.last_processed.as_deref()
        {
            debug!(kind = ?event.kind, user_id = ?incoming, "Session unchanged, skipping reconcile");
            return SessionAction::Ignore;
        }

        self.bootstrapped = true;
        self.last_processed = incoming.map(str::to_string);
        let epoch = self.epoch.advance();

        match &event.identity {
            None => {
                info!(epoch, "Signed out, detaching from remote");
                self.phase = SyncPhase::Detached;
                self.identity = None;
                self.loading = false;
                SessionAction::Detach
            }
            Some(identity) => {
                info!(epoch, user_id = %identity.user_id, "Identity attached, reconciling");
                self.phase = SyncPhase::Reconciling;
                self.identity = Some(identity.clone());
                self.loading = true;
                SessionAction::Reconcile(ReconcileTicket {
                    epoch,
                    identity: identity.clone(),
                })
            }
        }
    }

    /// Release the loading state when the UI guard fires
    ///
    /// The reconciliation itself keeps running. Returns whether anything changed.
    pub fn release_ui_guard(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch.current() || !self.loading {
            return false;
        }
        warn!(epoch, "Reconcile still running, releasing loading state");
        self.loading = false;
        true
    }

    /// Decide which record to adopt for a finished fetch
    ///
    /// Returns `None` when the ticket went stale; the result must be dropped.
    pub fn complete(
        &mut self,
        ticket: &ReconcileTicket,
        outcome: FetchOutcome,
        local: ProgressRecord,
    ) -> Option<Reconciliation> {
        if ticket.epoch != self.epoch.current() {
            debug!(
                ticket_epoch = ticket.epoch,
                current_epoch = self.epoch.current(),
                "Discarding stale reconcile result"
            );
            return None;
        }

        let user_id = &ticket.identity.user_id;
        let reconciliation = match outcome {
            FetchOutcome::Found(remote) if remote.has_progress() => {
                info!(user_id = %user_id, xp = remote.xp, "Adopting remote progress");
                Reconciliation {
                    record: remote,
                    source: ReconcileSource::Remote,
                    follow_up: FollowUp::None,
                }
            }
            FetchOutcome::Found(_) | FetchOutcome::Missing if local.has_progress() => {
                info!(user_id = %user_id, xp = local.xp, "Remote empty, healing from local cache");
                Reconciliation {
                    record: local,
                    source: ReconcileSource::Healed,
                    follow_up: FollowUp::Upsert,
                }
            }
            FetchOutcome::Found(remote) => {
                debug!(user_id = %user_id, "Adopting empty remote progress");
                Reconciliation {
                    record: remote,
                    source: ReconcileSource::Remote,
                    follow_up: FollowUp::None,
                }
            }
            FetchOutcome::Missing => {
                info!(user_id = %user_id, "New user, creating remote progress");
                Reconciliation {
                    record: ProgressRecord::default(),
                    source: ReconcileSource::Fresh,
                    follow_up: FollowUp::Insert,
                }
            }
            FetchOutcome::Failed(reason) => {
                warn!(user_id = %user_id, %reason, "Remote fetch failed, falling back to local");
                Reconciliation {
                    record: local,
                    source: ReconcileSource::LocalFallback,
                    follow_up: FollowUp::None,
                }
            }
        };

        self.phase = SyncPhase::Attached;
        self.loading = false;
        Some(reconciliation)
    }
}

/// Read the remote record, bounded by `timeout`
pub async fn fetch_remote(remote: &dyn RemoteStore, user_id: &str, timeout: Duration) -> FetchOutcome {
    match tokio::time::timeout(timeout, remote.get(user_id)).await {
        Ok(Ok(Some(doc))) => FetchOutcome::Found(migrate(doc)),
        Ok(Ok(None)) => FetchOutcome::Missing,
        Ok(Err(e)) => FetchOutcome::Failed(e.to_string()),
        Err(_) => FetchOutcome::Failed(format!("fetch timed out after {:?}", timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::MemoryRemoteStore;
    use serde_json::json;

    fn record_with_xp(xp: u64) -> ProgressRecord {
        ProgressRecord {
            xp,
            level: crate::derive::level_for(xp),
            ..Default::default()
        }
    }

    fn ticket(action: SessionAction) -> ReconcileTicket {
        match action {
            SessionAction::Reconcile(t) => t,
            other => panic!("expected reconcile, got {:?}", other),
        }
    }

    #[test]
    fn test_first_event_always_processed() {
        let mut coordinator = SyncCoordinator::new();
        let action = coordinator.on_session_event(&SessionEvent::initial(None));
        assert_eq!(action, SessionAction::Detach);
        assert_eq!(coordinator.epoch(), 1);
    }

    #[test]
    fn test_same_user_refresh_is_ignored() {
        let mut coordinator = SyncCoordinator::new();
        let alice = Identity::new("alice");

        let t = ticket(coordinator.on_session_event(&SessionEvent::signed_in(alice.clone())));
        assert_eq!(coordinator.phase(), SyncPhase::Reconciling);
        coordinator.complete(&t, FetchOutcome::Missing, ProgressRecord::default());

        let action = coordinator.on_session_event(&SessionEvent::token_refreshed(alice.clone()));
        assert_eq!(action, SessionAction::Ignore);
        assert_eq!(coordinator.phase(), SyncPhase::Attached);

        // Initial restore is processed even for the same id
        let action = coordinator.on_session_event(&SessionEvent::initial(Some(alice)));
        assert!(matches!(action, SessionAction::Reconcile(_)));
    }

    #[test]
    fn test_repeated_sign_out_is_ignored() {
        let mut coordinator = SyncCoordinator::new();
        assert_eq!(coordinator.on_session_event(&SessionEvent::signed_out()), SessionAction::Detach);
        assert_eq!(coordinator.on_session_event(&SessionEvent::signed_out()), SessionAction::Ignore);
    }

    #[test]
    fn test_reconcile_policy() {
        let cases = [
            (FetchOutcome::Found(record_with_xp(340)), 0, 340, ReconcileSource::Remote, FollowUp::None),
            (FetchOutcome::Found(record_with_xp(0)), 120, 120, ReconcileSource::Healed, FollowUp::Upsert),
            (FetchOutcome::Missing, 120, 120, ReconcileSource::Healed, FollowUp::Upsert),
            (FetchOutcome::Found(record_with_xp(0)), 0, 0, ReconcileSource::Remote, FollowUp::None),
            (FetchOutcome::Missing, 0, 0, ReconcileSource::Fresh, FollowUp::Insert),
            (FetchOutcome::Failed("boom".into()), 75, 75, ReconcileSource::LocalFallback, FollowUp::None),
        ];

        for (outcome, local_xp, expected_xp, source, follow_up) in cases {
            let mut coordinator = SyncCoordinator::new();
            let t = ticket(coordinator.on_session_event(&SessionEvent::signed_in(Identity::new("u"))));
            let result = coordinator
                .complete(&t, outcome, record_with_xp(local_xp))
                .unwrap();

            assert_eq!(result.record.xp, expected_xp);
            assert_eq!(result.source, source);
            assert_eq!(result.follow_up, follow_up);
            assert_eq!(coordinator.phase(), SyncPhase::Attached);
            assert!(!coordinator.is_loading());
        }
    }

    #[test]
    fn test_stale_ticket_discarded() {
        let mut coordinator = SyncCoordinator::new();
        let old = ticket(coordinator.on_session_event(&SessionEvent::signed_in(Identity::new("alice"))));
        let new = ticket(coordinator.on_session_event(&SessionEvent::signed_in(Identity::new("bob"))));

        assert!(coordinator
            .complete(&old, FetchOutcome::Found(record_with_xp(999)), ProgressRecord::default())
            .is_none());
        assert_eq!(coordinator.phase(), SyncPhase::Reconciling);

        let result = coordinator
            .complete(&new, FetchOutcome::Missing, ProgressRecord::default())
            .unwrap();
        assert_eq!(result.source, ReconcileSource::Fresh);
        assert_eq!(coordinator.identity().unwrap().user_id, "bob");
    }

    #[test]
    fn test_sign_out_invalidates_inflight_fetch() {
        let mut coordinator = SyncCoordinator::new();
        let t = ticket(coordinator.on_session_event(&SessionEvent::signed_in(Identity::new("alice"))));
        coordinator.on_session_event(&SessionEvent::signed_out());

        assert!(coordinator
            .complete(&t, FetchOutcome::Missing, ProgressRecord::default())
            .is_none());
        assert_eq!(coordinator.phase(), SyncPhase::Detached);
        assert!(coordinator.attached_identity().is_none());
    }

    #[test]
    fn test_ui_guard_releases_loading_once() {
        let mut coordinator = SyncCoordinator::new();
        let t = ticket(coordinator.on_session_event(&SessionEvent::signed_in(Identity::new("alice"))));
        assert!(coordinator.is_loading());

        assert!(!coordinator.release_ui_guard(t.epoch + 1));
        assert!(coordinator.release_ui_guard(t.epoch));
        assert!(!coordinator.is_loading());
        assert!(!coordinator.release_ui_guard(t.epoch));
        assert_eq!(coordinator.phase(), SyncPhase::Reconciling);
    }

    #[tokio::test]
    async fn test_fetch_remote_outcomes() {
        let remote = MemoryRemoteStore::new().with_document("alice", json!({ "xp": 340 }));

        match fetch_remote(&remote, "alice", Duration::from_secs(1)).await {
            FetchOutcome::Found(record) => {
                assert_eq!(record.xp, 340);
                assert!(record.completed_days.is_empty());
            }
            other => panic!("expected found, got {:?}", other),
        }
        assert!(matches!(
            fetch_remote(&remote, "bob", Duration::from_secs(1)).await,
            FetchOutcome::Missing
        ));

        remote.set_failing(true);
        assert!(matches!(
            fetch_remote(&remote, "alice", Duration::from_secs(1)).await,
            FetchOutcome::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_remote_times_out() {
        let remote = MemoryRemoteStore::new().with_document("alice", json!({ "xp": 340 }));
        remote.set_latency(Some(Duration::from_secs(60)));

        let outcome = fetch_remote(&remote, "alice", Duration::from_secs(15)).await;
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
    }
}
