//! Event loop around [`ProgressService`].
//!
//! One task owns the service. Session events, mutation requests and I/O
//! completions are handled one at a time, in arrival order, so the record is
//! never mutated concurrently. Remote fetches and the loading guard timer run
//! on their own tasks and report back through a completion channel.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use super::events::{Mutation, MutationOutcome};
use super::progress_service::{fetch_for, ProgressService};
use crate::error::{ProgressError, Result};
use crate::store::ProgressRecord;
use crate::sync::{FetchOutcome, Identity, ReconcileTicket, SessionAction, SessionEvent, SyncPhase};

/// Loading state is released after this long, whatever the fetch does
pub const DEFAULT_UI_GUARD: Duration = Duration::from_secs(8);

const CHANNEL_CAPACITY: usize = 64;

/// What observers see after every handled event
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub record: ProgressRecord,
    pub loading: bool,
    pub phase: SyncPhase,
    pub identity: Option<Identity>,
    pub last_achievement: Option<String>,
    pub last_level_up: Option<u32>,
}

impl ProgressSnapshot {
    fn of(service: &ProgressService) -> Self {
        Self {
            record: service.record().clone(),
            loading: service.is_loading(),
            phase: service.phase(),
            identity: service.identity().cloned(),
            last_achievement: service.last_achievement().map(str::to_string),
            last_level_up: service.last_level_up(),
        }
    }
}

struct MutationRequest {
    mutation: Mutation,
    reply: oneshot::Sender<Result<MutationOutcome>>,
}

enum Completion {
    Fetched {
        ticket: ReconcileTicket,
        outcome: FetchOutcome,
    },
    GuardElapsed {
        epoch: u64,
    },
}

pub struct ServiceDriver {
    service: ProgressService,
    ui_guard: Duration,
    sessions: mpsc::Receiver<SessionEvent>,
    mutations: mpsc::Receiver<MutationRequest>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    snapshots: watch::Sender<ProgressSnapshot>,
    inflight_fetches: usize,
}

/// Cloneable front end for a running [`ServiceDriver`]
#[derive(Clone)]
pub struct DriverHandle {
    sessions: mpsc::Sender<SessionEvent>,
    mutations: mpsc::Sender<MutationRequest>,
    snapshots: watch::Receiver<ProgressSnapshot>,
}

impl ServiceDriver {
    pub fn new(service: ProgressService, ui_guard: Duration) -> (Self, DriverHandle) {
        let (session_tx, sessions) = mpsc::channel(CHANNEL_CAPACITY);
        let (mutation_tx, mutations) = mpsc::channel(CHANNEL_CAPACITY);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(ProgressSnapshot::of(&service));

        let driver = Self {
            service,
            ui_guard,
            sessions,
            mutations,
            completions_tx,
            completions,
            snapshots,
            inflight_fetches: 0,
        };
        let handle = DriverHandle {
            sessions: session_tx,
            mutations: mutation_tx,
            snapshots: snapshot_rx,
        };
        (driver, handle)
    }

    /// Run until every handle is dropped and in-flight fetches have landed
    ///
    /// Outstanding remote writes are awaited before the service is handed back.
    pub async fn run(mut self) -> ProgressService {
        let mut sessions_open = true;
        let mut mutations_open = true;

        while sessions_open || mutations_open || self.inflight_fetches > 0 {
            tokio::select! {
                event = self.sessions.recv(), if sessions_open => match event {
                    Some(event) => self.on_session(event),
                    None => sessions_open = false,
                },
                request = self.mutations.recv(), if mutations_open => match request {
                    Some(request) => self.on_mutation(request),
                    None => mutations_open = false,
                },
                Some(done) = self.completions.recv() => self.on_completion(done),
            }
        }

        self.service.settle().await;
        info!("Progress driver stopped");
        self.service
    }

    fn on_session(&mut self, event: SessionEvent) {
        match self.service.begin_session(&event) {
            SessionAction::Ignore => return,
            SessionAction::Detach => {}
            SessionAction::Reconcile(ticket) => self.spawn_reconcile(ticket),
        }
        self.publish();
    }

    fn spawn_reconcile(&mut self, ticket: ReconcileTicket) {
        self.inflight_fetches += 1;
        let epoch = ticket.epoch;

        let remote = self.service.remote();
        let timeout = self.service.fetch_timeout();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = fetch_for(remote, &ticket.identity.user_id, timeout).await;
            let _ = tx.send(Completion::Fetched { ticket, outcome });
        });

        let guard = self.ui_guard;
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(guard).await;
            let _ = tx.send(Completion::GuardElapsed { epoch });
        });
    }

    fn on_mutation(&mut self, request: MutationRequest) {
        let result = self.service.apply(request.mutation);
        if let Err(ref e) = result {
            debug!(error = %e, "Mutation rejected");
        }
        self.publish();
        let _ = request.reply.send(result);
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Fetched { ticket, outcome } => {
                self.inflight_fetches = self.inflight_fetches.saturating_sub(1);
                if self.service.finish_reconcile(&ticket, outcome).is_some() {
                    self.publish();
                }
            }
            Completion::GuardElapsed { epoch } => {
                if self.service.release_ui_guard(epoch) {
                    self.publish();
                }
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(ProgressSnapshot::of(&self.service));
    }
}

impl DriverHandle {
    pub async fn send_session(&self, event: SessionEvent) -> Result<()> {
        self.sessions
            .send(event)
            .await
            .map_err(|_| ProgressError::Shutdown)
    }

    /// Queue a mutation and wait for its outcome
    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome> {
        let (reply, rx) = oneshot::channel();
        self.mutations
            .send(MutationRequest { mutation, reply })
            .await
            .map_err(|_| ProgressError::Shutdown)?;
        rx.await.map_err(|_| ProgressError::Shutdown)?
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LocalCache, MemoryKv};
    use crate::catalog::StaticCatalog;
    use crate::clock::SystemClock;
    use crate::store::Difficulty;
    use crate::sync::MemoryRemoteStore;
    use serde_json::json;
    use std::sync::Arc;

    fn service(remote: Arc<MemoryRemoteStore>) -> ProgressService {
        ProgressService::new(
            LocalCache::new(MemoryKv::new()),
            Arc::new(StaticCatalog::default()),
            Arc::new(SystemClock),
        )
        .with_remote(remote)
    }

    async fn wait_until(rx: &mut watch::Receiver<ProgressSnapshot>, f: impl Fn(&ProgressSnapshot) -> bool) {
        loop {
            let done = f(&rx.borrow_and_update());
            if done {
                return;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sign_in_then_mutate_writes_through() {
        let remote = Arc::new(MemoryRemoteStore::new().with_document("alice", json!({ "xp": 340 })));
        let (driver, handle) = ServiceDriver::new(service(remote.clone()), DEFAULT_UI_GUARD);
        let task = tokio::spawn(driver.run());

        let mut rx = handle.subscribe();
        handle
            .send_session(SessionEvent::signed_in(Identity::new("alice")))
            .await
            .unwrap();
        wait_until(&mut rx, |s| s.phase == SyncPhase::Attached).await;
        assert_eq!(handle.snapshot().record.xp, 340);
        assert!(!handle.snapshot().loading);
        assert!(remote.writes().is_empty());

        let outcome = handle
            .mutate(Mutation::MarkProblemSolved {
                problem_id: "two-sum".into(),
                difficulty: Difficulty::Easy,
                time_spent_secs: 300,
                first_attempt: false,
            })
            .await
            .unwrap();
        assert!(outcome.changed);

        drop(rx);
        drop(handle);
        let service = task.await.unwrap();

        assert_eq!(service.record().xp, 345);
        assert_eq!(remote.document("alice").unwrap()["xp"], 345);
    }

    #[tokio::test]
    async fn test_rejected_mutation_reports_error() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let (driver, handle) = ServiceDriver::new(service(remote), DEFAULT_UI_GUARD);
        let task = tokio::spawn(driver.run());

        let err = handle
            .mutate(Mutation::LogDaily { energy_score: 42 })
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidEnergyScore(42)));

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ui_guard_fires_before_fetch_timeout() {
        let remote = Arc::new(MemoryRemoteStore::new().with_document("alice", json!({ "xp": 340 })));
        remote.set_latency(Some(Duration::from_secs(60)));
        let (driver, handle) = ServiceDriver::new(service(remote.clone()), DEFAULT_UI_GUARD);
        let task = tokio::spawn(driver.run());

        handle
            .send_session(SessionEvent::signed_in(Identity::new("alice")))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(9)).await;
        let snapshot = handle.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.phase, SyncPhase::Reconciling);

        let mut rx = handle.subscribe();
        wait_until(&mut rx, |s| s.phase == SyncPhase::Attached).await;
        // Fetch timed out at 15s; local (empty) wins and nothing is written
        assert_eq!(handle.snapshot().record.xp, 0);

        drop(rx);
        drop(handle);
        task.await.unwrap();
        assert!(remote.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_ui_guard_is_honoured() {
        let remote_config = crate::config::RemoteSection {
            ui_guard_secs: 2,
            ..Default::default()
        };
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_latency(Some(Duration::from_secs(10)));
        let (driver, handle) = ServiceDriver::new(service(remote), remote_config.ui_guard());
        let task = tokio::spawn(driver.run());

        handle
            .send_session(SessionEvent::signed_in(Identity::new("alice")))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.snapshot().loading);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snapshot = handle.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.phase, SyncPhase::Reconciling);

        drop(handle);
        task.await.unwrap();
    }

    /// Answers reads at once, holds every write for a minute
    #[derive(Default)]
    struct SlowWrites {
        landed: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl crate::sync::RemoteStore for SlowWrites {
        async fn get(&self, _user_id: &str) -> Result<Option<serde_json::Value>> {
            Ok(Some(json!({ "xp": 0 })))
        }

        async fn upsert(&self, _user_id: &str, _record: &serde_json::Value) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.landed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn insert(&self, user_id: &str, record: &serde_json::Value) -> Result<()> {
            self.upsert(user_id, record).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_heal_write_does_not_block_loop() {
        let cache = LocalCache::new(MemoryKv::new());
        cache.save(&ProgressRecord {
            xp: 120,
            level: 3,
            ..Default::default()
        });
        let remote = Arc::new(SlowWrites::default());
        let service = ProgressService::new(cache, Arc::new(StaticCatalog::default()), Arc::new(SystemClock))
            .with_remote(remote.clone());
        let (driver, handle) = ServiceDriver::new(service, DEFAULT_UI_GUARD);
        let task = tokio::spawn(driver.run());

        let mut rx = handle.subscribe();
        handle
            .send_session(SessionEvent::signed_in(Identity::new("alice")))
            .await
            .unwrap();
        wait_until(&mut rx, |s| s.phase == SyncPhase::Attached).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.record.xp, 120);
        assert!(!snapshot.loading);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            handle.mutate(Mutation::MarkVideoWatched {
                resource_id: "arrays-intro".into(),
                watched: true,
            }),
        )
        .await
        .expect("loop stalled behind the write-back")
        .unwrap();
        assert!(outcome.changed);
        assert_eq!(remote.landed.load(std::sync::atomic::Ordering::SeqCst), 0);

        drop(rx);
        drop(handle);
        let service = task.await.unwrap();

        // Heal upsert plus the write-through both land on shutdown
        assert_eq!(remote.landed.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(service.record().xp, 135);
    }
}
