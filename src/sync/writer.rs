//! Fire-and-forget remote writes
//!
//! Every write carries the full record, so completions may land in any order
//! without leaving the remote worse than the latest snapshot.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::coordinator::EpochCounter;
use super::remote::{RemoteStore, WriteKind};
use crate::store::ProgressRecord;

pub struct RemoteWriter {
    remote: Arc<dyn RemoteStore>,
    epoch: EpochCounter,
    seq: u64,
    pending: Vec<JoinHandle<()>>,
}

impl RemoteWriter {
    pub fn new(remote: Arc<dyn RemoteStore>, epoch: EpochCounter) -> Self {
        Self {
            remote,
            epoch,
            seq: 0,
            pending: Vec::new(),
        }
    }

    /// Writes issued so far
    pub fn issued(&self) -> u64 {
        self.seq
    }

    /// Queue a full-snapshot upsert issued under `epoch`
    pub fn schedule_upsert(&mut self, user_id: &str, record: &ProgressRecord, epoch: u64) {
        self.schedule(WriteKind::Upsert, user_id, record, epoch);
    }

    /// Queue a full-snapshot write issued under `epoch`
    ///
    /// Dropped without sending if the epoch has moved on by the time the
    /// task runs. Failures are logged only.
    pub fn schedule(&mut self, kind: WriteKind, user_id: &str, record: &ProgressRecord, epoch: u64) {
        let doc: Value = match serde_json::to_value(record) {
            Ok(doc) => doc,
            Err(e) => {
                error!(error = %e, "Failed to serialize progress for remote write");
                return;
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(user_id, "No async runtime, remote write skipped");
                return;
            }
        };

        self.seq += 1;
        let seq = self.seq;
        let remote = Arc::clone(&self.remote);
        let current = self.epoch.clone();
        let user_id = user_id.to_string();

        self.pending.retain(|h| !h.is_finished());
        self.pending.push(handle.spawn(async move {
            if current.current() != epoch {
                debug!(seq, epoch, "Dropping remote write from stale epoch");
                return;
            }
            let result = match kind {
                WriteKind::Upsert => remote.upsert(&user_id, &doc).await,
                WriteKind::Insert => remote.insert(&user_id, &doc).await,
            };
            match result {
                Ok(()) => debug!(seq, ?kind, user_id = %user_id, "Progress synced to remote"),
                Err(e) => error!(seq, ?kind, user_id = %user_id, error = %e, "Remote sync failed"),
            }
        }));
    }

    /// Wait for every outstanding write
    pub async fn settle(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Remote write task aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::MemoryRemoteStore;

    #[tokio::test]
    async fn test_scheduled_writes_land_after_settle() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let epoch = EpochCounter::default();
        let mut writer = RemoteWriter::new(remote.clone(), epoch.clone());

        let record = ProgressRecord {
            xp: 42,
            ..Default::default()
        };
        writer.schedule_upsert("alice", &record, epoch.current());
        writer.settle().await;

        assert_eq!(writer.issued(), 1);
        assert_eq!(remote.document("alice").unwrap()["xp"], 42);
    }

    #[tokio::test]
    async fn test_stale_epoch_write_dropped() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let epoch = EpochCounter::default();
        let mut writer = RemoteWriter::new(remote.clone(), epoch.clone());

        writer.schedule_upsert("alice", &ProgressRecord::default(), epoch.current() + 7);
        writer.settle().await;

        assert!(remote.writes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_failing(true);
        let epoch = EpochCounter::default();
        let mut writer = RemoteWriter::new(remote.clone(), epoch.clone());

        writer.schedule_upsert("alice", &ProgressRecord::default(), epoch.current());
        writer.settle().await;
        assert!(remote.writes().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_insert_creates_row() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let epoch = EpochCounter::default();
        let mut writer = RemoteWriter::new(remote.clone(), epoch.clone());

        writer.schedule(WriteKind::Insert, "newbie", &ProgressRecord::default(), epoch.current());
        writer.settle().await;

        let writes = remote.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].kind, WriteKind::Insert);
        assert_eq!(writes[0].user_id, "newbie");
    }

    #[test]
    fn test_schedule_without_runtime_is_noop() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let mut writer = RemoteWriter::new(remote, EpochCounter::default());
        writer.schedule_upsert("alice", &ProgressRecord::default(), 0);
        assert_eq!(writer.issued(), 0);
    }
}
