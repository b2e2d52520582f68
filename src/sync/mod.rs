//! Remote Sync Coordinator
//!
//! Attaches the active record to a signed-in identity's remote copy and keeps
//! the two in step. Local cache writes happen regardless; remote writes only
//! while [`SyncPhase::Attached`].
//!
//! ```text
//! Detached ──sign-in──▶ Reconciling ──fetch done/failed──▶ Attached
//!     ▲                                                       │
//!     └──────────────────────── sign-out ─────────────────────┘
//! ```

pub mod coordinator;
pub mod remote;
pub mod session;
pub mod writer;

pub use coordinator::{
    fetch_remote, EpochCounter, FetchOutcome, FollowUp, ReconcileSource, ReconcileTicket, Reconciliation,
    SessionAction, SyncCoordinator, SyncPhase,
};
pub use remote::{HttpRemoteStore, MemoryRemoteStore, ProgressRow, RemoteConfig, RemoteStore, RemoteWrite, WriteKind};
pub use session::{Identity, SessionEvent, SessionEventKind};
pub use writer::RemoteWriter;
