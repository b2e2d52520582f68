//! AlgoQuest Progress - offline-first progress sync and gamification
//!
//! Keeps one learner's progress record on this device and, once signed in,
//! mirrors it to a remote document store.
//!
//! # Architecture
//!
//! - **store**: the versioned record, its JSON form and legacy migration
//! - **derive**: pure functions for streaks, XP/levels, achievements, mastery
//!   and re-solve scheduling
//! - **cache**: durable local key-value storage (SQLite)
//! - **sync**: identity state machine, remote store client, write-through
//! - **service**: the mutation surface that ties the above together
//!
//! The local cache is always written; the remote store only while a signed-in
//! identity is attached. Remote writes are full snapshots, so last completed
//! write wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use algoquest_progress::{LocalCache, ProgressService, SqliteKv, StaticCatalog, SystemClock};
//! use algoquest_progress::store::Difficulty;
//! use std::sync::Arc;
//!
//! let cache = LocalCache::new(SqliteKv::open("/tmp/algoquest/progress.db")?);
//! let mut service = ProgressService::new(cache, Arc::new(StaticCatalog::default()), Arc::new(SystemClock));
//!
//! service.mark_problem_solved("two-sum", Difficulty::Easy, 900, true)?;
//! assert_eq!(service.last_achievement(), Some("first-blood"));
//! ```

// Progress record and persisted form
pub mod store;

// Pure derivations
pub mod derive;

// Curriculum reference data
pub mod catalog;

// Local persistence
pub mod cache;

// Remote sync
pub mod sync;

// Mutation surface
pub mod service;

// Injected time source
pub mod clock;

pub mod config;

// Error types
pub mod error;

// Re-export the common entry points
pub use cache::{KeyValueStore, LocalCache, MemoryKv, SqliteKv, Theme};
pub use catalog::{Catalog, StaticCatalog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use service::{DriverHandle, Mutation, MutationOutcome, ProgressService, ProgressSnapshot, ServiceDriver};
pub use store::ProgressRecord;
pub use sync::{HttpRemoteStore, Identity, MemoryRemoteStore, RemoteStore, SessionEvent, SyncPhase};

// Re-export error types
pub use error::{ProgressError, Result};
