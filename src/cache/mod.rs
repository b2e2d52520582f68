//! Local Cache Adapter - durable progress and theme storage on this device
//!
//! One key holds the active progress document; guest and signed-in modes
//! share it, and only one record occupies it at a time.

mod kv;
mod local;

pub use kv::{KeyValueStore, MemoryKv, SqliteKv};
pub use local::{LocalCache, Theme, PROGRESS_KEY, THEME_KEY};
