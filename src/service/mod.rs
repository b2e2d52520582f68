//! Event API - the only way the record changes
//!
//! [`ProgressService`] owns the active record and the sync state machine.
//! [`ServiceDriver`] wraps it in a single-task event loop for callers that
//! want queued mutations and a snapshot stream.

mod driver;
mod events;
mod progress_service;

pub use driver::{DriverHandle, ProgressSnapshot, ServiceDriver, DEFAULT_UI_GUARD};
pub use events::{Mutation, MutationOutcome, NewMockInterview, NewPostmortem};
pub use progress_service::{ProgressService, DEFAULT_FETCH_TIMEOUT};
