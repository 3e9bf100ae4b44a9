//! Error types for `bscan_core`.
//!
//! All Rust-side failures are funnelled through [`DriveError`], which uses
//! `thiserror` for `Display` and `Error` derives.  Per-unit terminal
//! failures are *not* errors -- they are recorded as data in the batch
//! report (see [`crate::batch::UnitOutcome`]) so the loop can continue.

use std::time::Duration;

use thiserror::Error;

use crate::state::ExternalState;

/// Top-level error type for the `bscan_core` library.
///
/// Each variant corresponds to a distinct failure class with its own
/// recovery policy.
#[derive(Debug, Error)]
pub enum DriveError {
    /// A poll did not observe the target state before its deadline.
    /// Recovered locally: the dispatcher falls through to the next action
    /// in the chain, or the current work unit fails.
    #[error("TimeoutError: {target} not reached within {timeout:?}")]
    StateTimeout {
        target: ExternalState,
        timeout: Duration,
    },

    /// The external system's surface tree was transiently unreadable.
    /// Swallowed inside the poller and treated as "not yet matched".
    #[error("IntrospectionError: {0}")]
    Introspection(String),

    /// Synthetic input injection or element interaction failure.
    /// Fails the current action, not the batch.
    #[error("InputError: {0}")]
    Input(String),

    /// The external system could not be reached or started before the
    /// batch began.  Aborts the entire run.
    #[error("FatalStartupError: {0}")]
    Startup(String),
}

impl DriveError {
    /// Whether this error aborts the whole run rather than one attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriveError::Startup(_))
    }
}
