//! State poller: bounded waiting for a target external state.
//!
//! Polling (not event subscription) because the external system exposes no
//! change-notification channel.  The poll interval is a latency/CPU
//! tradeoff; shorter intervals reduce end-to-end batch time without
//! increasing false-negative misses.

use std::time::Duration;

use crate::clock::Clock;
use crate::errors::DriveError;
use crate::state::{matches_state, ExternalState, StateSignatures};
use crate::surface::{Surface, UiDriver};

/// Read-only poller over an external system's observable surfaces.
pub struct StatePoller<'a> {
    driver: &'a dyn UiDriver,
    clock: &'a dyn Clock,
    signatures: &'a StateSignatures,
}

impl<'a> StatePoller<'a> {
    pub fn new(
        driver: &'a dyn UiDriver,
        clock: &'a dyn Clock,
        signatures: &'a StateSignatures,
    ) -> Self {
        StatePoller {
            driver,
            clock,
            signatures,
        }
    }

    /// Wait until some visible surface satisfies the predicate for
    /// `target`, polling every `interval`.
    ///
    /// Returns the first matching surface.  The first probe happens before
    /// any sleep, so a target that already holds returns immediately.  A
    /// target that never holds fails with [`DriveError::StateTimeout`] no
    /// earlier than `timeout` and no later than `timeout + interval`.
    ///
    /// Transient introspection failures are logged at trace level and
    /// treated as "not yet matched".
    pub fn await_state(
        &self,
        target: ExternalState,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Box<dyn Surface>, DriveError> {
        let start = self.clock.now();
        let deadline = start + timeout;

        loop {
            if let Some(surface) = self.probe(target) {
                log::debug!(
                    "observed {target} after {:?}",
                    self.clock.now().saturating_sub(start)
                );
                return Ok(surface);
            }
            if self.clock.now() >= deadline {
                return Err(DriveError::StateTimeout { target, timeout });
            }
            self.clock.sleep(interval);
        }
    }

    /// One read-only pass over the surface list.
    fn probe(&self, target: ExternalState) -> Option<Box<dyn Surface>> {
        match self.driver.list_surfaces() {
            Ok(surfaces) => surfaces
                .into_iter()
                .find(|s| matches_state(s.as_ref(), target, self.signatures)),
            Err(err) => {
                // Flaky introspection reads as "not yet matched".
                log::trace!("surface enumeration failed, retrying: {err}");
                None
            }
        }
    }
}
