//! Timing and resilience properties of the state poller, on virtual time.

use std::time::Duration;

use bscan_core::clock::Clock;
use bscan_core::errors::DriveError;
use bscan_core::poller::StatePoller;
use bscan_core::profile::AppProfile;
use bscan_core::sim::{SimApp, SimClock};
use bscan_core::state::ExternalState;

fn profile() -> AppProfile {
    let mut p = AppProfile::capella_scan_9();
    p.verify_output = false;
    p
}

#[test]
fn timeout_lands_between_deadline_and_one_interval_past_it() {
    // The save chooser never appears: no input is ever injected.
    for (timeout_ms, interval_ms) in [(1000, 250), (900, 250), (1000, 1000), (500, 100), (300, 7)]
    {
        let profile = profile();
        let app = SimApp::new(&profile);
        let clock = SimClock::new();
        let poller = StatePoller::new(&app, &clock, &profile.signatures);

        let timeout = Duration::from_millis(timeout_ms);
        let interval = Duration::from_millis(interval_ms);
        let err = poller
            .await_state(ExternalState::AwaitingSave, timeout, interval)
            .unwrap_err();

        let elapsed = clock.now();
        assert!(
            elapsed >= timeout,
            "failed early: {elapsed:?} < {timeout:?} (interval {interval:?})"
        );
        assert!(
            elapsed <= timeout + interval,
            "failed late: {elapsed:?} > {:?} (interval {interval:?})",
            timeout + interval
        );
        assert!(matches!(
            err,
            DriveError::StateTimeout {
                target: ExternalState::AwaitingSave,
                ..
            }
        ));
    }
}

#[test]
fn already_true_target_returns_immediately_without_sleeping() {
    let profile = profile();
    let app = SimApp::new(&profile);
    let clock = SimClock::new();
    let poller = StatePoller::new(&app, &clock, &profile.signatures);

    // The main window is up from the start; both calls must return on the
    // first probe with zero sleeps.
    for _ in 0..2 {
        let surface = poller
            .await_state(
                ExternalState::Main,
                Duration::from_secs(10),
                Duration::from_millis(250),
            )
            .unwrap();
        assert!(surface.title().contains("capella-scan"));
    }
    assert_eq!(clock.sleep_count(), 0);
    assert_eq!(clock.now(), Duration::ZERO);
}

#[test]
fn transient_introspection_failures_do_not_propagate() {
    let profile = profile();
    let app = SimApp::new(&profile);
    let clock = SimClock::new();
    let poller = StatePoller::new(&app, &clock, &profile.signatures);

    app.fail_introspection(3);
    let surface = poller
        .await_state(
            ExternalState::Main,
            Duration::from_secs(10),
            Duration::from_millis(250),
        )
        .expect("poller must ride out flaky introspection");
    assert!(surface.is_visible());
    // Three failed probes cost three sleeps before the fourth succeeded.
    assert_eq!(clock.sleep_count(), 3);
}

#[test]
fn persistent_introspection_failure_still_surfaces_as_timeout() {
    let profile = profile();
    let app = SimApp::new(&profile);
    let clock = SimClock::new();
    let poller = StatePoller::new(&app, &clock, &profile.signatures);

    app.fail_introspection(u32::MAX);
    let err = poller
        .await_state(
            ExternalState::Main,
            Duration::from_secs(2),
            Duration::from_millis(250),
        )
        .unwrap_err();
    assert!(
        matches!(err, DriveError::StateTimeout { .. }),
        "introspection trouble must never escape as its own error: {err}"
    );
}
