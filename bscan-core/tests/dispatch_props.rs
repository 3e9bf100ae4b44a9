//! Fallback-chain properties of the action dispatcher: exact invocation
//! counts and short-circuiting.

use std::time::Duration;

use bscan_core::dispatch::{Action, ActionDispatcher, ActionStep, Outcome};
use bscan_core::input::{Chord, InputEvent};
use bscan_core::profile::AppProfile;
use bscan_core::sim::{SimApp, SimClock};
use bscan_core::state::ExternalState;

fn profile() -> AppProfile {
    let mut p = AppProfile::capella_scan_9();
    p.verify_output = false;
    p
}

/// A keystroke the simulated application does not react to.
fn inert(name: &str) -> Action {
    Action::keys(
        name,
        vec![InputEvent::Chord(Chord::ctrl('z'))],
        Duration::from_millis(500),
    )
}

fn open_chooser(profile: &AppProfile) -> Action {
    Action::keys(
        "open-chooser hotkey",
        profile.open_chooser.clone(),
        Duration::from_millis(500),
    )
}

#[test]
fn first_k_failures_then_success_invokes_exactly_k_plus_one() {
    let profile = profile();
    let app = SimApp::new(&profile);
    let clock = SimClock::new();
    let dispatcher =
        ActionDispatcher::new(&app, &clock, &profile.signatures, Duration::from_millis(100));

    let chain = vec![inert("first try"), inert("second try"), open_chooser(&profile)];
    let outcome = Outcome::new("open chooser shown", ExternalState::AwaitingOpen);

    let surface = dispatcher.achieve(&outcome, &chain, None);
    assert!(surface.is_some());

    let log = app.input_log();
    assert_eq!(log.len(), 3, "exactly K+1 actions must run: {log:?}");
    assert!(log[2].contains("Ctrl+O"));
}

#[test]
fn success_on_first_action_skips_the_rest() {
    let profile = profile();
    let app = SimApp::new(&profile);
    let clock = SimClock::new();
    let dispatcher =
        ActionDispatcher::new(&app, &clock, &profile.signatures, Duration::from_millis(100));

    let chain = vec![open_chooser(&profile), inert("never reached")];
    let outcome = Outcome::new("open chooser shown", ExternalState::AwaitingOpen);

    assert!(dispatcher.achieve(&outcome, &chain, None).is_some());
    assert_eq!(app.input_log().len(), 1);
    // No confirming poll failed, so no virtual time was burned waiting.
    assert_eq!(clock.sleep_count(), 0);
}

#[test]
fn exhausted_chain_invokes_exactly_n_and_fails() {
    let profile = profile();
    let app = SimApp::new(&profile);
    let clock = SimClock::new();
    let dispatcher =
        ActionDispatcher::new(&app, &clock, &profile.signatures, Duration::from_millis(100));

    let chain = vec![inert("first try"), inert("second try"), inert("third try")];
    let outcome = Outcome::new("open chooser shown", ExternalState::AwaitingOpen);

    assert!(dispatcher.achieve(&outcome, &chain, None).is_none());
    assert_eq!(app.input_log().len(), 3, "never more than N invocations");
}

#[test]
fn action_whose_step_cannot_execute_falls_through_the_chain() {
    let profile = profile();
    let app = SimApp::new(&profile);
    let clock = SimClock::new();
    let dispatcher =
        ActionDispatcher::new(&app, &clock, &profile.signatures, Duration::from_millis(100));

    // No element anywhere carries this automation ID, so the step fails
    // before injecting anything; the hotkey fallback still wins.
    let chain = vec![
        Action::new("click missing control", Duration::from_millis(500)).with(
            ActionStep::ClickById {
                automation_id: "actionDoesNotExist".into(),
            },
        ),
        open_chooser(&profile),
    ];
    let outcome = Outcome::new("open chooser shown", ExternalState::AwaitingOpen);

    assert!(dispatcher.achieve(&outcome, &chain, None).is_some());
    let log = app.input_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("Ctrl+O"));
}
