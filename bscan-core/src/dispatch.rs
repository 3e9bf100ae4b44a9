//! Bounded-retry action dispatch: achieve a target outcome through an
//! ordered fallback chain.
//!
//! Actions are data, not closures, so every attempt is loggable and a run
//! can be reconstructed from its log.  The chain order is part of the
//! contract: fastest/most specific first, most robust-but-slowest last.

use std::fmt;
use std::time::Duration;

use crate::clock::Clock;
use crate::errors::DriveError;
use crate::input::{sequence_label, InputEvent};
use crate::poller::StatePoller;
use crate::state::{ExternalState, StateSignatures};
use crate::surface::{descendant_by_id, descendant_by_name, ElementRole, Surface, UiDriver};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A named target state transition the dispatcher is trying to achieve,
/// e.g. "file chooser shown" or "recognition finished".
#[derive(Debug, Clone)]
pub struct Outcome {
    pub name: String,
    pub target: ExternalState,
}

impl Outcome {
    pub fn new(name: impl Into<String>, target: ExternalState) -> Self {
        Outcome {
            name: name.into(),
            target,
        }
    }
}

/// One side-effect step of an [`Action`].
///
/// Element steps address the anchor surface passed to
/// [`ActionDispatcher::achieve`]; without an anchor they search every
/// observable surface.
#[derive(Debug, Clone)]
pub enum ActionStep {
    /// Inject a synthetic-input sequence into the focused surface.
    SendKeys(Vec<InputEvent>),
    /// Replace the text of the edit element with the given automation ID.
    SetEditText { automation_id: String, text: String },
    /// Click the button with the given accessible name.
    ClickButton { name: String },
    /// Click the button with the given automation ID.
    ClickById { automation_id: String },
}

impl fmt::Display for ActionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStep::SendKeys(seq) => write!(f, "keys [{}]", sequence_label(seq)),
            ActionStep::SetEditText { automation_id, .. } => {
                write!(f, "set edit #{automation_id}")
            }
            ActionStep::ClickButton { name } => write!(f, "click '{name}'"),
            ActionStep::ClickById { automation_id } => write!(f, "click #{automation_id}"),
        }
    }
}

/// One candidate action in a fallback chain: a few side-effect steps and
/// the deadline for its confirming poll.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub steps: Vec<ActionStep>,
    pub timeout: Duration,
}

impl Action {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Action {
            name: name.into(),
            steps: Vec::new(),
            timeout,
        }
    }

    pub fn with(mut self, step: ActionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Shorthand for a single-sequence keystroke action.
    pub fn keys(name: impl Into<String>, sequence: Vec<InputEvent>, timeout: Duration) -> Self {
        Action::new(name, timeout).with(ActionStep::SendKeys(sequence))
    }
}

/// One attempt within a dispatch call: the action's identity, its ordinal
/// position in the chain, and its bounded deadline.  Ephemeral, never
/// retained past the call.
struct ActionAttempt<'a> {
    action: &'a Action,
    ordinal: usize,
    chain_len: usize,
}

impl fmt::Display for ActionAttempt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt {}/{} '{}' (deadline {:?})",
            self.ordinal + 1,
            self.chain_len,
            self.action.name,
            self.action.timeout
        )
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Drives the external system towards named outcomes through fallback
/// chains, confirming each attempt with the state poller.
pub struct ActionDispatcher<'a> {
    driver: &'a dyn UiDriver,
    poller: StatePoller<'a>,
    poll_interval: Duration,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(
        driver: &'a dyn UiDriver,
        clock: &'a dyn Clock,
        signatures: &'a StateSignatures,
        poll_interval: Duration,
    ) -> Self {
        ActionDispatcher {
            driver,
            poller: StatePoller::new(driver, clock, signatures),
            poll_interval,
        }
    }

    /// Read-only access to the confirming poller, for callers that need a
    /// bare state wait between dispatches.
    pub fn poller(&self) -> &StatePoller<'a> {
        &self.poller
    }

    /// Try each action in `chain` in priority order until the outcome's
    /// target state is observed.
    ///
    /// Returns the confirming surface on success (so follow-up stages can
    /// address elements on it), `None` once the chain is exhausted.  An
    /// action whose steps fail or whose confirming poll times out falls
    /// through to the next; a success short-circuits the rest, so exactly
    /// K+1 actions run when the (K+1)-th succeeds.
    pub fn achieve(
        &self,
        outcome: &Outcome,
        chain: &[Action],
        anchor: Option<&dyn Surface>,
    ) -> Option<Box<dyn Surface>> {
        for (ordinal, action) in chain.iter().enumerate() {
            let attempt = ActionAttempt {
                action,
                ordinal,
                chain_len: chain.len(),
            };
            log::debug!("outcome '{}': {attempt}", outcome.name);

            if let Err(err) = self.run_steps(action, anchor) {
                log::warn!("outcome '{}': {attempt} failed to execute: {err}", outcome.name);
                continue;
            }

            match self
                .poller
                .await_state(outcome.target, action.timeout, self.poll_interval)
            {
                Ok(surface) => {
                    log::debug!("outcome '{}' reached via '{}'", outcome.name, action.name);
                    return Some(surface);
                }
                Err(err) => {
                    log::warn!("outcome '{}': {attempt} not confirmed: {err}", outcome.name);
                }
            }
        }

        log::warn!(
            "outcome '{}' failed after {} attempt(s)",
            outcome.name,
            chain.len()
        );
        None
    }

    fn run_steps(&self, action: &Action, anchor: Option<&dyn Surface>) -> Result<(), DriveError> {
        for step in &action.steps {
            self.run_step(step, anchor)?;
        }
        Ok(())
    }

    fn run_step(&self, step: &ActionStep, anchor: Option<&dyn Surface>) -> Result<(), DriveError> {
        log::trace!("step: {step}");
        match step {
            ActionStep::SendKeys(sequence) => self.driver.send_input(sequence),
            ActionStep::SetEditText {
                automation_id,
                text,
            } => self
                .find_by_id(anchor, ElementRole::Edit, automation_id)?
                .set_text(text),
            ActionStep::ClickButton { name } => {
                self.find_by_name(anchor, ElementRole::Button, name)?.click()
            }
            ActionStep::ClickById { automation_id } => self
                .find_by_id(anchor, ElementRole::Button, automation_id)?
                .click(),
        }
    }

    fn find_by_id(
        &self,
        anchor: Option<&dyn Surface>,
        role: ElementRole,
        automation_id: &str,
    ) -> Result<Box<dyn crate::surface::Element>, DriveError> {
        match anchor {
            Some(surface) => descendant_by_id(surface, role, automation_id),
            None => self
                .driver
                .list_surfaces()?
                .iter()
                .find_map(|s| descendant_by_id(s.as_ref(), role, automation_id)),
        }
        .ok_or_else(|| DriveError::Input(format!("no {role} element with id '{automation_id}'")))
    }

    fn find_by_name(
        &self,
        anchor: Option<&dyn Surface>,
        role: ElementRole,
        name: &str,
    ) -> Result<Box<dyn crate::surface::Element>, DriveError> {
        match anchor {
            Some(surface) => descendant_by_name(surface, role, name),
            None => self
                .driver
                .list_surfaces()?
                .iter()
                .find_map(|s| descendant_by_name(s.as_ref(), role, name)),
        }
        .ok_or_else(|| DriveError::Input(format!("no {role} element named '{name}'")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Chord;

    #[test]
    fn test_action_builder_accumulates_steps() {
        let action = Action::new("confirm save", Duration::from_secs(10))
            .with(ActionStep::SetEditText {
                automation_id: "1001".into(),
                text: r"C:\out\score.csc".into(),
            })
            .with(ActionStep::ClickButton {
                name: "Save".into(),
            });
        assert_eq!(action.steps.len(), 2);
        assert_eq!(action.name, "confirm save");
    }

    #[test]
    fn test_keys_shorthand() {
        let action = Action::keys(
            "open chooser",
            vec![InputEvent::Chord(Chord::ctrl('o'))],
            Duration::from_secs(10),
        );
        assert_eq!(action.steps.len(), 1);
        assert!(matches!(action.steps[0], ActionStep::SendKeys(_)));
    }

    #[test]
    fn test_attempt_display_is_one_based() {
        let action = Action::new("press Enter", Duration::from_secs(5));
        let attempt = ActionAttempt {
            action: &action,
            ordinal: 1,
            chain_len: 3,
        };
        let text = attempt.to_string();
        assert!(text.contains("attempt 2/3"));
        assert!(text.contains("press Enter"));
    }

    #[test]
    fn test_step_display() {
        let step = ActionStep::ClickById {
            automation_id: "actionStartRecognition".into(),
        };
        assert_eq!(step.to_string(), "click #actionStartRecognition");
    }
}
