//! Batch loop: a thin orchestrator sequencing work units through the
//! dispatcher.
//!
//! Per-unit state machine: `Opening -> Recognizing -> Saving -> Done`,
//! with any stage diverting to `Failed`.  A failure aborts that unit only;
//! the runner attempts to return the external system to `Main` before the
//! next unit so units never cross-contaminate.  Units are processed
//! strictly sequentially, sorted by input file name.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::clock::Clock;
use crate::dispatch::{Action, ActionDispatcher, ActionStep, Outcome};
use crate::errors::DriveError;
use crate::input::{Chord, InputEvent, Key};
use crate::profile::AppProfile;
use crate::state::ExternalState;
use crate::surface::UiDriver;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One input-file-to-output-artifact conversion task.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl WorkUnit {
    /// Derive the output locator from the input stem, e.g.
    /// `in/score1.png` -> `out/score1.csc`.
    pub fn new(input: PathBuf, output_dir: &Path, extension: &str) -> Self {
        let stem = input
            .file_stem()
            .unwrap_or_else(|| input.as_os_str())
            .to_os_string();
        let mut output = output_dir.join(stem);
        output.set_extension(extension);
        WorkUnit { input, output }
    }

    /// Short identity for logs and reports: the input file name.
    pub fn label(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// The output file name without its directory.
    pub fn output_file_name(&self) -> String {
        self.output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.output.display().to_string())
    }
}

/// Stage a unit was in when it succeeded or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitStage {
    Opening,
    Recognizing,
    Saving,
}

impl std::fmt::Display for UnitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UnitStage::Opening => "opening",
            UnitStage::Recognizing => "recognizing",
            UnitStage::Saving => "saving",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UnitOutcome {
    Done,
    Failed { stage: UnitStage, reason: String },
}

/// Owned per-unit record in the final report.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub input: String,
    pub output: String,
    pub outcome: UnitOutcome,
}

/// Aggregate result of a whole run.  Every unit is accounted for; nothing
/// is silently dropped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub units: Vec<UnitReport>,
}

impl BatchResult {
    fn record(&mut self, unit: &WorkUnit, outcome: UnitOutcome) {
        self.total += 1;
        match outcome {
            UnitOutcome::Done => self.succeeded += 1,
            UnitOutcome::Failed { .. } => self.failed += 1,
        }
        self.units.push(UnitReport {
            input: unit.input.display().to_string(),
            output: unit.output.display().to_string(),
            outcome,
        });
    }
}

/// Per-batch mutable flags, threaded explicitly through each unit instead
/// of living in process-wide state.
#[derive(Debug, Default)]
struct BatchContext {
    /// The save chooser's directory has been set once this run; later
    /// units may type the bare file name.
    save_dir_primed: bool,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

type StageFailure = (UnitStage, String);

/// Sequences sorted work units through open/recognize/export against one
/// external application session.
pub struct BatchRunner<'a> {
    driver: &'a dyn UiDriver,
    clock: &'a dyn Clock,
    profile: AppProfile,
}

impl<'a> BatchRunner<'a> {
    pub fn new(driver: &'a dyn UiDriver, clock: &'a dyn Clock, profile: AppProfile) -> Self {
        BatchRunner {
            driver,
            clock,
            profile,
        }
    }

    /// Process every unit, strictly sequentially, in lexicographic order
    /// of input file name.
    ///
    /// Only a startup failure aborts the run; per-unit failures are
    /// recorded and the loop continues.
    pub fn run(&self, mut units: Vec<WorkUnit>) -> Result<BatchResult, DriveError> {
        self.driver.connect()?;

        units.sort_by(|a, b| a.input.file_name().cmp(&b.input.file_name()));

        let dispatcher = ActionDispatcher::new(
            self.driver,
            self.clock,
            &self.profile.signatures,
            self.profile.poll_interval,
        );

        // The main window must be up before the first unit; without a live
        // target no per-unit recovery is possible.
        dispatcher
            .poller()
            .await_state(
                ExternalState::Main,
                self.profile.timeouts.startup,
                self.profile.poll_interval,
            )
            .map_err(|err| DriveError::Startup(format!("main window did not appear: {err}")))?;

        let started = self.clock.now();
        let mut ctx = BatchContext::default();
        let mut result = BatchResult::default();

        for unit in &units {
            log::info!("unit '{}': starting", unit.label());
            match self.process_unit(&dispatcher, &mut ctx, unit) {
                Ok(()) => {
                    log::info!("unit '{}': done -> {}", unit.label(), unit.output.display());
                    result.record(unit, UnitOutcome::Done);
                }
                Err((stage, reason)) => {
                    log::warn!("unit '{}': failed while {stage}: {reason}", unit.label());
                    result.record(unit, UnitOutcome::Failed { stage, reason });
                }
            }
            self.return_to_main(&dispatcher);
        }

        let elapsed = self.clock.now().saturating_sub(started);
        log::info!(
            "batch finished in {elapsed:?}: {} total, {} succeeded, {} failed",
            result.total,
            result.succeeded,
            result.failed
        );
        Ok(result)
    }

    /// One unit through the stage machine.  The error carries the stage
    /// reached and a human-readable reason.
    fn process_unit(
        &self,
        dispatcher: &ActionDispatcher<'_>,
        ctx: &mut BatchContext,
        unit: &WorkUnit,
    ) -> Result<(), StageFailure> {
        let t = &self.profile.timeouts;

        // -- Opening
        let chooser = dispatcher
            .achieve(
                &Outcome::new("open chooser shown", ExternalState::AwaitingOpen),
                &self.open_chain(),
                None,
            )
            .ok_or_else(|| (UnitStage::Opening, "open chooser did not appear".to_string()))?;

        let input_path = unit.input.display().to_string();
        dispatcher
            .achieve(
                &Outcome::new("file loaded", ExternalState::Main),
                &self.confirm_open_chain(&input_path),
                Some(chooser.as_ref()),
            )
            .ok_or_else(|| {
                (
                    UnitStage::Opening,
                    format!("chooser did not accept '{}'", unit.label()),
                )
            })?;

        // -- Recognizing
        let sighted = dispatcher.achieve(
            &Outcome::new(
                "recognition started",
                ExternalState::RecognitionInProgress,
            ),
            &self.trigger_chain(),
            None,
        );
        if sighted.is_none() {
            // A fast recognition can finish between two polls; the done
            // wait below is authoritative either way.
            log::debug!("unit '{}': recognition start not observed", unit.label());
        }
        dispatcher
            .poller()
            .await_state(
                ExternalState::RecognitionDone,
                t.recognition,
                self.profile.poll_interval,
            )
            .map_err(|err| (UnitStage::Recognizing, err.to_string()))?;

        // -- Saving
        let chooser = dispatcher
            .achieve(
                &Outcome::new("save chooser shown", ExternalState::AwaitingSave),
                &self.export_chain(),
                None,
            )
            .ok_or_else(|| (UnitStage::Saving, "save chooser did not appear".to_string()))?;

        let entry = if ctx.save_dir_primed {
            unit.output_file_name()
        } else {
            unit.output.display().to_string()
        };
        dispatcher
            .achieve(
                &Outcome::new("export confirmed", ExternalState::Main),
                &self.confirm_save_chain(&entry),
                Some(chooser.as_ref()),
            )
            .ok_or_else(|| {
                (
                    UnitStage::Saving,
                    format!("chooser did not accept '{entry}'"),
                )
            })?;
        ctx.save_dir_primed = true;

        if self.profile.verify_output && !unit.output.exists() {
            return Err((
                UnitStage::Saving,
                format!("output artifact missing: {}", unit.output.display()),
            ));
        }

        Ok(())
    }

    /// Best-effort recovery between units: close the current document,
    /// fall back to dismissing whatever modal surface lingers.
    fn return_to_main(&self, dispatcher: &ActionDispatcher<'_>) {
        let outcome = Outcome::new("application back at main", ExternalState::Main);
        if dispatcher
            .achieve(&outcome, &self.recovery_chain(), None)
            .is_none()
        {
            log::warn!("could not confirm return to main state; continuing");
        }
    }

    // -- fallback chains, fastest/most specific first ----------------------

    fn open_chain(&self) -> Vec<Action> {
        vec![Action::keys(
            "open-chooser hotkey",
            self.profile.open_chooser.clone(),
            self.profile.timeouts.chooser,
        )]
    }

    fn confirm_open_chain(&self, input_path: &str) -> Vec<Action> {
        let entry = ActionStep::SetEditText {
            automation_id: self.profile.signatures.open_entry_id.clone(),
            text: input_path.to_string(),
        };
        vec![
            Action::new("confirm via button", self.profile.timeouts.load)
                .with(entry.clone())
                .with(ActionStep::ClickButton {
                    name: self.profile.open_confirm.clone(),
                }),
            Action::new("confirm via Enter", self.profile.timeouts.load)
                .with(entry)
                .with(ActionStep::SendKeys(vec![InputEvent::Chord(Chord::plain(
                    Key::Enter,
                ))])),
        ]
    }

    fn trigger_chain(&self) -> Vec<Action> {
        vec![Action::new(
            "recognition trigger",
            self.profile.timeouts.recognition_start,
        )
        .with(ActionStep::ClickById {
            automation_id: self.profile.recognize_trigger_id.clone(),
        })]
    }

    fn export_chain(&self) -> Vec<Action> {
        vec![Action::keys(
            "export hotkey",
            self.profile.export_chooser.clone(),
            self.profile.timeouts.chooser,
        )]
    }

    fn confirm_save_chain(&self, entry_text: &str) -> Vec<Action> {
        let entry = ActionStep::SetEditText {
            automation_id: self.profile.signatures.save_entry_id.clone(),
            text: entry_text.to_string(),
        };
        vec![
            Action::new("confirm via button", self.profile.timeouts.save)
                .with(entry.clone())
                .with(ActionStep::ClickButton {
                    name: self.profile.save_confirm.clone(),
                }),
            Action::new("confirm via Enter", self.profile.timeouts.save)
                .with(entry)
                .with(ActionStep::SendKeys(vec![InputEvent::Chord(Chord::plain(
                    Key::Enter,
                ))])),
        ]
    }

    fn recovery_chain(&self) -> Vec<Action> {
        vec![
            Action::keys(
                "close document",
                self.profile.close_document.clone(),
                self.profile.timeouts.recovery,
            ),
            Action::keys(
                "dismiss modal",
                self.profile.dismiss.clone(),
                self.profile.timeouts.recovery,
            ),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_unit_output_derivation() {
        let unit = WorkUnit::new(
            PathBuf::from("img_in/score1.png"),
            Path::new("csc_out"),
            "csc",
        );
        assert_eq!(unit.output, PathBuf::from("csc_out/score1.csc"));
        assert_eq!(unit.label(), "score1.png");
        assert_eq!(unit.output_file_name(), "score1.csc");
    }

    #[test]
    fn test_batch_result_counts_every_unit() {
        let a = WorkUnit::new(PathBuf::from("a.png"), Path::new("out"), "csc");
        let b = WorkUnit::new(PathBuf::from("b.png"), Path::new("out"), "csc");
        let mut result = BatchResult::default();
        result.record(&a, UnitOutcome::Done);
        result.record(
            &b,
            UnitOutcome::Failed {
                stage: UnitStage::Recognizing,
                reason: "timed out".into(),
            },
        );
        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.units.len(), 2);
    }

    #[test]
    fn test_batch_result_serialization() {
        let a = WorkUnit::new(PathBuf::from("a.png"), Path::new("out"), "csc");
        let mut result = BatchResult::default();
        result.record(&a, UnitOutcome::Done);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"total\":1"));
        assert!(json.contains("a.png"));
    }

    #[test]
    fn test_unit_stage_display() {
        assert_eq!(UnitStage::Opening.to_string(), "opening");
        assert_eq!(UnitStage::Recognizing.to_string(), "recognizing");
        assert_eq!(UnitStage::Saving.to_string(), "saving");
    }
}
