//! Application profile: the glue data the control plane consumes but does
//! not own.
//!
//! A profile bundles everything specific to one automation target --
//! identity signatures, hotkeys, chooser field IDs, per-stage deadlines --
//! so the poller, dispatcher and batch runner stay target-agnostic.

use std::time::Duration;

use crate::input::{Chord, InputEvent};
use crate::state::{CompletionProbe, StateSignatures};

/// Per-stage deadlines for one work unit, plus the run-level startup wait.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    /// Main window visible after connect, before the batch starts.
    pub startup: Duration,
    /// A file chooser appearing after its hotkey.
    pub chooser: Duration,
    /// The document loaded back into the main window after open-confirm.
    pub load: Duration,
    /// Sighting recognition-in-progress after the trigger (non-fatal).
    pub recognition_start: Duration,
    /// Recognition running to completion.
    pub recognition: Duration,
    /// The export accepted and the chooser gone after save-confirm.
    pub save: Duration,
    /// Returning the application to the main state between units.
    pub recovery: Duration,
}

/// Everything the batch driver needs to know about one target application.
#[derive(Debug, Clone)]
pub struct AppProfile {
    pub signatures: StateSignatures,

    /// Hotkey opening the input file chooser.
    pub open_chooser: Vec<InputEvent>,
    /// Hotkey opening the export file chooser.
    pub export_chooser: Vec<InputEvent>,
    /// Hotkey closing the current document tab.
    pub close_document: Vec<InputEvent>,
    /// Keystroke dismissing a lingering modal surface.
    pub dismiss: Vec<InputEvent>,

    /// Accessible name of the open chooser's confirm button.
    pub open_confirm: String,
    /// Accessible name of the save chooser's confirm button.
    pub save_confirm: String,
    /// Automation ID of the recognition trigger.
    pub recognize_trigger_id: String,

    pub timeouts: StageTimeouts,
    /// Shared poll interval for every confirming wait.
    pub poll_interval: Duration,

    /// Extension of exported artifacts (without the dot).
    pub output_extension: String,
    /// Check that the output artifact exists on disk after a save
    /// (real runs only; the simulator produces no files).
    pub verify_output: bool,
}

impl AppProfile {
    /// Profile for capella-scan 9 (`capscan.exe`, Qt 5.15), the original
    /// automation target.
    pub fn capella_scan_9() -> Self {
        AppProfile {
            signatures: StateSignatures {
                main_title: "capella-scan".into(),
                chooser_class: "#32770".into(),
                open_entry_id: "1148".into(),
                save_entry_id: "1001".into(),
                completion: CompletionProbe::TriggerEnabled("actionStartRecognition".into()),
            },
            open_chooser: vec![InputEvent::Chord(Chord::ctrl('o'))],
            export_chooser: vec![InputEvent::Chord(Chord::ctrl_shift('m'))],
            close_document: vec![InputEvent::Chord(Chord::ctrl('w'))],
            dismiss: vec![InputEvent::Chord(Chord::plain(crate::input::Key::Escape))],
            open_confirm: "Open".into(),
            save_confirm: "Save".into(),
            recognize_trigger_id: "actionStartRecognition".into(),
            timeouts: StageTimeouts {
                startup: Duration::from_secs(20),
                chooser: Duration::from_secs(10),
                load: Duration::from_secs(10),
                recognition_start: Duration::from_secs(3),
                recognition: Duration::from_secs(120),
                save: Duration::from_secs(10),
                recovery: Duration::from_secs(5),
            },
            poll_interval: Duration::from_millis(250),
            output_extension: "csc".into(),
            verify_output: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Key;

    #[test]
    fn test_capella_profile_selectors() {
        let p = AppProfile::capella_scan_9();
        assert_eq!(p.signatures.chooser_class, "#32770");
        assert_eq!(p.signatures.open_entry_id, "1148");
        assert_eq!(p.signatures.save_entry_id, "1001");
        assert_eq!(p.recognize_trigger_id, "actionStartRecognition");
        assert_eq!(p.output_extension, "csc");
    }

    #[test]
    fn test_capella_profile_hotkeys() {
        let p = AppProfile::capella_scan_9();
        assert_eq!(p.open_chooser, vec![InputEvent::Chord(Chord::ctrl('o'))]);
        assert_eq!(
            p.export_chooser,
            vec![InputEvent::Chord(Chord::ctrl_shift('m'))]
        );
        assert_eq!(p.close_document, vec![InputEvent::Chord(Chord::ctrl('w'))]);
        assert_eq!(
            p.dismiss,
            vec![InputEvent::Chord(Chord::plain(Key::Escape))]
        );
    }

    #[test]
    fn test_recognition_deadline_dominates_stage_deadlines() {
        let t = AppProfile::capella_scan_9().timeouts;
        assert!(t.recognition > t.chooser);
        assert!(t.recognition > t.load);
        assert!(t.recognition > t.save);
    }
}
