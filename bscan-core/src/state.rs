//! Coarse external-state inference over observed surfaces.
//!
//! Every poll re-derives the state from scratch; nothing is persisted.
//! [`matches_state`] is the per-target predicate the poller evaluates, and
//! [`classify`] is the diagnostic first-match classification used by
//! `bscan-probe`.  First-match priority ordering guarantees that one
//! observed surface never claims two states at once.

use std::fmt;

use crate::surface::{descendant_by_id, ElementRole, Surface};

/// Coarse discrete state of the external application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalState {
    /// Application main window, no modal chooser in the way.
    Main,
    /// A file chooser is up, waiting for an input path ("open" shape).
    AwaitingOpen,
    /// A file chooser is up, waiting for an output path ("save" shape).
    AwaitingSave,
    /// Recognition has been triggered and has not completed.
    RecognitionInProgress,
    /// Recognition has completed.
    RecognitionDone,
    /// No known predicate matched.
    Unknown,
}

impl fmt::Display for ExternalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExternalState::Main => "Main",
            ExternalState::AwaitingOpen => "AwaitingOpen",
            ExternalState::AwaitingSave => "AwaitingSave",
            ExternalState::RecognitionInProgress => "RecognitionInProgress",
            ExternalState::RecognitionDone => "RecognitionDone",
            ExternalState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Strategy for deciding whether recognition has completed.
///
/// The trigger-button probe polls the recognition action's enabled flag
/// (disabled while running, re-enabled when done).  The marker probe looks
/// for a completion marker among the surface's descendant text elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionProbe {
    /// Recognition trigger button, addressed by automation ID.
    TriggerEnabled(String),
    /// Completion marker substring among descendant `Text` elements.
    MarkerText(String),
}

/// Identity signatures used by the per-state predicates.
#[derive(Debug, Clone)]
pub struct StateSignatures {
    /// Substring of the application main window title.
    pub main_title: String,
    /// Window class of the platform file chooser.
    pub chooser_class: String,
    /// Automation ID of the chooser's path entry in "open" shape.
    pub open_entry_id: String,
    /// Automation ID of the chooser's path entry in "save" shape.
    pub save_entry_id: String,
    /// How recognition completion is detected.
    pub completion: CompletionProbe,
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Does this surface alone have the chooser class and the given path entry?
fn is_chooser_shape(surface: &dyn Surface, sigs: &StateSignatures, entry_id: &str) -> bool {
    surface.class_name() == sigs.chooser_class
        && descendant_by_id(surface, ElementRole::Edit, entry_id).is_some()
}

/// Chooser predicate over the surface AND its direct children -- the
/// chooser may be nested inside another surface.
fn chooser_with_entry(surface: &dyn Surface, sigs: &StateSignatures, entry_id: &str) -> bool {
    if is_chooser_shape(surface, sigs, entry_id) {
        return true;
    }
    surface
        .children()
        .iter()
        .any(|child| is_chooser_shape(child.as_ref(), sigs, entry_id))
}

fn is_main_shape(surface: &dyn Surface, sigs: &StateSignatures) -> bool {
    surface.title().contains(&sigs.main_title)
}

/// Recognition probe result on a main-shaped surface.  `None` when the
/// probe's anchor (trigger button or text elements) is not observable.
fn recognition_done(surface: &dyn Surface, sigs: &StateSignatures) -> Option<bool> {
    match &sigs.completion {
        CompletionProbe::TriggerEnabled(id) => {
            descendant_by_id(surface, ElementRole::Button, id).map(|btn| btn.is_enabled())
        }
        CompletionProbe::MarkerText(marker) => {
            let texts = surface.descendants(ElementRole::Text);
            if texts.is_empty() {
                return None;
            }
            Some(texts.iter().any(|el| el.text().contains(marker)))
        }
    }
}

/// Evaluate the predicate for `target` against one observed surface.
pub fn matches_state(surface: &dyn Surface, target: ExternalState, sigs: &StateSignatures) -> bool {
    if !surface.is_visible() {
        return false;
    }
    match target {
        ExternalState::Main => is_main_shape(surface, sigs),
        ExternalState::AwaitingOpen => chooser_with_entry(surface, sigs, &sigs.open_entry_id),
        ExternalState::AwaitingSave => chooser_with_entry(surface, sigs, &sigs.save_entry_id),
        ExternalState::RecognitionInProgress => {
            is_main_shape(surface, sigs) && recognition_done(surface, sigs) == Some(false)
        }
        ExternalState::RecognitionDone => {
            is_main_shape(surface, sigs) && recognition_done(surface, sigs) == Some(true)
        }
        ExternalState::Unknown => false,
    }
}

/// First-match classification of one observed surface, for diagnostics.
///
/// Chooser states take priority over the main window (the chooser is the
/// modal surface actually holding focus), and the recognition states refine
/// `Main` when the completion probe's anchor is observable.
pub fn classify(surface: &dyn Surface, sigs: &StateSignatures) -> ExternalState {
    if !surface.is_visible() {
        return ExternalState::Unknown;
    }
    if chooser_with_entry(surface, sigs, &sigs.open_entry_id) {
        return ExternalState::AwaitingOpen;
    }
    if chooser_with_entry(surface, sigs, &sigs.save_entry_id) {
        return ExternalState::AwaitingSave;
    }
    if is_main_shape(surface, sigs) {
        return match recognition_done(surface, sigs) {
            Some(false) => ExternalState::RecognitionInProgress,
            Some(true) => ExternalState::RecognitionDone,
            None => ExternalState::Main,
        };
    }
    ExternalState::Unknown
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DriveError;
    use crate::surface::Element;

    struct StubElement {
        role: ElementRole,
        automation_id: String,
        text: String,
        enabled: bool,
    }

    impl Element for StubElement {
        fn role(&self) -> ElementRole {
            self.role
        }
        fn name(&self) -> String {
            String::new()
        }
        fn automation_id(&self) -> String {
            self.automation_id.clone()
        }
        fn text(&self) -> String {
            self.text.clone()
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn click(&self) -> Result<(), DriveError> {
            Err(DriveError::Input("stub".into()))
        }
        fn set_text(&self, _value: &str) -> Result<(), DriveError> {
            Err(DriveError::Input("stub".into()))
        }
    }

    #[derive(Default, Debug)]
    struct StubSurface {
        title: String,
        class_name: String,
        edits: Vec<String>,
        trigger: Option<(String, bool)>,
        texts: Vec<String>,
        children: Vec<StubSurface>,
    }

    impl StubSurface {
        fn clone_shallow(&self) -> StubSurface {
            StubSurface {
                title: self.title.clone(),
                class_name: self.class_name.clone(),
                edits: self.edits.clone(),
                trigger: self.trigger.clone(),
                texts: self.texts.clone(),
                children: Vec::new(),
            }
        }
    }

    impl Surface for StubSurface {
        fn is_visible(&self) -> bool {
            true
        }
        fn title(&self) -> String {
            self.title.clone()
        }
        fn class_name(&self) -> String {
            self.class_name.clone()
        }
        fn children(&self) -> Vec<Box<dyn Surface>> {
            self.children
                .iter()
                .map(|c| Box::new(c.clone_shallow()) as Box<dyn Surface>)
                .collect()
        }
        fn descendants(&self, role: ElementRole) -> Vec<Box<dyn Element>> {
            let mut out: Vec<Box<dyn Element>> = Vec::new();
            match role {
                ElementRole::Edit => {
                    for id in &self.edits {
                        out.push(Box::new(StubElement {
                            role,
                            automation_id: id.clone(),
                            text: String::new(),
                            enabled: true,
                        }));
                    }
                }
                ElementRole::Button => {
                    if let Some((id, enabled)) = &self.trigger {
                        out.push(Box::new(StubElement {
                            role,
                            automation_id: id.clone(),
                            text: String::new(),
                            enabled: *enabled,
                        }));
                    }
                }
                ElementRole::Text => {
                    for text in &self.texts {
                        out.push(Box::new(StubElement {
                            role,
                            automation_id: String::new(),
                            text: text.clone(),
                            enabled: true,
                        }));
                    }
                }
                _ => {}
            }
            out
        }
    }

    fn sigs() -> StateSignatures {
        StateSignatures {
            main_title: "capella-scan".into(),
            chooser_class: "#32770".into(),
            open_entry_id: "1148".into(),
            save_entry_id: "1001".into(),
            completion: CompletionProbe::TriggerEnabled("actionStartRecognition".into()),
        }
    }

    fn main_surface(trigger_enabled: Option<bool>) -> StubSurface {
        StubSurface {
            title: "capella-scan 9 - score1.png".into(),
            trigger: trigger_enabled.map(|e| ("actionStartRecognition".to_string(), e)),
            ..Default::default()
        }
    }

    fn chooser(entry_id: &str) -> StubSurface {
        StubSurface {
            title: "Open".into(),
            class_name: "#32770".into(),
            edits: vec![entry_id.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_main_matches_by_title_signature() {
        let sigs = sigs();
        assert!(matches_state(&main_surface(None), ExternalState::Main, &sigs));
        let other = StubSurface {
            title: "Notepad".into(),
            ..Default::default()
        };
        assert!(!matches_state(&other, ExternalState::Main, &sigs));
    }

    #[test]
    fn test_open_and_save_choosers_distinguished_by_entry_id() {
        let sigs = sigs();
        let open = chooser("1148");
        let save = chooser("1001");
        assert!(matches_state(&open, ExternalState::AwaitingOpen, &sigs));
        assert!(!matches_state(&open, ExternalState::AwaitingSave, &sigs));
        assert!(matches_state(&save, ExternalState::AwaitingSave, &sigs));
        assert!(!matches_state(&save, ExternalState::AwaitingOpen, &sigs));
    }

    #[test]
    fn test_chooser_nested_one_level_down_still_matches() {
        let sigs = sigs();
        let shell = StubSurface {
            title: "capella-scan 9".into(),
            class_name: "QShell".into(),
            children: vec![chooser("1148")],
            ..Default::default()
        };
        assert!(matches_state(&shell, ExternalState::AwaitingOpen, &sigs));
    }

    #[test]
    fn test_recognition_states_via_trigger_enabled_flag() {
        let sigs = sigs();
        let running = main_surface(Some(false));
        let done = main_surface(Some(true));
        assert!(matches_state(
            &running,
            ExternalState::RecognitionInProgress,
            &sigs
        ));
        assert!(!matches_state(&running, ExternalState::RecognitionDone, &sigs));
        assert!(matches_state(&done, ExternalState::RecognitionDone, &sigs));
        assert!(!matches_state(&done, ExternalState::RecognitionInProgress, &sigs));
    }

    #[test]
    fn test_recognition_done_via_marker_text() {
        let mut sigs = sigs();
        sigs.completion = CompletionProbe::MarkerText("Recognition finished".into());
        let mut done = main_surface(None);
        done.texts = vec!["Recognition finished in 42 s".into()];
        assert!(matches_state(&done, ExternalState::RecognitionDone, &sigs));

        let mut running = main_surface(None);
        running.texts = vec!["Recognizing page 1".into()];
        assert!(matches_state(
            &running,
            ExternalState::RecognitionInProgress,
            &sigs
        ));
    }

    #[test]
    fn test_classify_is_exclusive_and_prioritises_choosers() {
        let sigs = sigs();
        // A main-titled shell with a nested open chooser classifies as
        // AwaitingOpen, never as Main as well.
        let shell = StubSurface {
            title: "capella-scan 9".into(),
            children: vec![chooser("1148")],
            ..Default::default()
        };
        assert_eq!(classify(&shell, &sigs), ExternalState::AwaitingOpen);

        assert_eq!(classify(&main_surface(None), &sigs), ExternalState::Main);
        assert_eq!(
            classify(&main_surface(Some(false)), &sigs),
            ExternalState::RecognitionInProgress
        );
        assert_eq!(
            classify(&main_surface(Some(true)), &sigs),
            ExternalState::RecognitionDone
        );

        let foreign = StubSurface {
            title: "Task Manager".into(),
            ..Default::default()
        };
        assert_eq!(classify(&foreign, &sigs), ExternalState::Unknown);
    }
}
