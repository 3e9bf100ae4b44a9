//! Capability traits over the external system's UI-surface tree.
//!
//! The control plane (poller, dispatcher, batch loop) only ever talks to
//! these object-safe traits.  Two backends implement them: the Windows UIA
//! driver ([`crate::win`]) and the in-process simulator ([`crate::sim`]).
//!
//! Property reads return owned values and fall back to empty/false when the
//! underlying read fails -- the introspection interface of a live GUI
//! process is flaky under load, and a failed read must look like "no
//! match", never like a crash.  Only [`UiDriver::list_surfaces`] surfaces
//! introspection failures as errors, and the poller swallows those.

use crate::errors::DriveError;
use crate::input::InputEvent;

/// Control role of a descendant element, the subset of the accessibility
/// vocabulary this driver addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Window,
    Pane,
    Button,
    Edit,
    Text,
    MenuItem,
}

impl ElementRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementRole::Window => "Window",
            ElementRole::Pane => "Pane",
            ElementRole::Button => "Button",
            ElementRole::Edit => "Edit",
            ElementRole::Text => "Text",
            ElementRole::MenuItem => "MenuItem",
        }
    }
}

impl std::fmt::Display for ElementRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A descendant control within a [`Surface`] (button, text, input field).
///
/// Handles are live views, not snapshots: a handle held across a screen
/// change may go stale, in which case interactions return
/// [`DriveError::Input`] and reads return empty values.
pub trait Element {
    fn role(&self) -> ElementRole;

    /// Accessible name (e.g. a button caption).  Empty if unreadable.
    fn name(&self) -> String;

    /// Backend automation identifier.  Empty if unreadable or unset.
    fn automation_id(&self) -> String;

    /// Visible text content.  Empty if unreadable.
    fn text(&self) -> String;

    fn is_enabled(&self) -> bool;

    /// Activate the element (invoke/click).
    fn click(&self) -> Result<(), DriveError>;

    /// Replace the element's editable value.
    fn set_text(&self, value: &str) -> Result<(), DriveError>;
}

/// A visible top-level window or dialog exposed by the external system.
pub trait Surface: std::fmt::Debug {
    fn is_visible(&self) -> bool;

    /// Window title.  Empty if unreadable.
    fn title(&self) -> String;

    /// Window class string.  Empty if unreadable.
    fn class_name(&self) -> String;

    /// Direct child surfaces.  Empty on introspection trouble.
    fn children(&self) -> Vec<Box<dyn Surface>>;

    /// All descendant elements of the given role.  Empty on introspection
    /// trouble.
    fn descendants(&self, role: ElementRole) -> Vec<Box<dyn Element>>;
}

/// The external system under automation: an opaque process exposing an
/// introspectable surface tree and a synthetic-input channel.
pub trait UiDriver {
    /// Obtain a live target (attach or spawn).  Called once before the
    /// batch; failure here is fatal to the run.
    fn connect(&self) -> Result<(), DriveError>;

    /// Enumerate the currently observable surfaces.
    fn list_surfaces(&self) -> Result<Vec<Box<dyn Surface>>, DriveError>;

    /// Inject a synthetic-input sequence into the focused surface.
    fn send_input(&self, sequence: &[InputEvent]) -> Result<(), DriveError>;
}

/// Find the first descendant of `surface` with the given role whose
/// accessible name matches `name` exactly.
pub fn descendant_by_name(
    surface: &dyn Surface,
    role: ElementRole,
    name: &str,
) -> Option<Box<dyn Element>> {
    surface
        .descendants(role)
        .into_iter()
        .find(|el| el.name() == name)
}

/// Find the first descendant of `surface` with the given role and
/// automation identifier.
pub fn descendant_by_id(
    surface: &dyn Surface,
    role: ElementRole,
    automation_id: &str,
) -> Option<Box<dyn Element>> {
    surface
        .descendants(role)
        .into_iter()
        .find(|el| el.automation_id() == automation_id)
}
