//! Typed synthetic-input model.
//!
//! The control plane describes keystrokes as data ([`InputEvent`]) and
//! hands them to the active [`crate::surface::UiDriver`], which realises
//! them against the external system.  Chord semantics are fixed: all keys
//! of a chord are pressed in order and released in reverse, as one atomic
//! injection.

use std::fmt;

/// Maximum text length per [`InputEvent::Text`] to prevent unbounded
/// injection.
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// A single non-modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A printable character key (ASCII letters and digits).
    Char(char),
    Enter,
    Escape,
    Tab,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Key::Enter => write!(f, "Enter"),
            Key::Escape => write!(f, "Esc"),
            Key::Tab => write!(f, "Tab"),
        }
    }
}

/// A modifier+key combination, e.g. Ctrl+O or Ctrl+Shift+M.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub key: Key,
}

impl Chord {
    /// A bare key with no modifiers.
    pub fn plain(key: Key) -> Self {
        Chord {
            ctrl: false,
            shift: false,
            alt: false,
            key,
        }
    }

    pub fn ctrl(c: char) -> Self {
        Chord {
            ctrl: true,
            shift: false,
            alt: false,
            key: Key::Char(c),
        }
    }

    pub fn ctrl_shift(c: char) -> Self {
        Chord {
            ctrl: true,
            shift: true,
            alt: false,
            key: Key::Char(c),
        }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// One unit of synthetic input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A modifier+key chord, injected atomically.
    Chord(Chord),
    /// Literal text, typed character by character.
    Text(String),
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::Chord(chord) => write!(f, "{chord}"),
            InputEvent::Text(text) => write!(f, "Text({text:?})"),
        }
    }
}

/// Render a sequence for logs, e.g. `Ctrl+O` or `Ctrl+Shift+M, Enter`.
pub fn sequence_label(sequence: &[InputEvent]) -> String {
    sequence
        .iter()
        .map(|ev| ev.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
