//! Win32 realisation of the typed input model via `SendInput`.
//!
//! Chords press every key in order and release in reverse, in one atomic
//! `SendInput` call; text is injected as `KEYEVENTF_UNICODE` events so it
//! is layout-independent.

use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
    KEYEVENTF_UNICODE, VIRTUAL_KEY,
};

use crate::errors::DriveError;
use crate::input::{Chord, InputEvent, Key, MAX_TEXT_LENGTH};

/// Pre-computed size of `INPUT` for `SendInput` calls.
const INPUT_SIZE: i32 = std::mem::size_of::<INPUT>() as i32;

const VK_SHIFT: u16 = 0x10;
const VK_CONTROL: u16 = 0x11;
const VK_MENU: u16 = 0x12;
const VK_RETURN: u16 = 0x0D;
const VK_ESCAPE: u16 = 0x1B;
const VK_TAB: u16 = 0x09;

fn virtual_key_input(vk: u16, key_up: bool) -> INPUT {
    let flags = if key_up {
        KEYEVENTF_KEYUP
    } else {
        KEYBD_EVENT_FLAGS(0)
    };

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn unicode_key_input(scan_code: u16, key_up: bool) -> INPUT {
    let flags = if key_up {
        KEYEVENTF_UNICODE | KEYEVENTF_KEYUP
    } else {
        KEYEVENTF_UNICODE
    };

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(0),
                wScan: scan_code,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

/// Virtual-key code for a chord's non-modifier key.
///
/// Letter and digit keys share their uppercase ASCII code; anything else
/// printable has no layout-independent VK mapping and is rejected.
fn key_vk(key: Key) -> Result<u16, DriveError> {
    match key {
        Key::Char(c) if c.is_ascii_alphanumeric() => Ok(c.to_ascii_uppercase() as u16),
        Key::Char(c) => Err(DriveError::Input(format!(
            "no virtual-key mapping for character {c:?}"
        ))),
        Key::Enter => Ok(VK_RETURN),
        Key::Escape => Ok(VK_ESCAPE),
        Key::Tab => Ok(VK_TAB),
    }
}

/// Build the press/release event list for one chord.
fn chord_inputs(chord: &Chord) -> Result<Vec<INPUT>, DriveError> {
    let mut vks: Vec<u16> = Vec::with_capacity(4);
    if chord.ctrl {
        vks.push(VK_CONTROL);
    }
    if chord.shift {
        vks.push(VK_SHIFT);
    }
    if chord.alt {
        vks.push(VK_MENU);
    }
    vks.push(key_vk(chord.key)?);

    let mut inputs: Vec<INPUT> = Vec::with_capacity(vks.len() * 2);
    for &vk in &vks {
        inputs.push(virtual_key_input(vk, false));
    }
    for &vk in vks.iter().rev() {
        inputs.push(virtual_key_input(vk, true));
    }
    Ok(inputs)
}

/// Inject a full input sequence into the focused surface.
pub fn send_events(sequence: &[InputEvent]) -> Result<(), DriveError> {
    for event in sequence {
        match event {
            InputEvent::Chord(chord) => {
                let inputs = chord_inputs(chord)?;
                let sent = unsafe { SendInput(&inputs, INPUT_SIZE) };
                if sent != inputs.len() as u32 {
                    return Err(DriveError::Input(format!(
                        "SendInput injected {sent}/{} events for chord {chord}",
                        inputs.len()
                    )));
                }
            }
            InputEvent::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                if text.len() > MAX_TEXT_LENGTH {
                    return Err(DriveError::Input(format!(
                        "text exceeds {MAX_TEXT_LENGTH} bytes"
                    )));
                }
                let chars: Vec<u16> = text.encode_utf16().collect();
                let mut inputs: Vec<INPUT> = Vec::with_capacity(chars.len() * 2);
                for &ch in &chars {
                    inputs.push(unicode_key_input(ch, false));
                    inputs.push(unicode_key_input(ch, true));
                }
                let sent = unsafe { SendInput(&inputs, INPUT_SIZE) };
                if sent != inputs.len() as u32 {
                    return Err(DriveError::Input(format!(
                        "SendInput injected {sent}/{} unicode events",
                        inputs.len()
                    )));
                }
            }
        }
    }
    Ok(())
}
