//! Windows backend: [`UiaDriver`] implements the capability traits over
//! Win32 window enumeration and UI Automation.
//!
//! Surfaces are top-level windows of the target process; descendants are
//! resolved with `FindAll(TreeScope_Descendants)` under a control-type
//! condition; clicks go through `InvokePattern`, text entry through
//! `ValuePattern`, and keystrokes through `SendInput`.
//!
//! The driver owns the thread's COM apartment for its whole lifetime.
//! Surfaces and elements it hands out hold COM references and must not
//! outlive it.  Everything runs on the single control thread.

mod com;
mod input;

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};
use windows::core::Interface;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, TRUE};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER};
use windows::Win32::UI::Accessibility::{
    CUIAutomation, IUIAutomation, IUIAutomationCondition, IUIAutomationElement,
    IUIAutomationInvokePattern, IUIAutomationValuePattern, TreeScope_Descendants,
    UIA_ButtonControlTypeId, UIA_ControlTypePropertyId, UIA_EditControlTypeId,
    UIA_InvokePatternId, UIA_MenuItemControlTypeId, UIA_PaneControlTypeId,
    UIA_TextControlTypeId, UIA_ValuePatternId, UIA_WindowControlTypeId,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, GetClassNameW, GetParent, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsWindowVisible,
};

use crate::errors::DriveError;
use crate::input::InputEvent;
use crate::surface::{Element, ElementRole, Surface, UiDriver};

use com::ComGuard;

/// How long to wait for the target's first window after attach/spawn.
/// This precedes the batch; all in-batch waiting goes through the poller.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(30);
const ATTACH_POLL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Win32 helpers
// ---------------------------------------------------------------------------

/// Read the window title (up to its reported length).
fn read_window_title(hwnd: HWND) -> String {
    let len = unsafe { GetWindowTextLengthW(hwnd) };
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u16; (len + 1) as usize];
    let copied = unsafe { GetWindowTextW(hwnd, &mut buf) };
    if copied <= 0 {
        return String::new();
    }
    OsString::from_wide(&buf[..copied as usize])
        .to_string_lossy()
        .into_owned()
}

/// Read the window class name (up to 256 chars).
fn read_class_name(hwnd: HWND) -> String {
    let mut buf = [0u16; 256];
    let len = unsafe { GetClassNameW(hwnd, &mut buf) };
    if len <= 0 {
        return String::new();
    }
    OsString::from_wide(&buf[..len as usize])
        .to_string_lossy()
        .into_owned()
}

/// Get the owning process ID for a window handle.
fn read_pid(hwnd: HWND) -> u32 {
    let mut pid: u32 = 0;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    pid
}

struct EnumState {
    pid: u32,
    handles: Vec<HWND>,
}

/// Collect visible top-level windows belonging to the target process.
unsafe extern "system" fn enum_top_level(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let state = unsafe { &mut *(lparam.0 as *mut EnumState) };
    if unsafe { IsWindowVisible(hwnd) }.as_bool() && read_pid(hwnd) == state.pid {
        state.handles.push(hwnd);
    }
    TRUE
}

struct ChildEnumState {
    parent: HWND,
    handles: Vec<HWND>,
}

/// Collect visible *direct* children -- EnumChildWindows walks the whole
/// subtree, so filter on the immediate parent.
unsafe extern "system" fn enum_direct_children(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let state = unsafe { &mut *(lparam.0 as *mut ChildEnumState) };
    let is_direct = unsafe { GetParent(hwnd) }
        .map(|parent| parent == state.parent)
        .unwrap_or(false);
    if is_direct && unsafe { IsWindowVisible(hwnd) }.as_bool() {
        state.handles.push(hwnd);
    }
    TRUE
}

/// Map a control role to its UIA control-type ID.
fn control_type_id(role: ElementRole) -> i32 {
    match role {
        ElementRole::Window => UIA_WindowControlTypeId.0,
        ElementRole::Pane => UIA_PaneControlTypeId.0,
        ElementRole::Button => UIA_ButtonControlTypeId.0,
        ElementRole::Edit => UIA_EditControlTypeId.0,
        ElementRole::Text => UIA_TextControlTypeId.0,
        ElementRole::MenuItem => UIA_MenuItemControlTypeId.0,
    }
}

/// Find a running process by executable name.
fn find_running_pid(exe: &std::path::Path) -> Option<u32> {
    let name = exe.file_name()?;
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    sys.processes_by_name(name)
        .next()
        .map(|p| p.pid().as_u32())
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// [`UiDriver`] over one external process's window tree.
pub struct UiaDriver {
    exe: PathBuf,
    pid: Mutex<Option<u32>>,
    uia: IUIAutomation,
    _com: ComGuard,
}

impl UiaDriver {
    /// Set up COM and the UIA root interface.  Does not touch the target
    /// process yet; `connect` does.
    pub fn new(exe: PathBuf) -> Result<Self, DriveError> {
        let com = ComGuard::init()?;
        let uia: IUIAutomation =
            unsafe { CoCreateInstance(&CUIAutomation, None, CLSCTX_INPROC_SERVER) }.map_err(
                |e| DriveError::Startup(format!("CoCreateInstance(CUIAutomation): {e}")),
            )?;
        Ok(UiaDriver {
            exe,
            pid: Mutex::new(None),
            uia,
            _com: com,
        })
    }

    fn target_pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    fn top_level_windows(&self, pid: u32) -> Result<Vec<HWND>, DriveError> {
        let mut state = EnumState {
            pid,
            handles: Vec::with_capacity(8),
        };
        unsafe {
            EnumWindows(
                Some(enum_top_level),
                LPARAM(&mut state as *mut EnumState as isize),
            )
        }
        .map_err(|e| DriveError::Introspection(format!("EnumWindows failed: {e}")))?;
        Ok(state.handles)
    }
}

impl UiDriver for UiaDriver {
    /// Attach to a running instance of the target executable, or spawn
    /// one, then wait for its first visible window.
    fn connect(&self) -> Result<(), DriveError> {
        let pid = match find_running_pid(&self.exe) {
            Some(pid) => {
                log::info!("attached to running {} (pid {pid})", self.exe.display());
                pid
            }
            None => {
                let child = Command::new(&self.exe).spawn().map_err(|e| {
                    DriveError::Startup(format!("failed to start {}: {e}", self.exe.display()))
                })?;
                let pid = child.id();
                log::info!("started {} (pid {pid})", self.exe.display());
                pid
            }
        };
        *self.pid.lock() = Some(pid);

        let deadline = Instant::now() + ATTACH_TIMEOUT;
        loop {
            if !self.top_level_windows(pid)?.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriveError::Startup(format!(
                    "no window of pid {pid} appeared within {ATTACH_TIMEOUT:?}"
                )));
            }
            std::thread::sleep(ATTACH_POLL);
        }
    }

    fn list_surfaces(&self) -> Result<Vec<Box<dyn Surface>>, DriveError> {
        let pid = self
            .target_pid()
            .ok_or_else(|| DriveError::Introspection("not connected to a target".into()))?;
        let handles = self.top_level_windows(pid)?;
        Ok(handles
            .into_iter()
            .map(|hwnd| {
                Box::new(UiaSurface {
                    hwnd,
                    uia: self.uia.clone(),
                }) as Box<dyn Surface>
            })
            .collect())
    }

    fn send_input(&self, sequence: &[InputEvent]) -> Result<(), DriveError> {
        input::send_events(sequence)
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct UiaSurface {
    hwnd: HWND,
    uia: IUIAutomation,
}

impl UiaSurface {
    /// Build the role condition and run `FindAll` under this window.
    /// Introspection trouble reads as "no descendants".
    fn find_descendants(&self, role: ElementRole) -> Option<Vec<Box<dyn Element>>> {
        let root: IUIAutomationElement = unsafe { self.uia.ElementFromHandle(self.hwnd) }.ok()?;

        let variant = windows::core::VARIANT::from(control_type_id(role));
        let condition: IUIAutomationCondition = unsafe {
            self.uia
                .CreatePropertyCondition(UIA_ControlTypePropertyId, &variant)
        }
        .ok()?
        .cast()
        .ok()?;

        let elements = unsafe { root.FindAll(TreeScope_Descendants, &condition) }.ok()?;
        let count = unsafe { elements.Length() }.unwrap_or(0);

        let mut out: Vec<Box<dyn Element>> = Vec::with_capacity(count as usize);
        for i in 0..count {
            if let Ok(element) = unsafe { elements.GetElement(i) } {
                out.push(Box::new(UiaElement { element, role }));
            }
        }
        Some(out)
    }
}

impl Surface for UiaSurface {
    fn is_visible(&self) -> bool {
        unsafe { IsWindowVisible(self.hwnd) }.as_bool()
    }

    fn title(&self) -> String {
        read_window_title(self.hwnd)
    }

    fn class_name(&self) -> String {
        read_class_name(self.hwnd)
    }

    fn children(&self) -> Vec<Box<dyn Surface>> {
        let mut state = ChildEnumState {
            parent: self.hwnd,
            handles: Vec::new(),
        };
        let _ = unsafe {
            EnumChildWindows(
                self.hwnd,
                Some(enum_direct_children),
                LPARAM(&mut state as *mut ChildEnumState as isize),
            )
        };
        state
            .handles
            .into_iter()
            .map(|hwnd| {
                Box::new(UiaSurface {
                    hwnd,
                    uia: self.uia.clone(),
                }) as Box<dyn Surface>
            })
            .collect()
    }

    fn descendants(&self, role: ElementRole) -> Vec<Box<dyn Element>> {
        match self.find_descendants(role) {
            Some(elements) => elements,
            None => {
                log::trace!("descendant query failed on hwnd {:?}", self.hwnd);
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

struct UiaElement {
    element: IUIAutomationElement,
    role: ElementRole,
}

impl Element for UiaElement {
    fn role(&self) -> ElementRole {
        self.role
    }

    fn name(&self) -> String {
        unsafe { self.element.CurrentName() }
            .map(|b| b.to_string())
            .unwrap_or_default()
    }

    fn automation_id(&self) -> String {
        unsafe { self.element.CurrentAutomationId() }
            .map(|b| b.to_string())
            .unwrap_or_default()
    }

    fn text(&self) -> String {
        // UIA exposes a text control's content as its Name.
        self.name()
    }

    fn is_enabled(&self) -> bool {
        unsafe { self.element.CurrentIsEnabled() }
            .map(|b| b.as_bool())
            .unwrap_or(false)
    }

    fn click(&self) -> Result<(), DriveError> {
        let pattern: Option<IUIAutomationInvokePattern> = unsafe {
            self.element
                .GetCurrentPattern(UIA_InvokePatternId)
                .ok()
                .and_then(|p| p.cast().ok())
        };
        match pattern {
            Some(p) => unsafe { p.Invoke() }
                .map_err(|e| DriveError::Input(format!("Invoke failed: {e}"))),
            None => Err(DriveError::Input(format!(
                "element '{}' does not support InvokePattern",
                self.name()
            ))),
        }
    }

    fn set_text(&self, value: &str) -> Result<(), DriveError> {
        let pattern: Option<IUIAutomationValuePattern> = unsafe {
            self.element
                .GetCurrentPattern(UIA_ValuePatternId)
                .ok()
                .and_then(|p| p.cast().ok())
        };
        match pattern {
            Some(p) => {
                let bstr = windows::core::BSTR::from(value);
                unsafe { p.SetValue(&bstr) }
                    .map_err(|e| DriveError::Input(format!("SetValue failed: {e}")))
            }
            None => Err(DriveError::Input(format!(
                "element '{}' does not support ValuePattern",
                self.name()
            ))),
        }
    }
}
