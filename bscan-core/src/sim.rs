//! Deterministic stand-ins for the external system and the wall clock.
//!
//! [`SimApp`] is a scripted in-memory model of the recognition application:
//! it reacts to the profile's hotkeys and element interactions by switching
//! an internal screen model, counts recognition down across poll ticks, and
//! supports fault injection (stuck recognition, transient introspection
//! failures, refused connect).  [`SimClock`] advances virtual time on every
//! `sleep`.  Together they back the test suite and `bscan --dry-run` --
//! no wall-clock sleeps, no real process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::errors::DriveError;
use crate::input::{sequence_label, Chord, InputEvent, Key};
use crate::profile::AppProfile;
use crate::state::CompletionProbe;
use crate::surface::{Element, ElementRole, Surface, UiDriver};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Manual [`Clock`]: `sleep` advances virtual time instead of blocking.
pub struct SimClock {
    now: Mutex<Duration>,
    sleeps: Mutex<usize>,
}

impl SimClock {
    pub fn new() -> Self {
        SimClock {
            now: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(0),
        }
    }

    /// How many times `sleep` has been called.
    pub fn sleep_count(&self) -> usize {
        *self.sleeps.lock()
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock() += duration;
        *self.sleeps.lock() += 1;
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Which screen the simulated application is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Main,
    OpenChooser,
    SaveChooser,
}

/// Selectors the simulator answers to, copied from the profile so the
/// simulator always mirrors whatever profile drives it.
#[derive(Debug)]
struct SimConfig {
    main_title: String,
    chooser_class: String,
    open_entry_id: String,
    save_entry_id: String,
    trigger_id: String,
    /// Completion marker emitted as a status text once recognition is done.
    marker: String,
    open_chord: Option<Chord>,
    export_chord: Option<Chord>,
    close_chord: Option<Chord>,
    dismiss_chord: Option<Chord>,
    open_confirm: String,
    save_confirm: String,
}

#[derive(Debug)]
struct Model {
    screen: Screen,
    /// File name of the loaded document, if any.
    loaded: Option<String>,
    recognizing: bool,
    recognized: bool,
    /// Poll ticks left until a running recognition completes.
    ticks_left: u32,
    /// Configured recognition duration in poll ticks.
    recognition_ticks: u32,
    /// Text typed into the chooser's path entry.
    entry: String,
    /// Directory primed by the last full-path save.
    save_dir: Option<PathBuf>,
    saved: Vec<PathBuf>,
    /// Input file names whose recognition never completes.
    stuck: HashSet<String>,
    /// Leading `list_surfaces` calls that fail.
    introspection_failures: u32,
    refuse_connect: bool,
    /// Present the chooser nested inside a shell surface.
    nest_chooser: bool,
    /// One entry per injected sequence or element interaction.
    input_log: Vec<String>,
}

fn single_chord(sequence: &[InputEvent]) -> Option<Chord> {
    match sequence {
        [InputEvent::Chord(chord)] => Some(*chord),
        _ => None,
    }
}

fn confirm_open(model: &mut Model) {
    let name = Path::new(&model.entry)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| model.entry.clone());
    model.loaded = Some(name);
    model.recognizing = false;
    model.recognized = false;
    model.screen = Screen::Main;
}

fn confirm_save(model: &mut Model) {
    let typed = PathBuf::from(model.entry.clone());
    let has_dir = typed
        .parent()
        .map(|p| !p.as_os_str().is_empty())
        .unwrap_or(false);
    let resolved = if has_dir {
        model.save_dir = typed.parent().map(Path::to_path_buf);
        typed
    } else {
        match &model.save_dir {
            Some(dir) => dir.join(&typed),
            None => typed,
        }
    };
    model.saved.push(resolved);
    model.screen = Screen::Main;
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Scripted [`UiDriver`] over an in-memory application model.
pub struct SimApp {
    cfg: Arc<SimConfig>,
    model: Arc<Mutex<Model>>,
}

impl SimApp {
    pub fn new(profile: &AppProfile) -> Self {
        let sigs = &profile.signatures;
        let marker = match &sigs.completion {
            CompletionProbe::MarkerText(marker) => marker.clone(),
            CompletionProbe::TriggerEnabled(_) => "Recognition finished".to_string(),
        };
        let cfg = SimConfig {
            main_title: sigs.main_title.clone(),
            chooser_class: sigs.chooser_class.clone(),
            open_entry_id: sigs.open_entry_id.clone(),
            save_entry_id: sigs.save_entry_id.clone(),
            trigger_id: profile.recognize_trigger_id.clone(),
            marker,
            open_chord: single_chord(&profile.open_chooser),
            export_chord: single_chord(&profile.export_chooser),
            close_chord: single_chord(&profile.close_document),
            dismiss_chord: single_chord(&profile.dismiss),
            open_confirm: profile.open_confirm.clone(),
            save_confirm: profile.save_confirm.clone(),
        };
        let model = Model {
            screen: Screen::Main,
            loaded: None,
            recognizing: false,
            recognized: false,
            ticks_left: 0,
            recognition_ticks: 3,
            entry: String::new(),
            save_dir: None,
            saved: Vec::new(),
            stuck: HashSet::new(),
            introspection_failures: 0,
            refuse_connect: false,
            nest_chooser: false,
            input_log: Vec::new(),
        };
        SimApp {
            cfg: Arc::new(cfg),
            model: Arc::new(Mutex::new(model)),
        }
    }

    /// Recognition duration in poll ticks (default 3).
    pub fn set_recognition_ticks(&self, ticks: u32) {
        self.model.lock().recognition_ticks = ticks;
    }

    /// Make recognition of the given input file name never complete.
    pub fn stick_recognition(&self, file_name: &str) {
        self.model.lock().stuck.insert(file_name.to_string());
    }

    /// Fail the next `count` surface enumerations.
    pub fn fail_introspection(&self, count: u32) {
        self.model.lock().introspection_failures = count;
    }

    /// Make `connect` fail, as an unreachable external target would.
    pub fn refuse_connect(&self) {
        self.model.lock().refuse_connect = true;
    }

    /// Present choosers nested one level inside a shell surface.
    pub fn nest_choosers(&self) {
        self.model.lock().nest_chooser = true;
    }

    /// Output paths accepted by the save chooser, in order.
    pub fn saved_outputs(&self) -> Vec<PathBuf> {
        self.model.lock().saved.clone()
    }

    /// Every injected sequence and element interaction, in order.
    pub fn input_log(&self) -> Vec<String> {
        self.model.lock().input_log.clone()
    }

    fn surface(&self, kind: SurfaceKind) -> Box<dyn Surface> {
        Box::new(SimSurface {
            cfg: Arc::clone(&self.cfg),
            model: Arc::clone(&self.model),
            kind,
        })
    }
}

impl UiDriver for SimApp {
    fn connect(&self) -> Result<(), DriveError> {
        if self.model.lock().refuse_connect {
            return Err(DriveError::Startup(
                "simulated target refused connection".into(),
            ));
        }
        Ok(())
    }

    fn list_surfaces(&self) -> Result<Vec<Box<dyn Surface>>, DriveError> {
        {
            let mut m = self.model.lock();
            if m.introspection_failures > 0 {
                m.introspection_failures -= 1;
                return Err(DriveError::Introspection(
                    "simulated surface tree unreadable".into(),
                ));
            }

            // A running recognition advances one tick per observation,
            // unless the loaded file is scripted to hang.
            if m.recognizing {
                let hung = m
                    .loaded
                    .as_ref()
                    .map(|name| m.stuck.contains(name))
                    .unwrap_or(false);
                if !hung && m.ticks_left > 0 {
                    m.ticks_left -= 1;
                    if m.ticks_left == 0 {
                        m.recognizing = false;
                        m.recognized = true;
                    }
                }
            }
        }

        let m = self.model.lock();
        let mut out = vec![self.surface(SurfaceKind::MainWin)];
        if m.screen != Screen::Main {
            if m.nest_chooser {
                out.push(self.surface(SurfaceKind::Shell));
            } else {
                out.push(self.surface(SurfaceKind::Chooser));
            }
        }
        Ok(out)
    }

    fn send_input(&self, sequence: &[InputEvent]) -> Result<(), DriveError> {
        let mut m = self.model.lock();
        m.input_log.push(format!("keys [{}]", sequence_label(sequence)));

        for event in sequence {
            match event {
                InputEvent::Chord(chord) => {
                    if Some(*chord) == self.cfg.open_chord {
                        m.screen = Screen::OpenChooser;
                        m.entry.clear();
                    } else if Some(*chord) == self.cfg.export_chord {
                        if m.loaded.is_some() {
                            m.screen = Screen::SaveChooser;
                            m.entry.clear();
                        }
                    } else if Some(*chord) == self.cfg.close_chord {
                        m.loaded = None;
                        m.recognizing = false;
                        m.recognized = false;
                        m.screen = Screen::Main;
                    } else if Some(*chord) == self.cfg.dismiss_chord {
                        m.screen = Screen::Main;
                    } else if *chord == Chord::plain(Key::Enter) {
                        match m.screen {
                            Screen::OpenChooser => confirm_open(&mut m),
                            Screen::SaveChooser => confirm_save(&mut m),
                            Screen::Main => {}
                        }
                    }
                    // Unrecognised chords fall through with no effect.
                }
                InputEvent::Text(text) => {
                    if m.screen != Screen::Main {
                        m.entry.push_str(text);
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Surfaces and elements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceKind {
    MainWin,
    Chooser,
    /// Wrapper around the chooser, for nested-dialog layouts.
    Shell,
}

#[derive(Debug)]
struct SimSurface {
    cfg: Arc<SimConfig>,
    model: Arc<Mutex<Model>>,
    kind: SurfaceKind,
}

impl SimSurface {
    fn element(&self, kind: ElemKind) -> Box<dyn Element> {
        Box::new(SimElement {
            cfg: Arc::clone(&self.cfg),
            model: Arc::clone(&self.model),
            kind,
        })
    }
}

impl Surface for SimSurface {
    fn is_visible(&self) -> bool {
        match self.kind {
            SurfaceKind::MainWin => true,
            SurfaceKind::Chooser | SurfaceKind::Shell => {
                self.model.lock().screen != Screen::Main
            }
        }
    }

    fn title(&self) -> String {
        let m = self.model.lock();
        match self.kind {
            SurfaceKind::MainWin => match &m.loaded {
                Some(doc) => format!("{} 9 - {doc}", self.cfg.main_title),
                None => format!("{} 9", self.cfg.main_title),
            },
            SurfaceKind::Chooser => match m.screen {
                Screen::OpenChooser => "Open".into(),
                Screen::SaveChooser => "Save As".into(),
                Screen::Main => String::new(),
            },
            SurfaceKind::Shell => "Dialog Host".into(),
        }
    }

    fn class_name(&self) -> String {
        match self.kind {
            SurfaceKind::MainWin => "Qt5QWindowIcon".into(),
            SurfaceKind::Chooser => self.cfg.chooser_class.clone(),
            SurfaceKind::Shell => "QShellDialog".into(),
        }
    }

    fn children(&self) -> Vec<Box<dyn Surface>> {
        match self.kind {
            SurfaceKind::Shell => vec![Box::new(SimSurface {
                cfg: Arc::clone(&self.cfg),
                model: Arc::clone(&self.model),
                kind: SurfaceKind::Chooser,
            })],
            _ => Vec::new(),
        }
    }

    fn descendants(&self, role: ElementRole) -> Vec<Box<dyn Element>> {
        let screen = self.model.lock().screen;
        match self.kind {
            SurfaceKind::MainWin => match role {
                ElementRole::Button => vec![self.element(ElemKind::Trigger)],
                ElementRole::Text => {
                    if self.model.lock().recognized {
                        vec![self.element(ElemKind::Status)]
                    } else {
                        Vec::new()
                    }
                }
                _ => Vec::new(),
            },
            // The shell exposes its nested chooser's controls, as a real
            // descendant query would.
            SurfaceKind::Chooser | SurfaceKind::Shell => match (role, screen) {
                (ElementRole::Edit, Screen::OpenChooser | Screen::SaveChooser) => {
                    vec![self.element(ElemKind::Entry)]
                }
                (ElementRole::Button, Screen::OpenChooser | Screen::SaveChooser) => {
                    vec![self.element(ElemKind::Confirm)]
                }
                _ => Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElemKind {
    /// Recognition trigger on the main window.
    Trigger,
    /// Path entry of the active chooser.
    Entry,
    /// Confirm button of the active chooser.
    Confirm,
    /// Completion status text on the main window.
    Status,
}

struct SimElement {
    cfg: Arc<SimConfig>,
    model: Arc<Mutex<Model>>,
    kind: ElemKind,
}

impl Element for SimElement {
    fn role(&self) -> ElementRole {
        match self.kind {
            ElemKind::Trigger | ElemKind::Confirm => ElementRole::Button,
            ElemKind::Entry => ElementRole::Edit,
            ElemKind::Status => ElementRole::Text,
        }
    }

    fn name(&self) -> String {
        let m = self.model.lock();
        match self.kind {
            ElemKind::Trigger => "Start recognition".into(),
            ElemKind::Confirm => match m.screen {
                Screen::OpenChooser => self.cfg.open_confirm.clone(),
                Screen::SaveChooser => self.cfg.save_confirm.clone(),
                Screen::Main => String::new(),
            },
            _ => String::new(),
        }
    }

    fn automation_id(&self) -> String {
        let m = self.model.lock();
        match self.kind {
            ElemKind::Trigger => self.cfg.trigger_id.clone(),
            ElemKind::Entry => match m.screen {
                Screen::OpenChooser => self.cfg.open_entry_id.clone(),
                Screen::SaveChooser => self.cfg.save_entry_id.clone(),
                Screen::Main => String::new(),
            },
            _ => String::new(),
        }
    }

    fn text(&self) -> String {
        match self.kind {
            ElemKind::Status => {
                if self.model.lock().recognized {
                    self.cfg.marker.clone()
                } else {
                    String::new()
                }
            }
            ElemKind::Entry => self.model.lock().entry.clone(),
            _ => String::new(),
        }
    }

    fn is_enabled(&self) -> bool {
        match self.kind {
            ElemKind::Trigger => !self.model.lock().recognizing,
            _ => true,
        }
    }

    fn click(&self) -> Result<(), DriveError> {
        let mut m = self.model.lock();
        match self.kind {
            ElemKind::Trigger => {
                m.input_log.push(format!("click #{}", self.cfg.trigger_id));
                if m.screen != Screen::Main {
                    return Err(DriveError::Input(
                        "main window is blocked by a modal surface".into(),
                    ));
                }
                if m.loaded.is_none() {
                    return Err(DriveError::Input("no document loaded".into()));
                }
                m.recognizing = true;
                m.recognized = false;
                m.ticks_left = m.recognition_ticks;
                Ok(())
            }
            ElemKind::Confirm => match m.screen {
                Screen::OpenChooser => {
                    m.input_log.push(format!("click '{}'", self.cfg.open_confirm));
                    confirm_open(&mut m);
                    Ok(())
                }
                Screen::SaveChooser => {
                    m.input_log.push(format!("click '{}'", self.cfg.save_confirm));
                    confirm_save(&mut m);
                    Ok(())
                }
                Screen::Main => Err(DriveError::Input("chooser is gone".into())),
            },
            _ => Err(DriveError::Input("element is not clickable".into())),
        }
    }

    fn set_text(&self, value: &str) -> Result<(), DriveError> {
        let mut m = self.model.lock();
        match self.kind {
            ElemKind::Entry => {
                if m.screen == Screen::Main {
                    return Err(DriveError::Input("chooser is gone".into()));
                }
                let id = match m.screen {
                    Screen::OpenChooser => &self.cfg.open_entry_id,
                    Screen::SaveChooser => &self.cfg.save_entry_id,
                    Screen::Main => unreachable!(),
                };
                m.input_log.push(format!("set edit #{id}"));
                m.entry = value.to_string();
                Ok(())
            }
            _ => Err(DriveError::Input("element is not editable".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
