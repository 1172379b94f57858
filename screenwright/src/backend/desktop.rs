//! Desktop implementations of the backend traits: xcap for capture, enigo
//! for input synthesis, arboard for the clipboard, and the platform opener
//! for URLs and applications.

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use image::RgbaImage;
use tracing::debug;

use super::{ClipboardBackend, InputBackend, KeySpec, Launcher, ScreenBackend};
use crate::errors::AutomationError;
use crate::types::Point;

/// Captures the primary monitor through xcap.
pub struct XcapScreen;

impl ScreenBackend for XcapScreen {
    fn capture(&self) -> Result<RgbaImage, AutomationError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AutomationError::CaptureFailed(format!("monitor enumeration: {e}")))?;
        let monitor = monitors
            .into_iter()
            .next()
            .ok_or_else(|| AutomationError::CaptureFailed("no monitor available".into()))?;
        monitor
            .capture_image()
            .map_err(|e| AutomationError::CaptureFailed(e.to_string()))
    }
}

/// Input synthesis through enigo. Enigo wants `&mut self` for every
/// operation, so the handle lives behind a mutex.
pub struct EnigoInput {
    enigo: Mutex<Enigo>,
}

impl EnigoInput {
    pub fn new() -> Result<Self, AutomationError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| AutomationError::InputFailed(format!("enigo init: {e}")))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    fn with_enigo<T>(
        &self,
        f: impl FnOnce(&mut Enigo) -> Result<T, enigo::InputError>,
    ) -> Result<T, AutomationError> {
        let mut enigo = self
            .enigo
            .lock()
            .map_err(|_| AutomationError::InputFailed("input handle poisoned".into()))?;
        f(&mut enigo).map_err(|e| AutomationError::InputFailed(e.to_string()))
    }
}

fn to_enigo_key(key: KeySpec) -> Key {
    match key {
        KeySpec::Enter => Key::Return,
        KeySpec::Escape => Key::Escape,
        KeySpec::Tab => Key::Tab,
        KeySpec::Space => Key::Space,
        KeySpec::Backspace => Key::Backspace,
        KeySpec::Control => Key::Control,
        KeySpec::Alt => Key::Alt,
        KeySpec::Shift => Key::Shift,
        KeySpec::Meta => Key::Meta,
        KeySpec::Char(c) => Key::Unicode(c),
    }
}

impl InputBackend for EnigoInput {
    fn pointer_location(&self) -> Result<Point, AutomationError> {
        let (x, y) = self.with_enigo(|e| e.location())?;
        Ok(Point::new(x, y))
    }

    fn pointer_move(&self, to: Point) -> Result<(), AutomationError> {
        self.with_enigo(|e| e.move_mouse(to.x, to.y, Coordinate::Abs))
    }

    fn button_press(&self) -> Result<(), AutomationError> {
        self.with_enigo(|e| e.button(Button::Left, Direction::Press))
    }

    fn button_release(&self) -> Result<(), AutomationError> {
        self.with_enigo(|e| e.button(Button::Left, Direction::Release))
    }

    fn key_tap(&self, key: KeySpec) -> Result<(), AutomationError> {
        self.with_enigo(|e| e.key(to_enigo_key(key), Direction::Click))
    }

    fn hotkey(&self, modifiers: &[KeySpec], key: KeySpec) -> Result<(), AutomationError> {
        self.with_enigo(|e| {
            for m in modifiers {
                e.key(to_enigo_key(*m), Direction::Press)?;
            }
            let result = e.key(to_enigo_key(key), Direction::Click);
            for m in modifiers.iter().rev() {
                e.key(to_enigo_key(*m), Direction::Release)?;
            }
            result
        })
    }

    fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        self.with_enigo(|e| e.text(text))
    }
}

pub struct ArboardClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl ArboardClipboard {
    pub fn new() -> Result<Self, AutomationError> {
        let clipboard = arboard::Clipboard::new()
            .map_err(|e| AutomationError::ClipboardError(e.to_string()))?;
        Ok(Self {
            inner: Mutex::new(clipboard),
        })
    }
}

impl ClipboardBackend for ArboardClipboard {
    fn read_text(&self) -> Result<Option<String>, AutomationError> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| AutomationError::ClipboardError("clipboard handle poisoned".into()))?;
        match clipboard.get_text() {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            // Empty and non-text clipboards surface as content errors.
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(AutomationError::ClipboardError(e.to_string())),
        }
    }

    fn write_text(&self, text: &str) -> Result<(), AutomationError> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| AutomationError::ClipboardError("clipboard handle poisoned".into()))?;
        clipboard
            .set_text(text)
            .map_err(|e| AutomationError::ClipboardError(e.to_string()))
    }
}

/// Shells out to the platform's default opener.
pub struct DesktopLauncher;

impl DesktopLauncher {
    fn spawn(&self, target: &str) -> Result<(), AutomationError> {
        debug!(target, "launching via platform opener");
        #[cfg(target_os = "windows")]
        let result = Command::new("cmd").args(["/C", "start", "", target]).spawn();
        #[cfg(target_os = "macos")]
        let result = Command::new("open").arg(target).spawn();
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let result = Command::new("xdg-open").arg(target).spawn();

        result
            .map(|_| ())
            .map_err(|e| AutomationError::PlatformError(format!("opener failed: {e}")))
    }
}

impl Launcher for DesktopLauncher {
    fn open_url(&self, url: &str) -> Result<(), AutomationError> {
        self.spawn(url)
    }

    fn open_app(&self, path: &Path) -> Result<(), AutomationError> {
        if !path.exists() {
            return Err(AutomationError::InvalidArgument(format!(
                "application does not exist: {}",
                path.display()
            )));
        }
        self.spawn(&path.to_string_lossy())
    }
}
