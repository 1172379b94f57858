//! Trait boundary between the core and the machine it drives.
//!
//! Screen capture, input synthesis, the clipboard, and the URL/app
//! launcher are the only places the core touches the operating system, so
//! each is a small trait with one desktop implementation. Tests substitute
//! in-memory fakes.

mod desktop;

pub use desktop::{ArboardClipboard, DesktopLauncher, EnigoInput, XcapScreen};

use image::RgbaImage;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::AutomationError;
use crate::types::{Point, Region};

pub trait ScreenBackend: Send + Sync {
    /// Takes one full capture of the primary monitor. Never cached; the
    /// remote surface may have changed since the last call.
    fn capture(&self) -> Result<RgbaImage, AutomationError>;

    fn capture_region(&self, region: Region) -> Result<RgbaImage, AutomationError> {
        let frame = self.capture()?;
        if region.is_empty() || region.x >= frame.width() || region.y >= frame.height() {
            return Err(AutomationError::InvalidArgument(format!(
                "region {region:?} outside {}x{} frame",
                frame.width(),
                frame.height()
            )));
        }
        let w = region.width.min(frame.width() - region.x);
        let h = region.height.min(frame.height() - region.y);
        Ok(image::imageops::crop_imm(&frame, region.x, region.y, w, h).to_image())
    }
}

/// A key the input backend can tap, parsed from the loose strings a
/// workflow document stores ("enter", "esc", "ctrl", single characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Control,
    Alt,
    Shift,
    Meta,
    Char(char),
}

impl FromStr for KeySpec {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let key = match normalized.as_str() {
            "enter" | "return" => KeySpec::Enter,
            "esc" | "escape" => KeySpec::Escape,
            "tab" => KeySpec::Tab,
            "space" => KeySpec::Space,
            "backspace" => KeySpec::Backspace,
            "ctrl" | "control" => KeySpec::Control,
            "alt" => KeySpec::Alt,
            "shift" => KeySpec::Shift,
            "meta" | "win" | "cmd" | "super" => KeySpec::Meta,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeySpec::Char(c),
                    _ => {
                        return Err(AutomationError::InvalidArgument(format!(
                            "unrecognized key name: {s:?}"
                        )))
                    }
                }
            }
        };
        Ok(key)
    }
}

pub trait InputBackend: Send + Sync {
    fn pointer_location(&self) -> Result<Point, AutomationError>;

    /// Moves the pointer to an absolute position without any easing; the
    /// motion synthesizer layers its own timing on top of this.
    fn pointer_move(&self, to: Point) -> Result<(), AutomationError>;

    fn button_press(&self) -> Result<(), AutomationError>;

    fn button_release(&self) -> Result<(), AutomationError>;

    fn key_tap(&self, key: KeySpec) -> Result<(), AutomationError>;

    /// Holds the modifiers, taps the key, releases the modifiers in
    /// reverse order.
    fn hotkey(&self, modifiers: &[KeySpec], key: KeySpec) -> Result<(), AutomationError>;

    fn type_text(&self, text: &str) -> Result<(), AutomationError>;
}

pub trait ClipboardBackend: Send + Sync {
    /// Reads the clipboard as text. An empty or non-text clipboard is
    /// `Ok(None)`, not an error.
    fn read_text(&self) -> Result<Option<String>, AutomationError>;

    fn write_text(&self, text: &str) -> Result<(), AutomationError>;
}

/// Opens URLs and applications through whatever the platform considers its
/// default handler.
pub trait Launcher: Send + Sync {
    fn open_url(&self, url: &str) -> Result<(), AutomationError>;

    fn open_app(&self, path: &Path) -> Result<(), AutomationError>;
}

/// The full set of desktop backends a session shares with every locator
/// and pointer it creates.
pub struct DesktopBackends {
    pub screen: Arc<dyn ScreenBackend>,
    pub input: Arc<dyn InputBackend>,
    pub clipboard: Arc<dyn ClipboardBackend>,
    pub launcher: Arc<dyn Launcher>,
}

pub fn create_backends() -> Result<DesktopBackends, AutomationError> {
    Ok(DesktopBackends {
        screen: Arc::new(XcapScreen),
        input: Arc::new(EnigoInput::new()?),
        clipboard: Arc::new(ArboardClipboard::new()?),
        launcher: Arc::new(DesktopLauncher),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_parse() {
        assert_eq!("Enter".parse::<KeySpec>().unwrap(), KeySpec::Enter);
        assert_eq!("esc".parse::<KeySpec>().unwrap(), KeySpec::Escape);
        assert_eq!("CTRL".parse::<KeySpec>().unwrap(), KeySpec::Control);
        assert_eq!("a".parse::<KeySpec>().unwrap(), KeySpec::Char('a'));
        assert!("not-a-key".parse::<KeySpec>().is_err());
    }
}
