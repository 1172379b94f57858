//! In-memory backends shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{GrayImage, Luma, RgbaImage};

use screenwright::backend::{
    ClipboardBackend, InputBackend, KeySpec, Launcher, ScreenBackend,
};
use screenwright::errors::AutomationError;
use screenwright::notify::Notifier;
use screenwright::ocr::{OcrEngine, OcrSpan};
use screenwright::{Point, Session};

/// A 100x80 textured frame with a bright 16x16 patch at (40, 20); its
/// centroid is (48, 28).
pub fn screen_with_patch() -> RgbaImage {
    let gray = GrayImage::from_fn(100, 80, |x, y| {
        if (40..56).contains(&x) && (20..36).contains(&y) {
            Luma([220 - ((x * 3 + y) % 25) as u8])
        } else {
            Luma([((x + 2 * y) % 50) as u8])
        }
    });
    image::DynamicImage::ImageLuma8(gray).to_rgba8()
}

/// Writes the patch from [`screen_with_patch`] as a reference image.
pub fn write_patch_template(dir: &Path, name: &str) -> PathBuf {
    let screen = screen_with_patch();
    let patch = image::imageops::crop_imm(&screen, 40, 20, 16, 16).to_image();
    let path = dir.join(name);
    patch.save(&path).unwrap();
    path
}

pub struct MockScreen {
    pub frame: Mutex<RgbaImage>,
}

impl MockScreen {
    pub fn showing(frame: RgbaImage) -> Arc<Self> {
        Arc::new(Self {
            frame: Mutex::new(frame),
        })
    }
}

impl ScreenBackend for MockScreen {
    fn capture(&self) -> Result<RgbaImage, AutomationError> {
        Ok(self.frame.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Move(Point),
    Press,
    Release,
    Key(KeySpec),
    Hotkey(Vec<KeySpec>, KeySpec),
    Type(String),
}

#[derive(Default)]
pub struct MockInput {
    pub events: Mutex<Vec<InputEvent>>,
}

impl MockInput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, InputEvent::Press))
            .count()
    }

    pub fn last_position(&self) -> Point {
        self.events()
            .iter()
            .rev()
            .find_map(|e| match e {
                InputEvent::Move(p) => Some(*p),
                _ => None,
            })
            .unwrap_or(Point::new(0, 0))
    }
}

impl InputBackend for MockInput {
    fn pointer_location(&self) -> Result<Point, AutomationError> {
        Ok(self.last_position())
    }

    fn pointer_move(&self, to: Point) -> Result<(), AutomationError> {
        self.events.lock().unwrap().push(InputEvent::Move(to));
        Ok(())
    }

    fn button_press(&self) -> Result<(), AutomationError> {
        self.events.lock().unwrap().push(InputEvent::Press);
        Ok(())
    }

    fn button_release(&self) -> Result<(), AutomationError> {
        self.events.lock().unwrap().push(InputEvent::Release);
        Ok(())
    }

    fn key_tap(&self, key: KeySpec) -> Result<(), AutomationError> {
        self.events.lock().unwrap().push(InputEvent::Key(key));
        Ok(())
    }

    fn hotkey(&self, modifiers: &[KeySpec], key: KeySpec) -> Result<(), AutomationError> {
        self.events
            .lock()
            .unwrap()
            .push(InputEvent::Hotkey(modifiers.to_vec(), key));
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        self.events
            .lock()
            .unwrap()
            .push(InputEvent::Type(text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockClipboard {
    pub content: Mutex<Option<String>>,
    fail_writes: bool,
}

impl MockClipboard {
    pub fn holding(text: &str) -> Arc<Self> {
        Arc::new(Self {
            content: Mutex::new(Some(text.to_string())),
            fail_writes: false,
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A clipboard whose writes always fail, as on a headless session.
    pub fn rejecting_writes() -> Arc<Self> {
        Arc::new(Self {
            content: Mutex::new(None),
            fail_writes: true,
        })
    }

    pub fn current(&self) -> Option<String> {
        self.content.lock().unwrap().clone()
    }
}

impl ClipboardBackend for MockClipboard {
    fn read_text(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.content.lock().unwrap().clone())
    }

    fn write_text(&self, text: &str) -> Result<(), AutomationError> {
        if self.fail_writes {
            return Err(AutomationError::ClipboardError(
                "clipboard not available".into(),
            ));
        }
        *self.content.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLauncher {
    pub opened: Mutex<Vec<String>>,
}

impl MockLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl Launcher for MockLauncher {
    fn open_url(&self, url: &str) -> Result<(), AutomationError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn open_app(&self, path: &Path) -> Result<(), AutomationError> {
        self.opened
            .lock()
            .unwrap()
            .push(path.display().to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    fn send(&self, title: &str, content: &str) -> Result<(), AutomationError> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), content.to_string()));
        Ok(())
    }
}

/// Recognizes the same spans for every region.
pub struct MockOcr {
    pub spans: Vec<OcrSpan>,
}

impl MockOcr {
    pub fn reading(text: &str) -> Arc<Self> {
        Arc::new(Self {
            spans: vec![OcrSpan {
                text: text.to_string(),
                confidence: 0.95,
            }],
        })
    }
}

impl OcrEngine for MockOcr {
    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<OcrSpan>, AutomationError> {
        Ok(self.spans.clone())
    }
}

pub struct TestHarness {
    pub session: Session,
    pub input: Arc<MockInput>,
    pub clipboard: Arc<MockClipboard>,
    pub launcher: Arc<MockLauncher>,
    pub notifier: Arc<MockNotifier>,
}

/// A session over the patch screen with recording fakes everywhere.
pub fn harness(clipboard: Arc<MockClipboard>) -> TestHarness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();

    let input = MockInput::new();
    let launcher = MockLauncher::new();
    let notifier = MockNotifier::new();
    let session = Session::with_backends(
        MockScreen::showing(screen_with_patch()),
        input.clone(),
        clipboard.clone(),
        launcher.clone(),
    )
    .with_notifier(notifier.clone());
    TestHarness {
        session,
        input,
        clipboard,
        launcher,
        notifier,
    }
}
