//! Pixel-level automation for remote web UIs.
//!
//! This crate drives unattended interaction with a rendered surface it does
//! not control: it locates stored reference images on the live screen,
//! synthesizes humanized pointer input, and chains both into replayable
//! step workflows plus a fixed sign-in pipeline. Everything is synchronous
//! and single-threaded; waits are blocking sleeps on the calling thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{instrument, warn};

pub mod backend;
pub mod errors;
pub mod locator;
pub mod motion;
pub mod notify;
pub mod ocr;
pub mod pipeline;
pub mod template;
pub mod types;
pub mod workflow;

pub use errors::AutomationError;
pub use locator::Locator;
pub use pipeline::{RunOutcome, SigninConfig, SigninPipeline, Stage};
pub use motion::Pointer;
pub use template::MatchResult;
pub use types::{Point, Region};

use backend::{ClipboardBackend, InputBackend, Launcher, ScreenBackend};
use notify::{NoopNotifier, Notifier};
use ocr::{NoopOcr, OcrEngine, OcrSpan};

/// The main entry point: one set of backend handles shared by every
/// locator, pointer, workflow run, and pipeline stage.
///
/// All collaborators are injected here once at construction; nothing in the
/// crate reaches for lazily-initialized global state.
#[derive(Clone)]
pub struct Session {
    screen: Arc<dyn ScreenBackend>,
    input: Arc<dyn InputBackend>,
    clipboard: Arc<dyn ClipboardBackend>,
    launcher: Arc<dyn Launcher>,
    ocr: Arc<dyn OcrEngine>,
    notifier: Arc<dyn Notifier>,
}

impl Session {
    /// Session over the real desktop, with OCR and notification disabled
    /// until configured via [`Session::with_ocr`] / [`Session::with_notifier`].
    pub fn desktop() -> Result<Self, AutomationError> {
        let backends = backend::create_backends()?;
        Ok(Self {
            screen: backends.screen,
            input: backends.input,
            clipboard: backends.clipboard,
            launcher: backends.launcher,
            ocr: Arc::new(NoopOcr),
            notifier: Arc::new(NoopNotifier),
        })
    }

    /// Session over arbitrary backends; how tests run without a screen.
    pub fn with_backends(
        screen: Arc<dyn ScreenBackend>,
        input: Arc<dyn InputBackend>,
        clipboard: Arc<dyn ClipboardBackend>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            screen,
            input,
            clipboard,
            launcher,
            ocr: Arc::new(NoopOcr),
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// A locator for the reference image at `template`, with default
    /// confidence, timeout, and poll interval.
    #[instrument(level = "debug", skip(self, template))]
    pub fn locator(&self, template: impl Into<PathBuf>) -> Locator {
        Locator::new(self.screen.clone(), template.into())
    }

    pub fn pointer(&self) -> Pointer {
        Pointer::new(self.input.clone())
    }

    pub fn screen(&self) -> &Arc<dyn ScreenBackend> {
        &self.screen
    }

    pub fn input(&self) -> &Arc<dyn InputBackend> {
        &self.input
    }

    pub fn clipboard(&self) -> &Arc<dyn ClipboardBackend> {
        &self.clipboard
    }

    pub fn open_url(&self, url: &str) -> Result<(), AutomationError> {
        self.launcher.open_url(url)
    }

    pub fn open_app(&self, path: &Path) -> Result<(), AutomationError> {
        self.launcher.open_app(path)
    }

    /// Captures `region` and runs OCR over it, dropping spans under the
    /// confidence floor. Backend failure degrades to an empty result.
    #[instrument(level = "debug", skip(self))]
    pub fn recognize_region(&self, region: Region) -> Vec<OcrSpan> {
        let frame = match self.screen.capture_region(region) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "region capture failed, no text recognized");
                return Vec::new();
            }
        };
        match self.ocr.recognize(&frame) {
            Ok(spans) => ocr::filter_spans(spans),
            Err(e) => {
                warn!(error = %e, "OCR backend unavailable, no text recognized");
                Vec::new()
            }
        }
    }

    /// Joins the recognized spans of `region` into one line, or `None`
    /// when nothing confident was read.
    pub fn read_region_text(&self, region: Region) -> Option<String> {
        let spans = self.recognize_region(region);
        if spans.is_empty() {
            return None;
        }
        Some(
            spans
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    /// Sends a notification, logging failure instead of propagating it.
    pub fn notify(&self, title: &str, content: &str) {
        if let Err(e) = self.notifier.send(title, content) {
            warn!(error = %e, title, "notification delivery failed");
        }
    }
}
