//! Screen-space element locator: find a stored reference image on the live
//! screen, or block until it appears.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::backend::ScreenBackend;
use crate::template::{self, MatchResult};

pub const DEFAULT_CONFIDENCE: f32 = 0.8;
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A high-level API for finding a reference image on screen.
///
/// Recognition failure is an expected, frequent outcome: `find` and
/// `wait_for` return `None` for a miss, a missing reference file, or a
/// failed capture. Nothing here is fatal.
#[derive(Clone)]
pub struct Locator {
    screen: Arc<dyn ScreenBackend>,
    template_path: PathBuf,
    confidence: f32,
    timeout: Duration, // Default timeout for this locator instance
    poll_interval: Duration,
}

impl Locator {
    pub(crate) fn new(screen: Arc<dyn ScreenBackend>, template_path: PathBuf) -> Self {
        Self {
            screen,
            template_path,
            confidence: DEFAULT_CONFIDENCE,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the confidence threshold a match must reach, in `[0, 1]`.
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set a default timeout for waiting operations on this locator
    /// instance, used when no specific timeout is passed to `wait_for`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// One capture, one match. Returns the best placement only when its
    /// score reaches the confidence threshold.
    #[instrument(level = "debug", skip(self), fields(template = %self.template_path.display()))]
    pub fn find(&self) -> Option<MatchResult> {
        let template = template::load_template(&self.template_path)?;
        let frame = match self.screen.capture() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "screen capture failed, treating as not found");
                return None;
            }
        };
        let screen = template::to_gray(&frame);
        match template::match_template(&screen, &template) {
            Some(m) if m.score >= self.confidence => {
                debug!(score = m.score, location = ?m.location, "reference found");
                Some(m)
            }
            Some(m) => {
                debug!(best = m.score, threshold = self.confidence, "reference not found");
                None
            }
            None => None,
        }
    }

    /// Repeats `find` at `poll_interval` spacing until a match appears or
    /// the timeout elapses. When no match ever appears, this does not give
    /// up before the full timeout has passed.
    #[instrument(level = "debug", skip(self, timeout), fields(template = %self.template_path.display()))]
    pub fn wait_for(&self, timeout: Option<Duration>) -> Option<MatchResult> {
        let deadline = Instant::now() + timeout.unwrap_or(self.timeout);
        loop {
            if let Some(m) = self.find() {
                return Some(m);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("timed out waiting for reference");
                return None;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AutomationError;
    use image::{GrayImage, Luma, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn screen_with_patch() -> RgbaImage {
        let gray = GrayImage::from_fn(100, 80, |x, y| {
            if (40..56).contains(&x) && (20..36).contains(&y) {
                Luma([220 - ((x * 3 + y) % 25) as u8])
            } else {
                Luma([((x + 2 * y) % 50) as u8])
            }
        });
        image::DynamicImage::ImageLuma8(gray).to_rgba8()
    }

    fn blank_screen() -> RgbaImage {
        RgbaImage::from_pixel(100, 80, image::Rgba([10, 10, 10, 255]))
    }

    fn write_patch_template(dir: &std::path::Path) -> PathBuf {
        let screen = screen_with_patch();
        let patch = image::imageops::crop_imm(&screen, 40, 20, 16, 16).to_image();
        let path = dir.join("patch.png");
        patch.save(&path).unwrap();
        path
    }

    /// Returns `frames[n]` on the n-th capture, repeating the last frame.
    struct FrameSequence {
        frames: Vec<RgbaImage>,
        calls: AtomicUsize,
    }

    impl ScreenBackend for FrameSequence {
        fn capture(&self) -> Result<RgbaImage, AutomationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.frames[n.min(self.frames.len() - 1)].clone())
        }
    }

    fn locator_over(frames: Vec<RgbaImage>, template: PathBuf) -> Locator {
        Locator::new(
            Arc::new(FrameSequence {
                frames,
                calls: AtomicUsize::new(0),
            }),
            template,
        )
        .poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn find_honors_threshold_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_patch_template(dir.path());

        let hit = locator_over(vec![screen_with_patch()], template.clone()).find();
        assert!(hit.is_some());
        // Centroid of the 16x16 patch placed at (40, 20).
        assert_eq!(hit.unwrap().location, (48, 28));

        let miss = locator_over(vec![blank_screen()], template).find();
        assert!(miss.is_none());
    }

    #[test]
    fn lowering_confidence_never_unmatches() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_patch_template(dir.path());
        let at_default = locator_over(vec![screen_with_patch()], template.clone())
            .find()
            .is_some();
        let at_lower = locator_over(vec![screen_with_patch()], template)
            .confidence(0.3)
            .find()
            .is_some();
        assert!(at_default);
        assert!(at_lower, "decreasing the threshold must not lose a match");
    }

    #[test]
    fn missing_reference_is_a_miss_not_a_panic() {
        let found = locator_over(vec![blank_screen()], PathBuf::from("does/not/exist.png")).find();
        assert!(found.is_none());
    }

    #[test]
    fn wait_for_runs_out_the_full_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_patch_template(dir.path());
        let locator = locator_over(vec![blank_screen()], template);

        let timeout = Duration::from_millis(80);
        let start = Instant::now();
        let result = locator.wait_for(Some(timeout));
        assert!(result.is_none());
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn wait_for_picks_up_a_late_match() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_patch_template(dir.path());
        // Blank for three polls, then the patch appears.
        let locator = locator_over(
            vec![
                blank_screen(),
                blank_screen(),
                blank_screen(),
                screen_with_patch(),
            ],
            template,
        );
        let start = Instant::now();
        let result = locator.wait_for(Some(Duration::from_secs(2)));
        assert!(result.is_some());
        // The patch is visible on the fourth capture, after three 10 ms
        // polls; it must be picked up within about one further interval,
        // not at the 2 s deadline. Generous slack for match cost.
        assert!(
            start.elapsed() < Duration::from_millis(300),
            "late match took {:?}",
            start.elapsed()
        );
    }
}
