//! Reference-image template matching.
//!
//! The matcher implements zero-mean normalized cross-correlation over
//! grayscale buffers, which is what the remote-UI layout tolerance in the
//! locator contract requires: pop-ups, CDN delays, and locale shifts mean an
//! exact pixel comparison would never hold, while a similarity score with a
//! threshold does.

use std::path::Path;

use image::{GrayImage, RgbaImage};
use tracing::warn;

/// The best placement of a reference image on a screen capture.
///
/// `location` is the centroid of the matched region, not its top-left
/// corner, so it can be fed straight to the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub location: (u32, u32),
    pub score: f32,
}

/// Loads a reference image as grayscale. A missing or unreadable file is an
/// expected condition and degrades to `None` with a warning.
pub fn load_template(path: &Path) -> Option<GrayImage> {
    match image::open(path) {
        Ok(img) => Some(img.to_luma8()),
        Err(e) => {
            warn!(template = %path.display(), error = %e, "cannot read reference image");
            None
        }
    }
}

pub fn to_gray(frame: &RgbaImage) -> GrayImage {
    image::DynamicImage::ImageRgba8(frame.clone()).to_luma8()
}

/// Slides `template` over `screen` and returns the placement with the
/// maximal correlation score, or `None` when no placement is defined
/// (template empty, or larger than the screen in either dimension).
///
/// Scores follow OpenCV's `TM_CCOEFF_NORMED` semantics, clamped to
/// `[0, 1]`: both windows are mean-centered before correlating, so uniform
/// brightness changes do not affect the score. Zero-variance regions
/// (flat template or flat screen window) score 0 rather than dividing by
/// zero.
pub fn match_template(screen: &GrayImage, template: &GrayImage) -> Option<MatchResult> {
    let (sw, sh) = screen.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let n = (tw * th) as f64;
    let tpix: Vec<f64> = template.as_raw().iter().map(|&p| p as f64).collect();
    let tmean = tpix.iter().sum::<f64>() / n;
    let tdev: Vec<f64> = tpix.iter().map(|p| p - tmean).collect();
    let tnorm = tdev.iter().map(|d| d * d).sum::<f64>().sqrt();

    let srow = sw as usize;
    let spix = screen.as_raw();

    let mut best: Option<MatchResult> = None;
    for oy in 0..=(sh - th) {
        for ox in 0..=(sw - tw) {
            let mut dot = 0.0f64;
            let mut wsum = 0.0f64;
            let mut wsq = 0.0f64;
            for ty in 0..th {
                let row = (oy + ty) as usize * srow + ox as usize;
                let trow = (ty * tw) as usize;
                for tx in 0..tw as usize {
                    let w = spix[row + tx] as f64;
                    dot += w * tdev[trow + tx];
                    wsum += w;
                    wsq += w * w;
                }
            }
            // `dot` is already the zero-mean cross term: subtracting the
            // window mean contributes nothing because sum(tdev) == 0.
            let wvar = wsq - wsum * wsum / n;
            let denom = tnorm * wvar.max(0.0).sqrt();
            let score = if denom > f64::EPSILON {
                (dot / denom).clamp(0.0, 1.0) as f32
            } else {
                0.0
            };

            if best.map_or(true, |b| score > b.score) {
                best = Some(MatchResult {
                    location: (ox + tw / 2, oy + th / 2),
                    score,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// A screen with a bright square at a known offset on a dark
    /// gradient background.
    fn synthetic_screen() -> GrayImage {
        let mut img = GrayImage::from_fn(120, 90, |x, y| Luma([((x + y) % 40) as u8]));
        for y in 30..50 {
            for x in 60..80 {
                img.put_pixel(x, y, Luma([230 - ((x * y) % 20) as u8]));
            }
        }
        img
    }

    fn patch_of(screen: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        image::imageops::crop_imm(screen, x, y, w, h).to_image()
    }

    #[test]
    fn exact_patch_scores_near_one_at_centroid() {
        let screen = synthetic_screen();
        let template = patch_of(&screen, 60, 30, 20, 20);
        let m = match_template(&screen, &template).unwrap();
        assert!(m.score > 0.99, "score was {}", m.score);
        assert_eq!(m.location, (70, 40));
    }

    #[test]
    fn unrelated_template_scores_low() {
        let screen = synthetic_screen();
        let template = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 13 + y * 7) % 251) as u8]));
        let m = match_template(&screen, &template).unwrap();
        assert!(m.score < 0.8, "score was {}", m.score);
    }

    #[test]
    fn oversized_template_yields_no_match() {
        let screen = GrayImage::new(10, 10);
        let template = GrayImage::new(20, 5);
        assert!(match_template(&screen, &template).is_none());
    }

    #[test]
    fn flat_template_scores_zero() {
        let screen = synthetic_screen();
        let template = GrayImage::from_pixel(8, 8, Luma([128]));
        let m = match_template(&screen, &template).unwrap();
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn score_invariant_under_brightness_shift() {
        let screen = synthetic_screen();
        let template = patch_of(&screen, 60, 30, 20, 20);
        let brighter = GrayImage::from_fn(template.width(), template.height(), |x, y| {
            Luma([template.get_pixel(x, y)[0].saturating_add(20)])
        });
        let m = match_template(&screen, &brighter).unwrap();
        assert!(m.score > 0.95, "score was {}", m.score);
        assert_eq!(m.location, (70, 40));
    }

    #[test]
    fn missing_template_file_degrades_to_none() {
        assert!(load_template(Path::new("no/such/reference.png")).is_none());
    }
}
