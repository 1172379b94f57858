//! OCR collaborator boundary.
//!
//! Recognition runs out of process (an Umi-OCR style local HTTP service);
//! the core only knows the trait. Unavailability degrades to "no text
//! recognized", never a fatal failure.

use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use image::RgbaImage;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::AutomationError;

/// Entries below this confidence are discarded by callers.
pub const CONFIDENCE_FLOOR: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct OcrSpan {
    pub text: String,
    pub confidence: f32,
}

pub trait OcrEngine: Send + Sync {
    /// Recognizes text in a captured region. Zero spans is a normal
    /// outcome; `Err` means the backend itself is unreachable or broken.
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<OcrSpan>, AutomationError>;
}

/// Drops spans under the confidence floor.
pub fn filter_spans(spans: Vec<OcrSpan>) -> Vec<OcrSpan> {
    spans
        .into_iter()
        .filter(|s| s.confidence >= CONFIDENCE_FLOOR)
        .collect()
}

/// The default engine when no recognition backend is configured.
pub struct NoopOcr;

impl OcrEngine for NoopOcr {
    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<OcrSpan>, AutomationError> {
        debug!("no OCR backend configured");
        Ok(Vec::new())
    }
}

/// Client for an Umi-OCR compatible HTTP endpoint: the region is posted as
/// a base64 PNG, the response carries `(text, score)` pairs.
pub struct HttpOcr {
    client: reqwest::blocking::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    code: i32,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct OcrEntry {
    text: String,
    #[serde(default)]
    score: f32,
}

impl HttpOcr {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl OcrEngine for HttpOcr {
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<OcrSpan>, AutomationError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| AutomationError::RecognitionError(format!("png encode: {e}")))?;
        let payload = json!({
            "base64": base64::engine::general_purpose::STANDARD.encode(&png),
            "options": { "data.format": "dict" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .map_err(|e| AutomationError::RecognitionError(e.to_string()))?
            .json::<OcrResponse>()
            .map_err(|e| AutomationError::RecognitionError(e.to_string()))?;

        // Code 100 is "text found"; 101 is the backend's "nothing
        // recognized", which is a normal empty result.
        match response.code {
            100 => {
                let entries: Vec<OcrEntry> =
                    serde_json::from_value(response.data).unwrap_or_default();
                Ok(entries
                    .into_iter()
                    .map(|e| OcrSpan {
                        text: e.text,
                        confidence: e.score,
                    })
                    .collect())
            }
            101 => Ok(Vec::new()),
            other => {
                warn!(code = other, "OCR backend returned an error code");
                Ok(Vec::new())
            }
        }
    }
}
