//! Recognition engine interfaces.
//!
//! Engines are black boxes: a crop goes in, text comes out. Every call returns
//! a `Result`; callers treat an error as "no candidate from this engine".

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("failed to write crop for recognition: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

impl EngineError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// The recognition engines a run can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Vision-to-text model for handwriting
    #[serde(alias = "trocr")]
    Vision,
    /// General text detector/recognizer returning line boxes
    #[serde(alias = "paddle")]
    Detector,
    /// Digits-only command-line recognizer
    #[serde(alias = "tesseract")]
    Numeral,
}

impl EngineKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Detector => "detector",
            Self::Numeral => "numeral",
        }
    }
}

/// One line found by a [`LineDetector`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectedLine {
    /// `[left, top, right, bottom]` in crop pixels
    pub bbox: [u32; 4],
    pub text: String,
    pub confidence: f32,
}

/// Vision model: crop -> text.
pub trait TextRecognizer {
    fn recognize(&self, crop: &RgbImage) -> Result<String, EngineError>;
}

/// General OCR: crop -> line detections.
pub trait LineDetector {
    fn detect(&self, crop: &RgbImage) -> Result<Vec<DetectedLine>, EngineError>;
}

/// Numeral recognizer. With the default language hint (`eng`) it restricts
/// output to digits.
pub trait NumeralRecognizer {
    fn recognize(&self, crop: &RgbImage, language: &str) -> Result<String, EngineError>;
}
