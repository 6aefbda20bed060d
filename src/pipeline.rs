//! Image in, JSON payload out.

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::align::align_check;
use crate::arbitrate::{ResultField, arbitrate};
use crate::config::{AnchorMode, CheckOcrConfig};
use crate::micr::{MicrBox, locate_micr};
use crate::ocr::{DetectedLine, EngineKind, EngineSet};
use crate::preprocess::{enhance_for_ocr, fit_within, preview_base64, to_gray};
use crate::refine::refine_field;
use crate::region::{RegionSet, crop_region};

/// Longest side of per-field preview thumbnails.
const CROP_PREVIEW_SIZE: u32 = 600;
/// Longest side of the aligned-image preview.
const ALIGNED_PREVIEW_SIZE: u32 = 800;

/// Result of one run, serialized to stdout.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Size of the aligned image all regions refer to
    pub width: u32,
    pub height: u32,
    /// Detector lines over the whole aligned image
    pub lines: Vec<DetectedLine>,
    pub regions: BTreeMap<String, ResultField>,
    pub engines: Vec<EngineKind>,
    pub errors: Vec<String>,
    pub micr_top_norm: Option<f64>,
    pub micr_top_px: Option<u32>,
    pub micr_bottom_norm: Option<f64>,
    pub micr_box: Option<MicrBox>,
    pub preview_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aligned_preview_base64: Option<String>,
}

/// Loads the image at `path` and runs the full pipeline on it.
///
/// `errors` carries diagnostics collected before the run (engine loading).
pub fn build_payload(
    path: &Path,
    config: &CheckOcrConfig,
    engines: &EngineSet,
    errors: Vec<String>,
) -> Result<Payload> {
    let img = image::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?;
    crate::log(&format!("Loaded {} ({}x{})", path.display(), img.width(), img.height()));
    process_image(&img, config, engines, errors)
}

/// Runs the pipeline on a decoded image.
pub fn process_image(
    img: &DynamicImage,
    config: &CheckOcrConfig,
    engines: &EngineSet,
    mut errors: Vec<String>,
) -> Result<Payload> {
    let mut image: RgbImage = enhance_for_ocr(img);
    if config.align {
        image = align_check(&image, config.bounds_padding, &config.deskew);
    }
    let (width, height) = image.dimensions();

    let base = RegionSet::with_overrides(&config.regions);
    let (regions, micr) = match config.anchor {
        AnchorMode::Micr => locate_micr(&to_gray(&image), &base, config.origin),
        AnchorMode::None => (base, None),
    };

    let lines = engines.detect_lines(&image, &mut errors);

    let mut results = BTreeMap::new();
    for (key, region) in regions.iter() {
        let crop = crop_region(&image, region, config.origin);
        let crop = refine_field(key, crop, config.preview_only);
        let crop = match config.crop_max_size {
            Some(max_side) => fit_within(&crop, max_side),
            None => crop,
        };

        let candidates = engines.collect_candidates(key, &crop, &mut errors);
        let mut field = arbitrate(key, candidates);
        crate::log(&format!("{}: {:?} from {:?}", key, field.text, field.engine));
        if config.debug_images {
            field.preview_base64 = Some(preview_base64(&crop, CROP_PREVIEW_SIZE)?);
        }
        results.insert(key.to_string(), field);
    }

    let aligned_preview_base64 = if config.debug_images {
        Some(preview_base64(&image, ALIGNED_PREVIEW_SIZE)?)
    } else {
        None
    };

    Ok(Payload {
        width,
        height,
        lines,
        regions: results,
        engines: config.engines.clone(),
        errors,
        micr_top_norm: micr.map(|m| m.top_norm),
        micr_top_px: micr.map(|m| m.micr_box.top),
        micr_bottom_norm: micr.map(|m| m.bottom_norm),
        micr_box: micr.map(|m| m.micr_box),
        preview_only: config.preview_only,
        aligned_preview_base64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{EngineError, NumeralRecognizer, TextRecognizer};
    use crate::region::{CHECK_NUMBER, LEGAL_AMOUNT, MICR, NUMERIC_AMOUNT};
    use image::{GrayImage, Luma};

    struct FixedText(&'static str);

    impl TextRecognizer for FixedText {
        fn recognize(&self, _crop: &RgbImage) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    struct FixedDigits(&'static str);

    impl NumeralRecognizer for FixedDigits {
        fn recognize(&self, _crop: &RgbImage, _language: &str) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    /// 1000x600 white check with a MICR-like glyph band at rows 530..570.
    fn synthetic_check() -> DynamicImage {
        let mut gray = GrayImage::from_pixel(1000, 600, Luma([255]));
        for y in 530..570 {
            for x in 100..900 {
                if x % 10 < 3 {
                    gray.put_pixel(x, y, Luma([0]));
                }
            }
        }
        DynamicImage::ImageLuma8(gray)
    }

    fn engines() -> EngineSet {
        let mut engines = EngineSet::empty(vec![EngineKind::Vision]);
        engines.vision = Some(Box::new(FixedText("1,250.00")));
        engines.numeral = Some(Box::new(FixedDigits("⑆012345678⑆ 1042")));
        engines
    }

    #[test]
    fn test_default_regions_without_anchor() {
        let config = CheckOcrConfig::default();
        let payload = process_image(&synthetic_check(), &config, &engines(), Vec::new()).unwrap();

        assert_eq!((payload.width, payload.height), (1000, 600));
        let keys: Vec<&str> = payload.regions.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec![CHECK_NUMBER, LEGAL_AMOUNT, NUMERIC_AMOUNT]);
        assert_eq!(payload.regions[NUMERIC_AMOUNT].text, "1,250.00");
        assert_eq!(payload.regions[NUMERIC_AMOUNT].engine, "vision");
        assert!(payload.micr_box.is_none());
        assert!(payload.micr_top_px.is_none());
        assert!(payload.errors.is_empty());
        assert!(payload.aligned_preview_base64.is_none());
    }

    #[test]
    fn test_micr_anchor_adds_micr_field() {
        let config = CheckOcrConfig {
            anchor: AnchorMode::Micr,
            ..CheckOcrConfig::default()
        };
        let payload = process_image(&synthetic_check(), &config, &engines(), Vec::new()).unwrap();

        assert_eq!(payload.micr_top_px, Some(530));
        assert_eq!(
            payload.micr_box,
            Some(MicrBox {
                top: 530,
                bottom: 569,
                left: 100,
                right: 892,
            })
        );
        let top_norm = payload.micr_top_norm.unwrap();
        assert!((top_norm - 530.0 / 600.0).abs() < 1e-9);

        let micr = &payload.regions[MICR];
        assert_eq!(micr.engine, "numeral");
        assert_eq!(micr.text, "0123456781042");
        assert_eq!(payload.regions.len(), 4);
    }

    #[test]
    fn test_preview_only_skips_recognition() {
        let mut engines = engines();
        engines.preview_only = true;
        let config = CheckOcrConfig {
            preview_only: true,
            debug_images: true,
            anchor: AnchorMode::Micr,
            ..CheckOcrConfig::default()
        };
        let errors = vec!["vision: x".to_string()];
        let payload = process_image(&synthetic_check(), &config, &engines, errors).unwrap();

        assert!(payload.preview_only);
        assert_eq!(payload.errors, vec!["vision: x".to_string()]);
        for field in payload.regions.values() {
            assert_eq!(field.text, "");
            assert!(field.candidates.is_empty());
            assert!(field.preview_base64.is_some());
        }
        assert!(payload.aligned_preview_base64.is_some());
    }

    #[test]
    fn test_payload_json_shape() {
        let config = CheckOcrConfig::default();
        let payload = process_image(&synthetic_check(), &config, &engines(), Vec::new()).unwrap();
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["width"], 1000);
        assert_eq!(json["engines"], serde_json::json!(["vision"]));
        assert!(json["micrTopNorm"].is_null());
        assert!(json["micrBox"].is_null());
        assert_eq!(json["previewOnly"], false);
        assert_eq!(json["lines"], serde_json::json!([]));
        assert_eq!(json["regions"]["numericAmount"]["candidates"]["vision"], "1,250.00");
        assert!(json.get("alignedPreviewBase64").is_none());
        assert!(json["regions"]["numericAmount"].get("previewBase64").is_none());
    }

    #[test]
    fn test_crop_max_size_and_missing_file() {
        let config = CheckOcrConfig {
            crop_max_size: Some(64),
            ..CheckOcrConfig::default()
        };
        assert!(process_image(&synthetic_check(), &config, &engines(), Vec::new()).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let err = build_payload(&missing, &config, &engines(), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to open image"));
    }

    #[test]
    fn test_build_payload_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.png");
        synthetic_check().save(&path).unwrap();

        let config = CheckOcrConfig::default();
        let payload = build_payload(&path, &config, &engines(), Vec::new()).unwrap();
        assert_eq!((payload.width, payload.height), (1000, 600));
    }
}
