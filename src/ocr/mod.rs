pub mod engine;
pub mod setup;
pub mod tesseract;
pub mod vision;

pub use engine::{
    DetectedLine, EngineError, EngineKind, LineDetector, NumeralRecognizer, TextRecognizer,
};
pub use tesseract::{Tesseract, TesseractDetector, TesseractNumeral};
pub use vision::CommandRecognizer;

use image::RgbImage;

use crate::arbitrate::CandidateSet;
use crate::config::CheckOcrConfig;
use crate::region::{CHECK_NUMBER, MICR, NUMERIC_AMOUNT};
use tesseract::join_lines;

/// The engines available for one run.
///
/// Unavailable engines are `None`; fields simply get no candidate from them.
pub struct EngineSet {
    pub requested: Vec<EngineKind>,
    pub vision: Option<Box<dyn TextRecognizer>>,
    pub detector: Option<Box<dyn LineDetector>>,
    pub numeral: Option<Box<dyn NumeralRecognizer>>,
    pub numeral_language: String,
    pub preview_only: bool,
    /// Why `numeral` is `None`, reported for every field that needed it
    numeral_error: EngineError,
}

impl EngineSet {
    /// A set with nothing loaded.
    pub fn empty(requested: Vec<EngineKind>) -> Self {
        Self {
            requested,
            vision: None,
            detector: None,
            numeral: None,
            numeral_language: tesseract::DEFAULT_NUMERAL_LANGUAGE.to_string(),
            preview_only: false,
            numeral_error: EngineError::unavailable("no numeral engine loaded"),
        }
    }

    /// Loads the engines the config asks for.
    ///
    /// A requested vision or detector engine that fails to load is reported
    /// once in `errors`. The numeral engine is always loaded since the MICR
    /// field needs it; its absence is reported per field that was routed to
    /// it.
    pub fn from_config(config: &CheckOcrConfig, errors: &mut Vec<String>) -> Self {
        let mut set = Self::empty(config.engines.clone());
        set.numeral_language = config.micr_language.clone();
        set.preview_only = config.preview_only;
        if config.preview_only {
            crate::log("Preview-only run, recognition engines not loaded");
            return set;
        }

        if set.is_requested(EngineKind::Vision) {
            match CommandRecognizer::from_command(&config.vision_command, &config.vision_model) {
                Ok(recognizer) => set.vision = Some(Box::new(recognizer)),
                Err(e) => errors.push(format!("{}: {}", EngineKind::Vision.name(), e)),
            }
        }

        match Tesseract::locate(config.tesseract_path.as_deref()) {
            Ok(tesseract) => {
                if set.is_requested(EngineKind::Detector) {
                    set.detector = Some(Box::new(TesseractDetector(tesseract.clone())));
                }
                set.numeral = Some(Box::new(TesseractNumeral(tesseract)));
            }
            Err(e) => {
                crate::log(&format!("Tesseract unavailable: {}", e));
                if set.is_requested(EngineKind::Detector) {
                    errors.push(format!("{}: {}", EngineKind::Detector.name(), e));
                }
                set.numeral_error = e;
            }
        }
        set
    }

    pub fn is_requested(&self, kind: EngineKind) -> bool {
        self.requested.contains(&kind)
    }

    /// Engines that run on `key`, in configured order.
    pub fn route(&self, key: &str) -> Vec<EngineKind> {
        if self.preview_only {
            return Vec::new();
        }
        if key == MICR {
            return vec![EngineKind::Numeral];
        }
        let numeral_field = key == NUMERIC_AMOUNT || key == CHECK_NUMBER;
        let mut kinds: Vec<EngineKind> = Vec::new();
        for &kind in &self.requested {
            if (kind != EngineKind::Numeral || numeral_field) && !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Runs every engine routed to `key` on `crop`.
    pub fn collect_candidates(
        &self,
        key: &str,
        crop: &RgbImage,
        errors: &mut Vec<String>,
    ) -> CandidateSet {
        let mut candidates = CandidateSet::new();
        for kind in self.route(key) {
            match kind {
                EngineKind::Vision => {
                    if let Some(vision) = &self.vision {
                        candidates.record(kind, vision.recognize(crop), errors);
                    }
                }
                EngineKind::Detector => {
                    if let Some(detector) = &self.detector {
                        match detector.detect(crop) {
                            Ok(lines) => {
                                candidates.insert(kind.name(), join_lines(&lines));
                                candidates.detections = lines;
                            }
                            Err(e) => errors.push(format!("{}: {}", kind.name(), e)),
                        }
                    }
                }
                EngineKind::Numeral => match &self.numeral {
                    Some(numeral) => {
                        let result = numeral.recognize(crop, &self.numeral_language);
                        candidates.record(kind, result, errors);
                    }
                    None => {
                        crate::log(&format!("No numeral engine for {}", key));
                        errors.push(format!("{}: {}", kind.name(), self.numeral_error));
                    }
                },
            }
        }
        candidates
    }

    /// Line detections over a whole image, when the detector was requested.
    pub fn detect_lines(&self, img: &RgbImage, errors: &mut Vec<String>) -> Vec<DetectedLine> {
        let Some(detector) = self.detector.as_ref().filter(|_| !self.preview_only) else {
            return Vec::new();
        };
        detector.detect(img).unwrap_or_else(|e| {
            errors.push(format!("{}: {}", EngineKind::Detector.name(), e));
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::LEGAL_AMOUNT;

    struct FixedText(&'static str);

    impl TextRecognizer for FixedText {
        fn recognize(&self, _crop: &RgbImage) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingNumeral;

    impl NumeralRecognizer for FailingNumeral {
        fn recognize(&self, _crop: &RgbImage, _language: &str) -> Result<String, EngineError> {
            Err(EngineError::unavailable("no tesseract"))
        }
    }

    struct FixedLines;

    impl LineDetector for FixedLines {
        fn detect(&self, _crop: &RgbImage) -> Result<Vec<DetectedLine>, EngineError> {
            Ok(vec![
                DetectedLine {
                    bbox: [0, 0, 10, 5],
                    text: "One".into(),
                    confidence: 90.0,
                },
                DetectedLine {
                    bbox: [0, 6, 10, 11],
                    text: "hundred".into(),
                    confidence: 80.0,
                },
            ])
        }
    }

    #[test]
    fn test_routing() {
        let set = EngineSet::empty(vec![
            EngineKind::Vision,
            EngineKind::Numeral,
            EngineKind::Detector,
        ]);
        assert_eq!(set.route(MICR), vec![EngineKind::Numeral]);
        assert_eq!(
            set.route(LEGAL_AMOUNT),
            vec![EngineKind::Vision, EngineKind::Detector]
        );
        assert_eq!(
            set.route(CHECK_NUMBER),
            vec![EngineKind::Vision, EngineKind::Numeral, EngineKind::Detector]
        );

        let mut preview = EngineSet::empty(vec![EngineKind::Vision]);
        preview.preview_only = true;
        assert!(preview.route(MICR).is_empty());
        assert!(preview.route(LEGAL_AMOUNT).is_empty());
    }

    #[test]
    fn test_collect_candidates_records_engine_errors() {
        let mut set = EngineSet::empty(vec![EngineKind::Vision]);
        set.vision = Some(Box::new(FixedText("1,000")));
        set.numeral = Some(Box::new(FailingNumeral));
        let crop = RgbImage::new(8, 8);
        let mut errors = Vec::new();

        let amount = set.collect_candidates(NUMERIC_AMOUNT, &crop, &mut errors);
        assert_eq!(amount.get("vision"), Some("1,000"));
        assert!(errors.is_empty());

        let micr = set.collect_candidates(MICR, &crop, &mut errors);
        assert!(micr.is_empty());
        assert_eq!(
            errors,
            vec!["numeral: engine unavailable: no tesseract".to_string()]
        );
    }

    #[test]
    fn test_micr_without_numeral_engine_is_reported() {
        let set = EngineSet::empty(vec![EngineKind::Vision]);
        let mut errors = Vec::new();

        let micr = set.collect_candidates(MICR, &RgbImage::new(8, 8), &mut errors);
        assert!(micr.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("numeral: engine unavailable"));
    }

    #[test]
    fn test_numeral_load_error_is_kept_for_fields() {
        let mut set = EngineSet::empty(vec![EngineKind::Numeral]);
        set.numeral_error = EngineError::unavailable("Tesseract not found");
        let mut errors = Vec::new();

        set.collect_candidates(CHECK_NUMBER, &RgbImage::new(8, 8), &mut errors);
        assert_eq!(
            errors,
            vec!["numeral: engine unavailable: Tesseract not found".to_string()]
        );
    }

    #[test]
    fn test_detector_candidate_is_joined_text() {
        let mut set = EngineSet::empty(vec![EngineKind::Detector]);
        set.detector = Some(Box::new(FixedLines));
        let mut errors = Vec::new();

        let legal = set.collect_candidates(LEGAL_AMOUNT, &RgbImage::new(8, 8), &mut errors);
        assert_eq!(legal.get("detector"), Some("One hundred"));
        assert_eq!(legal.detections.len(), 2);
        assert_eq!(set.detect_lines(&RgbImage::new(8, 8), &mut errors).len(), 2);
    }

    #[test]
    fn test_missing_engines_give_no_candidates() {
        let set = EngineSet::empty(vec![EngineKind::Vision, EngineKind::Detector]);
        let mut errors = Vec::new();
        let candidates = set.collect_candidates(LEGAL_AMOUNT, &RgbImage::new(8, 8), &mut errors);
        assert!(candidates.is_empty());
        assert!(set.detect_lines(&RgbImage::new(8, 8), &mut errors).is_empty());
        assert!(errors.is_empty());
    }
}
