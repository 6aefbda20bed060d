//! Run configuration.
//!
//! Loaded from config.json (next to the executable, or a path given on the
//! command line), then overridden by `OCR_*` environment variables. Built once
//! in `main` and passed down by reference.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::align::SkewParams;
use crate::ocr::EngineKind;
use crate::region::{Region, RegionOrigin};

/// How regions are re-derived from the scan before cropping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorMode {
    /// Use the configured regions as-is
    #[default]
    None,
    /// Detect the MICR line and re-anchor regions on it
    Micr,
}

impl AnchorMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "micr" => Some(Self::Micr),
            _ => None,
        }
    }
}

/// Complete run configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckOcrConfig {
    /// Region overrides merged over the built-in defaults
    pub regions: BTreeMap<String, Region>,
    pub origin: RegionOrigin,
    pub anchor: AnchorMode,
    /// Requested engines, in the order their candidates are considered
    pub engines: Vec<EngineKind>,
    /// `[program, args...]` for the vision engine; `{model}` is substituted
    pub vision_command: Vec<String>,
    pub vision_model: String,
    pub tesseract_path: Option<PathBuf>,
    /// Tesseract language for the numeral engine; `eng` restricts to digits
    pub micr_language: String,
    /// Crops are shrunk to fit this many pixels per side before recognition
    pub crop_max_size: Option<u32>,
    /// Crop and report regions without refinement or recognition
    pub preview_only: bool,
    /// Attach base64 PNG previews of the crops and the aligned image
    pub debug_images: bool,
    /// Run bounds detection and deskew before cropping
    pub align: bool,
    pub bounds_padding: u32,
    pub deskew: SkewParams,
}

pub const DEFAULT_VISION_MODEL: &str = "microsoft/trocr-small-handwritten";

impl Default for CheckOcrConfig {
    fn default() -> Self {
        Self {
            regions: BTreeMap::new(),
            origin: RegionOrigin::TopLeft,
            anchor: AnchorMode::None,
            engines: vec![EngineKind::Vision],
            vision_command: Vec::new(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            tesseract_path: None,
            micr_language: "eng".to_string(),
            crop_max_size: None,
            preview_only: false,
            debug_images: false,
            align: false,
            bounds_padding: 0,
            deskew: SkewParams::default(),
        }
    }
}

/// Default config.json location: next to the executable.
pub fn default_config_path() -> PathBuf {
    crate::paths::get_exe_dir().join("config.json")
}

/// Reads a config file. A missing file gives the defaults.
pub fn load_config(path: &Path) -> Result<CheckOcrConfig> {
    crate::log(&format!("Looking for config at: {}", path.display()));
    if !path.exists() {
        crate::log("config.json not found. Using defaults.");
        return Ok(CheckOcrConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    crate::log("Config loaded from config.json");
    Ok(config)
}

fn parse_or_log<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        crate::log(&format!("Ignoring invalid {}={:?}", name, value));
    }
    parsed
}

fn json_or_log<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> Option<T> {
    match serde_json::from_str(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            crate::log(&format!("Ignoring invalid {}: {}", name, e));
            None
        }
    }
}

impl CheckOcrConfig {
    /// Applies environment overrides from `lookup` (normally `std::env::var`).
    ///
    /// Unset or empty variables leave the value alone; unparsable ones are
    /// logged and ignored.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let flag = |name: &str| var(name).map(|v| v.trim() == "1");

        if let Some(raw) = var("OCR_REGIONS") {
            if let Some(regions) = json_or_log("OCR_REGIONS", &raw) {
                self.regions = regions;
            }
        }
        if let Some(raw) = var("OCR_ENGINES") {
            match json_or_log::<Vec<EngineKind>>("OCR_ENGINES", &raw) {
                Some(engines) if !engines.is_empty() => self.engines = engines,
                Some(_) => self.engines = vec![EngineKind::Vision],
                None => {}
            }
        }
        if let Some(raw) = var("OCR_REGION_ORIGIN") {
            match RegionOrigin::parse(&raw) {
                Some(origin) => self.origin = origin,
                None => crate::log(&format!("Ignoring invalid OCR_REGION_ORIGIN={:?}", raw)),
            }
        }
        if let Some(raw) = var("OCR_REGION_ANCHOR") {
            match AnchorMode::parse(&raw) {
                Some(anchor) => self.anchor = anchor,
                None => crate::log(&format!("Ignoring invalid OCR_REGION_ANCHOR={:?}", raw)),
            }
        }
        if let Some(model) = var("OCR_TROCR_MODEL") {
            self.vision_model = model.trim().to_string();
        }
        if let Some(raw) = var("OCR_VISION_COMMAND") {
            if let Some(command) = json_or_log("OCR_VISION_COMMAND", &raw) {
                self.vision_command = command;
            }
        }
        if let Some(path) = var("TESSERACT_PATH") {
            self.tesseract_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(language) = var("MICR_TESS_LANG") {
            self.micr_language = language.trim().to_string();
        }
        if let Some(raw) = var("OCR_CROP_MAX_SIZE") {
            self.crop_max_size = parse_or_log("OCR_CROP_MAX_SIZE", &raw);
        }
        if let Some(preview_only) = flag("OCR_PREVIEW_ONLY") {
            self.preview_only = preview_only;
        }
        if let Some(debug_images) = flag("OCR_DEBUG_IMAGES") {
            self.debug_images = debug_images;
        }
        if let Some(align) = flag("OCR_ALIGN") {
            self.align = align;
        }
        if let Some(padding) =
            var("OCR_BOUNDS_PADDING").and_then(|v| parse_or_log("OCR_BOUNDS_PADDING", &v))
        {
            self.bounds_padding = padding;
        }
        if let Some(angle) =
            var("OCR_DESKEW_MAX_ANGLE").and_then(|v| parse_or_log("OCR_DESKEW_MAX_ANGLE", &v))
        {
            self.deskew.max_angle = angle;
        }
        if let Some(step) =
            var("OCR_DESKEW_STEP").and_then(|v| parse_or_log("OCR_DESKEW_STEP", &v))
        {
            self.deskew.step = step;
        }
        if let Some(band) =
            var("OCR_DESKEW_BAND").and_then(|v| parse_or_log("OCR_DESKEW_BAND", &v))
        {
            self.deskew.band_ratio = band;
        }
        if let Some(scale) =
            var("OCR_DESKEW_SCALE").and_then(|v| parse_or_log("OCR_DESKEW_SCALE", &v))
        {
            self.deskew.scale = scale;
        }
        self
    }

    /// Applies overrides from the process environment.
    pub fn with_process_env(self) -> Self {
        self.apply_env(|name| std::env::var(name).ok())
    }
}
