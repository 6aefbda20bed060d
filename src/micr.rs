//! MICR line detection and MICR-anchored region placement.
//!
//! The MICR line is the one feature every check prints in the same place with
//! the same high-contrast font. Once found, it is used as the ground truth for
//! where every other field sits.

use image::GrayImage;
use serde::Serialize;

use crate::ink::{InkMask, longest_run, percentile};
use crate::region::{
    CHECK_NUMBER, LEGAL_AMOUNT, MICR, NUMERIC_AMOUNT, Region, RegionOrigin, RegionSet, clamp_unit,
    set_region_box_from_px, set_region_y_from_px,
};

/// Fraction of the image height (from the top) where the MICR search starts.
const MICR_SEARCH_START: f64 = 0.8;
const MIN_ROW_ACTIVITY: f64 = 0.08;
const MIN_MICR_INK_RATIO: f64 = 0.002;

/// Legal amount band: starts this far above the MICR top, as a fraction of height.
const LEGAL_OFFSET: f64 = 0.34;
const LEGAL_HEIGHT: f64 = 0.11;
const NUMERIC_OFFSET: f64 = 0.37;
const NUMERIC_HEIGHT: f64 = 0.12;

/// Pixel box of the MICR ink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MicrBox {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

/// A detected MICR line with its vertical span normalized under the active
/// origin. For `bottom-left`, `top_norm` is the larger of the two values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MicrDetection {
    pub micr_box: MicrBox,
    pub top_norm: f64,
    pub bottom_norm: f64,
}

impl MicrDetection {
    pub fn new(micr_box: MicrBox, height: u32, origin: RegionOrigin) -> Self {
        let h = height.max(1) as f64;
        let (top, bottom) = (micr_box.top as f64 / h, micr_box.bottom as f64 / h);
        let (top_norm, bottom_norm) = match origin {
            RegionOrigin::TopLeft => (top, bottom),
            RegionOrigin::BottomLeft => {
                let (t, b) = (1.0 - top, 1.0 - bottom);
                if t < b { (b, t) } else { (t, b) }
            }
        };
        Self {
            micr_box,
            top_norm,
            bottom_norm,
        }
    }

    /// Vertical span as `(y_min, y_max)` in region coordinates.
    pub fn span(&self) -> (f64, f64) {
        (self.top_norm.min(self.bottom_norm), self.top_norm.max(self.bottom_norm))
    }
}

/// Finds the MICR band as a pixel row span `(top, bottom)`, bottom exclusive.
///
/// A row is "active" in proportion to its pixels that deviate from the image
/// mean by more than the 75th percentile of all deviations. The longest run
/// of active rows inside the bottom 20% of the image wins.
pub fn detect_micr_band(gray: &GrayImage) -> Option<(u32, u32)> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let raw = gray.as_raw();
    let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / raw.len() as f64;
    let deviation: Vec<f64> = raw.iter().map(|&v| (v as f64 - mean).abs()).collect();
    let dev_thresh = percentile(&deviation, 75.0);

    let band_start = (height as f64 * MICR_SEARCH_START) as usize;
    let w = width as usize;
    let activity: Vec<f64> = deviation
        .chunks(w)
        .skip(band_start)
        .map(|row| row.iter().filter(|&&d| d > dev_thresh).count() as f64 / w as f64)
        .collect();
    if activity.is_empty() {
        return None;
    }

    let threshold = percentile(&activity, 75.0).max(MIN_ROW_ACTIVITY);
    let (start, end) = longest_run(&activity, threshold)?;
    Some(((band_start + start) as u32, (band_start + end) as u32))
}

/// Tightens a detected band to the box of its ink.
///
/// Falls back to the band at full width when it holds less than 0.2% ink.
pub fn tighten_micr_bounds(gray: &GrayImage, top: u32, bottom: u32) -> MicrBox {
    let (width, height) = gray.dimensions();
    let top = top.min(height);
    let bottom = bottom.min(height);
    let untightened = MicrBox {
        top,
        bottom,
        left: 0,
        right: width,
    };
    if bottom <= top {
        return untightened;
    }

    let band = image::imageops::crop_imm(gray, 0, top, width, bottom - top).to_image();
    let ink = InkMask::from_gray(&band, 35.0);
    if ink.ink_ratio() < MIN_MICR_INK_RATIO {
        return untightened;
    }
    match ink.bounding_box() {
        Some(b) => MicrBox {
            top: top + b.top,
            bottom: top + b.bottom,
            left: b.left,
            right: b.right,
        },
        None => untightened,
    }
}

/// Re-maps every region's vertical bounds with the affine map that sends
/// `anchor`'s configured span onto the detected MICR span.
///
/// `micr_span` is `(y_min, y_max)` in region coordinates. The `micr` region
/// itself is left untouched.
pub fn adjust_regions_for_micr(
    regions: &RegionSet,
    micr_span: (f64, f64),
    anchor: &Region,
) -> RegionSet {
    let (actual_top, actual_bottom) = micr_span;
    let actual_height = (actual_bottom - actual_top).max(1e-6);
    let desired_height = (anchor.y_max - anchor.y_min).max(1e-6);
    let scale = desired_height / actual_height;
    let shift = anchor.y_min - actual_top * scale;

    regions.map(|key, region| {
        if key == MICR {
            return *region;
        }
        Region {
            y_min: clamp_unit(region.y_min * scale + shift),
            y_max: clamp_unit(region.y_max * scale + shift),
            ..*region
        }
    })
}

/// Places the amount fields and the check number at fixed offsets from the
/// detected MICR line, and records the MICR region itself.
pub fn anchor_regions_to_micr(
    regions: &RegionSet,
    micr: &MicrDetection,
    width: u32,
    height: u32,
    origin: RegionOrigin,
) -> RegionSet {
    let b = micr.micr_box;
    let h = height as f64;
    let base = |key: &str| regions.get(key).copied().unwrap_or_default();
    let micr_box_region = |region: Region| {
        set_region_box_from_px(
            &region,
            b.left as f64,
            b.right as f64,
            b.top as f64,
            b.bottom as f64,
            width,
            height,
            origin,
        )
    };

    let legal_top = b.top as f64 - LEGAL_OFFSET * h;
    let numeric_top = b.top as f64 - NUMERIC_OFFSET * h;

    regions
        .with(MICR, micr_box_region(base(MICR)))
        .with(
            LEGAL_AMOUNT,
            set_region_y_from_px(
                &base(LEGAL_AMOUNT),
                legal_top,
                legal_top + LEGAL_HEIGHT * h,
                height,
                origin,
            ),
        )
        .with(
            NUMERIC_AMOUNT,
            set_region_y_from_px(
                &base(NUMERIC_AMOUNT),
                numeric_top,
                numeric_top + NUMERIC_HEIGHT * h,
                height,
                origin,
            ),
        )
        .with(CHECK_NUMBER, micr_box_region(base(CHECK_NUMBER)))
}

/// Detects the MICR line and returns the regions re-anchored on it.
///
/// When a `micr` region is configured it serves as the anchor for the
/// proportional re-mapping; the fixed placements then take precedence for
/// the amount fields and the check number. Without a detection the regions
/// are returned unchanged.
pub fn locate_micr(
    gray: &GrayImage,
    regions: &RegionSet,
    origin: RegionOrigin,
) -> (RegionSet, Option<MicrDetection>) {
    let Some((top, bottom)) = detect_micr_band(gray) else {
        crate::log("MICR band not found, keeping configured regions");
        return (regions.clone(), None);
    };
    let micr_box = tighten_micr_bounds(gray, top, bottom);
    let detection = MicrDetection::new(micr_box, gray.height(), origin);
    crate::log(&format!(
        "MICR detected: rows {}..{}, cols {}..{}",
        micr_box.top, micr_box.bottom, micr_box.left, micr_box.right
    ));

    let adjusted = match regions.get(MICR) {
        Some(anchor) => adjust_regions_for_micr(regions, detection.span(), anchor),
        None => regions.clone(),
    };
    let (width, height) = gray.dimensions();
    let anchored = anchor_regions_to_micr(&adjusted, &detection, width, height, origin);
    (anchored, Some(detection))
}
