//! Per-field crop refinement.
//!
//! Each heuristic narrows a coarse region crop to the ink it actually holds.
//! They are no-ops when there is not enough ink to say anything.

use image::RgbImage;

use crate::ink::{InkMask, argmax};
use crate::preprocess::to_gray;
use crate::region::{CHECK_NUMBER, LEGAL_AMOUNT, NUMERIC_AMOUNT, crop_px};

/// Crops to the bounding box of dark pixels (30th percentile), padded.
///
/// Skipped when the ink ratio is below `min_ink_ratio`.
pub fn tighten_to_ink(img: &RgbImage, padding: u32, min_ink_ratio: f64) -> RgbImage {
    let gray = to_gray(img);
    if gray.as_raw().is_empty() {
        return img.clone();
    }
    let mask = InkMask::from_gray(&gray, 30.0);
    match mask.ink_bounding_box(min_ink_ratio, padding) {
        Some(b) => crop_px(img, b.left, b.top, b.right, b.bottom),
        None => img.clone(),
    }
}

/// Keeps a horizontal band centered on the densest row.
///
/// The densest row is searched below the top 5% and above the bottom
/// `avoid_bottom_ratio`; the band is `band_height_ratio` of the crop height.
pub fn crop_to_band(img: &RgbImage, band_height_ratio: f64, avoid_bottom_ratio: f64) -> RgbImage {
    let gray = to_gray(img);
    if gray.as_raw().is_empty() {
        return img.clone();
    }
    let rows = InkMask::from_gray(&gray, 35.0).row_density();
    let total = rows.len();

    let start = (total as f64 * 0.05) as usize;
    let end = ((total as f64 * (1.0 - avoid_bottom_ratio)) as usize).min(total);
    if end <= start {
        return img.clone();
    }
    let Some(offset) = argmax(&rows[start..end]) else {
        return img.clone();
    };
    let peak = start + offset;

    let band = ((total as f64 * band_height_ratio) as usize).max(1);
    let half = band / 2;
    let y_min = peak.saturating_sub(half);
    let y_max = (peak + half).min(total);
    if y_max <= y_min {
        return img.clone();
    }
    crop_px(img, 0, y_min as u32, img.width(), y_max as u32)
}

/// Cuts off a dense block (a box or border) found in the right part of the
/// crop.
///
/// Looks at the rightmost `right_ratio` of columns for the first one whose
/// density exceeds `density_threshold` and keeps everything left of it, minus
/// `padding`.
pub fn trim_right_block(
    img: &RgbImage,
    right_ratio: f64,
    density_threshold: f64,
    padding: u32,
) -> RgbImage {
    let gray = to_gray(img);
    if gray.as_raw().is_empty() {
        return img.clone();
    }
    let cols = InkMask::from_gray(&gray, 35.0).column_density();
    let width = cols.len();

    let right_start = ((width as f64 * (1.0 - right_ratio)) as usize).min(width);
    let Some(hit) = cols[right_start..].iter().position(|&d| d > density_threshold) else {
        return img.clone();
    };
    let block_start = (right_start + hit) as u32;
    let x_max = block_start.saturating_sub(padding).max(1);
    crop_px(img, 0, 0, x_max, img.height())
}

/// Row of the strongest horizontal stroke, if it is dense enough to be a
/// printed underline.
fn find_underline_row(rows: &[f64], min_density: f64) -> Option<usize> {
    let idx = argmax(rows)?;
    (rows[idx] >= min_density).then_some(idx)
}

/// Legal amount: band around the printed underline, then drop any boxed
/// content on the right.
pub fn refine_legal_crop(crop: &RgbImage) -> RgbImage {
    let gray = to_gray(crop);
    if gray.as_raw().is_empty() {
        return crop.clone();
    }
    let height = gray.height() as usize;
    let rows = InkMask::from_gray(&gray, 35.0).row_density();

    let mut crop = crop.clone();
    if let Some(underline) = find_underline_row(&rows, 0.25) {
        let top = underline.saturating_sub((height as f64 * 0.6) as usize);
        let bottom = (underline + (height as f64 * 0.15) as usize).min(height);
        if bottom > top {
            crop = crop_px(&crop, 0, top as u32, crop.width(), bottom as u32);
        }
    }
    trim_right_block(&crop, 0.25, 0.06, 6)
}

/// Numeric amount: drop the currency sign or box border on the left, then
/// isolate the digit line.
pub fn refine_numeric_crop(crop: &RgbImage) -> RgbImage {
    let gray = to_gray(crop);
    if gray.as_raw().is_empty() {
        return crop.clone();
    }
    let cols = InkMask::from_gray(&gray, 35.0).column_density();
    let width = cols.len();

    let mut crop = crop.clone();
    let left_band = &cols[..((width as f64 * 0.35) as usize).clamp(1, width)];
    if let Some(peak) = argmax(left_band) {
        if left_band[peak] > 0.05 {
            let x_min = (peak + (width as f64 * 0.04) as usize).min(width - 1);
            crop = crop_px(&crop, x_min as u32, 0, width as u32, crop.height());
        }
    }
    crop_to_band(&crop, 0.45, 0.25)
}

/// Applies the refinement chain for a field.
///
/// Amount fields and the check number are tightened to their ink; numeric and
/// legal amounts then get their own refiner. Preview-only runs skip it all.
pub fn refine_field(key: &str, crop: RgbImage, preview_only: bool) -> RgbImage {
    if preview_only {
        return crop;
    }
    let mut crop = crop;
    if matches!(key, NUMERIC_AMOUNT | LEGAL_AMOUNT | CHECK_NUMBER) {
        crop = tighten_to_ink(&crop, 12, 0.003);
    }
    match key {
        NUMERIC_AMOUNT => refine_numeric_crop(&crop),
        LEGAL_AMOUNT => refine_legal_crop(&crop),
        _ => crop,
    }
}
