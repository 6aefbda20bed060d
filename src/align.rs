//! Document bounds detection and skew correction.
//!
//! The aligner crops a scan to the check's printed structure, estimates the
//! rotation that makes the bottom text lines sharpest, undoes it and crops
//! again. Every stage falls back to its input on degenerate geometry.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use serde::{Deserialize, Serialize};

use crate::ink::{InkMask, percentile, variance};
use crate::preprocess::to_gray;
use crate::region::crop_px;

/// Minimum score gain over the unrotated baseline before a rotation is accepted.
const MIN_SKEW_IMPROVEMENT: f64 = 0.0005;

/// Angles below this (degrees) are not worth resampling the image for.
const MIN_ROTATION_DEG: f64 = 0.1;

/// Skew search parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkewParams {
    /// Largest angle tried in either direction (degrees)
    pub max_angle: f64,
    /// Step between candidate angles (degrees)
    pub step: f64,
    /// Height of the scored bottom band as a fraction of the image height
    pub band_ratio: f64,
    /// Downsampling factor applied before searching; ignored outside (0, 1)
    pub scale: f64,
}

impl Default for SkewParams {
    fn default() -> Self {
        Self {
            max_angle: 3.0,
            step: 0.5,
            band_ratio: 0.2,
            scale: 0.4,
        }
    }
}

/// Pixel bounds `(x_min, y_min, x_max, y_max)` of the printed check.
///
/// Keeps rows and columns whose density of dark pixels (below the 75th
/// percentile) is above the 60th percentile of their own profile. Falls back
/// to the full image when nothing qualifies.
pub fn find_check_bounds(gray: &GrayImage, padding: u32) -> (u32, u32, u32, u32) {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return (0, 0, width, height);
    }

    let ink = InkMask::from_gray(gray, 75.0);
    let rows = ink.row_density();
    let cols = ink.column_density();
    let row_thresh = percentile(&rows, 60.0).max(0.01);
    let col_thresh = percentile(&cols, 60.0).max(0.01);

    let kept_rows: Vec<usize> = (0..rows.len()).filter(|&i| rows[i] > row_thresh).collect();
    let kept_cols: Vec<usize> = (0..cols.len()).filter(|&i| cols[i] > col_thresh).collect();

    let (Some(&y_min), Some(&y_max), Some(&x_min), Some(&x_max)) =
        (kept_rows.first(), kept_rows.last(), kept_cols.first(), kept_cols.last())
    else {
        return (0, 0, width, height);
    };

    (
        (x_min as u32).saturating_sub(padding),
        (y_min as u32).saturating_sub(padding),
        (x_max as u32 + padding).min(width),
        (y_max as u32 + padding).min(height),
    )
}

/// Output size and projection for rotating a `width x height` image by
/// `angle_deg` counter-clockwise onto a canvas that holds all of it.
fn expanded_rotation(width: u32, height: u32, angle_deg: f64) -> (Projection, u32, u32) {
    let theta = angle_deg.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let (w, h) = (width as f64, height as f64);
    let new_w = ((w * cos + h * sin) - 1e-6).ceil().max(1.0) as u32;
    let new_h = ((w * sin + h * cos) - 1e-6).ceil().max(1.0) as u32;

    let projection = Projection::translate(new_w as f32 / 2.0, new_h as f32 / 2.0)
        * Projection::rotate(-theta as f32)
        * Projection::translate(-(width as f32) / 2.0, -(height as f32) / 2.0);
    (projection, new_w, new_h)
}

/// Rotates a grayscale image counter-clockwise, expanding the canvas and
/// filling uncovered area with white.
pub fn rotate_expand_gray(gray: &GrayImage, angle_deg: f64) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 || angle_deg == 0.0 {
        return gray.clone();
    }
    let (projection, w, h) = expanded_rotation(gray.width(), gray.height(), angle_deg);
    let mut out = GrayImage::from_pixel(w, h, Luma([255]));
    warp_into(gray, &projection, Interpolation::Nearest, Luma([255]), &mut out);
    out
}

/// RGB counterpart of [`rotate_expand_gray`].
pub fn rotate_expand_rgb(img: &RgbImage, angle_deg: f64) -> RgbImage {
    if img.width() == 0 || img.height() == 0 || angle_deg == 0.0 {
        return img.clone();
    }
    let white = Rgb([255, 255, 255]);
    let (projection, w, h) = expanded_rotation(img.width(), img.height(), angle_deg);
    let mut out = RgbImage::from_pixel(w, h, white);
    warp_into(img, &projection, Interpolation::Nearest, white, &mut out);
    out
}

fn candidate_angles(max_angle: f64, step: f64) -> Vec<f64> {
    let count = ((2.0 * max_angle) / step + 1e-9).floor() as usize + 1;
    (0..count).map(|i| -max_angle + i as f64 * step).collect()
}

/// Line-sharpness score: variance of the row ink density in the bottom band.
fn band_score(rotated: &GrayImage, band_height: u32) -> Option<f64> {
    let (w, h) = rotated.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let band_height = band_height.min(h);
    let band = imageops::crop_imm(rotated, 0, h - band_height, w, band_height).to_image();
    Some(variance(&InkMask::from_gray(&band, 35.0).row_density()))
}

/// Angle (degrees, counter-clockwise) that best straightens the text lines.
///
/// Returns exactly 0.0 when no candidate beats the unrotated image by at
/// least [`MIN_SKEW_IMPROVEMENT`].
pub fn estimate_skew_angle(gray: &GrayImage, params: &SkewParams) -> f64 {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || params.step <= 0.0 || params.max_angle <= 0.0 {
        return 0.0;
    }

    let small;
    let gray = if params.scale > 0.0 && params.scale < 1.0 {
        let w = ((width as f64 * params.scale) as u32).max(1);
        let h = ((height as f64 * params.scale) as u32).max(1);
        small = imageops::resize(gray, w, h, FilterType::Triangle);
        &small
    } else {
        gray
    };

    let band_height = ((gray.height() as f64 * params.band_ratio) as u32).max(1);
    let mut best_angle = 0.0;
    let mut best_score = -1.0;
    let mut baseline: Option<f64> = None;

    for angle in candidate_angles(params.max_angle, params.step) {
        let rotated = rotate_expand_gray(gray, angle);
        let Some(score) = band_score(&rotated, band_height) else {
            continue;
        };
        if angle.abs() < 1e-9 {
            baseline = Some(score);
        }
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    match baseline {
        Some(base) if best_score - base < MIN_SKEW_IMPROVEMENT => 0.0,
        _ => best_angle,
    }
}

/// Crops the scan to the check, removes skew and re-tightens the crop.
pub fn align_check(img: &RgbImage, padding: u32, params: &SkewParams) -> RgbImage {
    let (x0, y0, x1, y1) = find_check_bounds(&to_gray(img), padding);
    let cropped = crop_px(img, x0, y0, x1, y1);
    if cropped.width() == 0 || cropped.height() == 0 {
        return img.clone();
    }

    let angle = estimate_skew_angle(&to_gray(&cropped), params);
    if angle.abs() < MIN_ROTATION_DEG {
        return cropped;
    }
    crate::log(&format!("Deskewing check by {:.2} degrees", angle));

    let rotated = rotate_expand_rgb(&cropped, angle);
    let (x0, y0, x1, y1) = find_check_bounds(&to_gray(&rotated), padding);
    crop_px(&rotated, x0, y0, x1, y1)
}
