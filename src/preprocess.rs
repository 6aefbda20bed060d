use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage};
use std::io::Cursor;

/// Sharpening kernel, normalized by its sum (16) in `filter3x3`.
const SHARPEN_KERNEL: [f32; 9] = [-2.0, -2.0, -2.0, -2.0, 32.0, -2.0, -2.0, -2.0, -2.0];

/// Contrast factor applied after autocontrast.
const CONTRAST_FACTOR: f32 = 2.0;

/// Normalizes a scanned check before any geometric analysis.
///
/// Converts to grayscale, stretches the intensity range to 0-255, doubles the
/// contrast around the mean and sharpens. The result is returned as RGB so
/// crops can be handed to engines unchanged.
pub fn enhance_for_ocr(img: &DynamicImage) -> RgbImage {
    let gray = img.to_luma8();
    let gray = autocontrast(&gray);
    let gray = enhance_contrast(&gray, CONTRAST_FACTOR);
    let gray = imageops::filter3x3(&gray, &SHARPEN_KERNEL);
    DynamicImage::ImageLuma8(gray).to_rgb8()
}

/// Linearly maps the darkest pixel to 0 and the brightest to 255.
pub fn autocontrast(gray: &GrayImage) -> GrayImage {
    let (lo, hi) = gray
        .as_raw()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi <= lo {
        return gray.clone();
    }
    let span = (hi - lo) as f32;
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p[0] = ((p[0] - lo) as f32 * 255.0 / span).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Scales each pixel's distance from the image mean by `factor`.
pub fn enhance_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    let n = gray.as_raw().len();
    if n == 0 {
        return gray.clone();
    }
    let sum = gray.as_raw().iter().map(|&v| v as u64).sum::<u64>();
    let mean = (sum as f32 / n as f32 + 0.5).floor();
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        let v = mean + factor * (p[0] as f32 - mean);
        *p = Luma([v.round().clamp(0.0, 255.0) as u8]);
    }
    out
}

pub fn to_gray(img: &RgbImage) -> GrayImage {
    imageops::grayscale(img)
}

/// Shrinks an image so neither side exceeds `max_side`, keeping the aspect
/// ratio. Never enlarges.
pub fn fit_within(img: &RgbImage, max_side: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if max_side == 0 || (w <= max_side && h <= max_side) {
        return img.clone();
    }
    let scale = max_side as f64 / w.max(h) as f64;
    let nw = ((w as f64 * scale).round() as u32).clamp(1, max_side);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, max_side);
    imageops::resize(img, nw, nh, FilterType::Triangle)
}

/// PNG thumbnail of `img` (at most `max_side` per side), base64 encoded.
pub fn preview_base64(img: &RgbImage, max_side: u32) -> Result<String> {
    let thumb = fit_within(img, max_side);
    let mut buffer = Cursor::new(Vec::new());
    thumb.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(STANDARD.encode(buffer.into_inner()))
}
