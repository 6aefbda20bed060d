//! Field regions in fractional image coordinates.
//!
//! A region describes where a field is expected on the check as fractions of
//! the full image (0.0-1.0). Conversions to and from pixels always take the
//! active [`RegionOrigin`] explicitly.

use image::{ImageBuffer, Pixel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NUMERIC_AMOUNT: &str = "numericAmount";
pub const LEGAL_AMOUNT: &str = "legalAmount";
pub const CHECK_NUMBER: &str = "checkNumber";
pub const MICR: &str = "micr";

/// Where y = 0.0 sits: the top edge of the image or the bottom edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionOrigin {
    #[default]
    TopLeft,
    BottomLeft,
}

impl RegionOrigin {
    /// Parses `top-left` / `bottom-left` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "top-left" => Some(Self::TopLeft),
            "bottom-left" => Some(Self::BottomLeft),
            _ => None,
        }
    }
}

/// A rectangle in fractional coordinates.
///
/// Missing bounds in a configured override default to the full image extent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Region {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
        }
    }
}

impl Region {
    pub const fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Pixel rectangle `(x0, y0, x1, y1)` for an image of the given size.
    ///
    /// Fractions are clamped to [0, 1] and truncated to whole pixels. Returns
    /// `None` when the rectangle is empty or inverted.
    pub fn to_pixels(
        &self,
        width: u32,
        height: u32,
        origin: RegionOrigin,
    ) -> Option<(u32, u32, u32, u32)> {
        let x0 = (clamp_unit(self.x_min) * width as f64) as u32;
        let x1 = (clamp_unit(self.x_max) * width as f64) as u32;
        let (mut y_min, mut y_max) = (clamp_unit(self.y_min), clamp_unit(self.y_max));
        if origin == RegionOrigin::BottomLeft {
            (y_min, y_max) = (1.0 - y_max, 1.0 - y_min);
        }
        let y0 = (y_min * height as f64) as u32;
        let y1 = (y_max * height as f64) as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Crops the region out of an image.
///
/// Degenerate regions return an unmodified copy of the input.
pub fn crop_region<P>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
    region: &Region,
    origin: RegionOrigin,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (w, h) = img.dimensions();
    match region.to_pixels(w, h, origin) {
        Some((x0, y0, x1, y1)) => crop_px(img, x0, y0, x1, y1),
        None => img.clone(),
    }
}

/// Crops a pixel rectangle `[x0, x1) x [y0, y1)`, clamped to the image.
///
/// An empty rectangle after clamping returns the input unchanged.
pub fn crop_px<P>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (w, h) = img.dimensions();
    let (x1, y1) = (x1.min(w), y1.min(h));
    if x1 <= x0 || y1 <= y0 {
        return img.clone();
    }
    image::imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image()
}

fn normalize_y(y_top_px: f64, y_bottom_px: f64, height: u32, origin: RegionOrigin) -> (f64, f64) {
    let h = height as f64;
    match origin {
        RegionOrigin::BottomLeft => (1.0 - y_bottom_px / h, 1.0 - y_top_px / h),
        RegionOrigin::TopLeft => (y_top_px / h, y_bottom_px / h),
    }
}

fn ordered_clamped(a: f64, b: f64, extent: u32) -> (f64, f64) {
    let a = a.clamp(0.0, extent as f64);
    let b = b.clamp(0.0, extent as f64);
    if b < a { (b, a) } else { (a, b) }
}

/// Rewrites only the vertical bounds of `region` from a pixel span.
pub fn set_region_y_from_px(
    region: &Region,
    y_top_px: f64,
    y_bottom_px: f64,
    height: u32,
    origin: RegionOrigin,
) -> Region {
    if height == 0 {
        return *region;
    }
    let (top, bottom) = ordered_clamped(y_top_px, y_bottom_px, height);
    let (y_min, y_max) = normalize_y(top, bottom, height, origin);
    Region {
        y_min: clamp_unit(y_min),
        y_max: clamp_unit(y_max),
        ..*region
    }
}

/// Rewrites all four bounds of `region` from a pixel box.
#[allow(clippy::too_many_arguments)]
pub fn set_region_box_from_px(
    region: &Region,
    x_min_px: f64,
    x_max_px: f64,
    y_top_px: f64,
    y_bottom_px: f64,
    width: u32,
    height: u32,
    origin: RegionOrigin,
) -> Region {
    if width == 0 || height == 0 {
        return *region;
    }
    let (left, right) = ordered_clamped(x_min_px, x_max_px, width);
    let (top, bottom) = ordered_clamped(y_top_px, y_bottom_px, height);
    let (y_min, y_max) = normalize_y(top, bottom, height, origin);
    Region {
        x_min: clamp_unit(left / width as f64),
        x_max: clamp_unit(right / width as f64),
        y_min: clamp_unit(y_min),
        y_max: clamp_unit(y_max),
    }
}

/// The set of field regions used for one run.
///
/// Adjustments produce a new set; nothing mutates a set that has already been
/// handed to a later stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionSet(BTreeMap<String, Region>);

impl Default for RegionSet {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(NUMERIC_AMOUNT.to_string(), Region::new(0.73, 0.96, 0.56, 0.69));
        map.insert(LEGAL_AMOUNT.to_string(), Region::new(0.08, 0.86, 0.47, 0.58));
        map.insert(CHECK_NUMBER.to_string(), Region::new(0.70, 0.96, 0.86, 0.95));
        Self(map)
    }
}

impl RegionSet {
    /// Built-in defaults with `overrides` replacing or adding whole regions.
    pub fn with_overrides(overrides: &BTreeMap<String, Region>) -> Self {
        let mut set = Self::default();
        for (key, region) in overrides {
            set.0.insert(key.clone(), *region);
        }
        set
    }

    pub fn get(&self, key: &str) -> Option<&Region> {
        self.0.get(key)
    }

    /// Returns a copy of the set with `key` set to `region`.
    pub fn with(&self, key: &str, region: Region) -> Self {
        let mut map = self.0.clone();
        map.insert(key.to_string(), region);
        Self(map)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Region)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&str, &Region) -> Region,
    {
        Self(self.0.iter().map(|(k, v)| (k.clone(), f(k, v))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_crop_region_size_matches_fractions() {
        let img: RgbImage =
            ImageBuffer::from_fn(1000, 600, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]));
        let region = Region::new(0.1, 0.45, 0.25, 0.6);
        let cropped = crop_region(&img, &region, RegionOrigin::TopLeft);

        assert_eq!(cropped.dimensions(), (350, 210));
        // Top-left pixel should be (100, 150) of the source image
        assert_eq!(cropped.get_pixel(0, 0)[0], 100);
        assert_eq!(cropped.get_pixel(0, 0)[1], 150);
    }

    #[test]
    fn test_crop_region_bottom_left_flips_y() {
        let img: GrayImage = ImageBuffer::from_fn(100, 200, |_, y| Luma([y as u8]));
        let region = Region::new(0.0, 1.0, 0.0, 0.25);
        let cropped = crop_region(&img, &region, RegionOrigin::BottomLeft);

        // Bottom quarter: rows 150..200
        assert_eq!(cropped.dimensions(), (100, 50));
        assert_eq!(cropped.get_pixel(0, 0)[0], 150);
    }

    #[test]
    fn test_crop_region_degenerate_returns_input() {
        let img = GrayImage::new(80, 40);
        let inverted = Region::new(0.6, 0.2, 0.1, 0.9);
        assert_eq!(crop_region(&img, &inverted, RegionOrigin::TopLeft).dimensions(), (80, 40));

        let flat = Region::new(0.1, 0.9, 0.5, 0.5);
        assert_eq!(crop_region(&img, &flat, RegionOrigin::BottomLeft).dimensions(), (80, 40));
    }

    #[test]
    fn test_crop_region_clamps_out_of_range() {
        let img = GrayImage::new(100, 100);
        let region = Region::new(-0.5, 1.5, 0.9, 2.0);
        assert_eq!(crop_region(&img, &region, RegionOrigin::TopLeft).dimensions(), (100, 10));
    }

    #[test]
    fn test_bottom_left_round_trip() {
        let height = 600;
        let region = set_region_y_from_px(
            &Region::default(),
            480.0,
            540.0,
            height,
            RegionOrigin::BottomLeft,
        );
        assert!((region.y_min - 0.1).abs() < 1e-9);
        assert!((region.y_max - 0.2).abs() < 1e-9);

        let (_, y0, _, y1) = region.to_pixels(100, height, RegionOrigin::BottomLeft).unwrap();
        assert!((y0 as i64 - 480).abs() <= 1);
        assert!((y1 as i64 - 540).abs() <= 1);
    }

    #[test]
    fn test_set_region_y_swaps_and_clamps() {
        let base = Region::new(0.2, 0.4, 0.0, 1.0);
        let region = set_region_y_from_px(&base, 150.0, -20.0, 100, RegionOrigin::TopLeft);
        assert_eq!(region.y_min, 0.0);
        assert_eq!(region.y_max, 1.0);
        // x untouched
        assert_eq!(region.x_min, 0.2);
        assert_eq!(region.x_max, 0.4);
    }

    #[test]
    fn test_set_region_box_from_px() {
        let region = set_region_box_from_px(
            &Region::default(),
            300.0,
            100.0,
            50.0,
            150.0,
            400,
            200,
            RegionOrigin::TopLeft,
        );
        assert_eq!(region, Region::new(0.25, 0.75, 0.25, 0.75));
    }

    #[test]
    fn test_region_set_overrides_merge() {
        let mut overrides = BTreeMap::new();
        overrides.insert(LEGAL_AMOUNT.to_string(), Region::new(0.1, 0.2, 0.3, 0.4));
        overrides.insert(MICR.to_string(), Region::new(0.0, 1.0, 0.85, 0.95));

        let set = RegionSet::with_overrides(&overrides);
        assert_eq!(set.iter().count(), 4);
        assert_eq!(set.get(LEGAL_AMOUNT), Some(&Region::new(0.1, 0.2, 0.3, 0.4)));
        assert_eq!(set.get(NUMERIC_AMOUNT), Some(&Region::new(0.73, 0.96, 0.56, 0.69)));
    }

    #[test]
    fn test_region_deserialize_partial() {
        let region: Region = serde_json::from_str(r#"{"xMin": 0.5, "yMax": 0.25}"#).unwrap();
        assert_eq!(region, Region::new(0.5, 1.0, 0.0, 0.25));
    }
}
