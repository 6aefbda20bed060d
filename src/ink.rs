//! Ink density analysis.
//!
//! Every geometric heuristic in this crate is a thresholded statistic over a
//! boolean "ink" mask: pixels darker than a percentile of the sampled area.

use image::GrayImage;

/// Percentile of `values` with linear interpolation between closest ranks.
///
/// Returns 0.0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    interpolate_rank(sorted.len(), p, |k| sorted[k])
}

/// Percentile of the pixel intensities of a grayscale image.
///
/// Same interpolation as [`percentile`], computed from a histogram.
pub fn gray_percentile(gray: &GrayImage, p: f64) -> f64 {
    let n = gray.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let mut hist = [0usize; 256];
    for &v in gray.as_raw() {
        hist[v as usize] += 1;
    }
    interpolate_rank(n, p, |k| {
        let mut seen = 0usize;
        for (value, &count) in hist.iter().enumerate() {
            seen += count;
            if seen > k {
                return value as f64;
            }
        }
        255.0
    })
}

fn interpolate_rank<F>(n: usize, p: f64, value_at: F) -> f64
where
    F: Fn(usize) -> f64,
{
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    let lo_value = value_at(lo);
    if frac == 0.0 || hi == lo {
        return lo_value;
    }
    lo_value + frac * (value_at(hi) - lo_value)
}

/// Index of the first maximum, like `argmax`.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Longest contiguous run where `value >= threshold`.
///
/// Returns `(start, end)` with `end` exclusive. A later run replaces the best
/// only when strictly longer, so ties keep the first run seen.
pub fn longest_run(activity: &[f64], threshold: f64) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut current: Option<usize> = None;

    let close = |start: usize, end: usize, best: &mut Option<(usize, usize)>| {
        let longer = match *best {
            Some((s, e)) => end - start > e - s,
            None => true,
        };
        if longer {
            *best = Some((start, end));
        }
    };

    for (idx, &value) in activity.iter().enumerate() {
        if value >= threshold {
            if current.is_none() {
                current = Some(idx);
            }
        } else if let Some(start) = current.take() {
            close(start, idx, &mut best);
        }
    }
    if let Some(start) = current {
        close(start, activity.len(), &mut best);
    }

    best
}

/// Pixel box of ink. `right`/`bottom` hold the last inked column/row for a
/// tight box, or the padded exclusive-style bound after padding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InkBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Boolean mask of pixels strictly darker than a percentile threshold.
#[derive(Clone, Debug)]
pub struct InkMask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl InkMask {
    /// Builds the mask with the threshold at `percentile` of `gray`.
    pub fn from_gray(gray: &GrayImage, percentile: f64) -> Self {
        let threshold = gray_percentile(gray, percentile);
        let data = gray.as_raw().iter().map(|&v| (v as f64) < threshold).collect();
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    /// Fraction of inked pixels over the whole mask.
    pub fn ink_ratio(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().filter(|&&b| b).count() as f64 / self.data.len() as f64
    }

    /// Mean of the mask along each row.
    pub fn row_density(&self) -> Vec<f64> {
        if self.width == 0 {
            return vec![0.0; self.height];
        }
        self.data
            .chunks(self.width)
            .map(|row| row.iter().filter(|&&b| b).count() as f64 / self.width as f64)
            .collect()
    }

    /// Mean of the mask along each column.
    pub fn column_density(&self) -> Vec<f64> {
        let mut counts = vec![0usize; self.width];
        if self.width == 0 {
            return Vec::new();
        }
        for row in self.data.chunks(self.width) {
            for (x, &b) in row.iter().enumerate() {
                if b {
                    counts[x] += 1;
                }
            }
        }
        let h = self.height.max(1) as f64;
        counts.into_iter().map(|c| c as f64 / h).collect()
    }

    /// Tight box around all inked pixels, `None` when there are none.
    pub fn bounding_box(&self) -> Option<InkBox> {
        let mut found: Option<InkBox> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.get(x, y) {
                    continue;
                }
                let (x, y) = (x as u32, y as u32);
                found = Some(match found {
                    None => InkBox {
                        left: x,
                        top: y,
                        right: x,
                        bottom: y,
                    },
                    Some(b) => InkBox {
                        left: b.left.min(x),
                        top: b.top.min(y),
                        right: b.right.max(x),
                        bottom: b.bottom.max(y),
                    },
                });
            }
        }
        found
    }

    /// Ink box expanded by `padding` and clamped to the mask extent.
    ///
    /// `None` means "no significant ink": the ink ratio is below
    /// `min_ink_ratio` or nothing is inked.
    pub fn ink_bounding_box(&self, min_ink_ratio: f64, padding: u32) -> Option<InkBox> {
        if self.ink_ratio() < min_ink_ratio {
            return None;
        }
        let tight = self.bounding_box()?;
        Some(InkBox {
            left: tight.left.saturating_sub(padding),
            top: tight.top.saturating_sub(padding),
            right: (tight.right + padding).min(self.width as u32),
            bottom: (tight.bottom + padding).min(self.height as u32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&[4.0, 1.0, 3.0, 2.0], 75.0) - 3.25).abs() < 1e-12);
    }

    #[test]
    fn test_gray_percentile_matches_slice_percentile() {
        let gray: GrayImage =
            ImageBuffer::from_fn(7, 5, |x, y| Luma([((x * 37 + y * 11) % 256) as u8]));
        let values: Vec<f64> = gray.as_raw().iter().map(|&v| v as f64).collect();
        for p in [0.0, 30.0, 35.0, 60.0, 75.0, 100.0] {
            assert!((gray_percentile(&gray, p) - percentile(&values, p)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_longest_run_prefers_longer_later_run() {
        let activity = [0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        assert_eq!(longest_run(&activity, 1.0), Some((4, 7)));
    }

    #[test]
    fn test_longest_run_ties_keep_first() {
        let activity = [1.0, 1.0, 0.0, 1.0, 1.0];
        assert_eq!(longest_run(&activity, 0.5), Some((0, 2)));
    }

    #[test]
    fn test_longest_run_trailing_and_none() {
        assert_eq!(longest_run(&[0.0, 0.2, 0.3], 0.2), Some((1, 3)));
        assert_eq!(longest_run(&[0.0, 0.1], 0.5), None);
        assert_eq!(longest_run(&[], 0.5), None);
    }

    #[test]
    fn test_white_image_has_no_significant_ink() {
        let white = GrayImage::from_pixel(40, 20, Luma([255]));
        let mask = InkMask::from_gray(&white, 30.0);
        assert_eq!(mask.ink_ratio(), 0.0);
        assert_eq!(mask.ink_bounding_box(0.0001, 0), None);
        assert_eq!(mask.ink_bounding_box(0.5, 4), None);
    }

    #[test]
    fn test_ink_bounding_box_pads_and_clamps() {
        let mut gray = GrayImage::from_pixel(50, 30, Luma([255]));
        for y in 10..15 {
            for x in 2..20 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        let mask = InkMask::from_gray(&gray, 30.0);
        assert_eq!(
            mask.bounding_box(),
            Some(InkBox {
                left: 2,
                top: 10,
                right: 19,
                bottom: 14,
            })
        );
        assert_eq!(
            mask.ink_bounding_box(0.01, 5),
            Some(InkBox {
                left: 0,
                top: 5,
                right: 24,
                bottom: 19,
            })
        );
        assert_eq!(mask.ink_bounding_box(0.5, 5), None);
    }

    #[test]
    fn test_row_and_column_density() {
        let mut gray = GrayImage::from_pixel(4, 2, Luma([255]));
        gray.put_pixel(0, 0, Luma([0]));
        gray.put_pixel(1, 0, Luma([0]));
        // 2 of 8 pixels dark: 30th percentile is 255, so only dark pixels count
        let mask = InkMask::from_gray(&gray, 30.0);
        assert_eq!(mask.row_density(), vec![0.5, 0.0]);
        assert_eq!(mask.column_density(), vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_argmax_and_variance() {
        assert_eq!(argmax(&[0.1, 0.5, 0.5, 0.2]), Some(1));
        assert_eq!(argmax(&[]), None);
        assert!((variance(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
    }
}
