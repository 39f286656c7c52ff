//! Face sharpness analysis.
//!
//! Sharpness is approximated by the variance of a 3x3 Laplacian over the
//! grayscale face region: crisp, well-focused features produce strong edge
//! responses and a high variance, while blur or motion smearing flattens the
//! response. Raw variance is bucketed into three coarse bands, `Low` (≤300),
//! `Medium` (300‒1000) and `High` (>1000); the thresholds follow what worked
//! against real portrait sets, with `High` marking faces that can ship as-is
//! and `Low` marking frames that should be skipped or re-shot. Both the raw
//! score and the bucket are kept on each face record so callers can filter or
//! rank without recomputing.

use image::{DynamicImage, GenericImageView};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Quality buckets derived from Laplacian variance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Bucket a raw Laplacian variance score.
    pub fn from_variance(v: f64) -> Self {
        if v > 1000.0 {
            Quality::High
        } else if v > 300.0 {
            Quality::Medium
        } else {
            Quality::Low
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" | "med" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(format!(
                "unknown quality '{}', expected low/medium/high",
                other
            )),
        }
    }
}

/// Compute the Laplacian variance for an image region. Higher values mean
/// the region is sharper (less blurry).
pub fn laplacian_variance(img: &DynamicImage) -> f64 {
    // Large regions are downscaled first; variance is stable under modest
    // resampling and the convolution cost is quadratic in the dimensions.
    let (w, h) = img.dimensions();
    let max_dim = 512;
    let img_to_process = if w > max_dim || h > max_dim {
        std::borrow::Cow::Owned(img.resize(max_dim, max_dim, image::imageops::FilterType::Triangle))
    } else {
        std::borrow::Cow::Borrowed(img)
    };

    let gray = img_to_process.to_luma8();
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut arr = Array2::<f64>::zeros((h as usize, w as usize));
    for (y, mut row) in arr.rows_mut().into_iter().enumerate() {
        for (x, val) in row.iter_mut().enumerate() {
            *val = gray.get_pixel(x as u32, y as u32)[0] as f64;
        }
    }

    // 3x3 Laplacian responses over the interior, accumulated directly into
    // running sums so no intermediate response image is kept.
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let count = (h as usize) * (w as usize);
    for y in 1..h as usize - 1 {
        for x in 1..w as usize - 1 {
            let lap = arr[[y - 1, x]] + arr[[y + 1, x]] + arr[[y, x - 1]] + arr[[y, x + 1]]
                - 4.0 * arr[[y, x]];
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    // Border cells contribute zero responses, matching a zero-padded kernel.
    let mean = sum / count as f64;
    sum_sq / count as f64 - mean * mean
}

/// Estimate the quality bucket for an image region using Laplacian variance.
pub fn estimate_sharpness(img: &DynamicImage) -> (f64, Quality) {
    let v = laplacian_variance(img);
    (v, Quality::from_variance(v))
}
