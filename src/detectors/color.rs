//! Dominant-color classification
//!
//! The dominant color is the peak of a 180-bin hue histogram, refined by
//! averaging every pixel within `hue_tolerance` of that peak. Confidence is
//! the share of pixels matching the dominant sample on all three channels.
//!
//! A candle crop always carries chart background, so only chromatic pixels
//! (saturated and bright enough to classify) are sampled when the crop has
//! any. A crop with none is sampled whole, which is what makes gray candles
//! come out Neutral and unlit ones Unknown.
//!
//! This is a histogram-peak heuristic, not a clustering algorithm: with two
//! equally strong hues in one crop it keeps the first peak and reports a low
//! confidence instead of separating the modes.

use image::RgbImage;
use tracing::debug;

use super::helpers::{clip_region, crop, hsv_pixels, hue_distance, hue_offset, HUE_BINS};
use crate::config::{ColorConfig, RecognitionConfig};
use crate::{ColorClass, ColorClassification, Hsv, RecognitionError, Region, Result, Stage};

impl_with_defaults!(ColorClassifier);

/// Calibrated tolerance bounds: (min, max) per channel
const HUE_TOLERANCE_BOUNDS: (f64, f64) = (3.0, 30.0);
const SATURATION_TOLERANCE_BOUNDS: (f64, f64) = (15.0, 100.0);
const VALUE_TOLERANCE_BOUNDS: (f64, f64) = (15.0, 100.0);
/// Calibrated tolerance = CALIBRATION_SPREAD * standard deviation
const CALIBRATION_SPREAD: f64 = 2.0;

/// Classifies the dominant color of a region
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorClassifier {
    pub config: ColorConfig,
}

impl ColorClassifier {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            config: config.color,
        }
    }

    pub fn classify(&self, image: &RgbImage, region: Region) -> Result<ColorClassification> {
        let pixels = self.region_pixels(image, region)?;
        let result = self.classify_pixels(&pixels)?;
        debug!(
            %region,
            class = ?result.class,
            hue = result.dominant.h,
            saturation = result.dominant.s,
            value = result.dominant.v,
            confidence = result.confidence,
            "classified color"
        );
        Ok(result)
    }

    pub fn classify_pixels(&self, pixels: &[Hsv]) -> Result<ColorClassification> {
        let sample = self.color_sample(pixels);
        let dominant = dominant_color(&sample, self.config.hue_tolerance)
            .ok_or_else(|| RecognitionError::stage(Stage::Color, "no pixels to classify"))?;
        Ok(ColorClassification {
            class: self.class_of(&dominant),
            dominant,
            confidence: self.match_fraction(&sample, &dominant),
        })
    }

    /// Chromatic pixels when there are any, otherwise all of them
    pub fn color_sample(&self, pixels: &[Hsv]) -> Vec<Hsv> {
        let c = &self.config;
        let chromatic: Vec<Hsv> = pixels
            .iter()
            .copied()
            .filter(|p| p.s >= c.gray_threshold && p.v >= c.darkness_threshold)
            .collect();
        if chromatic.is_empty() {
            pixels.to_vec()
        } else {
            chromatic
        }
    }

    /// Classification rule, evaluated in order
    pub fn class_of(&self, hsv: &Hsv) -> ColorClass {
        let c = &self.config;
        if hsv.s < c.gray_threshold {
            ColorClass::Neutral
        } else if hsv.v < c.darkness_threshold {
            ColorClass::Unknown
        } else if c.red_hue.contains(hsv.h) {
            c.polarity.red_class()
        } else if c.green_hue.contains(hsv.h) {
            c.polarity.green_class()
        } else {
            ColorClass::Unknown
        }
    }

    /// Share of pixels within all three tolerances of `dominant`
    pub fn match_fraction(&self, pixels: &[Hsv], dominant: &Hsv) -> f64 {
        if pixels.is_empty() {
            return 0.0;
        }
        let c = &self.config;
        let matching = pixels
            .iter()
            .filter(|p| {
                hue_distance(p.h, dominant.h) <= c.hue_tolerance
                    && (p.s - dominant.s).abs() <= c.saturation_tolerance
                    && (p.v - dominant.v).abs() <= c.value_tolerance
            })
            .count();
        matching as f64 / pixels.len() as f64
    }

    /// Derive tolerances from the region's own spread.
    ///
    /// Returns a new color config; `self` is left untouched.
    pub fn calibrate(&self, image: &RgbImage, region: Region) -> Result<ColorConfig> {
        let pixels = self.color_sample(&self.region_pixels(image, region)?);
        let dominant = dominant_color(&pixels, self.config.hue_tolerance)
            .ok_or_else(|| RecognitionError::stage(Stage::Color, "no pixels to calibrate"))?;

        let n = pixels.len() as f64;
        let hue_var = pixels
            .iter()
            .map(|p| hue_offset(p.h, dominant.h).powi(2))
            .sum::<f64>()
            / n;
        let (sat_mean, val_mean) = (
            pixels.iter().map(|p| p.s).sum::<f64>() / n,
            pixels.iter().map(|p| p.v).sum::<f64>() / n,
        );
        let sat_var = pixels.iter().map(|p| (p.s - sat_mean).powi(2)).sum::<f64>() / n;
        let val_var = pixels.iter().map(|p| (p.v - val_mean).powi(2)).sum::<f64>() / n;

        let spread = |var: f64, (lo, hi): (f64, f64)| (CALIBRATION_SPREAD * var.sqrt()).clamp(lo, hi);
        let calibrated = ColorConfig {
            hue_tolerance: spread(hue_var, HUE_TOLERANCE_BOUNDS),
            saturation_tolerance: spread(sat_var, SATURATION_TOLERANCE_BOUNDS),
            value_tolerance: spread(val_var, VALUE_TOLERANCE_BOUNDS),
            ..self.config
        };
        debug!(
            %region,
            hue_tolerance = calibrated.hue_tolerance,
            saturation_tolerance = calibrated.saturation_tolerance,
            value_tolerance = calibrated.value_tolerance,
            "calibrated color tolerances"
        );
        Ok(calibrated)
    }

    fn region_pixels(&self, image: &RgbImage, region: Region) -> Result<Vec<Hsv>> {
        let clipped = clip_region(image, region)?;
        let pixels = hsv_pixels(&crop(image, clipped));
        if pixels.is_empty() {
            return Err(RecognitionError::stage(Stage::Color, "empty crop"));
        }
        Ok(pixels)
    }
}

/// Hue histogram, one bin per hue unit
pub fn hue_histogram(pixels: &[Hsv]) -> [u32; HUE_BINS] {
    let mut bins = [0u32; HUE_BINS];
    for p in pixels {
        let bin = (p.h.max(0.0) as usize).min(HUE_BINS - 1);
        bins[bin] += 1;
    }
    bins
}

/// Histogram peak refined by the mean of pixels within `hue_tolerance` of it.
///
/// The first of several equal peaks wins. None for an empty slice.
pub fn dominant_color(pixels: &[Hsv], hue_tolerance: f64) -> Option<Hsv> {
    if pixels.is_empty() {
        return None;
    }
    let bins = hue_histogram(pixels);
    let mut peak = 0usize;
    for (i, &count) in bins.iter().enumerate() {
        if count > bins[peak] {
            peak = i;
        }
    }
    let peak_hue = peak as f64;

    let (mut count, mut offset, mut s, mut v) = (0usize, 0.0, 0.0, 0.0);
    for p in pixels {
        if hue_distance(p.h, peak_hue) <= hue_tolerance {
            count += 1;
            offset += hue_offset(p.h, peak_hue);
            s += p.s;
            v += p.v;
        }
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some(Hsv {
        h: (peak_hue + offset / n).rem_euclid(HUE_BINS as f64),
        s: s / n,
        v: v / n,
    })
}

// ============================================================
// TESTS
// ============================================================
