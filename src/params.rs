//! Parameter metadata for recognition tuning
//!
//! Describes the numeric knobs of [`RecognitionConfig`], enabling:
//! - Grid search against labelled screenshots
//! - Parameter documentation
//! - Building a config from named overrides
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use kline_vision::prelude::*;
//!
//! for param in RecognitionConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("doji_body_ratio", 0.08);
//! let config = RecognitionConfig::with_params(&overrides).unwrap();
//! assert!((config.structure.doji_body_ratio.get() - 0.08).abs() < 1e-12);
//! ```

use std::collections::HashMap;

use crate::config::RecognitionConfig;
use crate::{Ratio, RecognitionError, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Value in 0.0..=1.0
  Ratio,
  /// Non-negative integer (kernel sizes, counts, pixel thresholds)
  Count,
  /// Unbounded real threshold
  Scalar,
}

/// Metadata for a single config parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "doji_body_ratio")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  pub const fn scalar(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Scalar, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
      let v = min + step * i as f64;
      if v > max + 1e-9 {
        break;
      }
      values.push(v.min(max));
      i += 1;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(RecognitionError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Count => {
        if value < 0.0 || value.fract() != 0.0 {
          return Err(RecognitionError::InvalidValue("Count must be a non-negative integer"));
        }
        Ok(())
      },
      ParamType::Scalar => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED TRAIT
// ============================================================

/// Types that can be built from named numeric parameters
pub trait Parameterized: Sized {
  /// Returns metadata for all tunable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Set one parameter by name
  fn set_param(&mut self, name: &str, value: f64) -> Result<()>;

  /// Creates a value from a HashMap of overrides.
  ///
  /// Missing parameters keep their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

// ============================================================
// RECOGNITION CONFIG PARAMETERS
// ============================================================

static RECOGNITION_PARAMS: &[ParamMeta] = &[
  ParamMeta::scalar("edge_low_threshold", 50.0, (10.0, 150.0, 10.0), "Canny low threshold"),
  ParamMeta::scalar("edge_high_threshold", 150.0, (50.0, 300.0, 25.0), "Canny high threshold"),
  ParamMeta::count("blur_kernel_size", 5.0, (1.0, 9.0, 2.0), "Gaussian kernel size (odd)"),
  ParamMeta::scalar("contrast_factor", 1.2, (0.5, 3.0, 0.1), "Contrast gain around mid-gray"),
  ParamMeta::count("morph_kernel_size", 3.0, (1.0, 9.0, 2.0), "Morphology kernel size"),
  ParamMeta::scalar("min_contour_area", 20.0, (0.0, 500.0, 10.0), "Smallest contour area kept"),
  ParamMeta::scalar(
    "max_contour_aspect_ratio",
    5.0,
    (1.0, 20.0, 0.5),
    "Widest contour width/height kept",
  ),
  ParamMeta::scalar(
    "min_compactness",
    14.0,
    (0.0, 30.0, 1.0),
    "Smallest perimeter^2/area kept (rejects round blobs)",
  ),
  ParamMeta::count("max_contours", 10.0, (1.0, 50.0, 1.0), "Contours kept per crop"),
  ParamMeta::scalar(
    "region_max_aspect_ratio",
    3.0,
    (0.5, 10.0, 0.5),
    "Widest located box width/height kept",
  ),
  ParamMeta::ratio(
    "overlap_threshold",
    0.5,
    (0.1, 0.9, 0.1),
    "Overlap over the smaller box that marks a duplicate",
  ),
  ParamMeta::scalar("hue_tolerance", 10.0, (1.0, 45.0, 1.0), "Hue window around the dominant peak"),
  ParamMeta::scalar("saturation_tolerance", 60.0, (5.0, 255.0, 5.0), "Saturation match tolerance"),
  ParamMeta::scalar("value_tolerance", 60.0, (5.0, 255.0, 5.0), "Value match tolerance"),
  ParamMeta::scalar("gray_threshold", 40.0, (0.0, 255.0, 5.0), "Saturation below which color is gray"),
  ParamMeta::scalar("darkness_threshold", 40.0, (0.0, 255.0, 5.0), "Value below which color is unknown"),
  ParamMeta::ratio("body_height_ratio", 0.6, (0.1, 1.0, 0.05), "Body band / fallback body height"),
  ParamMeta::count("foreground_threshold", 30.0, (1.0, 128.0, 1.0), "Gray distance from background"),
  ParamMeta::ratio("body_row_fraction", 0.6, (0.1, 1.0, 0.05), "Row extent share that marks body rows"),
  ParamMeta::ratio("doji_body_ratio", 0.1, (0.01, 0.3, 0.01), "Body ratio under which a candle is a doji"),
  ParamMeta::ratio("hammer_shadow_ratio", 0.6, (0.3, 0.9, 0.05), "Shadow ratio above which a hammer forms"),
  ParamMeta::ratio("hammer_body_ratio", 0.3, (0.05, 0.5, 0.05), "Body ratio under which a hammer forms"),
  ParamMeta::ratio("min_confidence", 0.6, (0.0, 1.0, 0.05), "Overall confidence required"),
  ParamMeta::scalar("color_weight", 0.4, (0.0, 1.0, 0.1), "Color weight in the overall confidence"),
];

impl Parameterized for RecognitionConfig {
  fn param_meta() -> &'static [ParamMeta] {
    RECOGNITION_PARAMS
  }

  fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
    let meta = RECOGNITION_PARAMS
      .iter()
      .find(|m| m.name == name)
      .ok_or_else(|| RecognitionError::InvalidConfig(format!("unknown parameter '{name}'")))?;
    meta.validate(value)?;

    match meta.name {
      "edge_low_threshold" => self.edges.low_threshold = value as f32,
      "edge_high_threshold" => self.edges.high_threshold = value as f32,
      "blur_kernel_size" => self.preprocess.blur_kernel_size = value as u32,
      "contrast_factor" => self.preprocess.contrast_factor = value as f32,
      "morph_kernel_size" => self.preprocess.morph_kernel_size = value as u32,
      "min_contour_area" => self.contours.min_area = value,
      "max_contour_aspect_ratio" => self.contours.max_aspect_ratio = value,
      "min_compactness" => self.contours.min_compactness = value,
      "max_contours" => self.contours.max_contours = value as usize,
      "region_max_aspect_ratio" => self.regions.max_aspect_ratio = value,
      "overlap_threshold" => self.regions.overlap_threshold = Ratio::new(value)?,
      "hue_tolerance" => self.color.hue_tolerance = value,
      "saturation_tolerance" => self.color.saturation_tolerance = value,
      "value_tolerance" => self.color.value_tolerance = value,
      "gray_threshold" => self.color.gray_threshold = value,
      "darkness_threshold" => self.color.darkness_threshold = value,
      "body_height_ratio" => self.boundary.body_height_ratio = Ratio::new(value)?,
      "foreground_threshold" => self.boundary.foreground_threshold = value as u8,
      "body_row_fraction" => self.boundary.body_row_fraction = Ratio::new(value)?,
      "doji_body_ratio" => self.structure.doji_body_ratio = Ratio::new(value)?,
      "hammer_shadow_ratio" => self.structure.hammer_shadow_ratio = Ratio::new(value)?,
      "hammer_body_ratio" => self.structure.hammer_body_ratio = Ratio::new(value)?,
      "min_confidence" => self.min_confidence = Ratio::new(value)?,
      "color_weight" => self.fusion.color = value,
      other => {
        return Err(RecognitionError::InvalidConfig(format!("parameter '{other}' has no setter")))
      },
    }
    Ok(())
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let mut config = RecognitionConfig::default();
    for (name, value) in params {
      config.set_param(name, *value)?;
    }
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("test_ratio", 0.5, (0.3, 0.7, 0.1), "Test ratio parameter");

    assert_eq!(meta.name, "test_ratio");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, 0.5);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < 1e-12);
    assert!((grid[1] - 0.5).abs() < 1e-12);
    assert!((grid[2] - 0.7).abs() < 1e-12);
  }

  #[test]
  fn test_validate_count() {
    let meta = ParamMeta::count("test", 5.0, (1.0, 9.0, 2.0), "Test");

    assert!(meta.validate(5.0).is_ok());
    assert!(meta.validate(5.5).is_err());
    assert!(meta.validate(0.0).is_err());
    assert!(meta.validate(11.0).is_err());
  }

  #[test]
  fn test_defaults_match_config() {
    let config = RecognitionConfig::default();
    let mut rebuilt = RecognitionConfig::default();
    for meta in RecognitionConfig::param_meta() {
      rebuilt.set_param(meta.name, meta.default).unwrap();
    }
    // Parallelism is machine-dependent and not a tunable parameter
    rebuilt.parallel = config.parallel;
    assert_eq!(rebuilt, config);
  }

  #[test]
  fn test_param_names_unique() {
    let params = RecognitionConfig::param_meta();
    for (i, a) in params.iter().enumerate() {
      assert!(params[i + 1..].iter().all(|b| b.name != a.name), "duplicate {}", a.name);
    }
  }

  #[test]
  fn test_with_params_overrides() {
    let mut params = HashMap::new();
    params.insert("hammer_shadow_ratio", 0.7);
    params.insert("max_contours", 4.0);

    let config = RecognitionConfig::with_params(&params).unwrap();
    assert!((config.structure.hammer_shadow_ratio.get() - 0.7).abs() < 1e-12);
    assert_eq!(config.contours.max_contours, 4);
  }

  #[test]
  fn test_with_params_unknown_name() {
    let mut params = HashMap::new();
    params.insert("no_such_param", 1.0);
    assert!(matches!(
      RecognitionConfig::with_params(&params),
      Err(RecognitionError::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_with_params_cross_field_check() {
    let mut params = HashMap::new();
    params.insert("edge_low_threshold", 150.0);
    params.insert("edge_high_threshold", 50.0);
    assert!(RecognitionConfig::with_params(&params).is_err());
  }
}
