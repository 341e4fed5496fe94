//! Recognition configuration
//!
//! [`RecognitionConfig`] is an immutable value object handed to every stage.
//! Sections deserialize with `#[serde(default)]`, so a partial document only
//! overrides what it names. Ratios go through [`Ratio`] and are range-checked
//! while deserializing; cross-field rules are checked by
//! [`RecognitionConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::{ColorClass, Ratio, RecognitionError, Result};

// ============================================================
// EDGE DETECTION
// ============================================================

/// Canny hysteresis thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 150.0,
        }
    }
}

// ============================================================
// PREPROCESSING
// ============================================================

/// Morphological operation applied before edge detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MorphOperation {
    /// Dilate then erode: merges fragmented strokes
    #[default]
    Close,
    /// Erode then dilate: removes specks
    Open,
    Dilate,
    Erode,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Gaussian kernel size, odd; 1 disables blurring
    pub blur_kernel_size: u32,
    /// Linear contrast gain around mid-gray; 1.0 leaves the image unchanged
    pub contrast_factor: f32,
    pub morph_kernel_size: u32,
    pub morph_operation: MorphOperation,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            contrast_factor: 1.2,
            morph_kernel_size: 3,
            morph_operation: MorphOperation::Close,
        }
    }
}

// ============================================================
// CONTOUR / REGION FILTERS
// ============================================================

/// Contour filters used by boundary extraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourFilter {
    pub min_area: f64,
    pub max_area: f64,
    /// Bounding-box width / height
    pub max_aspect_ratio: f64,
    /// perimeter^2 / area; a circle scores 4*pi
    pub min_compactness: f64,
    pub max_contours: usize,
    /// Contours closer than this to the crop border are dropped
    pub edge_margin: u32,
}

impl Default for ContourFilter {
    fn default() -> Self {
        Self {
            min_area: 20.0,
            max_area: 1_000_000.0,
            max_aspect_ratio: 5.0,
            min_compactness: 14.0,
            max_contours: 10,
            edge_margin: 0,
        }
    }
}

/// Candidate-box filters used by the region locator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionFilter {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub max_aspect_ratio: f64,
    /// Boxes closer than this to the image border are dropped
    pub edge_margin: u32,
    /// Intersection over the smaller area above which a box is a duplicate
    pub overlap_threshold: Ratio,
    pub max_regions: usize,
}

impl Default for RegionFilter {
    fn default() -> Self {
        Self {
            min_width: 3,
            max_width: 200,
            min_height: 10,
            max_height: 2000,
            max_aspect_ratio: 3.0,
            edge_margin: 2,
            overlap_threshold: Ratio::new_const(0.5),
            max_regions: 200,
        }
    }
}

// ============================================================
// COLOR
// ============================================================

/// Which hue band means "up".
///
/// Chart conventions disagree: red is bullish on most mainland-China
/// terminals and bearish on most Western ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorPolarity {
    #[default]
    RedBullish,
    GreenBullish,
}

impl ColorPolarity {
    pub fn red_class(self) -> ColorClass {
        match self {
            ColorPolarity::RedBullish => ColorClass::Bullish,
            ColorPolarity::GreenBullish => ColorClass::Bearish,
        }
    }

    pub fn green_class(self) -> ColorClass {
        match self {
            ColorPolarity::RedBullish => ColorClass::Bearish,
            ColorPolarity::GreenBullish => ColorClass::Bullish,
        }
    }
}

/// Inclusive hue band on the 0..180 scale. `min > max` wraps through 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HueRange {
    pub min: f64,
    pub max: f64,
}

impl HueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn wraps(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, hue: f64) -> bool {
        if self.wraps() {
            hue >= self.min || hue <= self.max
        } else {
            hue >= self.min && hue <= self.max
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub hue_tolerance: f64,
    pub saturation_tolerance: f64,
    pub value_tolerance: f64,
    /// Saturation below this is gray (neutral)
    pub gray_threshold: f64,
    /// Value below this is too dark to classify
    pub darkness_threshold: f64,
    pub red_hue: HueRange,
    pub green_hue: HueRange,
    pub polarity: ColorPolarity,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            hue_tolerance: 10.0,
            saturation_tolerance: 60.0,
            value_tolerance: 60.0,
            gray_threshold: 40.0,
            darkness_threshold: 40.0,
            red_hue: HueRange::new(170.0, 10.0),
            green_hue: HueRange::new(35.0, 85.0),
            polarity: ColorPolarity::RedBullish,
        }
    }
}

// ============================================================
// BOUNDARY / STRUCTURE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Body band around the full boundary's center, and fallback body height
    pub body_height_ratio: Ratio,
    pub min_body_width: u32,
    /// Extra pixels cropped around the region on each side
    pub crop_padding: u32,
    /// Gray-level distance from the background that counts as candle
    pub foreground_threshold: u8,
    /// A row belongs to the body when its extent reaches this share of the widest row
    pub body_row_fraction: Ratio,
    pub profile_refinement: bool,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            body_height_ratio: Ratio::new_const(0.6),
            min_body_width: 3,
            crop_padding: 3,
            foreground_threshold: 30,
            body_row_fraction: Ratio::new_const(0.6),
            profile_refinement: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub doji_body_ratio: Ratio,
    pub hammer_shadow_ratio: Ratio,
    pub hammer_body_ratio: Ratio,
    pub min_body_ratio: Ratio,
    pub max_body_ratio: Ratio,
    /// Upper plus lower shadow ratio ceiling
    pub max_shadow_ratio: Ratio,
    /// Allowed |body + shadows - total| in pixels
    pub height_tolerance: u32,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            doji_body_ratio: Ratio::new_const(0.1),
            hammer_shadow_ratio: Ratio::new_const(0.6),
            hammer_body_ratio: Ratio::new_const(0.3),
            min_body_ratio: Ratio::new_const(0.01),
            max_body_ratio: Ratio::new_const(1.0),
            max_shadow_ratio: Ratio::new_const(0.95),
            height_tolerance: 5,
        }
    }
}

// ============================================================
// FUSION / EXECUTION
// ============================================================

/// Weights of the color and shape confidences in the overall score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub color: f64,
    pub shape: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            color: 0.4,
            shape: 0.6,
        }
    }
}

impl FusionWeights {
    /// Weighted average, normalized by the weight sum
    pub fn fuse(&self, color: f64, shape: f64) -> f64 {
        let total = self.color + self.shape;
        if total <= 0.0 {
            return 0.0;
        }
        ((self.color * color + self.shape * shape) / total).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    /// Batches larger than this run on the worker pool
    pub threshold: usize,
    pub max_degree_of_parallelism: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 8,
            max_degree_of_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Auto-detect post-processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub drop_below_threshold: bool,
    pub sort_by_x: bool,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            drop_below_threshold: true,
            sort_by_x: true,
        }
    }
}

// ============================================================
// RECOGNITION CONFIG
// ============================================================

/// All recognition options. Never mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub edges: EdgeConfig,
    pub preprocess: PreprocessConfig,
    pub contours: ContourFilter,
    pub regions: RegionFilter,
    pub color: ColorConfig,
    pub boundary: BoundaryConfig,
    pub structure: StructureConfig,
    pub fusion: FusionWeights,
    pub parallel: ParallelConfig,
    pub post_process: PostProcessConfig,
    pub min_confidence: Ratio,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            edges: EdgeConfig::default(),
            preprocess: PreprocessConfig::default(),
            contours: ContourFilter::default(),
            regions: RegionFilter::default(),
            color: ColorConfig::default(),
            boundary: BoundaryConfig::default(),
            structure: StructureConfig::default(),
            fusion: FusionWeights::default(),
            parallel: ParallelConfig::default(),
            post_process: PostProcessConfig::default(),
            min_confidence: Ratio::new_const(0.6),
        }
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(RecognitionError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_order(what: &str, low: f64, high: f64) -> Result<()> {
    if low > high {
        return Err(RecognitionError::InvalidConfig(format!(
            "{what}: minimum {low} exceeds maximum {high}"
        )));
    }
    Ok(())
}

impl RecognitionConfig {
    pub fn with_polarity(mut self, polarity: ColorPolarity) -> Self {
        self.color.polarity = polarity;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: Ratio) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel.enabled = false;
        self
    }

    /// Check cross-field rules
    pub fn validate(&self) -> Result<()> {
        let e = &self.edges;
        check_range("edges.low_threshold", e.low_threshold as f64, 0.0, f64::MAX)?;
        check_order(
            "edges thresholds",
            e.low_threshold as f64,
            e.high_threshold as f64,
        )?;

        let p = &self.preprocess;
        if p.blur_kernel_size == 0 || p.blur_kernel_size % 2 == 0 {
            return Err(RecognitionError::InvalidConfig(format!(
                "blur_kernel_size must be odd and positive, got {}",
                p.blur_kernel_size
            )));
        }
        check_range("preprocess.morph_kernel_size", p.morph_kernel_size as f64, 1.0, 31.0)?;
        if p.contrast_factor.is_nan() || p.contrast_factor <= 0.0 {
            return Err(RecognitionError::InvalidValue("contrast_factor must be > 0"));
        }

        let c = &self.contours;
        check_range("contours.min_area", c.min_area, 0.0, f64::MAX)?;
        check_order("contour area", c.min_area, c.max_area)?;
        if c.max_aspect_ratio.is_nan() || c.max_aspect_ratio <= 0.0 {
            return Err(RecognitionError::InvalidValue("contour max_aspect_ratio must be > 0"));
        }
        if c.max_contours == 0 {
            return Err(RecognitionError::InvalidValue("max_contours must be > 0"));
        }

        let r = &self.regions;
        check_order("region width", r.min_width as f64, r.max_width as f64)?;
        check_order("region height", r.min_height as f64, r.max_height as f64)?;
        if r.max_aspect_ratio.is_nan() || r.max_aspect_ratio <= 0.0 {
            return Err(RecognitionError::InvalidValue("region max_aspect_ratio must be > 0"));
        }
        if r.max_regions == 0 {
            return Err(RecognitionError::InvalidValue("max_regions must be > 0"));
        }

        let col = &self.color;
        check_range("color.hue_tolerance", col.hue_tolerance, 0.0, 90.0)?;
        check_range("color.saturation_tolerance", col.saturation_tolerance, 0.0, 255.0)?;
        check_range("color.value_tolerance", col.value_tolerance, 0.0, 255.0)?;
        check_range("color.gray_threshold", col.gray_threshold, 0.0, 255.0)?;
        check_range("color.darkness_threshold", col.darkness_threshold, 0.0, 255.0)?;
        for (field, range) in [
            ("color.red_hue", col.red_hue),
            ("color.green_hue", col.green_hue),
        ] {
            check_range(field, range.min, 0.0, 180.0)?;
            check_range(field, range.max, 0.0, 180.0)?;
        }
        if col.green_hue.wraps() {
            return Err(RecognitionError::InvalidConfig(
                "green hue range cannot wrap through 0".to_string(),
            ));
        }

        let s = &self.structure;
        check_order(
            "body ratio",
            s.min_body_ratio.get(),
            s.max_body_ratio.get(),
        )?;

        let f = &self.fusion;
        check_range("fusion.color", f.color, 0.0, f64::MAX)?;
        check_range("fusion.shape", f.shape, 0.0, f64::MAX)?;
        if f.color + f.shape <= 0.0 {
            return Err(RecognitionError::InvalidConfig(
                "fusion weights must not both be zero".to_string(),
            ));
        }

        if self.parallel.max_degree_of_parallelism == 0 {
            return Err(RecognitionError::InvalidValue(
                "max_degree_of_parallelism must be > 0",
            ));
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================
