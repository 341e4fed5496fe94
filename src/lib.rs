//! # kline-vision - candlestick recognition from chart screenshots
//!
//! Recognizes a single K-line (candlestick) inside a region of an RGB image and
//! describes it: color class, body/shadow boundaries, height metrics and a
//! pattern classification, each with a confidence score.
//!
//! ## Quick Start
//!
//! ```rust
//! use kline_vision::prelude::*;
//!
//! // A white 60x240 canvas with a red candle body and a thin wick.
//! let mut image = RgbImage::from_pixel(60, 240, Rgb([255, 255, 255]));
//! for y in 10..230 {
//!     for x in 29..31 {
//!         image.put_pixel(x, y, Rgb([220, 20, 20]));
//!     }
//! }
//! for y in 70..150 {
//!     for x in 10..50 {
//!         image.put_pixel(x, y, Rgb([220, 20, 20]));
//!     }
//! }
//!
//! let recognizer = Recognizer::new();
//! let config = RecognitionConfig::default();
//! let result = recognizer.recognize(&image, Region::new(0, 0, 60, 240), &config);
//! if let Some(info) = &result.info {
//!     println!("{:?} {:?} {:.2}", info.color.class, info.structure.pattern, info.confidence);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod params;
pub mod validation;

pub use image::{Rgb, RgbImage};

pub mod prelude {
    pub use crate::{
        // Cache
        cache::{CacheStats, Fingerprint, RecognitionCache},
        // Configuration
        config::{
            BoundaryConfig, ColorConfig, ColorPolarity, ContourFilter, EdgeConfig, FusionWeights,
            HueRange, MorphOperation, ParallelConfig, PostProcessConfig, PreprocessConfig,
            RecognitionConfig, RegionFilter, StructureConfig,
        },
        // Stages
        detectors::*,
        // Engine
        engine::{
            BatchControl, BatchProgress, CancelFlag, CandleCorrector, Recognizer, RecognizerBuilder,
        },
        // Parameters
        params::{ParamMeta, ParamType, Parameterized},
        // Types
        Boundaries,
        ColorClass,
        ColorClassification,
        ErrorKind,
        Hsv,
        // Image source
        ImageSource,
        KLineInfo,
        NoImageSource,
        PatternType,
        Ratio,
        // Errors
        RecognitionError,
        RecognitionResult,
        Region,
        Result,
        Rgb,
        RgbImage,
        Stage,
        StructureMetrics,
    };
}

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, RecognitionError>;

/// Pipeline stage that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Locate,
    Color,
    Boundary,
    Structure,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Locate => "locate",
            Stage::Color => "color",
            Stage::Boundary => "boundary",
            Stage::Structure => "structure",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during recognition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecognitionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Recognition cancelled")]
    Cancelled,
}

/// Coarse classification of a [`RecognitionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Precondition failure: bad image, region or configuration
    InvalidInput,
    /// A stage could not produce its output
    StageFailure,
    /// Output was computed but breaks an invariant
    ValidationFailure,
    Cancelled,
}

impl RecognitionError {
    pub(crate) fn stage(stage: Stage, message: impl Into<String>) -> Self {
        RecognitionError::Stage {
            stage,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RecognitionError::InvalidInput(_)
            | RecognitionError::InvalidValue(_)
            | RecognitionError::OutOfRange { .. }
            | RecognitionError::InvalidConfig(_) => ErrorKind::InvalidInput,
            RecognitionError::Stage { .. } => ErrorKind::StageFailure,
            RecognitionError::Validation(_) => ErrorKind::ValidationFailure,
            RecognitionError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(RecognitionError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(RecognitionError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// GEOMETRY
// ============================================================

/// Axis-aligned rectangle in image space (top-left origin).
///
/// `right()` and `bottom()` are exclusive. Edge arithmetic saturates at the
/// `i32` limits instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from edges; `right`/`bottom` are exclusive.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
    }

    #[inline]
    pub fn left(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn top(&self) -> i32 {
        self.y
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    #[inline]
    pub fn center_y(&self) -> f64 {
        self.y as f64 + self.height as f64 / 2.0
    }

    /// Width over height. Returns None for a zero-height rectangle.
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.height > 0).then(|| self.width as f64 / self.height as f64)
    }

    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        let r = Region::from_edges(left, top, right, bottom);
        (!r.is_empty()).then_some(r)
    }

    pub fn union(&self, other: &Region) -> Region {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Region::from_edges(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// True if `other` lies entirely inside `self`
    pub fn contains(&self, other: &Region) -> bool {
        other.left() >= self.left()
            && other.top() >= self.top()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Region {
        Region::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Grow on every side by `amount` pixels. Saturates at the `i32` limits.
    pub fn inflate(&self, amount: i32) -> Region {
        let grow = amount.saturating_mul(2);
        Region::new(
            self.x.saturating_sub(amount),
            self.y.saturating_sub(amount),
            self.width.saturating_add(grow),
            self.height.saturating_add(grow),
        )
    }

    /// Intersection area over the smaller of the two areas.
    pub fn overlap_ratio(&self, other: &Region) -> f64 {
        let min_area = self.area().min(other.area());
        if min_area == 0 {
            return 0.0;
        }
        let inter = self.intersect(other).map_or(0, |r| r.area());
        inter as f64 / min_area as f64
    }

    /// Clip to an image of the given size. None if nothing is left.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Region> {
        if self.is_empty() {
            return None;
        }
        let bounds = Region::new(
            0,
            0,
            i32::try_from(width).unwrap_or(i32::MAX),
            i32::try_from(height).unwrap_or(i32::MAX),
        );
        self.intersect(&bounds)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

// ============================================================
// COLOR
// ============================================================

/// Color class of a candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorClass {
    Bullish,
    Bearish,
    Neutral,
    Unknown,
}

impl ColorClass {
    #[inline]
    pub fn is_known(self) -> bool {
        !matches!(self, ColorClass::Unknown)
    }
}

/// HSV sample. Hue in [0, 180), saturation and value in [0, 255].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

/// Output of the color stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorClassification {
    pub class: ColorClass,
    pub dominant: Hsv,
    /// Fraction of sampled pixels close to the dominant sample, 0.0..=1.0
    pub confidence: f64,
}

// ============================================================
// BOUNDARIES
// ============================================================

/// Candle rectangles in original image coordinates.
///
/// When present, `body`, `upper_shadow` and `lower_shadow` lie inside `full`;
/// the upper shadow sits above the body and the lower shadow below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Boundaries {
    pub full: Option<Region>,
    pub body: Option<Region>,
    pub upper_shadow: Option<Region>,
    pub lower_shadow: Option<Region>,
}

impl Boundaries {
    pub fn translate(&self, dx: i32, dy: i32) -> Boundaries {
        let shift = |r: Option<Region>| r.map(|r| r.translate(dx, dy));
        Boundaries {
            full: shift(self.full),
            body: shift(self.body),
            upper_shadow: shift(self.upper_shadow),
            lower_shadow: shift(self.lower_shadow),
        }
    }

    /// True if the full boundary is missing or has no area
    pub fn is_empty(&self) -> bool {
        self.full.map_or(true, |r| r.is_empty())
    }
}

// ============================================================
// STRUCTURE
// ============================================================

/// Single-candle pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternType {
    Normal,
    Doji,
    Hammer,
    InvertedHammer,
    Unknown,
}

/// Height metrics in pixels plus the pattern they imply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureMetrics {
    pub body_height: u32,
    pub upper_shadow_height: u32,
    pub lower_shadow_height: u32,
    pub total_height: u32,
    pub pattern: PatternType,
}

impl StructureMetrics {
    #[inline]
    fn ratio_of(&self, part: u32) -> f64 {
        part as f64 / self.total_height.max(1) as f64
    }

    #[inline]
    pub fn body_ratio(&self) -> f64 {
        self.ratio_of(self.body_height)
    }

    #[inline]
    pub fn upper_shadow_ratio(&self) -> f64 {
        self.ratio_of(self.upper_shadow_height)
    }

    #[inline]
    pub fn lower_shadow_ratio(&self) -> f64 {
        self.ratio_of(self.lower_shadow_height)
    }

    /// |body + upper + lower - total|
    pub fn height_discrepancy(&self) -> u32 {
        let parts = self.body_height as i64
            + self.upper_shadow_height as i64
            + self.lower_shadow_height as i64;
        (parts - self.total_height as i64).unsigned_abs() as u32
    }
}

// ============================================================
// FUSED RESULT
// ============================================================

/// A recognized candle. Built once per successful recognition, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KLineInfo {
    pub boundaries: Boundaries,
    pub color: ColorClassification,
    pub structure: StructureMetrics,
    /// Overall confidence 0.0..=1.0
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl KLineInfo {
    pub fn new(
        boundaries: Boundaries,
        color: ColorClassification,
        structure: StructureMetrics,
        confidence: f64,
    ) -> Self {
        Self {
            boundaries,
            color,
            structure,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Utc::now(),
        }
    }

    /// Pixel row of the candle's top (the high)
    pub fn high_y(&self) -> Option<i32> {
        self.boundaries.full.map(|r| r.top())
    }

    /// Pixel row just below the candle's bottom (the low)
    pub fn low_y(&self) -> Option<i32> {
        self.boundaries.full.map(|r| r.bottom())
    }

    #[inline]
    pub fn body_ratio(&self) -> f64 {
        self.structure.body_ratio()
    }

    /// Equality ignoring `created_at`
    pub fn same_recognition(&self, other: &KLineInfo) -> bool {
        self.boundaries == other.boundaries
            && self.color == other.color
            && self.structure == other.structure
            && self.confidence.to_bits() == other.confidence.to_bits()
    }
}

/// Outcome of recognizing one region
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    /// Region as supplied by the caller
    pub region: Region,
    /// Present on success, and on validation failures for diagnostics
    pub info: Option<KLineInfo>,
    pub error: Option<RecognitionError>,
    pub elapsed_ms: f64,
}

impl RecognitionResult {
    pub fn succeeded(region: Region, info: KLineInfo, elapsed_ms: f64) -> Self {
        Self {
            region,
            info: Some(info),
            error: None,
            elapsed_ms,
        }
    }

    pub fn failed(region: Region, error: RecognitionError, elapsed_ms: f64) -> Self {
        Self {
            region,
            info: None,
            error: Some(error),
            elapsed_ms,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.info.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(RecognitionError::kind)
    }

    /// Left edge used for chart ordering: the candle's if known, else the region's
    pub fn x(&self) -> i32 {
        self.info
            .as_ref()
            .and_then(|i| i.boundaries.full)
            .map_or(self.region.x, |r| r.x)
    }
}

// ============================================================
// IMAGE SOURCE
// ============================================================

/// Supplies frames to the recognizer; screen capture lives behind this.
pub trait ImageSource: Send + Sync {
    fn capture(&self) -> Result<RgbImage>;
}

/// Default source: no capture capability
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImageSource;

impl ImageSource for NoImageSource {
    fn capture(&self) -> Result<RgbImage> {
        Err(RecognitionError::InvalidInput(
            "no image source configured".to_string(),
        ))
    }
}

/// A static frame
impl ImageSource for RgbImage {
    fn capture(&self) -> Result<RgbImage> {
        Ok(self.clone())
    }
}

impl<S: ImageSource + ?Sized> ImageSource for Arc<S> {
    fn capture(&self) -> Result<RgbImage> {
        (**self).capture()
    }
}

impl<S: ImageSource + ?Sized> ImageSource for Box<S> {
    fn capture(&self) -> Result<RgbImage> {
        (**self).capture()
    }
}

// ============================================================
// TESTS
// ============================================================
