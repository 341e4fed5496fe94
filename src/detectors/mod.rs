//! Recognition stages
//!
//! Each stage is a small value type built from a [`RecognitionConfig`](crate::config::RecognitionConfig)
//! section and is a pure function of its inputs.
//!
//! # Stages
//!
//! - **Locator**: candle bounding boxes in a full chart image
//! - **Color**: dominant-hue classification of a region
//! - **Boundary**: body / upper shadow / lower shadow rectangles
//! - **Structure**: height metrics and pattern classification

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple stage types.
macro_rules! impl_with_defaults {
  ($($stage:ty),* $(,)?) => {
    $(impl $stage {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod boundary;
pub mod color;
pub mod locator;
pub mod structure;

// Re-export all stages for convenience
pub use boundary::*;
pub use color::*;
pub use helpers::*;
pub use locator::*;
pub use structure::*;
