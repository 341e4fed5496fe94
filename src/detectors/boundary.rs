//! Body and shadow segmentation
//!
//! Contours come first: the region (plus a little padding) is blurred and
//! contrast-stretched, pixels that differ from the crop's background are
//! masked, the mask is closed, and Canny edges of the mask are traced into
//! outer contours. The filtered contours, clipped to the requested region,
//! give the full boundary and a first body guess.
//!
//! A row profile then refines that guess inside the contour window. Each
//! row's foreground extent is measured on the unblurred crop, and the body is
//! the run of rows at least `body_row_fraction` as wide as the widest row. Thin wicks rarely survive the contour stage as separate shapes, so
//! this is what actually separates body from shadows on most charts.

use image::{GrayImage, RgbImage};
use tracing::debug;

use super::helpers::{
    border_median, clip_region, close_edge_gaps, crop, external_contours, is_foreground,
    preprocess, to_gray, touches_margin, ContourShape,
};
use crate::config::{BoundaryConfig, ContourFilter, EdgeConfig, PreprocessConfig, RecognitionConfig};
use crate::{Boundaries, RecognitionError, Region, Result, Stage};

impl_with_defaults!(BoundaryExtractor);

/// Where the body rectangle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodySource {
    /// Row-profile refinement
    Profile,
    /// Union of contours in the central band
    Contours,
    /// Centered band of `body_height_ratio`
    Fallback,
}

impl BodySource {
    /// Boundary confidence contributed by each source
    pub fn confidence(self) -> f64 {
        match self {
            BodySource::Profile => 1.0,
            BodySource::Contours => 0.85,
            BodySource::Fallback => 0.5,
        }
    }
}

/// Boundaries plus what it took to find them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryExtraction {
    pub boundaries: Boundaries,
    pub body_source: BodySource,
    /// Contours kept after filtering
    pub contour_count: usize,
    pub confidence: f64,
}

/// Splits a candle region into full, body and shadow rectangles
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundaryExtractor {
    pub preprocess: PreprocessConfig,
    pub edges: EdgeConfig,
    pub contours: ContourFilter,
    pub boundary: BoundaryConfig,
}

impl BoundaryExtractor {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            preprocess: config.preprocess,
            edges: config.edges,
            contours: config.contours,
            boundary: config.boundary,
        }
    }

    /// Boundaries in image coordinates
    pub fn extract(&self, image: &RgbImage, region: Region) -> Result<Boundaries> {
        self.extract_detailed(image, region).map(|e| e.boundaries)
    }

    pub fn extract_detailed(&self, image: &RgbImage, region: Region) -> Result<BoundaryExtraction> {
        let clipped = clip_region(image, region)?;
        let padded = clipped
            .inflate(self.boundary.crop_padding as i32)
            .clip_to(image.width(), image.height())
            .unwrap_or(clipped);
        let gray = to_gray(&crop(image, padded));

        let shapes = self.filtered_contours(&gray);
        if shapes.is_empty() {
            return Err(RecognitionError::stage(
                Stage::Boundary,
                format!("no candle outline found in {region}"),
            ));
        }

        // Contours outside the requested region belong to neighbours
        let local = clipped.translate(-padded.x, -padded.y);
        let contour_full = shapes
            .iter()
            .map(|s| s.bounds)
            .reduce(|a, b| a.union(&b))
            .and_then(|bounds| bounds.intersect(&local))
            .ok_or_else(|| {
                RecognitionError::stage(
                    Stage::Boundary,
                    format!("no candle outline inside {region}"),
                )
            })?;

        let profile = if self.boundary.profile_refinement {
            contour_full
                .inflate(PROFILE_WINDOW_SLACK)
                .intersect(&local)
                .and_then(|window| {
                    RowProfile::measure(&gray, window, self.boundary.foreground_threshold)
                })
        } else {
            None
        };

        let (full, body, body_source) = match profile {
            Some(profile) => {
                let full = profile.bounds;
                match profile.body(self.min_body_row_width(profile.widest)) {
                    Some(body) => (full, body, BodySource::Profile),
                    None => (full, self.fallback_body(full), BodySource::Fallback),
                }
            }
            None => match self.contour_body(&shapes, contour_full) {
                Some(body) => (contour_full, body, BodySource::Contours),
                None => (contour_full, self.fallback_body(contour_full), BodySource::Fallback),
            },
        };

        let local = split_shadows(full, body);
        let boundaries = local.translate(padded.x, padded.y);
        let confidence = body_source.confidence();

        debug!(
            %region,
            contours = shapes.len(),
            source = ?body_source,
            full = ?boundaries.full,
            body = ?boundaries.body,
            confidence,
            "extracted boundaries"
        );

        Ok(BoundaryExtraction {
            boundaries,
            body_source,
            contour_count: shapes.len(),
            confidence,
        })
    }

    /// Outer contours of the foreground mask's edges passing the area, aspect, compactness and margin filters,
    /// largest first
    fn filtered_contours(&self, gray: &GrayImage) -> Vec<ContourShape> {
        let f = &self.contours;
        let (width, height) = gray.dimensions();
        let prepared = preprocess(gray, &self.preprocess, self.boundary.foreground_threshold);
        let edges = imageproc::edges::canny(
            &prepared,
            self.edges.low_threshold,
            self.edges.high_threshold,
        );

        let mut shapes: Vec<ContourShape> = external_contours(&close_edge_gaps(&edges))
            .into_iter()
            .filter(|s| s.area >= f.min_area && s.area <= f.max_area)
            .filter(|s| s.aspect_ratio() <= f.max_aspect_ratio)
            .filter(|s| s.compactness() >= f.min_compactness)
            .filter(|s| !touches_margin(&s.bounds, width, height, f.edge_margin))
            .collect();

        shapes.sort_by(|a, b| {
            b.area
                .total_cmp(&a.area)
                .then_with(|| (a.bounds.x, a.bounds.y).cmp(&(b.bounds.x, b.bounds.y)))
        });
        shapes.truncate(f.max_contours);
        shapes
    }

    /// Union of contours centered near the middle of `full` and wide enough
    fn contour_body(&self, shapes: &[ContourShape], full: Region) -> Option<Region> {
        let band = self.boundary.body_height_ratio.get() * full.height as f64 / 2.0;
        let center = full.center_y();
        shapes
            .iter()
            .map(|s| s.bounds)
            .filter(|b| (b.center_y() - center).abs() <= band)
            .filter(|b| b.width >= self.boundary.min_body_width as i32)
            .reduce(|a, b| a.union(&b))
            .and_then(|body| body.intersect(&full))
    }

    /// Centered band `body_height_ratio` of the full height
    fn fallback_body(&self, full: Region) -> Region {
        let height = ((self.boundary.body_height_ratio.get() * full.height as f64).round() as i32)
            .clamp(1, full.height.max(1));
        Region::new(full.x, full.y + (full.height - height) / 2, full.width, height)
    }

    fn min_body_row_width(&self, widest: u32) -> u32 {
        let share = (widest as f64 * self.boundary.body_row_fraction.get()).ceil() as u32;
        share.max(self.boundary.min_body_width)
    }
}

/// Full, body and the shadows between them
fn split_shadows(full: Region, body: Region) -> Boundaries {
    let upper_shadow = (body.top() > full.top())
        .then(|| Region::from_edges(full.left(), full.top(), full.right(), body.top()))
        .filter(|r| !r.is_empty());
    let lower_shadow = (body.bottom() < full.bottom())
        .then(|| Region::from_edges(full.left(), body.bottom(), full.right(), full.bottom()))
        .filter(|r| !r.is_empty());
    Boundaries {
        full: Some(full),
        body: Some(body),
        upper_shadow,
        lower_shadow,
    }
}

// ============================================================
// ROW PROFILE
// ============================================================

/// Pixels the profile window extends past the contour union
const PROFILE_WINDOW_SLACK: i32 = 2;

/// Horizontal foreground extent of every row of a window of a crop
#[derive(Debug, Clone)]
struct RowProfile {
    /// First row of the window
    top: u32,
    /// Inclusive (left, right) per window row; None for background-only rows
    rows: Vec<Option<(u32, u32)>>,
    bounds: Region,
    widest: u32,
}

impl RowProfile {
    /// Background comes from the whole crop's border; only rows and columns
    /// inside `window` are measured. None when nothing there stands out.
    fn measure(gray: &GrayImage, window: Region, threshold: u8) -> Option<Self> {
        let background = border_median(gray)?;
        let window = window.clip_to(gray.width(), gray.height())?;
        let (left, top, right, bottom) = (
            window.left() as u32,
            window.top() as u32,
            window.right() as u32,
            window.bottom() as u32,
        );

        let rows: Vec<Option<(u32, u32)>> = (top..bottom)
            .map(|y| {
                let mut extent: Option<(u32, u32)> = None;
                for x in left..right {
                    if is_foreground(gray.get_pixel(x, y).0[0], background, threshold) {
                        extent = Some(match extent {
                            Some((l, _)) => (l, x),
                            None => (x, x),
                        });
                    }
                }
                extent
            })
            .collect();

        let first = rows.iter().position(Option::is_some)?;
        let last = rows.iter().rposition(Option::is_some)?;
        let (min_x, max_x) = rows
            .iter()
            .flatten()
            .fold((u32::MAX, 0), |(l, r), &(a, b)| (l.min(a), r.max(b)));
        let widest = rows.iter().flatten().map(|&(a, b)| b - a + 1).max()?;

        Some(Self {
            top,
            bounds: Region::from_edges(
                min_x as i32,
                (top as usize + first) as i32,
                max_x as i32 + 1,
                (top as usize + last) as i32 + 1,
            ),
            rows,
            widest,
        })
    }

    /// Span of rows at least `min_width` wide
    fn body(&self, min_width: u32) -> Option<Region> {
        let wide = |&(a, b): &(u32, u32)| b - a + 1 >= min_width;
        let first = self.rows.iter().position(|r| r.as_ref().is_some_and(wide))?;
        let last = self.rows.iter().rposition(|r| r.as_ref().is_some_and(wide))?;
        let (left, right) = self.rows[first..=last]
            .iter()
            .flatten()
            .filter(|&r| wide(r))
            .fold((u32::MAX, 0), |(l, r), &(a, b)| (l.min(a), r.max(b)));
        let top = self.top as i32;
        Region::from_edges(
            left as i32,
            top + first as i32,
            right as i32 + 1,
            top + last as i32 + 1,
        )
        .intersect(&self.bounds)
    }
}

// ============================================================
// TESTS
// ============================================================
