//! Candle region locator
//!
//! Finds candidate candle boxes in a full chart image. The grayscale chart is
//! split into foreground and background against its border median; each
//! outer contour of that mask is one candidate box. A box is kept when Canny
//! finds an edge on it and it passes the size/aspect/border filters, then
//! boxes are deduplicated left to right.
//!
//! Tracing the unblurred mask keeps candles that stand a pixel or two apart
//! as separate boxes.

use image::RgbImage;
use tracing::debug;

use super::helpers::{external_contours, foreground_mask, has_edge_near, to_gray, touches_margin};
use crate::config::{BoundaryConfig, EdgeConfig, RecognitionConfig, RegionFilter};
use crate::Region;

impl_with_defaults!(RegionLocator);

/// Locates candle bounding boxes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionLocator {
    pub edges: EdgeConfig,
    pub filter: RegionFilter,
    /// Minimum gray-level distance from the background for a foreground pixel
    pub foreground_threshold: u8,
}

impl Default for RegionLocator {
    fn default() -> Self {
        Self {
            edges: EdgeConfig::default(),
            filter: RegionFilter::default(),
            foreground_threshold: BoundaryConfig::default().foreground_threshold,
        }
    }
}

impl RegionLocator {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            edges: config.edges,
            filter: config.regions,
            foreground_threshold: config.boundary.foreground_threshold,
        }
    }

    /// Candidate regions sorted left to right. Empty when nothing qualifies.
    pub fn locate(&self, image: &RgbImage) -> Vec<Region> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let gray = to_gray(image);
        let edges = imageproc::edges::canny(
            &gray,
            self.edges.low_threshold,
            self.edges.high_threshold,
        );
        let contours = external_contours(&foreground_mask(&gray, self.foreground_threshold));

        let mut candidates: Vec<Region> = contours
            .iter()
            .map(|c| c.bounds)
            .filter(|r| self.accepts(r, width, height))
            .filter(|r| has_edge_near(&edges, r))
            .collect();
        candidates.sort_by_key(|r| (r.x, r.y, r.width, r.height));

        let mut regions = deduplicate(&candidates, self.filter.overlap_threshold.get());
        regions.truncate(self.filter.max_regions);

        debug!(
            contours = contours.len(),
            candidates = candidates.len(),
            regions = regions.len(),
            "located candle regions"
        );
        regions
    }

    /// Size, aspect and border checks for one box
    pub fn accepts(&self, rect: &Region, image_width: u32, image_height: u32) -> bool {
        let f = &self.filter;
        let w = rect.width.max(0) as u32;
        let h = rect.height.max(0) as u32;
        if w < f.min_width || w > f.max_width || h < f.min_height || h > f.max_height {
            return false;
        }
        match rect.aspect_ratio() {
            Some(aspect) if aspect <= f.max_aspect_ratio => {}
            _ => return false,
        }
        !touches_margin(rect, image_width, image_height, f.edge_margin)
    }
}

/// Drop boxes overlapping an already accepted one by more than `threshold`.
///
/// Input must be sorted by x; the earliest box of an overlapping group wins.
pub fn deduplicate(sorted: &[Region], threshold: f64) -> Vec<Region> {
    let mut accepted: Vec<Region> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        if accepted
            .iter()
            .all(|kept| kept.overlap_ratio(candidate) <= threshold)
        {
            accepted.push(*candidate);
        }
    }
    accepted
}

// ============================================================
// TESTS
// ============================================================
