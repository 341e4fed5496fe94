//! Height metrics and single-candle pattern classification

use tracing::debug;

use crate::config::{RecognitionConfig, StructureConfig};
use crate::{Boundaries, PatternType, Region, StructureMetrics};

impl_with_defaults!(StructureAnalyzer);

/// Confidence contributions, summed
const FULL_PRESENT_WEIGHT: f64 = 0.3;
const BODY_FITS_WEIGHT: f64 = 0.3;
const BODY_RATIO_WEIGHT: f64 = 0.2;
const SHADOW_RATIO_WEIGHT: f64 = 0.2;

/// Metrics plus how plausible they look
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureAnalysis {
    pub metrics: StructureMetrics,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StructureAnalyzer {
    pub config: StructureConfig,
}

impl StructureAnalyzer {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            config: config.structure,
        }
    }

    pub fn analyze(&self, boundaries: &Boundaries) -> StructureAnalysis {
        let mut metrics = StructureMetrics {
            body_height: height_of(boundaries.body),
            upper_shadow_height: height_of(boundaries.upper_shadow),
            lower_shadow_height: height_of(boundaries.lower_shadow),
            total_height: height_of(boundaries.full),
            pattern: PatternType::Unknown,
        };
        metrics.pattern = self.classify_pattern(&metrics);
        let confidence = self.confidence(boundaries, &metrics);

        debug!(
            body = metrics.body_height,
            upper = metrics.upper_shadow_height,
            lower = metrics.lower_shadow_height,
            total = metrics.total_height,
            pattern = ?metrics.pattern,
            confidence,
            "analyzed structure"
        );
        StructureAnalysis {
            metrics,
            confidence,
        }
    }

    /// First matching rule wins: Doji, Hammer, InvertedHammer, then Normal.
    ///
    /// A candle with no height at all is Unknown, not Doji: the ratios are
    /// taken over `max(1, total)`, so a zero-height candle would otherwise
    /// read as a zero body and match the Doji rule with nothing measured.
    pub fn classify_pattern(&self, m: &StructureMetrics) -> PatternType {
        let c = &self.config;
        if m.total_height == 0 {
            return PatternType::Unknown;
        }
        let body = m.body_ratio();
        if body < c.doji_body_ratio.get() {
            PatternType::Doji
        } else if m.lower_shadow_ratio() > c.hammer_shadow_ratio.get()
            && body < c.hammer_body_ratio.get()
        {
            PatternType::Hammer
        } else if m.upper_shadow_ratio() > c.hammer_shadow_ratio.get()
            && body < c.hammer_body_ratio.get()
        {
            PatternType::InvertedHammer
        } else {
            PatternType::Normal
        }
    }

    pub fn confidence(&self, boundaries: &Boundaries, m: &StructureMetrics) -> f64 {
        let c = &self.config;
        let body_ratio = m.body_ratio();
        let mut score = 0.0;
        if !boundaries.is_empty() {
            score += FULL_PRESENT_WEIGHT;
        }
        if m.body_height <= m.total_height {
            score += BODY_FITS_WEIGHT;
        }
        if (c.min_body_ratio.get()..=c.max_body_ratio.get()).contains(&body_ratio) {
            score += BODY_RATIO_WEIGHT;
        }
        if m.upper_shadow_ratio() + m.lower_shadow_ratio() <= c.max_shadow_ratio.get() {
            score += SHADOW_RATIO_WEIGHT;
        }
        score.clamp(0.0, 1.0)
    }
}

#[inline]
fn height_of(r: Option<Region>) -> u32 {
    r.map_or(0, |r| r.height.max(0) as u32)
}

// ============================================================
// TESTS
// ============================================================
