//! Post-recognition checks on a fused [`KLineInfo`]
//!
//! Every violated rule contributes one human-readable reason; an empty list
//! means the candle is accepted.

use crate::config::RecognitionConfig;
use crate::{ColorClass, KLineInfo, RecognitionError, Region, Result};

/// Reasons `info` should be rejected. Empty when it passes.
pub fn validate(info: &KLineInfo, config: &RecognitionConfig) -> Vec<String> {
    let mut reasons = Vec::new();
    let b = &info.boundaries;

    match b.full {
        Some(full) if !full.is_empty() => check_layout(full, info, &mut reasons),
        _ => reasons.push("full boundary is empty".to_string()),
    }

    if info.color.class == ColorClass::Unknown {
        reasons.push("color could not be classified".to_string());
    }

    let min = config.min_confidence.get();
    if info.confidence < min {
        reasons.push(format!(
            "confidence {:.3} below threshold {:.3}",
            info.confidence, min
        ));
    }

    let s = &info.structure;
    let tolerance = config.structure.height_tolerance;
    if s.height_discrepancy() > tolerance {
        reasons.push(format!(
            "heights inconsistent: body {} + upper {} + lower {} vs total {} (tolerance {})",
            s.body_height, s.upper_shadow_height, s.lower_shadow_height, s.total_height, tolerance
        ));
    }

    reasons
}

/// `validate` as a `Result`: `Validation` error carrying every reason
pub fn ensure_valid(info: &KLineInfo, config: &RecognitionConfig) -> Result<()> {
    let reasons = validate(info, config);
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(RecognitionError::Validation(reasons))
    }
}

/// Containment in `full` and vertical ordering around the body
fn check_layout(full: Region, info: &KLineInfo, reasons: &mut Vec<String>) {
    let b = &info.boundaries;
    let parts = [
        ("body", b.body),
        ("upper shadow", b.upper_shadow),
        ("lower shadow", b.lower_shadow),
    ];
    for (name, part) in parts {
        if let Some(r) = part {
            if !full.contains(&r) {
                reasons.push(format!("{name} {r} outside full boundary {full}"));
            }
        }
    }

    if let Some(body) = b.body {
        if let Some(upper) = b.upper_shadow {
            if upper.bottom() > body.top() {
                reasons.push(format!("upper shadow {upper} extends below body top {}", body.top()));
            }
        }
        if let Some(lower) = b.lower_shadow {
            if lower.top() < body.bottom() {
                reasons.push(format!(
                    "lower shadow {lower} starts above body bottom {}",
                    body.bottom()
                ));
            }
        }
    }
}

// ============================================================
// TESTS
// ============================================================
