//! Property-based tests for the recognition invariants.

mod common;

use common::*;
use kline_vision::prelude::*;
use proptest::prelude::*;

/// Random candle geometry on a white canvas, with the region around it
fn arb_candle() -> impl Strategy<Value = (RgbImage, CandleSpec)> {
    (
        4u32..30,
        0i32..60,
        8i32..80,
        0i32..60,
        prop::bool::ANY,
    )
        .prop_map(|(body_width, upper, body, lower, red)| {
            let high = 12;
            let spec = CandleSpec {
                x: 12,
                body_width,
                wick_width: 2,
                high,
                body_top: high + upper,
                body_bottom: high + upper + body,
                low: high + upper + body + lower,
                color: if red { RED } else { GREEN },
            };
            let width = body_width + 24;
            let height = (spec.low + 12) as u32;
            (chart(width, height, WHITE, &[spec]), spec)
        })
}

fn arb_region() -> impl Strategy<Value = Region> {
    (-50i32..150, -50i32..150, 0i32..120, 0i32..120)
        .prop_map(|(x, y, w, h)| Region::new(x, y, w, h))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Clean candles are recognized and satisfy the height and layout invariants
    #[test]
    fn prop_successful_results_are_consistent((image, spec) in arb_candle()) {
        let config = RecognitionConfig::default();
        let result = Recognizer::new().recognize(&image, spec.region(6), &config);
        prop_assert!(result.is_ok(), "{:?} for {:?}", result.error, spec);
        let info = result.info.unwrap();

        let s = &info.structure;
        prop_assert!(s.height_discrepancy() <= config.structure.height_tolerance);
        prop_assert!((0.0..=1.0).contains(&info.confidence));

        let b = &info.boundaries;
        let full = b.full.unwrap();
        prop_assert_eq!(full, spec.full());
        prop_assert_eq!(b.body, Some(spec.body()));
        for part in [b.body, b.upper_shadow, b.lower_shadow].into_iter().flatten() {
            prop_assert!(full.contains(&part));
        }
        let body = b.body.unwrap();
        if let Some(upper) = b.upper_shadow {
            prop_assert!(upper.bottom() <= body.top());
        }
        if let Some(lower) = b.lower_shadow {
            prop_assert!(lower.top() >= body.bottom());
        }
    }

    /// Same input, same output (timestamp aside)
    #[test]
    fn prop_recognition_is_deterministic((image, spec) in arb_candle()) {
        let config = RecognitionConfig::default();
        let recognizer = Recognizer::new();
        let a = recognizer.recognize(&image, spec.region(6), &config);
        let b = recognizer.recognize(&image, spec.region(6), &config);
        prop_assert!(a.is_ok(), "{:?}", a.error);
        prop_assert_eq!(a.error, b.error);
        match (a.info, b.info) {
            (Some(x), Some(y)) => prop_assert!(x.same_recognition(&y)),
            (None, None) => {}
            _ => prop_assert!(false, "one run produced info and the other did not"),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Regions that miss the image are rejected before any stage runs
    #[test]
    fn prop_non_intersecting_regions_are_invalid_input(region in arb_region()) {
        let image = RgbImage::from_pixel(64, 64, WHITE);
        let result = Recognizer::new().recognize(&image, region, &RecognitionConfig::default());
        if region.clip_to(64, 64).is_none() {
            prop_assert_eq!(result.error_kind(), Some(ErrorKind::InvalidInput));
            prop_assert!(result.info.is_none());
        }
    }

    /// Pattern rules follow their documented order
    #[test]
    fn prop_pattern_rule_order(
        total in 1u32..500,
        body_share in 0.0f64..=1.0,
        upper_share in 0.0f64..=1.0,
    ) {
        let body = (total as f64 * body_share) as u32;
        let upper = ((total - body) as f64 * upper_share) as u32;
        let lower = total - body - upper;
        let full = Region::new(0, 0, 10, total as i32);
        let boundaries = Boundaries {
            full: Some(full),
            body: Some(Region::new(0, upper as i32, 10, body as i32)),
            upper_shadow: (upper > 0).then(|| Region::new(0, 0, 10, upper as i32)),
            lower_shadow: (lower > 0).then(|| Region::new(0, (upper + body) as i32, 10, lower as i32)),
        };
        let analyzer = StructureAnalyzer::with_defaults();
        let analysis = analyzer.analyze(&boundaries);
        let m = analysis.metrics;
        let c = &analyzer.config;

        prop_assert_eq!(m.height_discrepancy(), 0);
        prop_assert!((0.0..=1.0).contains(&analysis.confidence));
        let expected = if m.body_ratio() < c.doji_body_ratio.get() {
            PatternType::Doji
        } else if m.lower_shadow_ratio() > c.hammer_shadow_ratio.get()
            && m.body_ratio() < c.hammer_body_ratio.get()
        {
            PatternType::Hammer
        } else if m.upper_shadow_ratio() > c.hammer_shadow_ratio.get()
            && m.body_ratio() < c.hammer_body_ratio.get()
        {
            PatternType::InvertedHammer
        } else {
            PatternType::Normal
        };
        prop_assert_eq!(m.pattern, expected);
    }

    /// Overlap ratio is symmetric and bounded
    #[test]
    fn prop_overlap_ratio_bounds(a in arb_region(), b in arb_region()) {
        let ab = a.overlap_ratio(&b);
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert!((ab - b.overlap_ratio(&a)).abs() < 1e-12);
        if let Some(i) = a.intersect(&b) {
            prop_assert!(a.contains(&i) && b.contains(&i));
        }
    }

    /// Hue distance is symmetric and never exceeds half the circle
    #[test]
    fn prop_hue_distance_wraps(a in 0.0f64..180.0, b in 0.0f64..180.0) {
        let d = hue_distance(a, b);
        prop_assert!((0.0..=90.0).contains(&d));
        prop_assert!((d - hue_distance(b, a)).abs() < 1e-9);
    }
}
