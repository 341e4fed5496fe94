//! End-to-end recognition tests on synthetic charts.

mod common;

use common::*;
use kline_vision::prelude::*;

#[test]
fn test_normal_candle_end_to_end() {
    let (image, spec) = normal_candle();
    let result = Recognizer::new().recognize(&image, spec.region(6), &RecognitionConfig::default());

    assert!(result.is_ok(), "{:?}", result.error);
    let info = result.info.unwrap();
    assert_eq!(info.color.class, ColorClass::Bullish);
    assert!(info.color.confidence > 0.9);
    assert_eq!(info.boundaries.full, Some(spec.full()));
    assert_eq!(info.boundaries.body, Some(spec.body()));
    assert_eq!(info.structure.total_height, 200);
    assert_eq!(info.structure.body_height, 80);
    assert!((info.body_ratio() - 0.4).abs() < 1e-12);
    assert_eq!(info.structure.pattern, PatternType::Normal);
    assert_eq!(info.high_y(), Some(20));
    assert_eq!(info.low_y(), Some(220));
}

#[test]
fn test_stray_pixel_near_candle_does_not_move_high() {
    let (mut image, spec) = normal_candle();
    image.put_pixel(13, 13, Rgb([0, 0, 0]));
    let result = Recognizer::new().recognize(&image, spec.region(8), &RecognitionConfig::default());

    assert!(result.is_ok(), "{:?}", result.error);
    let info = result.info.unwrap();
    assert_eq!(info.boundaries.full, Some(spec.full()));
    assert_eq!(info.high_y(), Some(20));
    assert_eq!(info.structure.upper_shadow_height, 60);
}

#[test]
fn test_doji_on_dark_background() {
    let spec = CandleSpec::new(20, 20, 68, 73, 120, GREEN);
    let image = chart(80, 140, DARK, &[spec]);
    let result = Recognizer::new().recognize(&image, spec.region(6), &RecognitionConfig::default());

    assert!(result.is_ok(), "{:?}", result.error);
    let info = result.info.unwrap();
    assert_eq!(info.color.class, ColorClass::Bearish);
    assert_eq!(info.structure.body_height, 5);
    assert_eq!(info.structure.pattern, PatternType::Doji);
}

#[test]
fn test_hammer_and_inverted_hammer() {
    let recognizer = Recognizer::new();
    let config = RecognitionConfig::default();

    let hammer = CandleSpec::new(20, 20, 30, 54, 220, RED);
    let image = chart(80, 240, WHITE, &[hammer]);
    let info = recognizer.recognize(&image, hammer.region(6), &config).info.unwrap();
    assert_eq!(info.structure.pattern, PatternType::Hammer);

    let inverted = CandleSpec::new(20, 20, 186, 210, 220, RED);
    let image = chart(80, 240, WHITE, &[inverted]);
    let info = recognizer.recognize(&image, inverted.region(6), &config).info.unwrap();
    assert_eq!(info.structure.pattern, PatternType::InvertedHammer);
}

#[test]
fn test_partial_region_is_clipped() {
    let spec = CandleSpec::new(10, 10, 60, 120, 180, RED);
    let image = chart(60, 200, WHITE, &[spec]);
    // Extends past the left and bottom edges of the image
    let region = Region::new(-30, 0, 90, 260);
    let result = Recognizer::new().recognize(&image, region, &RecognitionConfig::default());
    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(result.region, region);
    assert_eq!(result.info.unwrap().boundaries.body, Some(spec.body()));
}

#[test]
fn test_region_outside_image_is_invalid_input() {
    let (image, _) = normal_candle();
    for region in [
        Region::new(500, 0, 10, 10),
        Region::new(-20, -20, 10, 10),
        Region::new(10, 10, 0, 50),
        Region::new(10, 10, 20, -5),
    ] {
        let result = Recognizer::new().recognize(&image, region, &RecognitionConfig::default());
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidInput), "{region}");
        assert!(result.info.is_none());
    }
}

#[test]
fn test_low_confidence_is_validation_failure_with_itemized_reasons() {
    let (image, spec) = normal_candle();
    let config = RecognitionConfig::default().with_min_confidence(Ratio::new(1.0).unwrap());
    let mut noisy = image.clone();
    // Off-color speckles inside the body pull color confidence below 1.0
    for i in 0..6u32 {
        noisy.put_pixel(24 + i * 5, 100, Rgb([40, 40, 230]));
    }
    let result = Recognizer::new().recognize(&noisy, spec.region(6), &config);
    match &result.error {
        Some(RecognitionError::Validation(reasons)) => {
            assert_eq!(reasons.len(), 1, "{reasons:?}");
            assert!(reasons[0].contains("confidence"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(result.info.is_some());
}

#[test]
fn test_recognition_is_deterministic() {
    let (image, spec) = normal_candle();
    let config = RecognitionConfig::default();
    let recognizer = Recognizer::new();
    let first = recognizer.recognize(&image, spec.region(6), &config).info.unwrap();
    for _ in 0..3 {
        let again = recognizer.recognize(&image, spec.region(6), &config).info.unwrap();
        assert!(first.same_recognition(&again));
    }
}

#[test]
fn test_auto_detect_chart() {
    let (image, specs) = candle_row(5);
    let results = Recognizer::new()
        .auto_detect_and_recognize(&image, &RecognitionConfig::default())
        .unwrap();

    assert_eq!(results.len(), specs.len());
    for (result, spec) in results.iter().zip(&specs) {
        let info = result.info.as_ref().unwrap();
        assert!(region_close(info.boundaries.full.unwrap(), spec.full(), 0));
        assert!(region_close(info.boundaries.body.unwrap(), spec.body(), 0));
        let expected = if spec.color == RED {
            ColorClass::Bullish
        } else {
            ColorClass::Bearish
        };
        assert_eq!(info.color.class, expected);
    }
}

#[test]
fn test_auto_detect_keeps_adjacent_candles_apart() {
    let left = CandleSpec::new(20, 20, 80, 160, 220, RED);
    let right = CandleSpec::new(62, 30, 60, 120, 200, GREEN);
    let image = chart(130, 240, WHITE, &[left, right]);
    let results = Recognizer::new()
        .auto_detect_and_recognize(&image, &RecognitionConfig::default())
        .unwrap();

    assert_eq!(results.len(), 2, "{results:?}");
    for (result, spec) in results.iter().zip([left, right]) {
        assert!(result.is_ok(), "{:?}", result.error);
        let info = result.info.as_ref().unwrap();
        assert_eq!(info.boundaries.full, Some(spec.full()));
        assert_eq!(info.boundaries.body, Some(spec.body()));
    }
}

#[test]
fn test_auto_detect_drops_low_confidence_candles() {
    let (mut image, specs) = candle_row(3);
    // Repaint the lower half of the middle body blue: color confidence drops
    let body = specs[1].body();
    for y in body.center_y() as i32..body.bottom() {
        for x in body.left()..body.right() {
            image.put_pixel(x as u32, y as u32, Rgb([40, 40, 230]));
        }
    }
    let mut config = RecognitionConfig::default().with_min_confidence(Ratio::new(0.9).unwrap());

    config.post_process.drop_below_threshold = false;
    let kept = Recognizer::new().auto_detect_and_recognize(&image, &config).unwrap();
    assert_eq!(kept.len(), 3);
    assert!(kept[0].is_ok() && kept[2].is_ok());
    assert_eq!(kept[1].error_kind(), Some(ErrorKind::ValidationFailure));

    config.post_process.drop_below_threshold = true;
    let dropped = Recognizer::new().auto_detect_and_recognize(&image, &config).unwrap();
    assert_eq!(dropped.len(), 2);
    assert!(dropped.iter().all(|r| r.is_ok()));
}

#[test]
fn test_calibrated_tolerances_still_classify() {
    let (image, spec) = normal_candle();
    let classifier = ColorClassifier::with_defaults();
    let calibrated = classifier.calibrate(&image, spec.region(6)).unwrap();
    let tuned = ColorClassifier { config: calibrated };
    let c = tuned.classify(&image, spec.region(6)).unwrap();
    assert_eq!(c.class, ColorClass::Bullish);
    assert!(c.confidence > 0.9);
}

struct FixedFrame(RgbImage);

impl ImageSource for FixedFrame {
    fn capture(&self) -> Result<RgbImage> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_capture_and_auto_detect_with_custom_source() {
    let (image, specs) = candle_row(4);
    let recognizer = RecognizerBuilder::new().source(FixedFrame(image)).build();
    let results = recognizer
        .capture_and_auto_detect(&RecognitionConfig::default())
        .unwrap();
    assert_eq!(results.len(), specs.len());
}
