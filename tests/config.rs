//! Configuration serialization, validation and parameter overrides.

use std::collections::HashMap;

use kline_vision::prelude::*;

#[test]
fn test_json_round_trip() {
    let config = RecognitionConfig::default()
        .with_polarity(ColorPolarity::GreenBullish)
        .with_min_confidence(Ratio::new(0.75).unwrap());
    let json = serde_json::to_string(&config).unwrap();
    let back: RecognitionConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_partial_json_fills_defaults() {
    let json = r#"{
        "color": { "polarity": "GreenBullish", "hue_tolerance": 12.0 },
        "structure": { "doji_body_ratio": 0.05 },
        "parallel": { "enabled": false }
    }"#;
    let config: RecognitionConfig = serde_json::from_str(json).unwrap();
    let defaults = RecognitionConfig::default();

    assert_eq!(config.color.polarity, ColorPolarity::GreenBullish);
    assert_eq!(config.color.hue_tolerance, 12.0);
    assert_eq!(config.color.red_hue, defaults.color.red_hue);
    assert!((config.structure.doji_body_ratio.get() - 0.05).abs() < 1e-12);
    assert_eq!(config.structure.hammer_body_ratio, defaults.structure.hammer_body_ratio);
    assert!(!config.parallel.enabled);
    assert_eq!(config.parallel.threshold, defaults.parallel.threshold);
    assert_eq!(config.edges, defaults.edges);
    assert!(config.validate().is_ok());
}

#[test]
fn test_out_of_range_ratio_is_rejected_on_load() {
    let json = r#"{ "min_confidence": 1.5 }"#;
    let err = serde_json::from_str::<RecognitionConfig>(json).unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");

    let json = r#"{ "structure": { "hammer_shadow_ratio": -0.2 } }"#;
    assert!(serde_json::from_str::<RecognitionConfig>(json).is_err());
}

#[test]
fn test_loaded_config_is_validated_before_use() {
    let json = r#"{ "preprocess": { "blur_kernel_size": 6 } }"#;
    let config: RecognitionConfig = serde_json::from_str(json).unwrap();
    let err = config.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let image = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
    let err = Recognizer::new()
        .recognize_batch(&image, &[Region::new(0, 0, 40, 40)], &config)
        .unwrap_err();
    assert!(matches!(err, RecognitionError::InvalidConfig(_)));
}

#[test]
fn test_boundaries_serialize_for_downstream_consumers() {
    let boundaries = Boundaries {
        full: Some(Region::new(10, 20, 30, 200)),
        body: Some(Region::new(10, 80, 30, 80)),
        upper_shadow: Some(Region::new(10, 20, 30, 60)),
        lower_shadow: None,
    };
    let value = serde_json::to_value(boundaries).unwrap();
    assert_eq!(value["full"]["height"], 200);
    assert!(value["lower_shadow"].is_null());
}

#[test]
fn test_param_overrides() {
    let mut overrides = HashMap::new();
    overrides.insert("hue_tolerance", 15.0);
    overrides.insert("min_confidence", 0.8);
    overrides.insert("blur_kernel_size", 3.0);
    let config = RecognitionConfig::with_params(&overrides).unwrap();
    assert_eq!(config.color.hue_tolerance, 15.0);
    assert!((config.min_confidence.get() - 0.8).abs() < 1e-12);
    assert_eq!(config.preprocess.blur_kernel_size, 3);
    assert!(config.validate().is_ok());

    let mut unknown = HashMap::new();
    unknown.insert("no_such_knob", 1.0);
    assert!(matches!(
        RecognitionConfig::with_params(&unknown),
        Err(RecognitionError::InvalidConfig(_))
    ));

    let mut out_of_range = HashMap::new();
    out_of_range.insert("doji_body_ratio", 0.9);
    assert!(matches!(
        RecognitionConfig::with_params(&out_of_range),
        Err(RecognitionError::OutOfRange { .. })
    ));
}

#[test]
fn test_param_grids_stay_in_range() {
    for meta in RecognitionConfig::param_meta() {
        let grid = meta.generate_grid();
        assert!(!grid.is_empty(), "{}", meta.name);
        for value in grid {
            assert!(meta.validate(value).is_ok(), "{} = {value}", meta.name);
        }
        assert!(meta.validate(meta.default).is_ok(), "default of {}", meta.name);
    }
}
