//! Recognition orchestration
//!
//! [`Recognizer`] composes the stages into single, batch and auto-detect
//! entry points. It holds no per-call state: every call is a function of the
//! image, the regions and the [`RecognitionConfig`] passed in.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::RecognitionConfig;
use crate::detectors::{BoundaryExtractor, ColorClassifier, RegionLocator, StructureAnalyzer};
use crate::validation;
use crate::{
    ImageSource, KLineInfo, NoImageSource, RecognitionError, RecognitionResult, Region, Result,
    Stage,
};

// ============================================================
// HOOKS AND BATCH CONTROL
// ============================================================

/// Cross-candle correction applied to auto-detect results.
///
/// Runs after post-processing, with the results in final order. No
/// implementation ships with the crate.
pub trait CandleCorrector: Send + Sync {
    fn correct(&self, image: &RgbImage, results: &mut Vec<RecognitionResult>);
}

/// Cooperative cancellation shared between a caller and a running batch
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One finished batch unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Position of the unit in the input regions
    pub index: usize,
    /// Units finished so far, including this one; cancelled units count
    pub completed: usize,
    pub total: usize,
    pub success: bool,
}

/// Optional cancellation and progress reporting for a batch
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    pub cancel: Option<CancelFlag>,
    pub progress: Option<Sender<BatchProgress>>,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_progress(mut self, sender: Sender<BatchProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    fn report(&self, progress: BatchProgress) {
        if let Some(tx) = &self.progress {
            // A dropped receiver just means nobody is listening
            let _ = tx.send(progress);
        }
    }
}

// ============================================================
// RECOGNIZER
// ============================================================

/// Candlestick recognizer
pub struct Recognizer<S: ImageSource = NoImageSource> {
    source: S,
    corrector: Option<Box<dyn CandleCorrector>>,
}

impl Default for Recognizer<NoImageSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer<NoImageSource> {
    pub fn new() -> Self {
        Self::with_source(NoImageSource)
    }
}

impl<S: ImageSource> Recognizer<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            corrector: None,
        }
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    // ===========================================
    // SINGLE
    // ===========================================

    /// Recognize the candle in `region`.
    ///
    /// Never fails outright: bad input, stage failures and validation
    /// failures all come back as a failed [`RecognitionResult`].
    pub fn recognize(
        &self,
        image: &RgbImage,
        region: Region,
        config: &RecognitionConfig,
    ) -> RecognitionResult {
        let start = Instant::now();
        match check_image(image).and_then(|_| config.validate()) {
            Ok(()) => self.recognize_unit(image, region, config, start),
            Err(e) => {
                warn!(%region, error = %e, "rejected recognition input");
                RecognitionResult::failed(region, e, elapsed_ms(start))
            }
        }
    }

    fn recognize_unit(
        &self,
        image: &RgbImage,
        region: Region,
        config: &RecognitionConfig,
        start: Instant,
    ) -> RecognitionResult {
        let result = match pipeline(image, region, config) {
            Ok(info) => match validation::ensure_valid(&info, config) {
                Ok(()) => RecognitionResult::succeeded(region, info, elapsed_ms(start)),
                Err(e) => RecognitionResult {
                    region,
                    info: Some(info),
                    error: Some(e),
                    elapsed_ms: elapsed_ms(start),
                },
            },
            Err(e) => RecognitionResult::failed(region, e, elapsed_ms(start)),
        };

        match &result.error {
            None => debug!(
                %region,
                confidence = result.info.as_ref().map_or(0.0, |i| i.confidence),
                elapsed_ms = result.elapsed_ms,
                "recognized candle"
            ),
            Some(e) => warn!(
                %region,
                kind = ?e.kind(),
                error = %e,
                elapsed_ms = result.elapsed_ms,
                "recognition failed"
            ),
        }
        result
    }

    // ===========================================
    // BATCH
    // ===========================================

    /// Recognize every region; output order matches `regions`.
    ///
    /// Fails only on preconditions (empty image, empty region list, invalid
    /// config). Per-region failures stay inside their own result.
    pub fn recognize_batch(
        &self,
        image: &RgbImage,
        regions: &[Region],
        config: &RecognitionConfig,
    ) -> Result<Vec<RecognitionResult>> {
        self.recognize_batch_with(image, regions, config, &BatchControl::default())
    }

    pub fn recognize_batch_with(
        &self,
        image: &RgbImage,
        regions: &[Region],
        config: &RecognitionConfig,
        control: &BatchControl,
    ) -> Result<Vec<RecognitionResult>> {
        check_image(image)?;
        if regions.is_empty() {
            return Err(RecognitionError::InvalidInput(
                "region list is empty".to_string(),
            ));
        }
        config.validate()?;

        let total = regions.len();
        let completed = AtomicUsize::new(0);
        let unit = |(index, region): (usize, &Region)| {
            let result = if control.is_cancelled() {
                RecognitionResult::failed(*region, RecognitionError::Cancelled, 0.0)
            } else {
                self.recognize_unit(image, *region, config, Instant::now())
            };
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            control.report(BatchProgress {
                index,
                completed: done,
                total,
                success: result.is_ok(),
            });
            result
        };

        let parallel = config.parallel.enabled && total > config.parallel.threshold;
        let results: Vec<RecognitionResult> = if parallel {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(config.parallel.max_degree_of_parallelism)
                .build()
            {
                Ok(pool) => pool.install(|| regions.par_iter().enumerate().map(unit).collect()),
                Err(e) => {
                    warn!(error = %e, "worker pool unavailable, running batch sequentially");
                    regions.iter().enumerate().map(unit).collect()
                }
            }
        } else {
            regions.iter().enumerate().map(unit).collect()
        };

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        info!(
            regions = total,
            succeeded,
            failed = total - succeeded,
            parallel,
            cancelled = control.is_cancelled(),
            "recognized batch"
        );
        Ok(results)
    }

    // ===========================================
    // AUTO-DETECT
    // ===========================================

    /// Locate candles, recognize each, then post-process and correct.
    ///
    /// A chart with no candidate regions yields an empty list.
    pub fn auto_detect_and_recognize(
        &self,
        image: &RgbImage,
        config: &RecognitionConfig,
    ) -> Result<Vec<RecognitionResult>> {
        self.auto_detect_with(image, config, &BatchControl::default())
    }

    pub fn auto_detect_with(
        &self,
        image: &RgbImage,
        config: &RecognitionConfig,
        control: &BatchControl,
    ) -> Result<Vec<RecognitionResult>> {
        check_image(image)?;
        config.validate()?;

        let regions = RegionLocator::from_config(config).locate(image);
        if regions.is_empty() {
            info!(located = 0, "auto-detect found no candles");
            return Ok(Vec::new());
        }

        let mut results = self.recognize_batch_with(image, &regions, config, control)?;
        post_process(&mut results, config);
        if let Some(corrector) = &self.corrector {
            corrector.correct(image, &mut results);
        }

        info!(
            located = regions.len(),
            kept = results.len(),
            "auto-detect finished"
        );
        Ok(results)
    }

    // ===========================================
    // CAPTURE
    // ===========================================

    /// Capture one frame from the source and recognize `region` in it
    pub fn capture_and_recognize(
        &self,
        region: Region,
        config: &RecognitionConfig,
    ) -> Result<RecognitionResult> {
        let image = self.source.capture()?;
        Ok(self.recognize(&image, region, config))
    }

    /// Capture one frame from the source and auto-detect in it
    pub fn capture_and_auto_detect(
        &self,
        config: &RecognitionConfig,
    ) -> Result<Vec<RecognitionResult>> {
        let image = self.source.capture()?;
        self.auto_detect_and_recognize(&image, config)
    }
}

// ============================================================
// PIPELINE
// ============================================================

/// Crop, color + boundary (concurrently), structure, fusion
fn pipeline(image: &RgbImage, region: Region, config: &RecognitionConfig) -> Result<KLineInfo> {
    if region.width <= 0 || region.height <= 0 {
        return Err(RecognitionError::InvalidInput(format!(
            "region {region} has no area"
        )));
    }
    let representable =
        region.x.checked_add(region.width).is_some() && region.y.checked_add(region.height).is_some();
    if !representable {
        return Err(RecognitionError::InvalidInput(format!(
            "region {region} exceeds the coordinate range"
        )));
    }
    let clipped = crate::detectors::clip_region(image, region)?;

    let colors = ColorClassifier::from_config(config);
    let extractor = BoundaryExtractor::from_config(config);
    let (color, boundary) = rayon::join(
        || guarded(Stage::Color, || colors.classify(image, clipped)),
        || guarded(Stage::Boundary, || extractor.extract_detailed(image, clipped)),
    );
    let color = color?;
    let boundary = boundary?;

    let analyzer = StructureAnalyzer::from_config(config);
    let structure = guarded(Stage::Structure, || Ok(analyzer.analyze(&boundary.boundaries)))?;

    let shape = (boundary.confidence + structure.confidence) / 2.0;
    let confidence = config.fusion.fuse(color.confidence, shape);
    Ok(KLineInfo::new(
        boundary.boundaries,
        color,
        structure.metrics,
        confidence,
    ))
}

/// Sort and threshold auto-detect results in place.
///
/// The confidence drop only applies to results that carry a candle; failures
/// without one stay so callers can see why a located region was lost.
fn post_process(results: &mut Vec<RecognitionResult>, config: &RecognitionConfig) {
    let p = &config.post_process;
    if p.drop_below_threshold {
        let min = config.min_confidence.get();
        results.retain(|r| r.info.as_ref().map_or(true, |i| i.confidence >= min));
    }
    if p.sort_by_x {
        results.sort_by_key(RecognitionResult::x);
    }
}

/// Run a stage, turning a panic into a failure of that stage
fn guarded<T>(stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(RecognitionError::stage(stage, panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

fn check_image(image: &RgbImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RecognitionError::InvalidInput("image is empty".to_string()));
    }
    Ok(())
}

#[inline]
fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`Recognizer`]
pub struct RecognizerBuilder<S: ImageSource = NoImageSource> {
    source: S,
    corrector: Option<Box<dyn CandleCorrector>>,
}

impl Default for RecognizerBuilder<NoImageSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognizerBuilder<NoImageSource> {
    pub fn new() -> Self {
        Self {
            source: NoImageSource,
            corrector: None,
        }
    }
}

impl<S: ImageSource> RecognizerBuilder<S> {
    /// Change image source
    pub fn source<S2: ImageSource>(self, source: S2) -> RecognizerBuilder<S2> {
        RecognizerBuilder {
            source,
            corrector: self.corrector,
        }
    }

    /// Register the cross-candle correction hook
    pub fn corrector<K: CandleCorrector + 'static>(mut self, corrector: K) -> Self {
        self.corrector = Some(Box::new(corrector));
        self
    }

    pub fn build(self) -> Recognizer<S> {
        Recognizer {
            source: self.source,
            corrector: self.corrector,
        }
    }
}

// ============================================================
// TESTS
// ============================================================
