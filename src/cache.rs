//! Caller-owned memoization of recognition results
//!
//! The recognizer never caches. Callers that re-run recognition on frames
//! that rarely change (a chart redrawn every second, say) key results by a
//! [`Fingerprint`] of the region's pixels and the config, and keep them in a
//! [`RecognitionCache`] they own.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use image::RgbImage;
use tracing::debug;

use crate::config::RecognitionConfig;
use crate::engine::Recognizer;
use crate::{ImageSource, RecognitionResult, Region};

/// Content hash of (region pixels, region, recognition-relevant config)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Hash the pixels recognition reads: `region` plus the boundary crop
    /// padding, clipped to the image.
    ///
    /// Settings that never change a single recognition (region filters,
    /// `parallel`, `post_process`) are left out.
    pub fn compute(image: &RgbImage, region: Region, config: &RecognitionConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        region.hash(&mut hasher);

        let read = region.inflate(config.boundary.crop_padding as i32);
        match read.clip_to(image.width(), image.height()) {
            Some(clipped) => {
                clipped.hash(&mut hasher);
                for y in clipped.top()..clipped.bottom() {
                    for x in clipped.left()..clipped.right() {
                        image.get_pixel(x as u32, y as u32).0.hash(&mut hasher);
                    }
                }
            }
            None => (image.width(), image.height()).hash(&mut hasher),
        }

        // Floats have no Hash; their Debug text is exact and stable
        let settings = format!(
            "{:?}{:?}{:?}{:?}{:?}{:?}{:?}{:?}",
            config.edges,
            config.preprocess,
            config.contours,
            config.color,
            config.boundary,
            config.structure,
            config.fusion,
            config.min_confidence,
        );
        settings.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Bounded result cache; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct RecognitionCache {
    capacity: usize,
    entries: HashMap<Fingerprint, RecognitionResult>,
    order: VecDeque<Fingerprint>,
    hits: u64,
    misses: u64,
}

impl RecognitionCache {
    /// A cache holding at most `capacity` results (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &Fingerprint) -> Option<&RecognitionResult> {
        match self.entries.get(key) {
            Some(result) => {
                self.hits += 1;
                Some(result)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: Fingerprint, result: RecognitionResult) {
        if self.entries.insert(key, result).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }

    /// Cached result for this content, or recognize and remember it.
    ///
    /// Only successful results are stored, so a transient failure is retried
    /// on the next call.
    pub fn get_or_recognize<S: ImageSource>(
        &mut self,
        recognizer: &Recognizer<S>,
        image: &RgbImage,
        region: Region,
        config: &RecognitionConfig,
    ) -> RecognitionResult {
        let key = Fingerprint::compute(image, region, config);
        if let Some(hit) = self.get(&key) {
            debug!(fingerprint = key.0, "recognition cache hit");
            return hit.clone();
        }
        let result = recognizer.recognize(image, region, config);
        if result.is_ok() {
            self.insert(key, result.clone());
        }
        result
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

impl Default for RecognitionCache {
    fn default() -> Self {
        Self::new(256)
    }
}

// ============================================================
// TESTS
// ============================================================
