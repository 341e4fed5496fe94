//! Common image helpers shared by the recognition stages
//!
//! Cropping, grayscale and HSV conversion, foreground masks, preprocessing
//! filters and contour geometry. HSV follows the 8-bit chart-tool convention: hue in [0, 180),
//! saturation and value in [0, 255].

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::point::Point;

use crate::config::{MorphOperation, PreprocessConfig};
use crate::{Hsv, RecognitionError, Region, Result};

/// Number of hue bins (one per hue unit)
pub const HUE_BINS: usize = 180;

// ============================================================
// CROPPING / CONVERSION
// ============================================================

/// Clip `region` to the image, failing when nothing is left.
pub fn clip_region(image: &RgbImage, region: Region) -> Result<Region> {
    region
        .clip_to(image.width(), image.height())
        .ok_or_else(|| {
            RecognitionError::InvalidInput(format!(
                "region {} does not intersect image {}x{}",
                region,
                image.width(),
                image.height()
            ))
        })
}

/// Copy out a region that already lies inside the image.
pub fn crop(image: &RgbImage, region: Region) -> RgbImage {
    imageops::crop_imm(
        image,
        region.x.max(0) as u32,
        region.y.max(0) as u32,
        region.width.max(0) as u32,
        region.height.max(0) as u32,
    )
    .to_image()
}

#[inline]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

/// RGB to HSV (hue 0..180, saturation/value 0..255)
pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let r = rgb[0] as f64;
    let g = rgb[1] as f64;
    let b = rgb[2] as f64;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let mut h = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    let mut h = h / 2.0;
    if h >= HUE_BINS as f64 {
        h -= HUE_BINS as f64;
    }
    Hsv { h, s, v: max }
}

/// All pixels of an image as HSV samples, row-major
pub fn hsv_pixels(image: &RgbImage) -> Vec<Hsv> {
    image.pixels().map(|p| rgb_to_hsv(p.0)).collect()
}

/// Circular hue distance on the 0..180 scale
#[inline]
pub fn hue_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % HUE_BINS as f64;
    d.min(HUE_BINS as f64 - d)
}

/// Signed hue offset `a - b`, wrapped into [-90, 90)
#[inline]
pub fn hue_offset(a: f64, b: f64) -> f64 {
    let half = HUE_BINS as f64 / 2.0;
    (a - b + half).rem_euclid(HUE_BINS as f64) - half
}

// ============================================================
// PREPROCESSING
// ============================================================

/// Gaussian sigma for an odd kernel size (OpenCV's rule of thumb)
#[inline]
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Linear contrast gain around mid-gray
pub fn adjust_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let mut out = image.clone();
    if (factor - 1.0).abs() <= f32::EPSILON {
        return out;
    }
    for p in out.pixels_mut() {
        let v = (p.0[0] as f32 - 128.0) * factor + 128.0;
        p.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Median gray level of the outermost ring of pixels
pub fn border_median(gray: &GrayImage) -> Option<u8> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let mut ring: Vec<u8> = Vec::with_capacity(2 * (width + height) as usize);
    for x in 0..width {
        ring.push(gray.get_pixel(x, 0).0[0]);
        ring.push(gray.get_pixel(x, height - 1).0[0]);
    }
    for y in 0..height {
        ring.push(gray.get_pixel(0, y).0[0]);
        ring.push(gray.get_pixel(width - 1, y).0[0]);
    }
    ring.sort_unstable();
    ring.get(ring.len() / 2).copied()
}

#[inline]
pub fn is_foreground(value: u8, background: u8, threshold: u8) -> bool {
    value.abs_diff(background) > threshold
}

/// Binary mask (255 = foreground) of pixels that differ from the
/// border-estimated background by more than `threshold`
pub fn foreground_mask(gray: &GrayImage, threshold: u8) -> GrayImage {
    let Some(background) = border_median(gray) else {
        return GrayImage::new(gray.width(), gray.height());
    };
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Luma([if is_foreground(v, background, threshold) { 255 } else { 0 }])
    })
}

/// Morphology on a binary mask; nonzero pixels are foreground
pub fn apply_morphology(mask: &GrayImage, op: MorphOperation, kernel_size: u32) -> GrayImage {
    let k = (kernel_size / 2).min(u8::MAX as u32) as u8;
    if k == 0 {
        return mask.clone();
    }
    match op {
        MorphOperation::Close => morphology::close(mask, Norm::LInf, k),
        MorphOperation::Open => morphology::open(mask, Norm::LInf, k),
        MorphOperation::Dilate => morphology::dilate(mask, Norm::LInf, k),
        MorphOperation::Erode => morphology::erode(mask, Norm::LInf, k),
        MorphOperation::None => mask.clone(),
    }
}

/// Bridge one-pixel gaps in an edge map so outlines close
pub fn close_edge_gaps(edges: &GrayImage) -> GrayImage {
    morphology::dilate(edges, Norm::LInf, 1)
}

/// Blur and contrast stretch
pub fn smooth(gray: &GrayImage, config: &PreprocessConfig) -> GrayImage {
    let blurred = if config.blur_kernel_size > 1 {
        imageproc::filter::gaussian_blur_f32(gray, sigma_for_kernel(config.blur_kernel_size))
    } else {
        gray.clone()
    };
    adjust_contrast(&blurred, config.contrast_factor)
}

/// Smooth, binarize against the background, then apply morphology to the mask
pub fn preprocess(gray: &GrayImage, config: &PreprocessConfig, threshold: u8) -> GrayImage {
    let mask = foreground_mask(&smooth(gray, config), threshold);
    apply_morphology(&mask, config.morph_operation, config.morph_kernel_size)
}

/// True if `edges` has an edge pixel inside `rect` or on its one-pixel rim
pub fn has_edge_near(edges: &GrayImage, rect: &Region) -> bool {
    let Some(area) = rect.inflate(1).clip_to(edges.width(), edges.height()) else {
        return false;
    };
    (area.top()..area.bottom()).any(|y| {
        (area.left()..area.right()).any(|x| edges.get_pixel(x as u32, y as u32).0[0] > 0)
    })
}

// ============================================================
// CONTOURS
// ============================================================

/// An outer contour with its derived geometry
#[derive(Debug, Clone)]
pub struct ContourShape {
    pub points: Vec<Point<i32>>,
    pub bounds: Region,
    pub area: f64,
    pub perimeter: f64,
}

impl ContourShape {
    pub fn from_points(points: Vec<Point<i32>>) -> Option<Self> {
        let bounds = bounding_rect(&points)?;
        let area = polygon_area(&points);
        let perimeter = arc_length(&points);
        Some(Self {
            points,
            bounds,
            area,
            perimeter,
        })
    }

    /// Bounding-box width over height
    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.bounds.aspect_ratio().unwrap_or(f64::INFINITY)
    }

    /// perimeter^2 / area; infinite for a zero-area trace
    #[inline]
    pub fn compactness(&self) -> f64 {
        if self.area > 0.0 {
            self.perimeter * self.perimeter / self.area
        } else {
            f64::INFINITY
        }
    }
}

/// Outermost contours of a binary (edge) image
pub fn external_contours(edges: &GrayImage) -> Vec<ContourShape> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| ContourShape::from_points(c.points))
        .collect()
}

/// Pixel-inclusive bounding rectangle of a point set
pub fn bounding_rect(points: &[Point<i32>]) -> Option<Region> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Region::from_edges(min_x, min_y, max_x + 1, max_y + 1))
}

/// Shoelace area of a closed polygon
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice.abs() as f64 / 2.0
}

/// Perimeter of a closed polygon
pub fn arc_length(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let q = &points[(i + 1) % points.len()];
            let dx = (q.x - p.x) as f64;
            let dy = (q.y - p.y) as f64;
            dx.hypot(dy)
        })
        .sum()
}

/// True if `rect` comes within `margin` pixels of a `width` x `height` frame
#[inline]
pub fn touches_margin(rect: &Region, width: u32, height: u32, margin: u32) -> bool {
    let m = margin as i32;
    rect.left() < m
        || rect.top() < m
        || rect.right() > width as i32 - m
        || rect.bottom() > height as i32 - m
}

// ============================================================
// TESTS
// ============================================================
