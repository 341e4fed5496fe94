//! Shared test utilities: synthetic candlestick charts.

use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use kline_vision::prelude::*;

#[allow(dead_code)]
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
#[allow(dead_code)]
pub const DARK: Rgb<u8> = Rgb([20, 24, 32]);
#[allow(dead_code)]
pub const RED: Rgb<u8> = Rgb([220, 20, 20]);
#[allow(dead_code)]
pub const GREEN: Rgb<u8> = Rgb([30, 180, 60]);

/// A candle to draw, in image coordinates
#[derive(Debug, Clone, Copy)]
pub struct CandleSpec {
    /// Left edge of the body
    pub x: i32,
    pub body_width: u32,
    pub wick_width: u32,
    /// Top of the upper wick (the high)
    pub high: i32,
    pub body_top: i32,
    /// Exclusive bottom of the body
    pub body_bottom: i32,
    /// Exclusive bottom of the lower wick (the low)
    pub low: i32,
    pub color: Rgb<u8>,
}

#[allow(dead_code)]
impl CandleSpec {
    /// Body 40 wide, wick 2 wide, full rows `high..low`
    pub fn new(x: i32, high: i32, body_top: i32, body_bottom: i32, low: i32, color: Rgb<u8>) -> Self {
        Self {
            x,
            body_width: 40,
            wick_width: 2,
            high,
            body_top,
            body_bottom,
            low,
            color,
        }
    }

    pub fn full(&self) -> Region {
        Region::from_edges(self.x, self.high, self.x + self.body_width as i32, self.low)
    }

    pub fn body(&self) -> Region {
        Region::from_edges(
            self.x,
            self.body_top,
            self.x + self.body_width as i32,
            self.body_bottom,
        )
    }

    /// The full box plus `margin` pixels of background on each side
    pub fn region(&self, margin: i32) -> Region {
        self.full().inflate(margin)
    }

    pub fn draw(&self, image: &mut RgbImage) {
        let wick_x = self.x + (self.body_width as i32 - self.wick_width as i32) / 2;
        draw_filled_rect_mut(
            image,
            Rect::at(wick_x, self.high).of_size(self.wick_width, (self.low - self.high) as u32),
            self.color,
        );
        draw_filled_rect_mut(
            image,
            Rect::at(self.x, self.body_top)
                .of_size(self.body_width, (self.body_bottom - self.body_top) as u32),
            self.color,
        );
    }
}

/// Draw `candles` on a `width` x `height` canvas of `background`
#[allow(dead_code)]
pub fn chart(width: u32, height: u32, background: Rgb<u8>, candles: &[CandleSpec]) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, background);
    for candle in candles {
        candle.draw(&mut image);
    }
    image
}

/// Normal red candle: full rows 20..220, body rows 80..160, centered in 80x240
#[allow(dead_code)]
pub fn normal_candle() -> (RgbImage, CandleSpec) {
    let spec = CandleSpec::new(20, 20, 80, 160, 220, RED);
    (chart(80, 240, WHITE, &[spec]), spec)
}

/// `n` evenly spaced candles alternating red and green, left to right
#[allow(dead_code)]
pub fn candle_row(n: usize) -> (RgbImage, Vec<CandleSpec>) {
    let specs: Vec<CandleSpec> = (0..n)
        .map(|i| {
            let x = 20 + i as i32 * 70;
            let color = if i % 2 == 0 { RED } else { GREEN };
            let shift = (i as i32 % 3) * 10;
            CandleSpec::new(x, 20 + shift, 70 + shift, 150 + shift, 220 + shift, color)
        })
        .collect();
    let width = 40 + n as u32 * 70;
    (chart(width, 260, WHITE, &specs), specs)
}

/// |a - b| <= tol for region edges
#[allow(dead_code)]
pub fn region_close(a: Region, b: Region, tol: i32) -> bool {
    (a.left() - b.left()).abs() <= tol
        && (a.top() - b.top()).abs() <= tol
        && (a.right() - b.right()).abs() <= tol
        && (a.bottom() - b.bottom()).abs() <= tol
}
