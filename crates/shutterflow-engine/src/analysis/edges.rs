//! Edge detection for composition and scene analysis.
//!
//! A Canny-style detector: 3×3 Sobel gradients with L1 magnitude,
//! non-maximum suppression along the quantized gradient direction, and
//! double-threshold hysteresis. Edge pixels are 255, everything else 0.

use image::GrayImage;

/// Gradient magnitude below which a pixel is never an edge.
pub const LOW_THRESHOLD: i32 = 50;

/// Gradient magnitude above which a pixel always seeds an edge.
pub const HIGH_THRESHOLD: i32 = 150;

/// Value written for edge pixels.
pub const EDGE: u8 = 255;

/// tan(22.5°) and tan(67.5°) scaled by 2^15, for integer direction binning.
const TAN_22_5: i64 = 13_573;
const TAN_67_5: i64 = 79_109;

#[derive(Clone, Copy)]
enum Direction {
    Horizontal,
    Vertical,
    /// Gradient runs top-left to bottom-right.
    Falling,
    /// Gradient runs bottom-left to top-right.
    Rising,
}

fn direction(gx: i32, gy: i32) -> Direction {
    let ax = i64::from(gx.abs());
    let ay = i64::from(gy.abs()) << 15;
    if ay < ax * TAN_22_5 {
        Direction::Horizontal
    } else if ay > ax * TAN_67_5 {
        Direction::Vertical
    } else if (gx < 0) == (gy < 0) {
        Direction::Falling
    } else {
        Direction::Rising
    }
}

/// Runs the detector over a grayscale image.
#[must_use]
pub fn detect_edges(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut edges = GrayImage::new(width, height);
    if w < 3 || h < 3 {
        return edges;
    }

    let px = |x: usize, y: usize| -> i32 { i32::from(gray.as_raw()[y * w + x]) };

    // Sobel, border pixels left at zero.
    let mut magnitude = vec![0_i32; w * h];
    let mut directions = vec![Direction::Horizontal; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (px(x + 1, y - 1) + 2 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2 * px(x - 1, y) + px(x - 1, y + 1));
            let gy = (px(x - 1, y + 1) + 2 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2 * px(x, y - 1) + px(x + 1, y - 1));
            magnitude[y * w + x] = gx.abs() + gy.abs();
            directions[y * w + x] = direction(gx, gy);
        }
    }

    // Non-maximum suppression. The first neighbor must be strictly smaller so
    // a two-pixel-wide ridge keeps exactly one pixel.
    let mag = |x: usize, y: usize| magnitude[y * w + x];
    let mut candidates = vec![0_u8; w * h];
    let mut stack = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let m = mag(x, y);
            if m <= LOW_THRESHOLD {
                continue;
            }
            let (before, after) = match directions[y * w + x] {
                Direction::Horizontal => (mag(x - 1, y), mag(x + 1, y)),
                Direction::Vertical => (mag(x, y - 1), mag(x, y + 1)),
                Direction::Falling => (mag(x - 1, y - 1), mag(x + 1, y + 1)),
                Direction::Rising => (mag(x + 1, y - 1), mag(x - 1, y + 1)),
            };
            if m > before && m >= after {
                if m > HIGH_THRESHOLD {
                    candidates[y * w + x] = 2;
                    stack.push((x, y));
                } else {
                    candidates[y * w + x] = 1;
                }
            }
        }
    }

    // Hysteresis: grow strong pixels through 8-connected weak ones.
    let out: &mut [u8] = &mut edges;
    while let Some((x, y)) = stack.pop() {
        out[y * w + x] = EDGE;
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let idx = ny * w + nx;
                if candidates[idx] == 1 {
                    candidates[idx] = 2;
                    stack.push((nx, ny));
                }
            }
        }
    }

    edges
}

/// Counts edge pixels.
#[must_use]
pub fn count_edges(edges: &GrayImage) -> u64 {
    edges.as_raw().iter().filter(|&&v| v > 0).count() as u64
}
