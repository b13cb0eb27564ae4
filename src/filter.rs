//! Canny edge detection over RGBA images.
//!
//! The filter works on a greyscale projection of the input and runs, in
//! order: an optional 5x5 Gaussian pre-blur, 3x3 Sobel gradients,
//! non-maximum suppression along the quantized gradient direction, and
//! hysteresis thresholding with 8-connected flood fill.
//!
//! All stages use replicated borders. Intermediate values are integers
//! except the blur, which accumulates in `f32` and rounds half up, so the
//! output is deterministic for a given input and [`FilterParameters`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::{BYTES_PER_PIXEL, PackedImage};

/// Colour written for edge pixels.
pub const EDGE: [u8; 4] = [255, 255, 255, 255];
/// Colour written for everything else.
pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

const BLUR_TAPS: usize = 5;
/// tan(22.5°) in Q15.
const TG22: i32 = 13573;

/// How the gradient magnitude is computed from its two components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GradientNorm {
    /// `|gx| + |gy|`
    #[default]
    L1,
    /// `sqrt(gx² + gy²)`
    L2,
}

/// Tunables for [`EdgeFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterParameters {
    /// Gradient magnitudes below this are never edges.
    pub low_threshold: f32,
    /// Gradient magnitudes at or above this are always edges. Magnitudes
    /// in between are edges only when connected to one.
    pub high_threshold: f32,
    /// Sigma of the Gaussian pre-blur, `None` to skip it.
    pub blur_sigma: Option<f32>,
    pub gradient_norm: GradientNorm,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            low_threshold: 100.0,
            high_threshold: 200.0,
            blur_sigma: Some(1.2),
            gradient_norm: GradientNorm::L1,
        }
    }
}

impl FilterParameters {
    pub fn validate(&self) -> Result<()> {
        let (low, high) = (self.low_threshold, self.high_threshold);
        if !low.is_finite() || !high.is_finite() {
            return Err(Error::InvalidConfig("thresholds must be finite"));
        }
        if low < 0.0 {
            return Err(Error::InvalidConfig("low threshold must not be negative"));
        }
        if low > high {
            return Err(Error::InvalidConfig("low threshold exceeds high threshold"));
        }
        if let Some(sigma) = self.blur_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(Error::InvalidConfig("blur sigma must be positive"));
            }
        }
        Ok(())
    }

    /// Thresholds in the units of the stored magnitude: plain for L1,
    /// squared for L2. Magnitudes are integers, so rounding the threshold up
    /// keeps `m >= threshold` exact.
    fn magnitude_thresholds(&self) -> (i64, i64) {
        let scale = |t: f32| match self.gradient_norm {
            GradientNorm::L1 => f64::from(t).ceil() as i64,
            GradientNorm::L2 => (f64::from(t) * f64::from(t)).ceil() as i64,
        };
        (scale(self.low_threshold), scale(self.high_threshold))
    }
}

/// Quantized gradient direction, named by the axis the gradient runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Direction {
    #[default]
    Horizontal,
    Vertical,
    /// Top-left to bottom-right.
    Diagonal,
    /// Top-right to bottom-left.
    AntiDiagonal,
}

impl Direction {
    fn quantize(gx: i32, gy: i32) -> Self {
        let (ax, ay) = (gx.abs(), gy.abs());
        let tg22x = ax * TG22;
        let tg67x = tg22x + (ax << 16);
        let ay = ay << 15;
        if ay < tg22x {
            Self::Horizontal
        } else if ay > tg67x {
            Self::Vertical
        } else if (gx < 0) == (gy < 0) {
            Self::Diagonal
        } else {
            Self::AntiDiagonal
        }
    }

    /// Offsets of the two neighbours compared during suppression. The
    /// first must be strictly smaller, the second smaller or equal, so a
    /// flat two-pixel ridge keeps exactly one pixel.
    fn neighbours(self) -> [(isize, isize); 2] {
        match self {
            Self::Horizontal => [(-1, 0), (1, 0)],
            Self::Vertical => [(0, -1), (0, 1)],
            Self::Diagonal => [(-1, -1), (1, 1)],
            Self::AntiDiagonal => [(1, -1), (-1, 1)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Label {
    #[default]
    Suppressed,
    Weak,
    Edge,
}

#[derive(Debug, Default)]
struct Scratch {
    grey: Vec<u8>,
    blur_row: Vec<f32>,
    blurred: Vec<u8>,
    magnitude: Vec<i32>,
    direction: Vec<Direction>,
    labels: Vec<Label>,
    stack: Vec<usize>,
}

/// A reusable edge detector. Scratch buffers are kept between calls.
#[derive(Debug)]
pub struct EdgeFilter {
    params: FilterParameters,
    kernel: Option<[f32; BLUR_TAPS]>,
    low: i64,
    high: i64,
    scratch: Scratch,
}

impl EdgeFilter {
    pub fn new(params: FilterParameters) -> Result<Self> {
        params.validate()?;
        let (low, high) = params.magnitude_thresholds();
        Ok(Self {
            params,
            kernel: params.blur_sigma.map(gaussian_kernel),
            low,
            high,
            scratch: Scratch::default(),
        })
    }

    pub fn parameters(&self) -> &FilterParameters {
        &self.params
    }

    /// Detect edges in `src`, returning a new image of the same size.
    pub fn apply(&mut self, src: &PackedImage) -> Result<PackedImage> {
        let mut dst = PackedImage::empty();
        self.apply_into(src, &mut dst)?;
        Ok(dst)
    }

    /// Detect edges in `src`, writing the result into `dst`.
    pub fn apply_into(&mut self, src: &PackedImage, dst: &mut PackedImage) -> Result<()> {
        let size = src.size();
        dst.reshape(size)?;
        let (w, h) = (size.width as usize, size.height as usize);
        if w == 0 || h == 0 {
            return Ok(());
        }

        let s = &mut self.scratch;
        greyscale(src.as_bytes(), &mut s.grey);
        let intensity = match &self.kernel {
            Some(kernel) => {
                blur(&s.grey, w, h, kernel, &mut s.blur_row, &mut s.blurred);
                &s.blurred
            }
            None => &s.grey,
        };
        gradients(
            intensity,
            w,
            h,
            self.params.gradient_norm,
            &mut s.magnitude,
            &mut s.direction,
        );
        suppress(&s.magnitude, &s.direction, w, h, self.low, self.high, &mut s.labels);
        hysteresis(&mut s.labels, w, h, &mut s.stack);

        for (px, label) in dst
            .as_bytes_mut()
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(&s.labels)
        {
            px.copy_from_slice(if *label == Label::Edge { &EDGE } else { &BACKGROUND });
        }
        Ok(())
    }
}

/// One-shot edge detection with a fresh [`EdgeFilter`].
pub fn detect_edges(src: &PackedImage, params: &FilterParameters) -> Result<PackedImage> {
    EdgeFilter::new(*params)?.apply(src)
}

fn greyscale(rgba: &[u8], grey: &mut Vec<u8>) {
    grey.clear();
    grey.extend(rgba.chunks_exact(BYTES_PER_PIXEL).map(|px| {
        let y = 4899 * u32::from(px[0]) + 9617 * u32::from(px[1]) + 1868 * u32::from(px[2]);
        ((y + (1 << 13)) >> 14) as u8
    }));
}

fn gaussian_kernel(sigma: f32) -> [f32; BLUR_TAPS] {
    let centre = (BLUR_TAPS / 2) as f32;
    let mut kernel = [0.0; BLUR_TAPS];
    for (i, k) in kernel.iter_mut().enumerate() {
        let d = i as f32 - centre;
        *k = (-(d * d) / (2.0 * sigma * sigma)).exp();
    }
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

#[inline]
fn clamped(i: usize, delta: isize, len: usize) -> usize {
    i.saturating_add_signed(delta).min(len - 1)
}

/// Separable Gaussian blur with replicated borders.
fn blur(
    src: &[u8],
    w: usize,
    h: usize,
    kernel: &[f32; BLUR_TAPS],
    tmp: &mut Vec<f32>,
    dst: &mut Vec<u8>,
) {
    let radius = (BLUR_TAPS / 2) as isize;
    tmp.clear();
    tmp.resize(w * h, 0.0);
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            tmp[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * f32::from(row[clamped(x, k as isize - radius, w)]))
                .sum();
        }
    }
    dst.clear();
    dst.resize(w * h, 0);
    for y in 0..h {
        for x in 0..w {
            let v: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * tmp[clamped(y, k as isize - radius, h) * w + x])
                .sum();
            dst[y * w + x] = (v + 0.5).floor().clamp(0.0, 255.0) as u8;
        }
    }
}

/// 3x3 Sobel gradients with replicated borders.
fn gradients(
    src: &[u8],
    w: usize,
    h: usize,
    norm: GradientNorm,
    magnitude: &mut Vec<i32>,
    direction: &mut Vec<Direction>,
) {
    magnitude.clear();
    magnitude.resize(w * h, 0);
    direction.clear();
    direction.resize(w * h, Direction::default());
    let at = |x: usize, dx: isize, y: usize, dy: isize| {
        i32::from(src[clamped(y, dy, h) * w + clamped(x, dx, w)])
    };
    for y in 0..h {
        for x in 0..w {
            let gx = (at(x, 1, y, -1) + 2 * at(x, 1, y, 0) + at(x, 1, y, 1))
                - (at(x, -1, y, -1) + 2 * at(x, -1, y, 0) + at(x, -1, y, 1));
            let gy = (at(x, -1, y, 1) + 2 * at(x, 0, y, 1) + at(x, 1, y, 1))
                - (at(x, -1, y, -1) + 2 * at(x, 0, y, -1) + at(x, 1, y, -1));
            let i = y * w + x;
            magnitude[i] = match norm {
                GradientNorm::L1 => gx.abs() + gy.abs(),
                GradientNorm::L2 => gx * gx + gy * gy,
            };
            direction[i] = Direction::quantize(gx, gy);
        }
    }
}

/// Non-maximum suppression followed by the two-threshold classification.
fn suppress(
    magnitude: &[i32],
    direction: &[Direction],
    w: usize,
    h: usize,
    low: i64,
    high: i64,
    labels: &mut Vec<Label>,
) {
    labels.clear();
    labels.resize(w * h, Label::Suppressed);
    // Neighbours outside the image count as zero.
    let neighbour = |x: usize, y: usize, (dx, dy): (isize, isize)| -> i32 {
        match (x.checked_add_signed(dx), y.checked_add_signed(dy)) {
            (Some(nx), Some(ny)) if nx < w && ny < h => magnitude[ny * w + nx],
            _ => 0,
        }
    };
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if i64::from(m) < low {
                continue;
            }
            let [before, after] = direction[i].neighbours();
            if m > neighbour(x, y, before) && m >= neighbour(x, y, after) {
                labels[i] = if i64::from(m) >= high {
                    Label::Edge
                } else {
                    Label::Weak
                };
            }
        }
    }
}

/// Promote weak pixels 8-connected to an edge, transitively.
fn hysteresis(labels: &mut [Label], w: usize, h: usize, stack: &mut Vec<usize>) {
    stack.clear();
    stack.extend(
        labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == Label::Edge)
            .map(|(i, _)| i),
    );
    while let Some(i) = stack.pop() {
        let (x, y) = (i % w, i / w);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (Some(nx), Some(ny)) = (x.checked_add_signed(dx), y.checked_add_signed(dy))
                else {
                    continue;
                };
                if nx >= w || ny >= h {
                    continue;
                }
                let n = ny * w + nx;
                if labels[n] == Label::Weak {
                    labels[n] = Label::Edge;
                    stack.push(n);
                }
            }
        }
    }
    for label in labels.iter_mut() {
        if *label == Label::Weak {
            *label = Label::Suppressed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    fn sharp() -> FilterParameters {
        FilterParameters {
            blur_sigma: None,
            ..FilterParameters::default()
        }
    }

    /// Grey image whose left half is `left` and right half is `right`,
    /// with an optional different right value for the bottom half.
    fn step(size: Size, left: u8, right_top: u8, right_bottom: u8) -> PackedImage {
        let (w, h) = (size.width, size.height);
        let mut data = Vec::with_capacity(size.pixel_count() * 4);
        for y in 0..h {
            for x in 0..w {
                let v = match (x < w / 2, y < h / 2) {
                    (true, _) => left,
                    (false, true) => right_top,
                    (false, false) => right_bottom,
                };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        PackedImage::from_rgba(size, data).unwrap()
    }

    fn edge_columns(image: &PackedImage, y: u32) -> Vec<u32> {
        (0..image.width())
            .filter(|&x| image.pixel(x, y) == EDGE)
            .collect()
    }

    #[test]
    fn black_input_has_no_edges() {
        let black = step(Size::new(16, 16), 0, 0, 0);
        for params in [sharp(), FilterParameters::default()] {
            let out = detect_edges(&black, &params).unwrap();
            assert_eq!(out.size(), black.size());
            assert!(out.pixels().all(|px| px == BACKGROUND));
        }
    }

    #[test]
    fn vertical_step_marks_one_column() {
        let image = step(Size::new(8, 8), 0, 255, 255);
        let out = detect_edges(&image, &sharp()).unwrap();
        for y in 0..8 {
            assert_eq!(edge_columns(&out, y), vec![3], "row {y}");
        }
    }

    #[test]
    fn blurred_step_stays_one_pixel_wide() {
        let image = step(Size::new(16, 10), 0, 255, 255);
        let out = detect_edges(&image, &FilterParameters::default()).unwrap();
        for y in 0..10 {
            let cols = edge_columns(&out, y);
            assert_eq!(cols.len(), 1, "row {y}: {cols:?}");
            assert!((7..=8).contains(&cols[0]), "row {y}: {cols:?}");
        }
    }

    #[test]
    fn weak_step_alone_is_suppressed() {
        // A 40-level step gives magnitude 160: between the thresholds.
        let image = step(Size::new(8, 8), 0, 40, 40);
        let out = detect_edges(&image, &sharp()).unwrap();
        assert!(out.pixels().all(|px| px == BACKGROUND));
    }

    #[test]
    fn weak_step_connected_to_strong_step_is_promoted() {
        let image = step(Size::new(8, 8), 0, 255, 40);
        let out = detect_edges(&image, &sharp()).unwrap();
        assert_eq!(edge_columns(&out, 0), vec![3]);
        assert_eq!(edge_columns(&out, 7), vec![3]);
    }

    #[test]
    fn lower_high_threshold_accepts_weak_step() {
        let image = step(Size::new(8, 8), 0, 40, 40);
        let params = FilterParameters {
            low_threshold: 50.0,
            high_threshold: 150.0,
            ..sharp()
        };
        let out = detect_edges(&image, &params).unwrap();
        assert_eq!(edge_columns(&out, 4), vec![3]);
    }

    #[test]
    fn l2_norm_thresholds_on_euclidean_magnitude() {
        // Horizontal gradient only, so L1 and L2 magnitudes agree at 160.
        let image = step(Size::new(8, 8), 0, 40, 40);
        let params = FilterParameters {
            low_threshold: 100.0,
            high_threshold: 160.0,
            gradient_norm: GradientNorm::L2,
            ..sharp()
        };
        let out = detect_edges(&image, &params).unwrap();
        assert_eq!(edge_columns(&out, 2), vec![3]);
        let params = FilterParameters {
            high_threshold: 160.5,
            ..params
        };
        let out = detect_edges(&image, &params).unwrap();
        assert!(out.pixels().all(|px| px == BACKGROUND));
    }

    #[test]
    fn repeated_application_is_identical() {
        let image = step(Size::new(24, 18), 10, 200, 90);
        let mut filter = EdgeFilter::new(FilterParameters::default()).unwrap();
        let first = filter.apply(&image).unwrap();
        let second = filter.apply(&image).unwrap();
        let fresh = detect_edges(&image, &FilterParameters::default()).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.as_bytes(), fresh.as_bytes());
    }

    #[test]
    fn output_is_opaque_and_binary() {
        let image = step(Size::new(9, 7), 0, 255, 120);
        let out = detect_edges(&image, &FilterParameters::default()).unwrap();
        assert!(out.pixels().all(|px| px == EDGE || px == BACKGROUND));
    }

    #[test]
    fn tiny_images_do_not_panic() {
        for size in [Size::new(1, 1), Size::new(1, 5), Size::new(5, 1), Size::new(0, 0)] {
            let image = PackedImage::new(size).unwrap();
            let out = detect_edges(&image, &FilterParameters::default()).unwrap();
            assert_eq!(out.size(), size);
        }
    }

    #[test]
    fn hysteresis_follows_chains_to_a_fixed_point() {
        use Label::{Edge, Suppressed, Weak};
        // A diagonal chain of weak pixels hanging off an edge, plus an
        // isolated weak pixel in the far corner.
        #[rustfmt::skip]
        let mut labels = vec![
            Edge,       Suppressed, Suppressed, Suppressed, Suppressed,
            Suppressed, Weak,       Suppressed, Suppressed, Suppressed,
            Suppressed, Suppressed, Weak,       Weak,       Suppressed,
            Suppressed, Suppressed, Suppressed, Suppressed, Suppressed,
            Suppressed, Suppressed, Suppressed, Suppressed, Weak,
        ];
        hysteresis(&mut labels, 5, 5, &mut Vec::new());
        assert_eq!(labels[6], Edge);
        assert_eq!(labels[12], Edge);
        assert_eq!(labels[13], Edge);
        assert_eq!(labels[24], Suppressed);
    }

    #[test]
    fn direction_quantization() {
        assert_eq!(Direction::quantize(100, 0), Direction::Horizontal);
        assert_eq!(Direction::quantize(0, -100), Direction::Vertical);
        assert_eq!(Direction::quantize(100, 100), Direction::Diagonal);
        assert_eq!(Direction::quantize(-100, -90), Direction::Diagonal);
        assert_eq!(Direction::quantize(100, -100), Direction::AntiDiagonal);
        assert_eq!(Direction::quantize(100, 40), Direction::Horizontal);
        assert_eq!(Direction::quantize(40, 100), Direction::Vertical);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let params = FilterParameters {
            low_threshold: 300.0,
            ..FilterParameters::default()
        };
        assert!(matches!(EdgeFilter::new(params), Err(Error::InvalidConfig(_))));
        let params = FilterParameters {
            blur_sigma: Some(0.0),
            ..FilterParameters::default()
        };
        assert!(matches!(EdgeFilter::new(params), Err(Error::InvalidConfig(_))));
    }
}
