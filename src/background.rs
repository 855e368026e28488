//! Ink extraction for photographed marks.
//!
//! A photo of a rubber stamp or a signature on paper is turned into an overlay
//! by estimating the paper color, then classifying every pixel as ink (forced
//! to opaque black) or background (alpha 0). There is no model and no mask
//! input: the paper color comes from the corners plus a coarse scan of bright
//! pixels, and the classification is a handful of fixed luma/color thresholds.
//!
//! The thresholds are empirical and existing outputs depend on them. Faint ink
//! that sits within them is dropped; that is accepted behavior.

use image::{Rgba, RgbaImage};

const MIN_SAMPLE_SPACING: u32 = 5;
const SAMPLE_SPACING_DIVISOR: u32 = 30;
const CORNER_GRID_STEPS: u32 = 3;
const GRID_STRIDE_FACTOR: u32 = 3;
const GRID_SAMPLE_MIN_LUMA: f32 = 170.0;

const DARKER_THAN_BACKGROUND: f32 = -25.0;
const COLOR_DISTANCE_LIMIT: f32 = 40.0;
const TINTED_DARKER_THAN_BACKGROUND: f32 = -15.0;
const EDGE_CONTRAST_LIMIT: f32 = 20.0;
const EDGE_DARKNESS_MARGIN: f32 = 15.0;

const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Reference paper color used for classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundEstimate {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub luma: f32,
    pub sample_count: usize,
}

impl BackgroundEstimate {
    pub const WHITE: Self = Self {
        r: 255.0,
        g: 255.0,
        b: 255.0,
        luma: 255.0,
        sample_count: 0,
    };

    /// True when no pixel qualified as a sample and white was assumed.
    pub fn is_fallback(&self) -> bool {
        self.sample_count == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    r: f32,
    g: f32,
    b: f32,
    luma: f32,
}

impl Sample {
    /// Fully transparent pixels are background by definition and sample as
    /// white paper.
    fn from_pixel(pixel: &Rgba<u8>) -> Self {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            return Self {
                r: 255.0,
                g: 255.0,
                b: 255.0,
                luma: 255.0,
            };
        }
        let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
        Self {
            r,
            g,
            b,
            luma: luma(r, g, b),
        }
    }
}

/// Perceptual brightness with BT.601 weights.
pub fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Spacing between corner samples; the coarse grid uses three times this.
pub fn sample_spacing(width: u32, height: u32) -> u32 {
    (width.min(height) / SAMPLE_SPACING_DIVISOR).max(MIN_SAMPLE_SPACING)
}

pub fn estimate_background(image: &RgbaImage) -> BackgroundEstimate {
    let mut samples = collect_samples(image);
    if samples.is_empty() {
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "no background samples; assuming white paper"
        );
        return BackgroundEstimate::WHITE;
    }

    samples.sort_by(|left, right| left.luma.total_cmp(&right.luma));
    let median = samples[samples.len() / 2];
    BackgroundEstimate {
        r: median.r,
        g: median.g,
        b: median.b,
        luma: median.luma,
        sample_count: samples.len(),
    }
}

fn collect_samples(image: &RgbaImage) -> Vec<Sample> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let spacing = sample_spacing(width, height);
    let mut samples = Vec::new();

    // Corner neighborhoods, walking inward from each corner.
    for (from_right, from_bottom) in [(false, false), (true, false), (false, true), (true, true)] {
        for step_y in 0..CORNER_GRID_STEPS {
            for step_x in 0..CORNER_GRID_STEPS {
                let dx = (step_x * spacing).min(width - 1);
                let dy = (step_y * spacing).min(height - 1);
                let x = if from_right { width - 1 - dx } else { dx };
                let y = if from_bottom { height - 1 - dy } else { dy };
                samples.push(Sample::from_pixel(image.get_pixel(x, y)));
            }
        }
    }

    let stride = (spacing * GRID_STRIDE_FACTOR) as usize;
    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            let sample = Sample::from_pixel(image.get_pixel(x, y));
            if sample.luma > GRID_SAMPLE_MIN_LUMA {
                samples.push(sample);
            }
        }
    }

    samples
}

/// Classify every pixel of `source` against the estimated paper color.
///
/// Ink becomes opaque black; everything else keeps its RGB with alpha 0.
/// Pixels that are already fully transparent are left alone, so running the
/// pass on its own output classifies no new ink.
pub fn remove_background(source: &RgbaImage) -> RgbaImage {
    let background = estimate_background(source);
    let mut output = source.clone();
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return output;
    }

    let lumas = source
        .pixels()
        .map(|pixel| Sample::from_pixel(pixel).luma)
        .collect::<Vec<_>>();
    let stride = width as usize;

    let mut ink_count = 0usize;
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        if pixel[3] == 0 {
            continue;
        }

        let idx = y as usize * stride + x as usize;
        let pixel_luma = lumas[idx];
        let sample = Sample::from_pixel(pixel);
        let color_distance = ((sample.r - background.r).powi(2)
            + (sample.g - background.g).powi(2)
            + (sample.b - background.b).powi(2))
        .sqrt();
        let luma_diff = pixel_luma - background.luma;

        let interior = x > 0 && y > 0 && x + 1 < width && y + 1 < height;
        let max_neighbor_diff = if interior {
            [idx - 1, idx + 1, idx - stride, idx + stride]
                .into_iter()
                .map(|neighbor| (pixel_luma - lumas[neighbor]).abs())
                .fold(0.0_f32, f32::max)
        } else {
            0.0
        };

        if is_ink(
            pixel_luma,
            background.luma,
            luma_diff,
            color_distance,
            max_neighbor_diff,
        ) {
            *pixel = INK;
            ink_count += 1;
        } else {
            pixel[3] = 0;
        }
    }

    tracing::debug!(
        width,
        height,
        ink_count,
        background_luma = background.luma,
        fallback = background.is_fallback(),
        "background removed"
    );
    output
}

fn is_ink(
    pixel_luma: f32,
    background_luma: f32,
    luma_diff: f32,
    color_distance: f32,
    max_neighbor_diff: f32,
) -> bool {
    luma_diff < DARKER_THAN_BACKGROUND
        || (color_distance > COLOR_DISTANCE_LIMIT && luma_diff < TINTED_DARKER_THAN_BACKGROUND)
        || (max_neighbor_diff > EDGE_CONTRAST_LIMIT
            && pixel_luma < background_luma - EDGE_DARKNESS_MARGIN)
}

/// Number of opaque pixels, i.e. ink after [`remove_background`].
pub fn count_opaque(image: &RgbaImage) -> usize {
    image.pixels().filter(|pixel| pixel[3] != 0).count()
}
