//! Classical GrabCut segmentation backend
//!
//! Used when no model session is available. The image is seeded with a
//! central rectangle as probable foreground and everything outside it as
//! definite background. Colour models and a graph cut are then alternated for
//! a fixed number of iterations and the final labels become a binary mask.

pub mod gmm;
pub mod maxflow;

use crate::{
    error::{Result, WhiteBgError},
    inference::SegmentationBackend,
    types::{SegmentationMask, SegmentationOutcome},
};
use gmm::{Color, GaussianMixture};
use image::{DynamicImage, RgbImage};
use maxflow::FlowGraph;

/// Default number of GrabCut iterations
pub const DEFAULT_ITERATIONS: usize = 5;

/// Smoothness weight between neighbouring pixels
const GAMMA: f64 = 50.0;

/// Capacity used to pin definite labels to their terminal
const LAMBDA: f64 = 9.0 * GAMMA;

/// Per-pixel GrabCut label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Background,
    Foreground,
    ProbableBackground,
    ProbableForeground,
}

impl Label {
    /// Whether the label counts as foreground in the final mask
    #[must_use]
    pub fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }

    fn is_probable(self) -> bool {
        matches!(self, Self::ProbableBackground | Self::ProbableForeground)
    }
}

/// Axis-aligned seed rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Central rectangle with a 10% margin on each side
    #[must_use]
    pub fn central(width: u32, height: u32) -> Self {
        Self {
            x: width / 10,
            y: height / 10,
            width: width * 8 / 10,
            height: height * 8 / 10,
        }
    }

    /// Whether the rectangle covers no pixels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether a pixel lies inside the rectangle
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Precomputed smoothness weights towards the already visited neighbours
struct NeighbourWeights {
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

fn color_distance_sq(a: Color, b: Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// `1 / (2 * mean squared neighbour difference)`, or zero for flat images
#[allow(clippy::cast_precision_loss)]
fn compute_beta(colors: &[Color], width: usize, height: usize) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;

    for y in 0..height {
        for x in 0..width {
            let color = colors[y * width + x];
            if x > 0 {
                total += color_distance_sq(color, colors[y * width + x - 1]);
                pairs += 1;
            }
            if y > 0 {
                if x > 0 {
                    total += color_distance_sq(color, colors[(y - 1) * width + x - 1]);
                    pairs += 1;
                }
                total += color_distance_sq(color, colors[(y - 1) * width + x]);
                pairs += 1;
                if x + 1 < width {
                    total += color_distance_sq(color, colors[(y - 1) * width + x + 1]);
                    pairs += 1;
                }
            }
        }
    }

    if pairs == 0 {
        return 0.0;
    }
    let mean = total / pairs as f64;
    if mean <= f64::EPSILON {
        0.0
    } else {
        1.0 / (2.0 * mean)
    }
}

fn compute_neighbour_weights(colors: &[Color], width: usize, height: usize) -> NeighbourWeights {
    let beta = compute_beta(colors, width, height);
    let diagonal_gamma = GAMMA / std::f64::consts::SQRT_2;
    let pixels = width * height;
    let mut weights = NeighbourWeights {
        left: vec![0.0; pixels],
        up_left: vec![0.0; pixels],
        up: vec![0.0; pixels],
        up_right: vec![0.0; pixels],
    };

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let color = colors[index];
            if x > 0 {
                let d = color_distance_sq(color, colors[index - 1]);
                weights.left[index] = GAMMA * (-beta * d).exp();
            }
            if y > 0 {
                if x > 0 {
                    let d = color_distance_sq(color, colors[index - width - 1]);
                    weights.up_left[index] = diagonal_gamma * (-beta * d).exp();
                }
                let d = color_distance_sq(color, colors[index - width]);
                weights.up[index] = GAMMA * (-beta * d).exp();
                if x + 1 < width {
                    let d = color_distance_sq(color, colors[index - width + 1]);
                    weights.up_right[index] = diagonal_gamma * (-beta * d).exp();
                }
            }
        }
    }

    weights
}

fn samples_where(colors: &[Color], labels: &[Label], foreground: bool) -> Vec<Color> {
    colors
        .iter()
        .zip(labels)
        .filter(|(_, label)| label.is_foreground() == foreground)
        .map(|(color, _)| *color)
        .collect()
}

/// Run GrabCut seeded with the central rectangle and return a binary mask
///
/// Mask values are 255 for foreground and 0 for background.
///
/// # Errors
/// - `WhiteBgError::Segmentation` when the seed rectangle is empty or leaves
///   no background pixels to learn from
pub fn segment_mask(image: &RgbImage, iterations: usize) -> Result<SegmentationMask> {
    let (width, height) = image.dimensions();
    let rect = Rect::central(width, height);
    if rect.is_empty() {
        return Err(WhiteBgError::segmentation(format!(
            "Image {width}x{height} is too small to seed GrabCut"
        )));
    }

    let mut labels: Vec<Label> = image
        .enumerate_pixels()
        .map(|(x, y, _)| {
            if rect.contains(x, y) {
                Label::ProbableForeground
            } else {
                Label::Background
            }
        })
        .collect();
    let colors: Vec<Color> = image
        .pixels()
        .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
        .collect();

    let w = width as usize;
    let h = height as usize;
    let weights = compute_neighbour_weights(&colors, w, h);

    let background_samples = samples_where(&colors, &labels, false);
    let foreground_samples = samples_where(&colors, &labels, true);
    let (Some(mut background_model), Some(mut foreground_model)) = (
        GaussianMixture::from_samples(&background_samples),
        GaussianMixture::from_samples(&foreground_samples),
    ) else {
        return Err(WhiteBgError::segmentation(
            "GrabCut seed rectangle leaves no background or foreground samples",
        ));
    };

    for iteration in 0..iterations {
        if iteration > 0 {
            let background_samples = samples_where(&colors, &labels, false);
            let foreground_samples = samples_where(&colors, &labels, true);
            if background_samples.is_empty() || foreground_samples.is_empty() {
                log::debug!("GrabCut converged to a single label after {iteration} iterations");
                break;
            }
            background_model.refine(&background_samples);
            foreground_model.refine(&foreground_samples);
        }

        let mut graph = FlowGraph::new(w * h, w * h * 5);
        for (index, (&label, &color)) in labels.iter().zip(&colors).enumerate() {
            let (from_source, to_sink) = match label {
                Label::ProbableBackground | Label::ProbableForeground => (
                    background_model.negative_log_likelihood(color),
                    foreground_model.negative_log_likelihood(color),
                ),
                Label::Background => (0.0, LAMBDA),
                Label::Foreground => (LAMBDA, 0.0),
            };
            graph.add_terminal_edges(index, from_source, to_sink);

            let x = index % w;
            if x > 0 {
                let weight = weights.left[index];
                graph.add_edge(index, index - 1, weight, weight);
            }
            if index >= w {
                if x > 0 {
                    let weight = weights.up_left[index];
                    graph.add_edge(index, index - w - 1, weight, weight);
                }
                let weight = weights.up[index];
                graph.add_edge(index, index - w, weight, weight);
                if x + 1 < w {
                    let weight = weights.up_right[index];
                    graph.add_edge(index, index - w + 1, weight, weight);
                }
            }
        }

        let flow = graph.max_flow();
        let source_side = graph.source_side();
        let mut changed = 0usize;
        for (label, &in_foreground) in labels.iter_mut().zip(&source_side) {
            if label.is_probable() {
                let relabelled = if in_foreground {
                    Label::ProbableForeground
                } else {
                    Label::ProbableBackground
                };
                if relabelled != *label {
                    changed += 1;
                }
                *label = relabelled;
            }
        }
        log::debug!("GrabCut iteration {}: flow {:.2}, {} labels changed", iteration + 1, flow, changed);
    }

    let data = labels
        .iter()
        .map(|label| if label.is_foreground() { 255 } else { 0 })
        .collect();
    Ok(SegmentationMask::new(data, (width, height)))
}

/// GrabCut fallback behind the `SegmentationBackend` trait
#[derive(Debug, Clone, Default)]
pub struct GrabCutBackend;

impl GrabCutBackend {
    /// Create a backend running the default number of iterations
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SegmentationBackend for GrabCutBackend {
    fn segment(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        let start = instant::Instant::now();
        let mask = segment_mask(&image.to_rgb8(), DEFAULT_ITERATIONS)?;
        log::debug!(
            "GrabCut finished in {:.0}ms, foreground ratio {:.2}",
            start.elapsed().as_secs_f64() * 1000.0,
            mask.foreground_ratio()
        );
        Ok(DynamicImage::ImageRgba8(mask.cutout(image)?))
    }

    fn kind(&self) -> SegmentationOutcome {
        SegmentationOutcome::Classical
    }

    fn name(&self) -> &'static str {
        "grabcut"
    }
}
