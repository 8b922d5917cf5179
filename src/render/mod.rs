//! # Image Renderer
//!
//! Turns a transform matrix into a colour-mapped PNG. Rendering is a pure
//! function of its inputs, so any number of threads can render at once.

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::dsp::stats::quantile_sorted;
use crate::dsp::Matrix;
use crate::error::TransformError;
use crate::transforms::TransformKind;

pub mod colormap;

pub use colormap::Colormap;

/// How matrix values are mapped onto [0, 1] before colouring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Normalization {
    MinMax,
    /// Clip to the given percentiles (0-100) first
    Percentile { low: f32, high: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderStyle {
    pub colormap: Colormap,
    pub normalization: Normalization,
}

impl RenderStyle {
    /// Palette and scaling for one transform view
    pub fn for_kind(kind: TransformKind, config: &RenderConfig) -> Self {
        let (colormap, normalization) = match kind {
            TransformKind::Mel => (Colormap::Viridis, Normalization::MinMax),
            TransformKind::Cqt => (Colormap::Plasma, Normalization::MinMax),
            TransformKind::LogStft => (Colormap::Inferno, Normalization::MinMax),
            TransformKind::Wavelet => (Colormap::Magma, Normalization::MinMax),
            TransformKind::Kurtosis => {
                let (low, high) = config.kurtosis_percentiles;
                (Colormap::RdYlBuR, Normalization::Percentile { low, high })
            }
            TransformKind::Modulation => (Colormap::Hot, Normalization::MinMax),
        };
        Self { colormap, normalization }
    }
}

/// Encoded PNG plus its pixel size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    width: u32,
    height: u32,
    png: Vec<u8>,
}

impl RenderedImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// PNG-encoded bytes
    pub fn png(&self) -> &[u8] {
        &self.png
    }
}

/// Value range that maps onto the colour scale
fn value_range(matrix: &Matrix, normalization: Normalization) -> (f32, f32) {
    match normalization {
        Normalization::MinMax => matrix.min_max(),
        Normalization::Percentile { low, high } => {
            let mut sorted = matrix.data().to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            (
                quantile_sorted(&sorted, low as f64 / 100.0),
                quantile_sorted(&sorted, high as f64 / 100.0),
            )
        }
    }
}

/// Render `matrix` to a `width x height` PNG.
///
/// Sampling is nearest-neighbour; row 0 (lowest frequency) is drawn at the
/// bottom. A matrix without spread is drawn at mid-scale.
pub fn render(matrix: &Matrix, style: &RenderStyle, width: u32, height: u32) -> Result<RenderedImage, TransformError> {
    if matrix.is_empty() {
        return Err(TransformError::Render {
            reason: "cannot render an empty matrix".to_string(),
        });
    }
    if width == 0 || height == 0 {
        return Err(TransformError::Render {
            reason: format!("invalid image size {}x{}", width, height),
        });
    }

    let (lo, hi) = value_range(matrix, style.normalization);
    let span = hi - lo;
    let flat = !(span.is_finite() && span > f32::EPSILON * lo.abs().max(hi.abs()).max(1.0));

    let rows = matrix.rows();
    let cols = matrix.cols();
    let image = RgbImage::from_fn(width, height, |x, y| {
        let col = (x as usize * cols / width as usize).min(cols - 1);
        let row = rows - 1 - (y as usize * rows / height as usize).min(rows - 1);
        let t = if flat {
            0.5
        } else {
            (matrix.get(row, col) - lo) / span
        };
        Rgb(style.colormap.sample(t))
    });

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(image.as_raw(), width, height, ColorType::Rgb8)
        .map_err(|e| TransformError::Render { reason: e.to_string() })?;

    Ok(RenderedImage { width, height, png })
}
