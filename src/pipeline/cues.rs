//! Structural cue extractors used as conditioning images.
//!
//! Each extractor maps a normalized RGB tensor to a three-channel cue tensor
//! of the same size in [-1, 1]; [`fill_img_with_cue`] then writes the cue
//! into the masked region of the image.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::edges::canny;
use imageproc::gradients::sobel_gradients;
use imageproc::hough::{detect_lines, draw_polar_lines, LineDetectionOptions};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::{ImageTensor, MaskTensor, RGB_CHANNELS};
use crate::model::{extract_array4, load_session, Device};

use super::fill::check_same_size;

/// Produces a structural cue from an image.
pub trait CueExtractor {
    /// # Errors
    ///
    /// Returns an error if the cue cannot be computed.
    fn extract(&mut self, img: &ImageTensor) -> Result<ImageTensor>;
}

/// Canny edge map, white edges on black.
#[derive(Debug, Clone, Copy)]
pub struct CannyCue {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl Default for CannyCue {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 100.0,
        }
    }
}

impl CueExtractor for CannyCue {
    fn extract(&mut self, img: &ImageTensor) -> Result<ImageTensor> {
        let gray = to_gray(img);
        let edges = canny(&gray, self.low_threshold, self.high_threshold);
        Ok(gray_to_cue(&edges))
    }
}

/// Pencil-style sketch: dark strokes where the gradient is strong.
#[derive(Debug, Clone, Copy, Default)]
pub struct SketchCue;

impl CueExtractor for SketchCue {
    #[allow(clippy::cast_possible_truncation)]
    fn extract(&mut self, img: &ImageTensor) -> Result<ImageTensor> {
        let gradients = sobel_gradients(&to_gray(img));

        let sketch = GrayImage::from_fn(gradients.width(), gradients.height(), |x, y| {
            let magnitude = gradients.get_pixel(x, y)[0].min(255);
            // Safe: magnitude is capped at 255
            Luma([255 - magnitude as u8])
        });
        Ok(gray_to_cue(&sketch))
    }
}

/// Straight lines found by a Hough transform over Canny edges.
#[derive(Debug, Clone, Copy)]
pub struct HoughCue {
    pub canny: CannyCue,
    pub vote_threshold: u32,
    pub suppression_radius: u32,
}

impl Default for HoughCue {
    fn default() -> Self {
        Self {
            canny: CannyCue::default(),
            vote_threshold: 40,
            suppression_radius: 8,
        }
    }
}

impl CueExtractor for HoughCue {
    fn extract(&mut self, img: &ImageTensor) -> Result<ImageTensor> {
        let gray = to_gray(img);
        let edges = canny(&gray, self.canny.low_threshold, self.canny.high_threshold);
        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold: self.vote_threshold,
                suppression_radius: self.suppression_radius,
            },
        );
        tracing::debug!("Hough transform found {} lines", lines.len());

        let canvas = GrayImage::new(gray.width(), gray.height());
        let drawn = draw_polar_lines(&canvas, &lines, Luma([255]));
        Ok(gray_to_cue(&drawn))
    }
}

/// Cue computed by an ONNX network (HED edges, monocular depth).
///
/// The first output is min-max normalized, resized to the input size and
/// replicated to three channels.
pub struct OnnxCue {
    session: Session,
}

impl OnnxCue {
    /// Load an extractor network.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded.
    pub fn load(path: &Path, device: Device) -> Result<Self> {
        tracing::info!("Loading cue extractor {}", path.display());
        Ok(Self {
            session: load_session(path, device)?,
        })
    }
}

impl CueExtractor for OnnxCue {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn extract(&mut self, img: &ImageTensor) -> Result<ImageTensor> {
        let (_, _, height, width) = img.dim();

        let input =
            Tensor::from_array(img.clone()).map_err(|source| Error::Inference { source })?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|source| Error::Inference { source })?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "cue output".to_string(),
                actual: "no output".to_string(),
            })?;
        let raw = extract_array4(&output)?;
        let (_, _, oh, ow) = raw.dim();

        let min = raw.iter().copied().fold(f32::INFINITY, f32::min);
        let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = (max - min).max(f32::EPSILON);

        // Safe: the extractor output comes from u32-sized images
        let map = GrayImage::from_fn(ow as u32, oh as u32, |x, y| {
            let v = (raw[[0, 0, y as usize, x as usize]] - min) / range;
            Luma([(v * 255.0).clamp(0.0, 255.0) as u8])
        });
        let map = if (ow, oh) == (width, height) {
            map
        } else {
            imageops::resize(&map, width as u32, height as u32, FilterType::Triangle)
        };

        Ok(gray_to_cue(&map))
    }
}

/// Replace the masked region of `img` with `cue`.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the tensors disagree in size.
pub fn fill_img_with_cue(
    img: &ImageTensor,
    mask: &MaskTensor,
    cue: &ImageTensor,
) -> Result<ImageTensor> {
    check_same_size(img, mask)?;
    if img.dim() != cue.dim() {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", img.dim()),
            actual: format!("{:?}", cue.dim()),
        });
    }

    let mut out = img.clone();
    for ((b, c, y, x), value) in out.indexed_iter_mut() {
        if mask[[0, 0, y, x]] > 0.0 {
            *value = cue[[b, c, y, x]];
        }
    }
    Ok(out)
}

/// Convert the first sample of an RGB tensor to 8-bit luma.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_gray(image: &ImageTensor) -> GrayImage {
    let (_, _, height, width) = image.dim();

    // Safe: tensors are built from u32-sized images
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let r = (image[[0, 0, y, x]] + 1.0) * 127.5;
        let g = (image[[0, 1, y, x]] + 1.0) * 127.5;
        let b = (image[[0, 2, y, x]] + 1.0) * 127.5;

        // Standard luminosity formula: 0.299*R + 0.587*G + 0.114*B
        let luma = 0.299_f32.mul_add(r, 0.587_f32.mul_add(g, 0.114 * b));
        Luma([luma.clamp(0.0, 255.0) as u8])
    })
}

/// Spread a grayscale map over three normalized channels.
fn gray_to_cue(gray: &GrayImage) -> ImageTensor {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, RGB_CHANNELS, height, width));

    for (x, y, pixel) in gray.enumerate_pixels() {
        let v = (f32::from(pixel[0]) / 127.5) - 1.0;
        for c in 0..RGB_CHANNELS {
            tensor[[0, c, y as usize, x as usize]] = v;
        }
    }

    tensor
}
