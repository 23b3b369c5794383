//! Conditioning image construction.

use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

use crate::error::{Error, Result};
use crate::geometry::Bbox;
use crate::image::{image_to_tensor, load_rgb, ImageTensor, MaskTensor};
use crate::model::{CondImageCreation, Device};

use super::cues::{fill_img_with_cue, CannyCue, CueExtractor, HoughCue, OnnxCue, SketchCue};

/// Value of the blank conditioning image (minimum of the normalized range).
const BLANK_VALUE: f32 = -1.0;

/// Previous video frame, by path or already loaded.
#[derive(Debug, Clone)]
pub enum PreviousFrame {
    Path(PathBuf),
    Image(RgbImage),
}

impl PreviousFrame {
    fn load(&self) -> Result<RgbImage> {
        match self {
            Self::Path(path) => load_rgb(path),
            Self::Image(img) => Ok(img.clone()),
        }
    }
}

/// Extractor networks for the cues that need one.
#[derive(Debug, Clone, Default)]
pub struct CueModels {
    pub hed: Option<PathBuf>,
    pub depth: Option<PathBuf>,
}

/// Everything a conditioning strategy may read.
#[derive(Debug, Clone, Copy)]
pub struct ConditioningInputs<'a> {
    /// Normalized (cropped) source image.
    pub img: &'a ImageTensor,
    pub mask: &'a MaskTensor,
    /// Mask-filled target.
    pub y_t: &'a ImageTensor,
    pub previous_frame: Option<&'a PreviousFrame>,
    /// Crop window in original-image pixels, if the image was cropped.
    pub selection: Option<Bbox>,
    /// Side of the square the previous frame is resized to.
    pub load_size: u32,
}

/// One conditioning strategy, ready to run.
pub enum Conditioning {
    PreviousFrame,
    YT,
    Cue(Box<dyn CueExtractor>),
}

impl Conditioning {
    /// Prepare the strategy, loading extractor networks when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `hed` or `depth` is requested without a model,
    /// or the model cannot be loaded.
    pub fn for_strategy(
        strategy: CondImageCreation,
        models: &CueModels,
        device: Device,
    ) -> Result<Self> {
        let conditioning = match strategy {
            CondImageCreation::PreviousFrame => Self::PreviousFrame,
            CondImageCreation::YT => Self::YT,
            CondImageCreation::Sketch => Self::Cue(Box::new(SketchCue)),
            CondImageCreation::Canny => Self::Cue(Box::new(CannyCue::default())),
            CondImageCreation::Hough => Self::Cue(Box::new(HoughCue::default())),
            CondImageCreation::Hed => {
                let path = models.hed.as_deref().ok_or(Error::MissingCueModel {
                    strategy: "hed",
                    flag: "hed-model",
                })?;
                Self::Cue(Box::new(OnnxCue::load(path, device)?))
            }
            CondImageCreation::Depth => {
                let path = models.depth.as_deref().ok_or(Error::MissingCueModel {
                    strategy: "depth",
                    flag: "depth-model",
                })?;
                Self::Cue(Box::new(OnnxCue::load(path, device)?))
            }
        };

        tracing::debug!("Conditioning strategy: {strategy}");
        Ok(conditioning)
    }

    /// Build the conditioning tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the previous frame cannot be loaded or a cue fails.
    pub fn build(&mut self, inputs: ConditioningInputs<'_>) -> Result<ImageTensor> {
        match self {
            Self::PreviousFrame => inputs.previous_frame.map_or_else(
                || {
                    tracing::debug!("No previous frame, using a blank conditioning image");
                    Ok(Array4::from_elem(inputs.y_t.dim(), BLANK_VALUE))
                },
                |frame| previous_frame_tensor(frame, inputs.selection, inputs.load_size),
            ),
            Self::YT => Ok(inputs.y_t.clone()),
            Self::Cue(extractor) => {
                let cue = extractor.extract(inputs.img)?;
                fill_img_with_cue(inputs.img, inputs.mask, &cue)
            }
        }
    }
}

/// Crop the previous frame to the selection window, resize and normalize it.
#[allow(clippy::cast_sign_loss)]
fn previous_frame_tensor(
    frame: &PreviousFrame,
    selection: Option<Bbox>,
    load_size: u32,
) -> Result<ImageTensor> {
    let frame = frame.load()?;

    let region = match selection {
        Some(sel) => {
            let clipped = sel.clip(frame.width(), frame.height());
            if clipped.width() <= 0 || clipped.height() <= 0 {
                return Err(Error::InvalidParameter {
                    name: "previous_frame".to_string(),
                    reason: format!("selection {sel:?} lies outside the frame"),
                });
            }
            // Safe: clip keeps coordinates in [0, dim]
            imageops::crop_imm(
                &frame,
                clipped.xmin as u32,
                clipped.ymin as u32,
                clipped.width() as u32,
                clipped.height() as u32,
            )
            .to_image()
        }
        None => frame,
    };

    let resized = imageops::resize(&region, load_size, load_size, FilterType::Triangle);
    Ok(image_to_tensor(&resized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn inputs<'a>(
        img: &'a ImageTensor,
        mask: &'a MaskTensor,
        previous_frame: Option<&'a PreviousFrame>,
    ) -> ConditioningInputs<'a> {
        ConditioningInputs {
            img,
            mask,
            y_t: img,
            previous_frame,
            selection: Some(Bbox::new(4, 4, 12, 12)),
            load_size: 8,
        }
    }

    #[test]
    fn test_blank_without_previous_frame() {
        let img = Array4::<f32>::zeros((1, 3, 8, 8));
        let mask = Array4::<f32>::zeros((1, 1, 8, 8));
        let cond = Conditioning::PreviousFrame
            .build(inputs(&img, &mask, None))
            .unwrap();

        assert_eq!(cond.dim(), img.dim());
        assert!(cond.iter().all(|&v| (v - BLANK_VALUE).abs() < f32::EPSILON));
    }

    #[test]
    fn test_previous_frame_is_cropped_to_selection() {
        let mut frame = RgbImage::new(16, 16);
        for (x, y, p) in frame.enumerate_pixels_mut() {
            if (4..12).contains(&x) && (4..12).contains(&y) {
                *p = Rgb([255, 255, 255]);
            }
        }
        let frame = PreviousFrame::Image(frame);

        let img = Array4::<f32>::zeros((1, 3, 8, 8));
        let mask = Array4::<f32>::zeros((1, 1, 8, 8));
        let cond = Conditioning::PreviousFrame
            .build(inputs(&img, &mask, Some(&frame)))
            .unwrap();

        assert_eq!(cond.shape(), &[1, 3, 8, 8]);
        assert!(cond.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_y_t_passthrough() {
        let img = Array4::<f32>::from_elem((1, 3, 2, 2), 0.5);
        let mask = Array4::<f32>::zeros((1, 1, 2, 2));
        let cond = Conditioning::YT.build(inputs(&img, &mask, None)).unwrap();
        assert_eq!(cond, img);
    }

    #[test]
    fn test_hed_requires_model() {
        let err = Conditioning::for_strategy(CondImageCreation::Hed, &CueModels::default(), Device::Cpu)
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingCueModel { strategy: "hed", .. }));
    }
}
