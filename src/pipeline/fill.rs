//! Filling the masked region of the target before restoration.

use rand::Rng;

use crate::error::{Error, Result};
use crate::image::{ImageTensor, MaskTensor};
use crate::model::TrainConfig;

/// How the masked region of `y_t` is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskFill {
    /// Independent uniform noise in [-1, 1] per value.
    Random,
    /// One random colour over the whole region.
    Color,
}

impl MaskFill {
    /// Fill mode the model was trained with.
    #[must_use]
    pub fn from_config(config: &TrainConfig) -> Self {
        if config.data_online_creation_rand_mask_A {
            Self::Random
        } else if config.data_online_creation_color_mask_A {
            Self::Color
        } else {
            tracing::warn!("No mask fill mode configured, falling back to random noise");
            Self::Random
        }
    }

    /// Return a copy of `img` with the masked region filled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the mask and image sizes differ.
    pub fn apply<R: Rng + ?Sized>(
        self,
        img: &ImageTensor,
        mask: &MaskTensor,
        rng: &mut R,
    ) -> Result<ImageTensor> {
        check_same_size(img, mask)?;

        let channels = img.dim().1;
        let color: Vec<f32> = (0..channels)
            .map(|_| rng.random::<f32>().mul_add(2.0, -1.0))
            .collect();

        let mut out = img.clone();
        for ((_, c, y, x), value) in out.indexed_iter_mut() {
            if mask[[0, 0, y, x]] > 0.0 {
                *value = match self {
                    Self::Random => rng.random::<f32>().mul_add(2.0, -1.0),
                    Self::Color => color[c],
                };
            }
        }
        Ok(out)
    }
}

/// Check that an image and a mask share their spatial size.
pub(crate) fn check_same_size(img: &ImageTensor, mask: &MaskTensor) -> Result<()> {
    let (_, _, h, w) = img.dim();
    let (_, _, mh, mw) = mask.dim();
    if (h, w) != (mh, mw) {
        return Err(Error::ShapeMismatch {
            expected: format!("mask of {w}x{h}"),
            actual: format!("{mw}x{mh}"),
        });
    }
    Ok(())
}
