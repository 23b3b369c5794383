//! Image saving utilities.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

use crate::error::{Error, Result};

use super::{ImageTensor, RGB_CHANNELS};

/// Save a normalized tensor as an image file (format inferred from extension).
///
/// Single-channel tensors are written as grayscale, three-channel tensors as RGB.
///
/// # Errors
///
/// Returns an error if the tensor layout is unsupported or the image cannot be saved.
pub fn save_tensor<P: AsRef<Path>>(tensor: &ImageTensor, path: P) -> Result<()> {
    let path = path.as_ref();

    tensor_to_image(tensor)?
        .save(path)
        .map_err(|source| Error::ImageSave {
            path: path.to_path_buf(),
            source,
        })
}

/// Save an RGB image.
///
/// # Errors
///
/// Returns an error if the image cannot be saved.
pub fn save_rgb<P: AsRef<Path>>(img: &RgbImage, path: P) -> Result<()> {
    let path = path.as_ref();

    img.save(path).map_err(|source| Error::ImageSave {
        path: path.to_path_buf(),
        source,
    })
}

/// Convert the first sample of a normalized NCHW tensor to an 8-bit image.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] unless the tensor has 1 or 3 channels.
#[allow(clippy::cast_possible_truncation)]
pub fn tensor_to_image(tensor: &ImageTensor) -> Result<DynamicImage> {
    let (_, channels, height, width) = tensor.dim();

    // Safe: tensors are built from u32-sized images
    let (w, h) = (width as u32, height as u32);

    match channels {
        1 => {
            let img: GrayImage = ImageBuffer::from_fn(w, h, |x, y| {
                Luma([denormalize(tensor[[0, 0, y as usize, x as usize]])])
            });
            Ok(DynamicImage::ImageLuma8(img))
        }
        RGB_CHANNELS => {
            let img: RgbImage = ImageBuffer::from_fn(w, h, |x, y| {
                let (x, y) = (x as usize, y as usize);
                Rgb([
                    denormalize(tensor[[0, 0, y, x]]),
                    denormalize(tensor[[0, 1, y, x]]),
                    denormalize(tensor[[0, 2, y, x]]),
                ])
            });
            Ok(DynamicImage::ImageRgb8(img))
        }
        other => Err(Error::ShapeMismatch {
            expected: "1 or 3 channels".to_string(),
            actual: format!("{other} channels"),
        }),
    }
}

/// Denormalize a value from [-1, 1] to [0, 255] with clamping.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn denormalize(value: f32) -> u8 {
    // Safe: clamped to [0, 255] range before casting
    let scaled = (value + 1.0) * 127.5;
    scaled.clamp(0.0, 255.0) as u8
}
