//! Image loading utilities.

use std::path::Path;

use image::{GrayImage, RgbImage};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, MaskTensor, RGB_CHANNELS};

/// Load an image from disk as 8-bit RGB.
///
/// # Errors
///
/// Returns an error if the image cannot be opened or decoded.
pub fn load_rgb<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();

    let img = image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(img.to_rgb8())
}

/// Load a mask from disk as single-channel grayscale.
///
/// # Errors
///
/// Returns an error if the image cannot be opened or decoded.
pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    let path = path.as_ref();

    let img = image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(img.to_luma8())
}

/// Convert an RGB image to a normalized (1, 3, H, W) tensor in [-1, 1].
#[must_use]
pub fn image_to_tensor(img: &RgbImage) -> ImageTensor {
    let (width, height) = (img.width() as usize, img.height() as usize);

    let mut tensor = Array4::<f32>::zeros((1, RGB_CHANNELS, height, width));

    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..RGB_CHANNELS {
            // Normalize from [0, 255] to [-1, 1]
            tensor[[0, c, y, x]] = (f32::from(pixel[c]) / 127.5) - 1.0;
        }
    }

    tensor
}

/// Convert a grayscale mask to a (1, 1, H, W) tensor, clamping every
/// non-zero label to 1.
#[must_use]
pub fn mask_to_tensor(mask: &GrayImage) -> MaskTensor {
    let (width, height) = (mask.width() as usize, mask.height() as usize);

    let mut tensor = Array4::<f32>::zeros((1, 1, height, width));

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] > 0 {
            tensor[[0, 0, y as usize, x as usize]] = 1.0;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_tensor_shape() {
        let img = RgbImage::new(40, 30);
        let tensor = image_to_tensor(&img);

        assert_eq!(tensor.shape(), &[1, 3, 30, 40]);
    }

    #[test]
    fn test_normalization_range() {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(1, 2, Rgb([255, 255, 255]));
        let tensor = image_to_tensor(&img);

        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 2, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mask_is_binary() {
        let mut mask = GrayImage::new(3, 3);
        mask.put_pixel(0, 0, Luma([7]));
        mask.put_pixel(2, 1, Luma([255]));
        let tensor = mask_to_tensor(&mask);

        assert_eq!(tensor.shape(), &[1, 1, 3, 3]);
        assert!((tensor.sum() - 2.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 1, 2]] - 1.0).abs() < 1e-6);
    }
}
