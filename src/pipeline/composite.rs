//! Pasting a generated crop back into the full-resolution image.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::geometry::Bbox;

/// Resize `generated` to the selection window and paste it into a copy of
/// `original`.
///
/// The resized crop is at most the original's size on each axis and anything
/// falling outside the original is clipped.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn recompose(original: &RgbImage, generated: &RgbImage, selection: Bbox) -> RgbImage {
    let (width, height) = original.dimensions();
    let mut out = original.clone();

    if selection.width() <= 0 || selection.height() <= 0 {
        tracing::warn!("Empty selection {selection:?}, keeping the original image");
        return out;
    }

    // Safe: both extents are positive
    let target_w = width.min(selection.width() as u32);
    let target_h = height.min(selection.height() as u32);

    let resized = imageops::resize(generated, target_w, target_h, FilterType::Triangle);
    imageops::replace(
        &mut out,
        &resized,
        i64::from(selection.xmin),
        i64::from(selection.ymin),
    );

    out
}

/// Resize the generated image back to the original's dimensions.
#[must_use]
pub fn restore_size(original: &RgbImage, generated: &RgbImage) -> RgbImage {
    let (width, height) = original.dimensions();
    if generated.dimensions() == (width, height) {
        return generated.clone();
    }
    imageops::resize(generated, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_paste_inside() {
        let original = RgbImage::new(20, 20);
        let generated = RgbImage::from_pixel(4, 4, Rgb([200, 10, 10]));

        let out = recompose(&original, &generated, Bbox::new(5, 6, 13, 14));
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(5, 6), &Rgb([200, 10, 10]));
        assert_eq!(out.get_pixel(12, 13), &Rgb([200, 10, 10]));
        assert_eq!(out.get_pixel(13, 13), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(4, 6), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_never_writes_outside_original() {
        let original = RgbImage::new(10, 10);
        let generated = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));

        let out = recompose(&original, &generated, Bbox::new(-4, 2, 30, 30));
        assert_eq!(out.dimensions(), (10, 10));
        // Crop resized to 10x10, pasted at x=-4 so columns 0..6 are covered
        assert_eq!(out.get_pixel(5, 9), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(6, 9), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(0, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_empty_selection_keeps_original() {
        let original = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let generated = RgbImage::new(2, 2);
        let out = recompose(&original, &generated, Bbox::new(3, 3, 3, 8));
        assert_eq!(out, original);
    }

    #[test]
    fn test_restore_size() {
        let original = RgbImage::new(30, 20);
        let generated = RgbImage::new(8, 8);
        assert_eq!(restore_size(&original, &generated).dimensions(), (30, 20));
    }
}
