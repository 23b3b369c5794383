//! Crop-window resolution and extraction around a selected bounding box.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use rand::Rng;

use crate::error::{Error, Result};

use super::bbox::{selection_bbox, LabeledBbox, MaskDelta};

/// Square crop region relative to the padded box's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropCoordinates {
    pub x_offset: i32,
    pub y_offset: i32,
    pub size: u32,
}

/// Parameters shared by the coordinate and extraction passes.
///
/// Both passes must receive the same value so they agree on the window.
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub mask_delta: MaskDelta,
    /// Per-axis ratio of the box extent the window may be jittered by.
    pub mask_random_offset: [f64; 2],
    pub crop_delta: u32,
    pub mask_square: bool,
    pub crop_dim: u32,
    pub output_dim: u32,
    pub context_pixels: u32,
    pub crop_center: bool,
    pub bbox_ref_id: usize,
}

/// Image and mask extracted from the crop window, resized to `output_dim`.
#[derive(Debug, Clone)]
pub struct CroppedPair {
    pub image: RgbImage,
    pub mask: GrayImage,
}

/// Resolve the crop window for the referenced box without touching pixels.
///
/// The window is at least as large as the padded box and is shifted so that
/// it, plus its context margin, lies inside the image.
///
/// # Errors
///
/// Returns an error if the box index is invalid, the padded box is empty, or
/// the window cannot fit in the image.
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn crop_coordinates<R: Rng + ?Sized>(
    dims: (u32, u32),
    bboxes: &[LabeledBbox],
    params: &CropParams,
    rng: &mut R,
) -> Result<CropCoordinates> {
    let (width, height) = dims;
    let bbox = reference_bbox(bboxes, params)?;

    let padded = bbox.pad(params.mask_delta);
    let adjusted = if params.mask_square {
        padded.squared()
    } else {
        padded
    };
    let (bw, bh) = (adjusted.width(), adjusted.height());
    if bw <= 0 || bh <= 0 {
        return Err(Error::InvalidParameter {
            name: "bbox".to_string(),
            reason: format!("box {adjusted:?} is empty after mask delta"),
        });
    }

    let crop_delta = params.crop_delta as i32;
    let jitter = if crop_delta > 0 {
        rng.random_range(-crop_delta..=crop_delta)
    } else {
        0
    };
    let size = (params.crop_dim as i32 + jitter).max(bw).max(bh).max(1);

    let (slack_x, slack_y) = (size - bw, size - bh);
    let (mut x_offset, mut y_offset) = if params.crop_center {
        (-(slack_x / 2), -(slack_y / 2))
    } else {
        (-rng.random_range(0..=slack_x), -rng.random_range(0..=slack_y))
    };

    let [ratio_x, ratio_y] = params.mask_random_offset;
    x_offset = jitter_offset(x_offset, ratio_x, bw, slack_x, rng);
    y_offset = jitter_offset(y_offset, ratio_y, bh, slack_y, rng);

    let context = params.context_pixels as i32;
    let window = size + 2 * context;
    if window > width as i32 || window > height as i32 {
        return Err(Error::CropTooLarge {
            window: window as u32,
            width,
            height,
        });
    }

    x_offset = fit_axis(adjusted.xmin + x_offset - context, window, width as i32) - adjusted.xmin
        + context;
    y_offset = fit_axis(adjusted.ymin + y_offset - context, window, height as i32) - adjusted.ymin
        + context;

    let coords = CropCoordinates {
        x_offset,
        y_offset,
        size: size as u32,
    };
    tracing::debug!("Resolved crop coordinates {coords:?} for bbox {bbox:?}");
    Ok(coords)
}

/// Extract the image and mask under previously resolved coordinates.
///
/// The mask is rendered from every box (padded, and squared when requested),
/// then both arrays are cut at the selection window and resized to
/// `output_dim`.
///
/// # Errors
///
/// Returns an error if the box index is invalid or the window leaves the image.
#[allow(clippy::cast_sign_loss)]
pub fn extract_crop(
    img: &RgbImage,
    bboxes: &[LabeledBbox],
    params: &CropParams,
    coords: CropCoordinates,
) -> Result<CroppedPair> {
    let bbox = reference_bbox(bboxes, params)?;
    let (width, height) = img.dimensions();

    let window = selection_bbox(
        bbox,
        params.mask_delta,
        params.mask_square,
        coords,
        params.context_pixels,
    );
    if !window.fits_in(width, height) {
        return Err(Error::CropTooLarge {
            window: window.width().unsigned_abs(),
            width,
            height,
        });
    }

    let mask = render_mask(width, height, bboxes, params.mask_delta, params.mask_square);

    // Safe: fits_in guarantees a non-negative, in-bounds window
    let (x, y) = (window.xmin as u32, window.ymin as u32);
    let (w, h) = (window.width() as u32, window.height() as u32);

    let image = imageops::crop_imm(img, x, y, w, h).to_image();
    let mask = imageops::crop_imm(&mask, x, y, w, h).to_image();

    let out = params.output_dim;
    if out == 0 || (out == w && out == h) {
        return Ok(CroppedPair { image, mask });
    }

    Ok(CroppedPair {
        image: imageops::resize(&image, out, out, FilterType::Triangle),
        mask: imageops::resize(&mask, out, out, FilterType::Nearest),
    })
}

/// Draw every box into a binary mask of the given size.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn render_mask(
    width: u32,
    height: u32,
    bboxes: &[LabeledBbox],
    delta: MaskDelta,
    mask_square: bool,
) -> GrayImage {
    let mut mask = GrayImage::new(width, height);

    for labeled in bboxes {
        let padded = labeled.bbox.pad(delta);
        let adjusted = if mask_square {
            padded.squared()
        } else {
            padded
        };
        let clipped = adjusted.clip(width, height);

        // Safe: clip bounds every coordinate to [0, dim]
        for y in clipped.ymin as u32..clipped.ymax as u32 {
            for x in clipped.xmin as u32..clipped.xmax as u32 {
                mask.put_pixel(x, y, Luma([1]));
            }
        }
    }

    mask
}

fn reference_bbox(bboxes: &[LabeledBbox], params: &CropParams) -> Result<super::Bbox> {
    bboxes
        .get(params.bbox_ref_id)
        .map(|b| b.bbox)
        .ok_or(Error::BboxIndex {
            index: params.bbox_ref_id,
            count: bboxes.len(),
        })
}

#[allow(clippy::cast_possible_truncation)]
fn jitter_offset<R: Rng + ?Sized>(
    offset: i32,
    ratio: f64,
    extent: i32,
    slack: i32,
    rng: &mut R,
) -> i32 {
    if ratio <= 0.0 {
        return offset;
    }
    let amplitude = (ratio * f64::from(extent)) as i32;
    if amplitude <= 0 {
        return offset;
    }
    (offset + rng.random_range(-amplitude..=amplitude)).clamp(-slack, 0)
}

/// Shift a window start so `[start, start + len)` stays within `[0, limit)`.
fn fit_axis(start: i32, len: i32, limit: i32) -> i32 {
    start.clamp(0, limit - len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bbox;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn boxes() -> Vec<LabeledBbox> {
        vec![LabeledBbox {
            label: "1".to_string(),
            bbox: Bbox::new(40, 50, 60, 80),
        }]
    }

    fn params() -> CropParams {
        CropParams {
            mask_delta: MaskDelta::new(0, 0),
            mask_random_offset: [0.0, 0.0],
            crop_delta: 0,
            mask_square: false,
            crop_dim: 40,
            output_dim: 0,
            context_pixels: 0,
            crop_center: true,
            bbox_ref_id: 0,
        }
    }

    #[test]
    fn test_centered_coordinates() {
        let mut rng = StdRng::seed_from_u64(0);
        let coords = crop_coordinates((200, 200), &boxes(), &params(), &mut rng).unwrap();
        // box 20x30, crop 40: slack 20 and 10
        assert_eq!(
            coords,
            CropCoordinates {
                x_offset: -10,
                y_offset: -5,
                size: 40
            }
        );
    }

    #[test]
    fn test_crop_grows_to_contain_box() {
        let mut p = params();
        p.crop_dim = 10;
        let mut rng = StdRng::seed_from_u64(0);
        let coords = crop_coordinates((200, 200), &boxes(), &p, &mut rng).unwrap();
        assert_eq!(coords.size, 30);
    }

    #[test]
    fn test_window_shifted_inside_image() {
        let bboxes = vec![LabeledBbox {
            label: "1".to_string(),
            bbox: Bbox::new(2, 2, 12, 12),
        }];
        let mut p = params();
        p.context_pixels = 4;
        let mut rng = StdRng::seed_from_u64(0);
        let coords = crop_coordinates((100, 100), &bboxes, &p, &mut rng).unwrap();
        let window = selection_bbox(bboxes[0].bbox, p.mask_delta, false, coords, 4);
        assert!(window.fits_in(100, 100));
        assert_eq!(window.xmin, 0);
        assert_eq!(window.width(), 48);
    }

    #[test]
    fn test_crop_too_large() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = crop_coordinates((30, 30), &boxes(), &params(), &mut rng).unwrap_err();
        assert!(matches!(err, Error::CropTooLarge { .. }));
    }

    #[test]
    fn test_random_offsets_keep_box_inside_window() {
        let mut p = params();
        p.crop_center = false;
        p.mask_random_offset = [0.5, 0.5];
        p.crop_delta = 5;
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let c = crop_coordinates((400, 400), &boxes(), &p, &mut rng).unwrap();
            let size = i32::try_from(c.size).unwrap();
            assert!(c.x_offset <= 0 && c.x_offset >= -(size - 20));
            assert!(c.y_offset <= 0 && c.y_offset >= -(size - 30));
        }
    }

    #[test]
    fn test_render_mask_clips() {
        let bboxes = vec![LabeledBbox {
            label: "3".to_string(),
            bbox: Bbox::new(-5, 8, 4, 20),
        }];
        let mask = render_mask(10, 10, &bboxes, MaskDelta::new(1, 1), false);
        assert_eq!(mask.get_pixel(0, 7)[0], 1);
        assert_eq!(mask.get_pixel(4, 9)[0], 1);
        assert_eq!(mask.get_pixel(5, 9)[0], 0);
        assert_eq!(mask.get_pixel(0, 6)[0], 0);
    }

    #[test]
    fn test_extract_resizes_to_output_dim() {
        let img = RgbImage::new(200, 200);
        let mut p = params();
        p.output_dim = 32;
        let mut rng = StdRng::seed_from_u64(0);
        let coords = crop_coordinates((200, 200), &boxes(), &p, &mut rng).unwrap();
        let pair = extract_crop(&img, &boxes(), &p, coords).unwrap();
        assert_eq!(pair.image.dimensions(), (32, 32));
        assert_eq!(pair.mask.dimensions(), (32, 32));
    }
}
