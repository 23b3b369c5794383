//! Bounding boxes, mask deltas and the selection-box arithmetic.

use std::fs;
use std::path::Path;

use rand::Rng;

use crate::error::{Error, Result};

use super::CropCoordinates;

/// Rectangular region `[xmin, ymin, xmax, ymax]` in source-image pixels.
///
/// Every adjustment returns a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Bbox {
    #[must_use]
    pub const fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    #[must_use]
    pub const fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    #[must_use]
    pub const fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    /// Grow the box by multiplicative factors applied to each coordinate.
    ///
    /// `xmin` moves left by `trunc(wf * xmin)` and `xmax` right by
    /// `trunc(wf * xmax)` (same on y with `hf`); amounts never go negative
    /// and a non-positive factor leaves that axis untouched.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn expand_by_factors(self, width_factor: f64, height_factor: f64) -> Self {
        let amount = |factor: f64, v: i32| ((factor * f64::from(v)) as i32).max(0);

        let mut out = self;
        if width_factor > 0.0 {
            out.xmin -= amount(width_factor, self.xmin);
            out.xmax += amount(width_factor, self.xmax);
        }
        if height_factor > 0.0 {
            out.ymin -= amount(height_factor, self.ymin);
            out.ymax += amount(height_factor, self.ymax);
        }
        out
    }

    /// Pad the box by the mask delta on every side.
    #[must_use]
    pub const fn pad(self, delta: MaskDelta) -> Self {
        Self::new(
            self.xmin - delta.dx,
            self.ymin - delta.dy,
            self.xmax + delta.dx,
            self.ymax + delta.dy,
        )
    }

    /// Force a square aspect by growing the short axis symmetrically.
    ///
    /// Each short-axis bound moves by `|w - h| / 2` (floor), so an odd
    /// difference leaves the result one pixel short of square.
    #[must_use]
    pub const fn squared(self) -> Self {
        let diff = self.width() - self.height();
        let half = diff.abs() / 2;

        if diff > 0 {
            Self::new(self.xmin, self.ymin - half, self.xmax, self.ymax + half)
        } else {
            Self::new(self.xmin - half, self.ymin, self.xmax + half, self.ymax)
        }
    }

    /// Grow the box by `margin` pixels on every side.
    #[must_use]
    pub const fn grow(self, margin: i32) -> Self {
        Self::new(
            self.xmin - margin,
            self.ymin - margin,
            self.xmax + margin,
            self.ymax + margin,
        )
    }

    /// Clip the box to `[0, width) x [0, height)`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn clip(self, width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self::new(
            self.xmin.clamp(0, w),
            self.ymin.clamp(0, h),
            self.xmax.clamp(0, w),
            self.ymax.clamp(0, h),
        )
    }

    /// Whether the box lies entirely inside a `width x height` image.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn fits_in(&self, width: u32, height: u32) -> bool {
        self.xmin >= 0
            && self.ymin >= 0
            && self.xmax <= width as i32
            && self.ymax <= height as i32
            && self.xmin < self.xmax
            && self.ymin < self.ymax
    }
}

/// A box read from a bbox file together with its class label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledBbox {
    pub label: String,
    pub bbox: Bbox,
}

/// Per-axis pixel padding applied around a box before cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaskDelta {
    pub dx: i32,
    pub dy: i32,
}

impl MaskDelta {
    #[must_use]
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Build a delta from one value (used on both axes) or two values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an empty list or more than two values.
    pub fn from_values(values: &[i32]) -> Result<Self> {
        match *values {
            [d] => Ok(Self::new(d, d)),
            [dx, dy] => Ok(Self::new(dx, dy)),
            _ => Err(Error::InvalidParameter {
                name: "mask_delta".to_string(),
                reason: format!("expected 1 or 2 values, got {}", values.len()),
            }),
        }
    }

    /// Add another delta per axis.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        Self::new(self.dx + other.dx, self.dy + other.dy)
    }
}

/// Read a whitespace-separated bbox file: `label xmin ymin xmax ymax` per line.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a line is malformed, or no box is found.
pub fn read_bboxes<P: AsRef<Path>>(path: P) -> Result<Vec<LabeledBbox>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    parse_bboxes(&text, path)
}

/// Parse the contents of a bbox file; `path` is only used for error reporting.
///
/// # Errors
///
/// Returns an error if a line is malformed or no box is found.
pub fn parse_bboxes(text: &str, path: &Path) -> Result<Vec<LabeledBbox>> {
    let mut boxes = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let elts: Vec<&str> = line.split_whitespace().collect();
        if elts.is_empty() {
            continue;
        }

        let parse_err = |reason: String| Error::BboxParse {
            path: path.to_path_buf(),
            line: line_no + 1,
            reason,
        };

        if elts.len() < 5 {
            return Err(parse_err(format!("expected 5 fields, got {}", elts.len())));
        }

        let mut coords = [0i32; 4];
        for (slot, token) in coords.iter_mut().zip(&elts[1..5]) {
            *slot = token
                .parse()
                .map_err(|_| parse_err(format!("{token:?} is not an integer")))?;
        }

        boxes.push(LabeledBbox {
            label: elts[0].to_string(),
            bbox: Bbox::new(coords[0], coords[1], coords[2], coords[3]),
        });
    }

    if boxes.is_empty() {
        return Err(Error::EmptyBboxFile {
            path: path.to_path_buf(),
        });
    }

    Ok(boxes)
}

/// Box id that selects a random box.
pub const RANDOM_BBOX: i64 = -1;

/// Pick which box to work on: `bbox_ref_id >= 0` selects it explicitly,
/// [`RANDOM_BBOX`] draws one uniformly at random.
///
/// # Errors
///
/// Returns [`Error::BboxIndex`] if the explicit index is out of range, or
/// [`Error::InvalidParameter`] for any other negative id.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn select_bbox_index<R: Rng + ?Sized>(
    count: usize,
    bbox_ref_id: i64,
    rng: &mut R,
) -> Result<usize> {
    if count == 0 {
        return Err(Error::BboxIndex { index: 0, count });
    }

    if bbox_ref_id == RANDOM_BBOX {
        return Ok(rng.random_range(0..count));
    }
    if bbox_ref_id < 0 {
        return Err(Error::InvalidParameter {
            name: "bbox_ref_id".to_string(),
            reason: format!("expected {RANDOM_BBOX} or a box index, got {bbox_ref_id}"),
        });
    }

    let index = bbox_ref_id as usize;
    if index >= count {
        return Err(Error::BboxIndex { index, count });
    }
    Ok(index)
}

/// Selection box: the crop window in original-image pixels.
///
/// The box is padded by `delta`, optionally squared, translated by the crop
/// offset, sized to `crop_size` on both axes, then grown by `context_pixels`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn selection_bbox(
    bbox: Bbox,
    delta: MaskDelta,
    mask_square: bool,
    coords: CropCoordinates,
    context_pixels: u32,
) -> Bbox {
    let padded = bbox.pad(delta);
    let adjusted = if mask_square { padded.squared() } else { padded };

    let xmin = adjusted.xmin + coords.x_offset;
    let ymin = adjusted.ymin + coords.y_offset;
    let size = coords.size as i32;

    Bbox::new(xmin, ymin, xmin + size, ymin + size).grow(context_pixels as i32)
}
