//! Bounding-box bookkeeping and crop resolution.

mod bbox;
mod crop;

pub use bbox::{
    parse_bboxes, read_bboxes, select_bbox_index, selection_bbox, Bbox, LabeledBbox, MaskDelta,
    RANDOM_BBOX,
};
pub use crop::{
    crop_coordinates, extract_crop, render_mask, CropCoordinates, CropParams, CroppedPair,
};
