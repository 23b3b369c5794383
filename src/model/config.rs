//! Training-configuration snapshot stored next to a checkpoint.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::geometry::MaskDelta;

/// File name of the snapshot inside a checkpoint directory.
pub const TRAIN_CONFIG_FILE: &str = "train_config.json";

/// Strategy used to build the model's conditioning image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondImageCreation {
    /// Previous video frame cropped to the same region.
    PreviousFrame,
    /// The mask-filled noisy target itself.
    YT,
    Sketch,
    Canny,
    Hed,
    Hough,
    Depth,
}

impl CondImageCreation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreviousFrame => "previous_frame",
            Self::YT => "y_t",
            Self::Sketch => "sketch",
            Self::Canny => "canny",
            Self::Hed => "hed",
            Self::Hough => "hough",
            Self::Depth => "depth",
        }
    }
}

impl FromStr for CondImageCreation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "previous_frame" => Ok(Self::PreviousFrame),
            "y_t" => Ok(Self::YT),
            "sketch" => Ok(Self::Sketch),
            "canny" => Ok(Self::Canny),
            "hed" => Ok(Self::Hed),
            "hough" => Ok(Self::Hough),
            "depth" => Ok(Self::Depth),
            other => Err(Error::UnknownConditioning(other.to_string())),
        }
    }
}

impl fmt::Display for CondImageCreation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of training options the inference driver reads.
///
/// Every other key is kept verbatim in [`TrainConfig::extra`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct TrainConfig {
    #[serde(default = "default_nblocks")]
    pub G_nblocks: u32,

    #[serde(default = "default_load_size")]
    pub data_load_size: u32,

    #[serde(default = "default_crop_size")]
    pub data_online_creation_crop_size_A: u32,

    #[serde(default = "default_mask_delta")]
    pub data_online_creation_mask_delta_A: Vec<i32>,

    #[serde(default = "default_random_offset")]
    pub data_online_creation_mask_random_offset_A: Vec<f64>,

    #[serde(default)]
    pub data_online_creation_mask_square_A: bool,

    #[serde(default)]
    pub data_online_creation_rand_mask_A: bool,

    #[serde(default)]
    pub data_online_creation_color_mask_A: bool,

    #[serde(default)]
    pub data_online_context_pixels: u32,

    #[serde(default = "default_cond_image_creation")]
    pub alg_palette_cond_image_creation: String,

    #[serde(default = "default_n_timestep_train")]
    pub alg_diffusion_n_timestep_train: u32,

    #[serde(default = "default_n_timestep_test")]
    pub alg_diffusion_n_timestep_test: u32,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_nblocks() -> u32 {
    9
}

fn default_load_size() -> u32 {
    286
}

fn default_crop_size() -> u32 {
    512
}

fn default_mask_delta() -> Vec<i32> {
    vec![0]
}

fn default_random_offset() -> Vec<f64> {
    vec![0.0]
}

fn default_cond_image_creation() -> String {
    "y_t".to_string()
}

fn default_n_timestep_train() -> u32 {
    2000
}

fn default_n_timestep_test() -> u32 {
    1000
}

impl TrainConfig {
    /// Read and validate a snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, not valid JSON, or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let raw = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the conditioning strategy is unknown or a
    /// per-axis list has the wrong length.
    pub fn validate(&self) -> Result<()> {
        self.cond_image_creation()?;
        self.mask_delta()?;
        self.mask_random_offset()?;

        if self.data_load_size == 0 {
            return Err(Error::InvalidParameter {
                name: "data_load_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Conditioning strategy the model was trained with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConditioning`] for an unrecognised value.
    pub fn cond_image_creation(&self) -> Result<CondImageCreation> {
        self.alg_palette_cond_image_creation.parse()
    }

    /// Mask delta the model was trained with, duplicated to two axes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored list does not hold 1 or 2 values.
    pub fn mask_delta(&self) -> Result<MaskDelta> {
        MaskDelta::from_values(&self.data_online_creation_mask_delta_A)
    }

    /// Per-axis random offset ratio, duplicated to two axes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored list does not hold 1 or 2 values.
    pub fn mask_random_offset(&self) -> Result<[f64; 2]> {
        match self.data_online_creation_mask_random_offset_A.as_slice() {
            [r] => Ok([*r, *r]),
            [rx, ry] => Ok([*rx, *ry]),
            other => Err(Error::InvalidParameter {
                name: "data_online_creation_mask_random_offset_A".to_string(),
                reason: format!("expected 1 or 2 values, got {}", other.len()),
            }),
        }
    }
}
