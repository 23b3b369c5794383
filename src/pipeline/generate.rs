//! Single-image generation: crop, condition, restore and recompose.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::geometry::{
    crop_coordinates, extract_crop, read_bboxes, select_bbox_index, selection_bbox, Bbox,
    CropParams, LabeledBbox, MaskDelta, RANDOM_BBOX,
};
use crate::image::{
    image_to_tensor, load_mask, load_rgb, mask_to_tensor, save_rgb, save_tensor,
    tensor_to_image, ImageTensor, MaskTensor,
};
use crate::model::{
    load_model, Device, Restoration, RestorationInputs, SamplingMethod, TrainConfig, SAMPLE_NUM,
};

use super::composite::{recompose, restore_size};
use super::conditioning::{Conditioning, ConditioningInputs, CueModels, PreviousFrame};
use super::fill::MaskFill;

/// Options for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Random seed for reproducibility. None for random.
    pub seed: Option<u64>,

    /// Weights file; `train_config.json` must sit next to it.
    pub model_in_file: PathBuf,

    pub device: Device,

    /// Test-phase sampling steps; non-positive keeps the trained schedule.
    pub sampling_steps: i32,

    pub sampling_method: SamplingMethod,

    pub img_in: PathBuf,
    pub mask_in: Option<PathBuf>,
    pub bbox_in: Option<PathBuf>,

    /// Multiplicative box expansion, applied only when cropping.
    pub bbox_width_factor: f64,
    pub bbox_height_factor: f64,

    /// Box to use; [`RANDOM_BBOX`] picks one at random.
    pub bbox_ref_id: i64,

    pub crop_width: i32,
    pub crop_height: i32,

    /// Size the crop is resized to before inference when both are positive.
    pub img_width: i32,
    pub img_height: i32,

    pub dir_out: PathBuf,

    /// Whether to write the output images.
    pub write: bool,

    pub previous_frame: Option<PreviousFrame>,

    /// Prefix of the output file names.
    pub name: String,

    /// One value for both axes, or one per axis.
    pub mask_delta: Vec<i32>,

    pub mask_square: bool,

    pub cue_models: CueModels,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            seed: None,
            model_in_file: PathBuf::new(),
            device: Device::Cpu,
            sampling_steps: -1,
            sampling_method: SamplingMethod::Ddpm,
            img_in: PathBuf::new(),
            mask_in: None,
            bbox_in: None,
            bbox_width_factor: 0.0,
            bbox_height_factor: 0.0,
            bbox_ref_id: RANDOM_BBOX,
            crop_width: -1,
            crop_height: -1,
            img_width: -1,
            img_height: -1,
            dir_out: PathBuf::from("."),
            write: true,
            previous_frame: None,
            name: "gen".to_string(),
            mask_delta: vec![0],
            mask_square: false,
            cue_models: CueModels::default(),
        }
    }
}

impl GenerateOptions {
    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        MaskDelta::from_values(&self.mask_delta)?;

        for (name, factor) in [
            ("bbox_width_factor", self.bbox_width_factor),
            ("bbox_height_factor", self.bbox_height_factor),
        ] {
            if !factor.is_finite() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    reason: "must be a finite number".to_string(),
                });
            }
        }

        if self.name.is_empty() {
            return Err(Error::InvalidParameter {
                name: "name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    const fn cropping(&self) -> bool {
        self.crop_width > 0 || self.crop_height > 0
    }

    #[allow(clippy::cast_sign_loss)]
    const fn resize_to(&self) -> Option<(u32, u32)> {
        if self.img_width > 0 && self.img_height > 0 {
            Some((self.img_width as u32, self.img_height as u32))
        } else {
            None
        }
    }
}

/// Everything produced by one generation run.
#[derive(Debug, Clone)]
pub struct Generated {
    /// Source image as loaded.
    pub original: RgbImage,
    /// Source image with the generated crop pasted back.
    pub image: RgbImage,
    /// Raw model output.
    pub crop: RgbImage,
    pub cond: ImageTensor,
    pub y_0: ImageTensor,
    pub y_t: ImageTensor,
    pub mask: MaskTensor,
    pub bbox_index: Option<usize>,
    /// Crop window in original-image pixels.
    pub selection: Option<Bbox>,
}

/// Load the checkpoint and generate one image.
///
/// # Errors
///
/// Returns an error if loading, cropping, inference or writing fails.
pub fn generate(options: &GenerateOptions) -> Result<Generated> {
    let (mut model, config) = load_model(
        &options.model_in_file,
        options.device,
        options.sampling_steps,
        options.sampling_method,
    )?;
    tracing::info!(
        "Sampling with {} ({})",
        model.sampling_method(),
        model.schedule()
    );

    generate_with_model(&mut model, &config, options)
}

/// Generate one image with an already loaded model.
///
/// # Errors
///
/// Returns an error if cropping, conditioning, inference or writing fails.
pub fn generate_with_model<M: Restoration + ?Sized>(
    model: &mut M,
    config: &TrainConfig,
    options: &GenerateOptions,
) -> Result<Generated> {
    options.validate()?;

    let mut rng = options
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

    let mask_delta = MaskDelta::from_values(&options.mask_delta)?.combine(config.mask_delta()?);
    let mask_square = options.mask_square || config.data_online_creation_mask_square_A;

    tracing::info!("Processing image: {}", options.img_in.display());
    let original = load_rgb(&options.img_in)?;
    let (width, height) = original.dimensions();

    let mut img = original.clone();
    let mut mask = match &options.mask_in {
        Some(path) => load_mask(path)?,
        None => GrayImage::new(width, height),
    };

    let mut bbox_index = None;
    let mut selection = None;

    if let Some(bbox_path) = &options.bbox_in {
        let bboxes = read_bboxes(bbox_path)?;
        let index = select_bbox_index(bboxes.len(), options.bbox_ref_id, &mut rng)?;

        let bboxes: Vec<LabeledBbox> = if options.cropping() {
            bboxes
                .into_iter()
                .enumerate()
                .map(|(i, labeled)| {
                    if i != index {
                        return labeled;
                    }
                    let bbox = labeled
                        .bbox
                        .expand_by_factors(options.bbox_width_factor, options.bbox_height_factor);
                    LabeledBbox { bbox, ..labeled }
                })
                .collect()
        } else {
            bboxes
        };

        let params = CropParams {
            mask_delta,
            mask_random_offset: config.mask_random_offset()?,
            crop_delta: 0,
            mask_square,
            crop_dim: config.data_online_creation_crop_size_A,
            output_dim: config.data_load_size,
            context_pixels: config.data_online_context_pixels,
            crop_center: true,
            bbox_ref_id: index,
        };

        let coords = crop_coordinates((width, height), &bboxes, &params, &mut rng)?;
        let pair = extract_crop(&original, &bboxes, &params, coords)?;
        img = pair.image;
        mask = pair.mask;

        let sel = selection_bbox(
            bboxes[index].bbox,
            mask_delta,
            mask_square,
            coords,
            params.context_pixels,
        );
        tracing::info!("Using bbox {index} ({:?}), selection {sel:?}", bboxes[index].bbox);

        bbox_index = Some(index);
        selection = Some(sel);
    }

    if let Some((w, h)) = options.resize_to() {
        img = imageops::resize(&img, w, h, FilterType::Triangle);
        mask = imageops::resize(&mask, w, h, FilterType::Nearest);
    }

    let img_tensor = image_to_tensor(&img);
    let mask_tensor = mask_to_tensor(&mask);

    let y_t = MaskFill::from_config(config).apply(&img_tensor, &mask_tensor, &mut rng)?;

    let mut conditioning =
        Conditioning::for_strategy(config.cond_image_creation()?, &options.cue_models, options.device)?;
    let cond = conditioning.build(ConditioningInputs {
        img: &img_tensor,
        mask: &mask_tensor,
        y_t: &y_t,
        previous_frame: options.previous_frame.as_ref(),
        selection,
        load_size: config.data_load_size,
    })?;

    tracing::info!("Running restoration...");
    let out_tensor = model.restoration(
        RestorationInputs {
            y_cond: &cond,
            y_t: &y_t,
            y_0: &img_tensor,
            mask: &mask_tensor,
        },
        SAMPLE_NUM,
    )?;
    let crop = tensor_to_image(&out_tensor)?.to_rgb8();

    let image = match selection {
        Some(sel) => recompose(&original, &crop, sel),
        None => restore_size(&original, &crop),
    };

    let generated = Generated {
        original,
        image,
        crop,
        cond,
        y_0: img_tensor,
        y_t,
        mask: mask_tensor,
        bbox_index,
        selection,
    };

    if options.write {
        write_outputs(&generated, &options.dir_out, &options.name)?;
        tracing::info!("Successfully generated image {}", options.name);
    }

    Ok(generated)
}

/// Write every intermediate of a run as `<name>_<suffix>.png` in `dir_out`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or an image cannot be saved.
pub fn write_outputs(generated: &Generated, dir_out: &Path, name: &str) -> Result<()> {
    fs::create_dir_all(dir_out)?;
    let path = |suffix: &str| dir_out.join(format!("{name}_{suffix}.png"));

    save_rgb(&generated.original, path("orig"))?;
    save_rgb(&generated.crop, path("generated_crop"))?;
    save_tensor(&generated.cond, path("cond"))?;
    save_rgb(&generated.image, path("generated"))?;
    save_tensor(&generated.y_0, path("y_0"))?;
    save_tensor(&generated.y_t, path("y_t"))?;
    save_tensor(&generated.mask, path("mask"))?;

    Ok(())
}

/// Name of sample `index` out of `count`, zero-padded to the width of `count`.
#[must_use]
pub fn sample_name(base: &str, index: usize, count: usize) -> String {
    let width = count.to_string().len();
    format!("{base}_{index:0width$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_name_padding() {
        assert_eq!(sample_name("gen", 0, 1), "gen_0");
        assert_eq!(sample_name("gen", 7, 10), "gen_07");
        assert_eq!(sample_name("gen", 42, 100), "gen_042");
    }

    #[test]
    fn test_validate_rejects_bad_delta() {
        let options = GenerateOptions {
            mask_delta: vec![1, 2, 3],
            ..GenerateOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_resize_needs_both_dimensions() {
        let options = GenerateOptions {
            img_width: 64,
            ..GenerateOptions::default()
        };
        assert_eq!(options.resize_to(), None);

        let options = GenerateOptions {
            img_width: 64,
            img_height: 32,
            ..GenerateOptions::default()
        };
        assert_eq!(options.resize_to(), Some((64, 32)));
    }
}
