//! `gen-single-image` CLI - run a palette model on one image.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palette_infer::model::{Device, SamplingMethod};
use palette_infer::pipeline::{sample_name, CueModels, PreviousFrame};
use palette_infer::{generate, GenerateOptions};

/// Generate images with a palette diffusion model, optionally around a bounding box.
#[derive(Parser, Debug)]
#[command(name = "gen-single-image")]
#[command(version, about, long_about = None)]
struct Args {
    /// Model weights; `train_config.json` must be in the same directory.
    #[arg(long, value_name = "PATH")]
    model_in_file: PathBuf,

    /// Image to transform.
    #[arg(long, value_name = "PATH")]
    img_in: PathBuf,

    /// Previous video frame, for models conditioned on it.
    #[arg(long, value_name = "PATH")]
    previous_frame: Option<PathBuf>,

    /// Mask used for image transformation.
    #[arg(long, value_name = "PATH")]
    mask_in: Option<PathBuf>,

    /// Bbox file used for masking (`label xmin ymin xmax ymax` per line).
    #[arg(long, value_name = "PATH")]
    bbox_in: Option<PathBuf>,

    /// Number of samples generated.
    #[arg(long, alias = "nb_samples", default_value_t = 1, value_name = "INT")]
    nb_samples: usize,

    /// Bbox id to use, -1 picks one at random.
    #[arg(long, alias = "bbox_ref_id", default_value_t = -1, allow_negative_numbers = true)]
    bbox_ref_id: i64,

    /// Random seed for reproducibility, -1 draws one from the OS.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_name = "INT")]
    seed: i64,

    /// Run on the CPU instead of an accelerator.
    #[arg(long)]
    cpu: bool,

    /// Accelerator index.
    #[arg(long, default_value_t = 0, value_name = "INT")]
    gpuid: u32,

    /// Override the number of sampling steps (non-positive keeps the trained value).
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_name = "INT")]
    sampling_steps: i32,

    /// Sampling method.
    #[arg(long, value_enum, default_value_t = SamplingMethod::Ddpm)]
    sampling_method: SamplingMethod,

    /// Grow the box horizontally by this factor of its coordinates when cropping.
    #[arg(long, default_value_t = 0.0, value_name = "FLOAT")]
    bbox_width_factor: f64,

    /// Grow the box vertically by this factor of its coordinates when cropping.
    #[arg(long, default_value_t = 0.0, value_name = "FLOAT")]
    bbox_height_factor: f64,

    /// Crop width; enables box expansion when positive.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_name = "INT")]
    crop_width: i32,

    /// Crop height; enables box expansion when positive.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_name = "INT")]
    crop_height: i32,

    /// Resize the crop to this width before inference.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_name = "INT")]
    img_width: i32,

    /// Resize the crop to this height before inference.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_name = "INT")]
    img_height: i32,

    /// Output directory.
    #[arg(long, default_value = ".", value_name = "PATH")]
    dir_out: PathBuf,

    /// Prefix of the output file names.
    #[arg(long, default_value = "gen")]
    name: String,

    /// Mask padding in pixels, one value for both axes or one per axis.
    #[arg(long, num_args = 1..=2, default_values_t = [0], allow_negative_numbers = true)]
    mask_delta: Vec<i32>,

    /// Force square masks.
    #[arg(long)]
    mask_square: bool,

    /// HED edge extractor network (ONNX).
    #[arg(long, value_name = "PATH")]
    hed_model: Option<PathBuf>,

    /// Depth extractor network (ONNX).
    #[arg(long, value_name = "PATH")]
    depth_model: Option<PathBuf>,

    /// Do not write output images.
    #[arg(long)]
    no_write: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("palette_infer={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    if !args.img_in.exists() {
        anyhow::bail!("Input file does not exist: {}", args.img_in.display());
    }

    let mut options = GenerateOptions {
        seed: u64::try_from(args.seed).ok(),
        model_in_file: args.model_in_file.clone(),
        device: Device::from_flags(args.cpu, args.gpuid),
        sampling_steps: args.sampling_steps,
        sampling_method: args.sampling_method,
        img_in: args.img_in.clone(),
        mask_in: args.mask_in.clone(),
        bbox_in: args.bbox_in.clone(),
        bbox_width_factor: args.bbox_width_factor,
        bbox_height_factor: args.bbox_height_factor,
        bbox_ref_id: args.bbox_ref_id,
        crop_width: args.crop_width,
        crop_height: args.crop_height,
        img_width: args.img_width,
        img_height: args.img_height,
        dir_out: args.dir_out.clone(),
        write: !args.no_write,
        previous_frame: args.previous_frame.clone().map(PreviousFrame::Path),
        name: args.name.clone(),
        mask_delta: args.mask_delta.clone(),
        mask_square: args.mask_square,
        cue_models: CueModels {
            hed: args.hed_model.clone(),
            depth: args.depth_model.clone(),
        },
    };
    options.validate().context("Invalid options")?;

    let pb = ProgressBar::new(args.nb_samples as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Sampling [{bar:40.cyan/blue}] {pos}/{len}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    for i in 0..args.nb_samples {
        options.name = sample_name(&args.name, i, args.nb_samples);

        generate(&options).with_context(|| format!("Failed to generate {}", options.name))?;

        pb.inc(1);
    }

    pb.finish_with_message("Sampling complete");

    println!(
        "Successfully generated {} sample(s) in {}",
        args.nb_samples,
        args.dir_out.display()
    );

    Ok(())
}
