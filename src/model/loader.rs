//! Checkpoint loading utilities.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;

use crate::error::{Error, Result};

use super::config::{TrainConfig, TRAIN_CONFIG_FILE};
use super::palette::{NoiseSchedule, PaletteModel, SamplingMethod};

/// Residual-block count that palette generators cannot use.
const OVERSIZED_NBLOCKS: u32 = 9;

/// Residual-block count used instead of [`OVERSIZED_NBLOCKS`].
const PALETTE_NBLOCKS: u32 = 2;

/// Compute device the network runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    /// Accelerator by index.
    Cuda(u32),
}

impl Device {
    /// Device for the `--cpu` / `--gpuid` flag pair.
    #[must_use]
    pub const fn from_flags(cpu: bool, gpu_id: u32) -> Self {
        if cpu {
            Self::Cpu
        } else {
            Self::Cuda(gpu_id)
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

/// Directory holding a weights file and its training snapshot.
#[must_use]
pub fn checkpoint_dir(model_in_file: &Path) -> PathBuf {
    model_in_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Read the training snapshot next to a weights file and apply the
/// inference-time corrections.
///
/// The exported graph fixes the architecture, so a corrected `G_nblocks` is
/// informational only.
///
/// # Errors
///
/// Returns an error if the snapshot is missing or invalid.
pub fn load_train_config(model_in_file: &Path) -> Result<TrainConfig> {
    let config_path = checkpoint_dir(model_in_file).join(TRAIN_CONFIG_FILE);
    let mut config = TrainConfig::from_file(&config_path)?;

    if config.G_nblocks == OVERSIZED_NBLOCKS {
        tracing::warn!(
            "G_nblocks default value {} is too high for palette model, {} will be used instead.",
            config.G_nblocks,
            PALETTE_NBLOCKS
        );
        config.G_nblocks = PALETTE_NBLOCKS;
    }

    Ok(config)
}

/// Reconstruct an evaluation-ready model from a checkpoint.
///
/// `sampling_steps > 0` overrides the test-phase step count of the noise
/// schedule.
///
/// # Errors
///
/// Returns an error if the snapshot or weights are missing, or the session
/// cannot be created on `device`.
pub fn load_model(
    model_in_file: &Path,
    device: Device,
    sampling_steps: i32,
    sampling_method: SamplingMethod,
) -> Result<(PaletteModel, TrainConfig)> {
    let config = load_train_config(model_in_file)?;

    let mut schedule = NoiseSchedule {
        train_n_timestep: config.alg_diffusion_n_timestep_train,
        test_n_timestep: config.alg_diffusion_n_timestep_test,
    };
    if let Ok(steps) = u32::try_from(sampling_steps) {
        if steps > 0 {
            schedule = schedule.with_test_steps(steps);
        }
    }

    // Surface a missing weights file as the underlying I/O error
    fs::metadata(model_in_file)?;

    tracing::info!("Loading {} on {device}", model_in_file.display());
    let session = load_session(model_in_file, device)?;

    Ok((PaletteModel::new(session, schedule, sampling_method), config))
}

/// Open an ONNX session bound to `device`.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded.
#[allow(clippy::cast_possible_wrap)]
pub fn load_session(path: &Path, device: Device) -> Result<Session> {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let builder = Session::builder().map_err(|source| Error::ModelLoad {
        name: name.clone(),
        source,
    })?;

    let builder = match device {
        Device::Cpu => builder.with_execution_providers([CPUExecutionProvider::default().build()]),
        Device::Cuda(id) => builder.with_execution_providers([CUDAExecutionProvider::default()
            .with_device_id(id as i32)
            .build()
            .error_on_failure()]),
    }
    .map_err(|source| Error::ModelLoad {
        name: name.clone(),
        source: source.into(),
    })?;

    builder
        .commit_from_file(path)
        .map_err(|source| Error::ModelLoad { name, source })
}
