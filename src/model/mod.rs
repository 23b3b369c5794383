//! Checkpoint loading and the restoration network.

mod config;
mod loader;
mod palette;

pub use config::{CondImageCreation, TrainConfig, TRAIN_CONFIG_FILE};
pub use loader::{checkpoint_dir, load_model, load_session, load_train_config, Device};
pub use palette::{
    NoiseSchedule, PaletteModel, Restoration, RestorationInputs, SamplingMethod, SAMPLE_NUM,
};

pub(crate) use palette::extract_array4;
