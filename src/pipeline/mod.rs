//! Crop, conditioning, restoration and recomposition pipeline.

mod composite;
mod conditioning;
mod cues;
mod fill;
mod generate;

pub use composite::{recompose, restore_size};
pub use conditioning::{Conditioning, ConditioningInputs, CueModels, PreviousFrame};
pub use cues::{fill_img_with_cue, CannyCue, CueExtractor, HoughCue, OnnxCue, SketchCue};
pub use fill::MaskFill;
pub use generate::{
    generate, generate_with_model, sample_name, write_outputs, GenerateOptions, Generated,
};
