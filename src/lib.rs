//! # `palette-infer`
//!
//! Single-image inference driver for palette image-to-image diffusion models
//! exported to ONNX.
//!
//! Given an image, an optional mask and an optional bounding-box file, the
//! driver resolves a crop around one box, builds the conditioning image the
//! model was trained with, runs the restoration network and pastes the
//! generated crop back into the full-resolution image.
//!
//! The [`matrix`] module enumerates training-configuration combinations and
//! hands each one to an external training launcher.
//!
//! ## Example
//!
//! ```no_run
//! use palette_infer::{generate, GenerateOptions};
//!
//! # fn main() -> palette_infer::Result<()> {
//! let options = GenerateOptions {
//!     model_in_file: "checkpoints/inpaint/latest_net_G_A.onnx".into(),
//!     img_in: "frame.png".into(),
//!     bbox_in: Some("frame.txt".into()),
//!     seed: Some(0),
//!     ..GenerateOptions::default()
//! };
//!
//! let generated = generate(&options)?;
//! generated.image.save("out.png").ok();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod geometry;
pub mod image;
pub mod matrix;
pub mod model;
pub mod pipeline;

pub use error::{Error, Result};
pub use pipeline::{generate, generate_with_model, GenerateOptions, Generated};
