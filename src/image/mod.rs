//! Image loading, tensor conversion, and saving utilities.

mod load;
mod save;

pub use load::{image_to_tensor, load_mask, load_rgb, mask_to_tensor};
pub use save::{save_rgb, save_tensor, tensor_to_image};

use ndarray::Array4;

/// Image tensor in NCHW format (batch, channels, height, width).
/// Values are normalized to [-1, 1] range for diffusion model compatibility.
pub type ImageTensor = Array4<f32>;

/// Binary mask tensor in NCHW format (1, 1, height, width) with values in {0, 1}.
pub type MaskTensor = Array4<f32>;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;
