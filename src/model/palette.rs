//! Palette restoration network backed by an ONNX session.

use std::borrow::Cow;
use std::fmt;

use ndarray::{s, Array1, Array4};
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::{ImageTensor, MaskTensor};

/// Number of samples requested from the restoration entrypoint; only the
/// primary one is used.
pub const SAMPLE_NUM: usize = 2;

/// Sampler the restoration network should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SamplingMethod {
    #[default]
    Ddpm,
    Ddim,
}

impl SamplingMethod {
    const fn code(self) -> i64 {
        match self {
            Self::Ddpm => 0,
            Self::Ddim => 1,
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ddpm => f.write_str("ddpm"),
            Self::Ddim => f.write_str("ddim"),
        }
    }
}

/// Timestep counts of the train and test noise schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseSchedule {
    pub train_n_timestep: u32,
    pub test_n_timestep: u32,
}

impl NoiseSchedule {
    /// Override the number of test-phase sampling steps.
    #[must_use]
    pub const fn with_test_steps(self, n_timestep: u32) -> Self {
        Self {
            train_n_timestep: self.train_n_timestep,
            test_n_timestep: n_timestep,
        }
    }
}

impl fmt::Display for NoiseSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} train / {} test timesteps",
            self.train_n_timestep, self.test_n_timestep
        )
    }
}

/// Tensors handed to the restoration entrypoint.
#[derive(Debug, Clone, Copy)]
pub struct RestorationInputs<'a> {
    /// Conditioning image.
    pub y_cond: &'a ImageTensor,
    /// Mask-filled noisy target.
    pub y_t: &'a ImageTensor,
    /// Ground truth.
    pub y_0: &'a ImageTensor,
    /// Binary mask, clamped to {0, 1}.
    pub mask: &'a MaskTensor,
}

/// The model's inference entrypoint.
pub trait Restoration {
    /// Run iterative restoration and return the primary output in [-1, 1].
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn restoration(&mut self, inputs: RestorationInputs<'_>, sample_num: usize)
        -> Result<ImageTensor>;
}

/// Restoration network loaded from an exported checkpoint.
pub struct PaletteModel {
    session: Session,
    schedule: NoiseSchedule,
    sampling_method: SamplingMethod,
    input_names: Vec<String>,
}

impl PaletteModel {
    pub(crate) fn new(
        session: Session,
        schedule: NoiseSchedule,
        sampling_method: SamplingMethod,
    ) -> Self {
        let input_names = session.inputs.iter().map(|i| i.name.clone()).collect();
        Self {
            session,
            schedule,
            sampling_method,
            input_names,
        }
    }

    #[must_use]
    pub const fn schedule(&self) -> NoiseSchedule {
        self.schedule
    }

    #[must_use]
    pub const fn sampling_method(&self) -> SamplingMethod {
        self.sampling_method
    }

    fn declares(&self, name: &str) -> bool {
        self.input_names.iter().any(|n| n == name)
    }
}

impl Restoration for PaletteModel {
    #[allow(clippy::cast_possible_wrap)]
    fn restoration(
        &mut self,
        inputs: RestorationInputs<'_>,
        sample_num: usize,
    ) -> Result<ImageTensor> {
        let mut feed: Vec<(Cow<'static, str>, SessionInputValue<'static>)> = vec![
            ("y_cond".into(), tensor_input(inputs.y_cond.clone())?),
            ("y_t".into(), tensor_input(inputs.y_t.clone())?),
            ("y_0".into(), tensor_input(inputs.y_0.clone())?),
            ("mask".into(), tensor_input(inputs.mask.clone())?),
        ];

        let scalars = [
            ("n_timestep", i64::from(self.schedule.test_n_timestep)),
            ("sampling_method", self.sampling_method.code()),
            ("sample_num", sample_num as i64),
        ];
        for (name, value) in scalars {
            if self.declares(name) {
                feed.push((name.into(), scalar_input(value)?));
            } else {
                tracing::debug!("Network does not declare input {name}, ignoring {value}");
            }
        }

        let outputs = self
            .session
            .run(feed)
            .map_err(|source| Error::Inference { source })?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "restoration output".to_string(),
                actual: "no output".to_string(),
            })?;

        let all = extract_array4(&output)?;
        Ok(all.slice(s![0..1, .., .., ..]).to_owned())
    }
}

fn tensor_input(array: Array4<f32>) -> Result<SessionInputValue<'static>> {
    Tensor::from_array(array)
        .map(SessionInputValue::from)
        .map_err(|source| Error::Inference { source })
}

fn scalar_input(value: i64) -> Result<SessionInputValue<'static>> {
    Tensor::from_array(Array1::from_vec(vec![value]))
        .map(SessionInputValue::from)
        .map_err(|source| Error::Inference { source })
}

/// Extract a 4D array from an ONNX value.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub(crate) fn extract_array4(value: &ort::value::ValueRef<'_>) -> Result<Array4<f32>> {
    let (shape_info, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|source| Error::Inference { source })?;

    // Safe: tensor dimensions are always non-negative and within bounds
    let dims: Vec<usize> = shape_info.iter().map(|&x| x as usize).collect();

    if dims.len() != 4 || dims[0] == 0 {
        return Err(Error::ShapeMismatch {
            expected: "non-empty 4D tensor".to_string(),
            actual: format!("{dims:?}"),
        });
    }

    Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec()).map_err(|_| {
        Error::ShapeMismatch {
            expected: format!("{dims:?}"),
            actual: "reshape failed".to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_override_keeps_train_phase() {
        let schedule = NoiseSchedule {
            train_n_timestep: 2000,
            test_n_timestep: 1000,
        };
        let overridden = schedule.with_test_steps(50);

        assert_eq!(overridden.test_n_timestep, 50);
        assert_eq!(overridden.train_n_timestep, 2000);
    }

    #[test]
    fn test_schedule_display_names_both_phases() {
        let schedule = NoiseSchedule {
            train_n_timestep: 2000,
            test_n_timestep: 1000,
        }
        .with_test_steps(25);
        assert_eq!(schedule.to_string(), "2000 train / 25 test timesteps");
    }

    #[test]
    fn test_sampling_method_names() {
        assert_eq!(SamplingMethod::default().to_string(), "ddpm");
        assert_eq!(SamplingMethod::Ddim.to_string(), "ddim");
    }
}
