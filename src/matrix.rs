//! Training-configuration matrix runner.
//!
//! A [`ConfigMatrix`] is a base training configuration, a list of axes whose
//! cartesian product is enumerated in order, and exclusion rules. Each
//! surviving combination is handed to a [`TrainingLauncher`] synchronously;
//! the first failure aborts the run.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::TempDir;
use thiserror::Error as ThisError;

use crate::error::{Error, Result};

/// Training configuration passed to a launcher.
pub type TrainOptions = Map<String, Value>;

/// Model families a training run can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Cut,
    CycleGan,
    Palette,
    Cm,
    CmGan,
    ReCut,
    ReCycleGan,
}

impl ModelType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cut => "cut",
            Self::CycleGan => "cycle_gan",
            Self::Palette => "palette",
            Self::Cm => "cm",
            Self::CmGan => "cm_gan",
            Self::ReCut => "re_cut",
            Self::ReCycleGan => "re_cycle_gan",
        }
    }
}

/// Unknown model family name.
#[derive(Debug, ThisError)]
#[error("unknown model type {0:?}")]
pub struct UnknownModelType(pub String);

impl FromStr for ModelType {
    type Err = UnknownModelType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| UnknownModelType(s.to_string()))
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dimension of the matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub key: String,
    pub values: Vec<Value>,
}

impl Axis {
    pub fn new<K, V, I>(key: K, values: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `model_type` axis over known model families.
    #[must_use]
    pub fn models(models: &[ModelType]) -> Self {
        Self::new("model_type", models.iter().map(ModelType::as_str))
    }
}

/// Skip combinations where `key == equals` and `other_key` contains `contains`.
///
/// "Contains" means array membership, or equality for scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub key: String,
    pub equals: Value,
    pub other_key: String,
    pub contains: Value,
}

impl Exclusion {
    fn matches(&self, options: &TrainOptions) -> bool {
        if options.get(&self.key) != Some(&self.equals) {
            return false;
        }
        match options.get(&self.other_key) {
            Some(Value::Array(items)) => items.contains(&self.contains),
            Some(other) => other == &self.contains,
            None => false,
        }
    }
}

/// Base configuration plus the axes and exclusions to enumerate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMatrix {
    pub base: TrainOptions,
    #[serde(default)]
    pub axes: Vec<Axis>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    /// Keys whose value is appended to `name` as `_<value>`.
    #[serde(default)]
    pub name_suffix_keys: Vec<String>,
}

/// One expanded combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub options: TrainOptions,
    pub excluded: bool,
}

impl ConfigMatrix {
    #[must_use]
    pub fn new(base: TrainOptions) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn axis(mut self, axis: Axis) -> Self {
        self.axes.push(axis);
        self
    }

    #[must_use]
    pub fn exclude(mut self, exclusion: Exclusion) -> Self {
        self.exclusions.push(exclusion);
        self
    }

    #[must_use]
    pub fn suffix_name_with(mut self, key: impl Into<String>) -> Self {
        self.name_suffix_keys.push(key.into());
        self
    }

    /// Point the base configuration at a dataset; checkpoints go next to it.
    #[must_use]
    pub fn with_dataroot(mut self, dataroot: &Path) -> Self {
        let checkpoints_dir = dataroot.parent().unwrap_or(dataroot);
        self.base.insert(
            "dataroot".to_string(),
            Value::String(dataroot.display().to_string()),
        );
        self.base.insert(
            "checkpoints_dir".to_string(),
            Value::String(checkpoints_dir.display().to_string()),
        );
        self
    }

    /// Read a matrix description from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Expand every combination in product order, last axis fastest.
    ///
    /// # Errors
    ///
    /// Returns an error if an axis is empty or names an unknown model type.
    pub fn combinations(&self) -> Result<Vec<Combination>> {
        for axis in &self.axes {
            if axis.values.is_empty() {
                return Err(Error::InvalidParameter {
                    name: axis.key.clone(),
                    reason: "axis has no values".to_string(),
                });
            }
        }

        let total: usize = self.axes.iter().map(|a| a.values.len()).product();
        let mut combos = Vec::with_capacity(total);
        let mut counters = vec![0usize; self.axes.len()];

        for _ in 0..total {
            let mut options = self.base.clone();
            for (axis, &i) in self.axes.iter().zip(&counters) {
                options.insert(axis.key.clone(), axis.values[i].clone());
            }
            check_model_type(&options)?;
            self.apply_name_suffixes(&mut options);

            let excluded = self.exclusions.iter().any(|e| e.matches(&options));
            combos.push(Combination { options, excluded });

            for (counter, axis) in counters.iter_mut().zip(&self.axes).rev() {
                *counter += 1;
                if *counter < axis.values.len() {
                    break;
                }
                *counter = 0;
            }
        }

        Ok(combos)
    }

    fn apply_name_suffixes(&self, options: &mut TrainOptions) {
        if self.name_suffix_keys.is_empty() {
            return;
        }
        let mut name = options
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        for key in &self.name_suffix_keys {
            if let Some(value) = options.get(key) {
                name.push('_');
                name.push_str(&value_label(value));
            }
        }
        options.insert("name".to_string(), Value::String(name));
    }
}

fn check_model_type(options: &TrainOptions) -> Result<()> {
    match options.get("model_type") {
        None => Ok(()),
        Some(Value::String(s)) => s.parse::<ModelType>().map(|_| ()).map_err(|err| {
            Error::InvalidParameter {
                name: "model_type".to_string(),
                reason: err.to_string(),
            }
        }),
        Some(other) => Err(Error::InvalidParameter {
            name: "model_type".to_string(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_label).collect::<Vec<_>>().join("-"),
        other => other.to_string(),
    }
}

/// Starts one training run and blocks until it finishes.
pub trait TrainingLauncher {
    /// # Errors
    ///
    /// Returns an error if the training run fails.
    fn launch(&mut self, options: &TrainOptions) -> Result<()>;
}

/// Outcome of a matrix run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixReport {
    pub launched: usize,
    pub skipped: usize,
}

/// Launch every non-excluded combination in order, stopping at the first failure.
///
/// # Errors
///
/// Returns an error if expansion fails, or [`Error::Launch`] for the first
/// failing combination.
pub fn run_matrix<L: TrainingLauncher + ?Sized>(
    matrix: &ConfigMatrix,
    launcher: &mut L,
) -> Result<MatrixReport> {
    let mut report = MatrixReport::default();

    for (index, combo) in matrix.combinations()?.into_iter().enumerate() {
        let name = combo
            .options
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed")
            .to_string();

        if combo.excluded {
            tracing::info!("Skipping combination {index} ({name})");
            report.skipped += 1;
            continue;
        }

        tracing::info!("Launching combination {index} ({name})");
        launcher
            .launch(&combo.options)
            .map_err(|err| Error::Launch {
                index,
                name: name.clone(),
                reason: err.to_string(),
            })?;
        report.launched += 1;
    }

    tracing::info!(
        "Matrix complete: {} launched, {} skipped",
        report.launched,
        report.skipped
    );
    Ok(report)
}

/// Runs an external command per combination with `--config_json <file>`.
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    scratch: TempDir,
    count: usize,
}

impl CommandLauncher {
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self> {
        Ok(Self {
            program: program.into(),
            args,
            scratch: tempfile::tempdir()?,
            count: 0,
        })
    }

    /// Where the configuration of launch `index` is written.
    #[must_use]
    pub fn config_path(&self, index: usize) -> PathBuf {
        self.scratch.path().join(format!("train_config_{index}.json"))
    }
}

impl TrainingLauncher for CommandLauncher {
    fn launch(&mut self, options: &TrainOptions) -> Result<()> {
        let path = self.config_path(self.count);
        self.count += 1;

        let json = serde_json::to_string_pretty(options).map_err(|source| Error::ConfigParse {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json)?;

        tracing::debug!(
            "Running {} {:?} --config_json {}",
            self.program,
            self.args,
            path.display()
        );
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg("--config_json")
            .arg(&path)
            .status()?;

        check_status(&self.program, status)
    }
}

fn check_status(program: &str, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::LauncherFailed {
            program: program.to_string(),
            status,
        })
    }
}

/// Records configurations instead of training.
#[derive(Debug, Default)]
pub struct DryRunLauncher {
    pub launched: Vec<TrainOptions>,
}

impl TrainingLauncher for DryRunLauncher {
    fn launch(&mut self, options: &TrainOptions) -> Result<()> {
        tracing::info!(
            "Dry run: {}",
            serde_json::to_string(options).unwrap_or_default()
        );
        self.launched.push(options.clone());
        Ok(())
    }
}
