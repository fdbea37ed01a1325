use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use segeval_core::errors::{ErrorInfo, EvalError};
use segeval_core::{Seed, METHOD_COUNT};
use serde::{Deserialize, Serialize};

/// YAML-configurable inputs of one evaluation experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Directory holding the volumes shown to the evaluator.
    #[serde(default)]
    pub volumes_dir: PathBuf,
    /// One directory of segmentation results per method.
    #[serde(default)]
    pub method_dirs: [PathBuf; METHOD_COUNT],
    /// CSV file receiving the score table after every save.
    #[serde(default)]
    pub output_file: PathBuf,
    /// Seed for the presentation order.
    #[serde(default)]
    pub seed: Option<Seed>,
    /// Reload scores from an existing `output_file` when the experiment starts.
    #[serde(default = "default_true")]
    pub resume: bool,
    /// Ask for confirmation before jumping to first/last or moving forward.
    #[serde(default = "default_true")]
    pub confirm_navigation: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            volumes_dir: PathBuf::new(),
            method_dirs: Default::default(),
            output_file: PathBuf::new(),
            seed: None,
            resume: true,
            confirm_navigation: true,
        }
    }
}

/// Required configuration entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    VolumesDir,
    MethodDir(usize),
    OutputFile,
    Seed,
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigField::VolumesDir => write!(f, "volumes_dir"),
            ConfigField::MethodDir(method) => write!(f, "method_dirs[{method}]"),
            ConfigField::OutputFile => write!(f, "output_file"),
            ConfigField::Seed => write!(f, "seed"),
        }
    }
}

impl ExperimentConfig {
    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, EvalError> {
        serde_yaml::from_str(text).map_err(|err| {
            EvalError::Config(ErrorInfo::new("config.parse", err.to_string()))
        })
    }

    /// Reads and parses a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, EvalError> {
        let text = fs::read_to_string(path).map_err(|err| {
            EvalError::Config(
                ErrorInfo::new("config.read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            EvalError::Config(info) => {
                EvalError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Serialises the configuration back to YAML.
    pub fn to_yaml_string(&self) -> Result<String, EvalError> {
        serde_yaml::to_string(self)
            .map_err(|err| EvalError::Serde(ErrorInfo::new("config.encode", err.to_string())))
    }

    /// Required entries that are still empty, in declaration order.
    pub fn missing_fields(&self) -> Vec<ConfigField> {
        let mut missing = Vec::new();
        if is_blank(&self.volumes_dir) {
            missing.push(ConfigField::VolumesDir);
        }
        for (method, dir) in self.method_dirs.iter().enumerate() {
            if is_blank(dir) {
                missing.push(ConfigField::MethodDir(method));
            }
        }
        if is_blank(&self.output_file) {
            missing.push(ConfigField::OutputFile);
        }
        if self.seed.is_none() {
            missing.push(ConfigField::Seed);
        }
        missing
    }

    /// True when every required entry is set. Does not touch the filesystem.
    pub fn can_start(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Fails with the list of unset entries when the experiment cannot start.
    pub fn ensure_complete(&self) -> Result<(), EvalError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
        Err(EvalError::Config(
            ErrorInfo::new("config.incomplete", "required configuration entries are missing")
                .with_context("missing", names.join(", ")),
        ))
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}
