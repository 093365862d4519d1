//! Run configuration, read from an optional YAML file in the model folder.

use crate::errors::ConfigError;
use crate::report::DEFAULT_REPORT_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

pub const DEFAULT_CONFIG_FILE: &str = "ifc-regress.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureLevel {
    Error,
    Warn,
    Info,
    #[default]
    Debug,
    Trace,
}

impl CaptureLevel {
    pub fn as_level(self) -> Level {
        match self {
            CaptureLevel::Error => Level::ERROR,
            CaptureLevel::Warn => Level::WARN,
            CaptureLevel::Info => Level::INFO,
            CaptureLevel::Debug => Level::DEBUG,
            CaptureLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConverterKind {
    /// Bundled STEP reader.
    #[default]
    Step,
    /// External program; `{input}` and `{output}` are substituted in `args`.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegressionConfig {
    pub report_prefix: String,
    /// Source extensions without the dot, matched case-insensitively.
    pub extensions: Vec<String>,
    pub recursive: bool,
    pub caching: bool,
    pub geometry: bool,
    pub capture_level: CaptureLevel,
    pub echo_captured: bool,
    pub converter: ConverterKind,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            report_prefix: DEFAULT_REPORT_PREFIX.to_string(),
            extensions: vec!["ifc".to_string()],
            recursive: true,
            caching: false,
            geometry: true,
            capture_level: CaptureLevel::default(),
            echo_captured: true,
            converter: ConverterKind::default(),
        }
    }
}

impl RegressionConfig {
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validated()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }

    /// Load `explicit` if given, else `<root>/ifc-regress.yaml` if present,
    /// else defaults.
    pub fn resolve(root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let implicit: PathBuf = root.join(DEFAULT_CONFIG_FILE);
        if implicit.is_file() {
            debug!(path = %implicit.display(), "using config file");
            Self::load(&implicit)
        } else {
            Ok(Self::default())
        }
    }

    /// Normalise extensions and reject settings a run cannot use.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.report_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("report_prefix must not be empty".into()));
        }
        if self.report_prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "report_prefix {:?} must not contain path separators",
                self.report_prefix
            )));
        }
        self.extensions = self
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("at least one extension is required".into()));
        }
        if let ConverterKind::Command {
            program,
            timeout_secs,
            ..
        } = &self.converter
        {
            if program.trim().is_empty() {
                return Err(ConfigError::Invalid("converter program must not be empty".into()));
            }
            if *timeout_secs == Some(0) {
                return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
            }
        }
        Ok(self)
    }
}
