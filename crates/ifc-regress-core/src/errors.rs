use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A conversion fault. Any of these marks the file as failed.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{extension} files are not supported by this converter")]
    UnsupportedFormat { extension: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model: {0}")]
    Malformed(String),

    #[error("geometry generation failed: {0}")]
    Geometry(String),

    #[error("converter exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("converter timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("converter panicked: {0}")]
    Panicked(String),
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
