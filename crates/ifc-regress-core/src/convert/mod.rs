//! Model converters: the collaborator that opens a source file, generates
//! its geometry and reports facts about it.

pub mod command;
pub mod scanner;
pub mod step;

use crate::config::ConverterKind;
use crate::errors::ConvertError;
use crate::model::ModelFacts;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use command::CommandConverter;
pub use step::{StepConverter, StepModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Persist the converted model to `converted_path`.
    pub caching: bool,
    pub converted_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometrySummary {
    pub node_count: u64,
}

pub trait Converter {
    fn name(&self) -> &str;

    fn open(&self, source: &Path, options: &OpenOptions)
        -> Result<Box<dyn ModelHandle>, ConvertError>;
}

/// An opened model. Dropped as soon as its facts are read.
pub trait ModelHandle {
    fn generate_geometry(&mut self) -> Result<GeometrySummary, ConvertError>;

    /// Facts about the model; the geometry node count is 0 until
    /// [`generate_geometry`](ModelHandle::generate_geometry) succeeds.
    fn facts(&self) -> Result<ModelFacts, ConvertError>;
}

pub fn build_converter(kind: &ConverterKind) -> Box<dyn Converter> {
    match kind {
        ConverterKind::Step => Box::new(StepConverter),
        ConverterKind::Command {
            program,
            args,
            timeout_secs,
        } => Box::new(CommandConverter::new(
            program.clone(),
            args.clone(),
            timeout_secs.map(Duration::from_secs),
        )),
    }
}

/// Lower-cased extension of `source` including the dot, or empty.
pub(crate) fn dotted_extension(source: &Path) -> String {
    source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}
