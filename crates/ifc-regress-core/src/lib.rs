//! Conversion regression harness for IFC model folders.
//!
//! A run converts every model under a root folder, records per-file outcome
//! and metrics in a CSV report, and compares pass/fail state with the most
//! recent earlier report in the same folder.

pub mod artifacts;
pub mod capture;
pub mod config;
pub mod convert;
pub mod discovery;
pub mod errors;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod transitions;

pub use config::{ConverterKind, RegressionConfig};
pub use errors::{ConfigError, ConvertError, ReportError};
pub use model::{Measured, ModelFacts, Outcome, ResultRecord};
pub use orchestrator::{BatchOrchestrator, RunOutcome};
pub use report::ResultSet;
pub use transitions::{compare_sets, RunSummary, Transition};
