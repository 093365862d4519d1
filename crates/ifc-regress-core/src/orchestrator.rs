//! Sequential batch run over a model folder.
//!
//! Each file is converted inside its own log-capture scope and a panic guard;
//! whatever goes wrong with one file ends up in that file's record and the
//! loop moves on. Only writing the final report can fail the run.

use crate::artifacts::{file_len, ArtifactPaths};
use crate::capture::LogCapture;
use crate::config::RegressionConfig;
use crate::convert::{build_converter, Converter, OpenOptions};
use crate::discovery;
use crate::errors::ConvertError;
use crate::model::{Measured, ModelFacts, ResultRecord};
use crate::report::{report_file_name, ResultSet};
use crate::transitions::RunSummary;
use anyhow::{Context, Result};
use chrono::Local;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: ResultSet,
    pub report_path: PathBuf,
    pub baseline_path: Option<PathBuf>,
    pub summary: RunSummary,
}

#[derive(Debug, Default, Clone, Copy)]
struct PhaseTimes {
    parse_ms: u64,
    geometry_ms: u64,
}

pub struct BatchOrchestrator {
    root: PathBuf,
    config: RegressionConfig,
    converter: Box<dyn Converter>,
    capture: LogCapture,
}

impl BatchOrchestrator {
    pub fn new(root: impl Into<PathBuf>, config: RegressionConfig) -> Self {
        let converter = build_converter(&config.converter);
        let capture = LogCapture::new(config.capture_level.as_level(), config.echo_captured);
        Self {
            root: root.into(),
            config,
            converter,
            capture,
        }
    }

    pub fn with_converter(mut self, converter: Box<dyn Converter>) -> Self {
        self.converter = converter;
        self
    }

    /// Most recent report under the root, loaded. Any problem means "no
    /// baseline" and is only logged.
    pub fn load_baseline(&self) -> Option<(PathBuf, ResultSet)> {
        let path = match discovery::latest_report(&self.root, &self.config.report_prefix) {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!("no previous report found; every file is new");
                return None;
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "cannot search for a previous report");
                return None;
            }
        };
        info!(report = %path.display(), "loading last report file");
        match ResultSet::load_from_file(&path) {
            Ok(set) => Some((path, set)),
            Err(e) => {
                warn!(error = %e, "ignoring previous report");
                None
            }
        }
    }

    /// Convert every discovered file, then write the report.
    ///
    /// `on_result` sees each record as soon as it is complete.
    pub fn run(&self, mut on_result: impl FnMut(&ResultRecord)) -> Result<RunOutcome> {
        let (baseline_path, baseline) = match self.load_baseline() {
            Some((p, set)) => (Some(p), Some(set)),
            None => (None, None),
        };

        let files = discovery::discover_inputs(
            &self.root,
            &self.config.extensions,
            self.config.recursive,
        )?;
        info!(count = files.len(), converter = self.converter.name(), "conversion starting");

        let mut results = ResultSet::new();
        for file in &files {
            let record = self.process_file(file, baseline.as_ref());
            on_result(&record);
            results.push(record);
        }

        let report_path = self
            .root
            .join(report_file_name(&self.config.report_prefix, &Local::now()));
        results
            .write_to_file(&report_path)
            .context("creating regression report")?;
        info!(report = %report_path.display(), files = results.len(), "report written");

        let summary = RunSummary::from_run(&results);
        Ok(RunOutcome {
            results,
            report_path,
            baseline_path,
            summary,
        })
    }

    /// Convert one file into a complete record. Never fails.
    pub fn process_file(&self, source: &Path, baseline: Option<&ResultSet>) -> ResultRecord {
        let artifacts = ArtifactPaths::for_source(source);
        artifacts.clean();
        debug!(file = %source.display(), "processing");

        let mut record = ResultRecord::new(source.display().to_string());
        let mut times = PhaseTimes::default();
        let scope = self.capture.begin();

        let converted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.convert(source, &artifacts, &mut times)
        }));
        let fault = match converted {
            Ok(Ok(facts)) => {
                record.facts = facts;
                None
            }
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(ConvertError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Some(e) = fault {
            error!(error = %e, "Problem converting file: {}", source.display());
            record.failed = true;
        }

        let log = scope.finish();
        record.errors = Measured::Measured(log.error_count());
        record.warnings = log.warning_count();
        record.parse_ms = times.parse_ms;
        record.geometry_ms = times.geometry_ms;
        record.scene_ms = 0;
        record.source_bytes = file_len(source);
        record.converted_bytes = file_len(&artifacts.converted);
        record.scene_bytes = file_len(&artifacts.scene);

        if !log.is_empty() {
            if let Err(e) = log.write_log_file(&artifacts.log, source) {
                error!(file = %source.display(), error = %e, "failed to create log file");
            }
        }

        if let Some(baseline) = baseline {
            record.last_run = baseline.compare(&record);
        }
        record
    }

    fn convert(
        &self,
        source: &Path,
        artifacts: &ArtifactPaths,
        times: &mut PhaseTimes,
    ) -> Result<ModelFacts, ConvertError> {
        let options = OpenOptions {
            caching: self.config.caching,
            converted_path: artifacts.converted.clone(),
        };
        let watch = Instant::now();
        let opened = self.converter.open(source, &options);
        times.parse_ms = elapsed_ms(watch);
        let mut model = opened?;

        if self.config.geometry {
            if let Err(e) = model.generate_geometry() {
                error!("Error compiling geometry: {} - {}", source.display(), e);
            }
        }
        times.geometry_ms = elapsed_ms(watch).saturating_sub(times.parse_ms);
        model.facts()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
