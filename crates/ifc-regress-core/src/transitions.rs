//! Pass/fail transitions between a baseline and the current run.
//!
//! Only pass/fail flips count. Metric drift (timings, entity counts) is
//! reported by neither the run summary nor `compare`.

use crate::model::{Outcome, ResultRecord};
use crate::report::schema::file_key;
use crate::report::ResultSet;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Passed in the baseline, failed now.
    Regressed,
    /// Failed in the baseline, passed now.
    Fixed,
    StillFailing,
    StillPassing,
    /// No baseline data for the file.
    New,
}

impl Transition {
    pub fn between(previous: Outcome, failed_now: bool) -> Self {
        match (previous, failed_now) {
            (Outcome::NoPriorData, _) => Transition::New,
            (Outcome::Passed, true) => Transition::Regressed,
            (Outcome::Failed, false) => Transition::Fixed,
            (Outcome::Failed, true) => Transition::StillFailing,
            (Outcome::Passed, false) => Transition::StillPassing,
        }
    }

    pub fn of(record: &ResultRecord) -> Self {
        Self::between(record.last_run, record.failed)
    }

    pub fn is_flip(self) -> bool {
        matches!(self, Transition::Regressed | Transition::Fixed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonEntry {
    pub file_name: String,
    pub previous: Outcome,
    pub current: Outcome,
    pub transition: Transition,
}

/// Counts and flipped files for one run (or one report comparison).
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub new: usize,
    pub errors: u64,
    pub warnings: u64,
    pub regressed: Vec<String>,
    pub fixed: Vec<String>,
    /// Baseline files absent from the current set (comparison only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl RunSummary {
    /// Summary of a finished run; each record carries its own baseline state.
    pub fn from_run(set: &ResultSet) -> Self {
        let mut summary = RunSummary::default();
        for r in set {
            summary.add(r, Transition::of(r));
        }
        summary
    }

    fn add(&mut self, r: &ResultRecord, transition: Transition) {
        self.total += 1;
        if r.failed {
            self.failed += 1;
        } else {
            self.passed += 1;
        }
        self.errors += u64::from(r.errors.or_zero());
        self.warnings += u64::from(r.warnings);
        match transition {
            Transition::Regressed => self.regressed.push(r.file_name.clone()),
            Transition::Fixed => self.fixed.push(r.file_name.clone()),
            Transition::New => self.new += 1,
            Transition::StillFailing | Transition::StillPassing => {}
        }
    }
}

/// Classify `current` against `baseline` by file name.
///
/// The baseline lookup ignores whatever `LastTest` column `current` was
/// written with.
pub fn compare_sets(baseline: &ResultSet, current: &ResultSet) -> (Vec<ComparisonEntry>, RunSummary) {
    let mut entries = Vec::with_capacity(current.len());
    let mut summary = RunSummary::default();
    for r in current {
        let previous = baseline.compare(r);
        let transition = Transition::between(previous, r.failed);
        summary.add(r, transition);
        entries.push(ComparisonEntry {
            file_name: r.file_name.clone(),
            previous,
            current: r.outcome(),
            transition,
        });
    }

    let seen: HashSet<String> = current.iter().map(|r| file_key(&r.file_name)).collect();
    let mut reported = HashSet::new();
    for r in baseline {
        let key = file_key(&r.file_name);
        if !seen.contains(&key) && reported.insert(key) {
            summary.missing.push(r.file_name.clone());
        }
    }
    (entries, summary)
}
