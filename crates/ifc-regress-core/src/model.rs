//! Per-file result model.
//!
//! A [`ResultRecord`] is assembled once by the orchestrator and is read-only
//! afterwards; it only flows into serialization and baseline comparison.

use serde::{Deserialize, Serialize};

/// Pass/fail state of a file in some run, including "no data for that run".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Failed,
    Passed,
    #[default]
    NoPriorData,
}

impl Outcome {
    pub fn from_failed(failed: bool) -> Self {
        if failed {
            Outcome::Failed
        } else {
            Outcome::Passed
        }
    }

    /// `Some(true)` for failed, `Some(false)` for passed.
    pub fn failed(self) -> Option<bool> {
        match self {
            Outcome::Failed => Some(true),
            Outcome::Passed => Some(false),
            Outcome::NoPriorData => None,
        }
    }

    /// Report cell text. These three strings are part of the on-disk contract.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Failed => "Failed",
            Outcome::Passed => "Passed",
            Outcome::NoPriorData => "No Test",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "FAILED" => Outcome::Failed,
            "PASSED" => Outcome::Passed,
            _ => Outcome::NoPriorData,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A count that may not have been taken yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Measured {
    #[default]
    NotMeasured,
    Measured(u32),
}

impl Measured {
    pub fn value(self) -> Option<u32> {
        match self {
            Measured::NotMeasured => None,
            Measured::Measured(n) => Some(n),
        }
    }

    /// Count for display and summaries; an unmeasured count reads as zero.
    pub fn or_zero(self) -> u32 {
        self.value().unwrap_or(0)
    }
}

impl std::fmt::Display for Measured {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Measured::NotMeasured => f.write_str("-"),
            Measured::Measured(n) => write!(f, "{}", n),
        }
    }
}

/// Header and summary facts read from an opened model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFacts {
    pub entity_count: u64,
    pub geometry_node_count: u64,
    pub product_count: u64,
    pub solid_count: u64,
    pub mapped_count: u64,
    pub boolean_count: u64,
    pub schema: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub application: Option<String>,
}

/// Outcome of converting one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Path of the source file; the comparison key across runs.
    pub file_name: String,
    pub failed: bool,
    pub last_run: Outcome,

    pub errors: Measured,
    pub warnings: u32,

    pub parse_ms: u64,
    pub geometry_ms: u64,
    pub scene_ms: u64,

    pub source_bytes: u64,
    pub converted_bytes: u64,
    pub scene_bytes: u64,

    pub facts: ModelFacts,
}

impl ResultRecord {
    /// Blank record for `file_name`, errors not yet measured.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Always the sum of the three phase durations.
    pub fn total_ms(&self) -> u64 {
        self.parse_ms
            .saturating_add(self.geometry_ms)
            .saturating_add(self.scene_ms)
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_failed(self.failed)
    }
}
