//! Human-facing lines printed while a batch runs.

use crate::model::ResultRecord;
use crate::transitions::{ComparisonEntry, RunSummary, Transition};
use std::fmt::Write as _;

/// One line per processed file.
pub fn file_line(r: &ResultRecord) -> String {
    if r.failed {
        format!(
            "Processing failed for {} after {}ms.",
            r.file_name,
            r.total_ms()
        )
    } else {
        format!(
            "Processed {} : {} errors, {} Warnings in {}ms. {} IFC Elements & {} Geometry Nodes.",
            r.file_name,
            r.errors.or_zero(),
            r.warnings,
            r.total_ms(),
            r.facts.entity_count,
            r.facts.geometry_node_count
        )
    }
}

pub fn summary_text(s: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} files processed: {} passed, {} failed, {} new ({} errors, {} warnings)",
        s.total, s.passed, s.failed, s.new, s.errors, s.warnings
    );
    if !s.regressed.is_empty() {
        let _ = writeln!(out, "Regressed ({}):", s.regressed.len());
        for f in &s.regressed {
            let _ = writeln!(out, "  - {f}");
        }
    }
    if !s.fixed.is_empty() {
        let _ = writeln!(out, "Fixed ({}):", s.fixed.len());
        for f in &s.fixed {
            let _ = writeln!(out, "  + {f}");
        }
    }
    if !s.missing.is_empty() {
        let _ = writeln!(out, "Missing from current ({}):", s.missing.len());
        for f in &s.missing {
            let _ = writeln!(out, "  ? {f}");
        }
    }
    out
}

/// Tabular `compare` output: one line per file that flipped.
pub fn comparison_text(entries: &[ComparisonEntry], s: &RunSummary) -> String {
    let mut out = String::new();
    for e in entries.iter().filter(|e| e.transition.is_flip()) {
        let tag = match e.transition {
            Transition::Regressed => "REGRESSED",
            _ => "FIXED",
        };
        let _ = writeln!(
            out,
            "{tag:<10} {} ({} -> {})",
            e.file_name, e.previous, e.current
        );
    }
    out.push_str(&summary_text(s));
    out
}
