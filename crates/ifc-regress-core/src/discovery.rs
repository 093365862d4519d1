//! Locating source models and the previous run's report under a root folder.

use crate::report::REPORT_EXTENSION;
use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Source files under `root` whose extension matches one of `extensions`
/// (case-insensitive, without the dot), ordered by path.
///
/// Unreadable subdirectories are logged and skipped.
pub fn discover_inputs(root: &Path, extensions: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("model folder {} does not exist", root.display());
    }
    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    debug!(root = %root.display(), count = files.len(), "discovered model files");
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

fn report_matcher(prefix: &str) -> Result<GlobMatcher> {
    let pattern = format!("{}_*.{}", globset::escape(prefix), REPORT_EXTENSION);
    let glob = GlobBuilder::new(&pattern)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid report prefix {prefix:?}"))?;
    Ok(glob.compile_matcher())
}

/// Most recently modified `<prefix>_*.csv` directly inside `root`.
pub fn latest_report(root: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    let matcher = report_matcher(prefix)?;
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("failed to list {}", root.display()))?;

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name() else {
            continue;
        };
        if !matcher.is_match(name) || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let newer = match &best {
            None => true,
            Some((t, p)) => (modified, &path) > (*t, p),
        };
        if newer {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn exts() -> Vec<String> {
        vec!["ifc".to_string()]
    }

    #[test]
    fn finds_models_recursively_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.ifc"), "").unwrap();
        fs::write(dir.path().join("a.IFC"), "").unwrap();
        fs::write(dir.path().join("a.ifc.xbim"), "").unwrap();
        fs::write(dir.path().join("sub").join("c.ifc"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let found = discover_inputs(dir.path(), &exts(), true).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"a.IFC".to_string()));
        assert!(names.contains(&format!("sub{}c.ifc", std::path::MAIN_SEPARATOR)));

        let top = discover_inputs(dir.path(), &exts(), false).unwrap();
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_inputs(&dir.path().join("nope"), &exts(), true).is_err());
    }

    #[test]
    fn latest_report_prefers_newest() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_report(dir.path(), "XbimRegression").unwrap(), None);

        let old = dir.path().join("XbimRegression_20200101-000000.csv");
        let new = dir.path().join("XbimRegression_20190101-000000.csv");
        fs::write(&old, "x").unwrap();
        fs::write(dir.path().join("Other_20300101-000000.csv"), "x").unwrap();
        let f = fs::File::options().write(true).open(&old).unwrap();
        f.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();
        fs::write(&new, "x").unwrap();

        assert_eq!(latest_report(dir.path(), "XbimRegression").unwrap(), Some(new));
    }
}
