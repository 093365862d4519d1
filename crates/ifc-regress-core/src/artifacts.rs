//! Files derived from a source model, named by appending to its full name.

use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONVERTED_EXT: &str = "xbim";
pub const WEXBIM_EXT: &str = "jfm";
pub const SCENE_EXT: &str = "xbimScene";
pub const LOG_EXT: &str = "log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub converted: PathBuf,
    pub wexbim: PathBuf,
    pub scene: PathBuf,
    pub log: PathBuf,
}

impl ArtifactPaths {
    /// `a.ifc` gives `a.ifc.xbim`, `a.ifc.jfm`, `a.ifc.xbimScene`, `a.ifc.log`.
    pub fn for_source(source: &Path) -> Self {
        Self {
            converted: append_ext(source, CONVERTED_EXT),
            wexbim: append_ext(source, WEXBIM_EXT),
            scene: append_ext(source, SCENE_EXT),
            log: append_ext(source, LOG_EXT),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.converted, &self.wexbim, &self.scene, &self.log]
    }

    /// Delete stale artifacts from an earlier run. Failures are ignored.
    pub fn clean(&self) {
        for path in self.all() {
            if std::fs::remove_file(path).is_ok() {
                debug!(path = %path.display(), "removed stale artifact");
            }
        }
    }
}

fn append_ext(source: &Path, ext: &str) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Size of `path` in bytes, 0 when it does not exist or cannot be read.
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
