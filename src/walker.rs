//! Injectable directory-walking abstraction.
//!
//! The distro and whiteout-detection probes need to walk a directory tree a
//! bounded number of times; expressing the walk behind a trait lets tests
//! drive them over an in-memory fixture instead of real files on disk.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// Depth relative to the walk root; the root itself is depth 0.
    pub depth: usize,
}

pub trait DirWalker {
    fn walk(&self, root: &Path) -> Box<dyn Iterator<Item = WalkEntry>>;
}

/// Default walker backed by `walkdir`, following no symlinks.
pub struct OsWalker;

impl DirWalker for OsWalker {
    fn walk(&self, root: &Path) -> Box<dyn Iterator<Item = WalkEntry>> {
        let entries: Vec<WalkEntry> = walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| WalkEntry {
                path: e.path().to_path_buf(),
                is_dir: e.file_type().is_dir(),
                depth: e.depth(),
            })
            .collect();
        Box::new(entries.into_iter())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub struct FixtureWalker {
    entries: Vec<WalkEntry>,
}

#[cfg(any(test, feature = "test-utils"))]
impl FixtureWalker {
    /// Builds a walker over a fixed set of relative paths, each becoming a
    /// `WalkEntry` rooted at whatever `root` is passed to `walk`.
    pub fn new(dirs: &[&str], files: &[&str]) -> Self {
        let mut entries = Vec::new();
        for d in dirs {
            entries.push((PathBuf::from(d), true));
        }
        for f in files {
            entries.push((PathBuf::from(f), false));
        }
        FixtureWalker {
            entries: entries
                .into_iter()
                .map(|(path, is_dir)| {
                    let depth = path.components().count();
                    WalkEntry { path, is_dir, depth }
                })
                .collect(),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl DirWalker for FixtureWalker {
    fn walk(&self, root: &Path) -> Box<dyn Iterator<Item = WalkEntry>> {
        let entries: Vec<WalkEntry> = self
            .entries
            .iter()
            .map(|e| WalkEntry {
                path: root.join(&e.path),
                is_dir: e.is_dir,
                depth: e.depth,
            })
            .collect();
        Box::new(entries.into_iter())
    }
}
