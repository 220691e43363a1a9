//! Depth-bounded, breadth-first directory walk.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Breadth-first walk yielding `(dirpath, filenames)` for each visited directory.
///
/// `max_depth` counts directory levels: 0 walks the whole tree, 1 visits only
/// the root, 2 the root and its children, and so on. Entries are visited in
/// filename order so repeated walks over an unchanged tree agree.
pub struct WalkDepth {
    queue: VecDeque<(PathBuf, usize)>,
    max_depth: usize,
}

impl WalkDepth {
    pub fn new(root: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            queue: VecDeque::from([(root.into(), 0)]),
            max_depth,
        }
    }

    fn descends_below(&self, level: usize) -> bool {
        self.max_depth == 0 || level + 1 < self.max_depth
    }

    fn list(&mut self, dir: &Path, level: usize) -> Vec<String> {
        let listing = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        let mut files = Vec::new();
        for entry in listing {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                if self.descends_below(level) {
                    self.queue.push_back((entry.into_path(), level + 1));
                }
            } else if file_type.is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files
    }
}

impl Iterator for WalkDepth {
    type Item = (PathBuf, Vec<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let (dir, level) = self.queue.pop_front()?;
        let files = self.list(&dir, level);
        Some((dir, files))
    }
}

/// `path` relative to `base`, or `path` itself when it lies elsewhere.
pub fn relative_to(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    if rel.as_os_str().is_empty() {
        ".".to_string()
    } else {
        rel.to_string_lossy().into_owned()
    }
}

/// Absolute form of `path` without resolving symlinks.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
