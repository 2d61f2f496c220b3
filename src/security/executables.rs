//! Point-in-time snapshot of executable names on the search path.
//!
//! Only strict mode consults it. The snapshot is built once and never
//! refreshed, so a tool installed after construction stays unknown until a
//! new validator is created.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use tracing::debug;

/// Upper bound on indexed names. Keeps the scan cheap on machines with
/// very long search paths.
pub const MAX_EXECUTABLES: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct ExecutableIndex {
    names: HashSet<String>,
}

impl ExecutableIndex {
    /// An index that knows no executables.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a fixed index, e.g. for tests. Still honours the cap.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().take(MAX_EXECUTABLES).map(Into::into).collect(),
        }
    }

    /// Scans `$PATH` of the current process.
    pub fn scan() -> Self {
        match std::env::var_os("PATH") {
            Some(path) => Self::from_search_path(&path),
            None => Self::empty(),
        }
    }

    /// Scans each directory of a `PATH`-style value in order, stopping once
    /// [`MAX_EXECUTABLES`] names are recorded.
    pub fn from_search_path(search_path: &OsStr) -> Self {
        let mut names = HashSet::new();

        for dir in std::env::split_paths(search_path) {
            if names.len() >= MAX_EXECUTABLES {
                break;
            }
            scan_dir(&dir, &mut names);
        }

        debug!("Indexed {} executables from search path", names.len());
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn scan_dir(dir: &Path, names: &mut HashSet<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping search path entry {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        if names.len() >= MAX_EXECUTABLES {
            return;
        }
        if !is_executable(&entry.path()) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.insert(name.to_string());
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}
