//! Library search paths and directory discovery
//!
//! Locates plugin libraries by logical name (`geometry` →
//! `libgeometry.so`, `geometry.dll`, ...) across a list of directories.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::LoaderError;

/// Environment variable read by default for extra search directories
pub const PLUGIN_PATH_ENV: &str = "TETHER_PLUGIN_PATH";

/// Errors that can occur while scanning for libraries
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read directory: {0}")]
    ReadDirectory(#[source] std::io::Error),
}

/// Result of loading every library in a directory
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Libraries that loaded, with the plugins each provided
    pub libraries: Vec<(PathBuf, BTreeSet<String>)>,

    /// Libraries that failed to load
    pub failures: Vec<(PathBuf, LoaderError)>,
}

impl DiscoveryResult {
    /// Returns true if every library loaded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of library files found
    pub fn total_found(&self) -> usize {
        self.libraries.len() + self.failures.len()
    }

    /// Every plugin name provided by the loaded libraries
    pub fn plugins(&self) -> BTreeSet<String> {
        self.libraries
            .iter()
            .flat_map(|(_, names)| names.iter().cloned())
            .collect()
    }
}

/// Ordered list of directories searched for libraries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    paths: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search paths taken from the [`PLUGIN_PATH_ENV`] variable
    pub fn from_env() -> Self {
        let mut paths = Self::new();
        paths.add_from_env(PLUGIN_PATH_ENV);
        paths
    }

    /// Append a directory, ignoring duplicates
    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Append every directory listed in the environment variable `var`
    pub fn add_from_env(&mut self, var: &str) {
        if let Some(value) = std::env::var_os(var) {
            for path in std::env::split_paths(&value) {
                if !path.as_os_str().is_empty() {
                    self.add_path(path);
                }
            }
        }
    }

    /// Append the platform's default plugin directories for `app_name`
    pub fn add_default_dirs(&mut self, app_name: &str) {
        for dir in default_plugin_dirs(app_name) {
            self.add_path(dir);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Find the library for a logical name or file name
    ///
    /// An existing path is returned as is. Otherwise every directory is
    /// tried in order with every platform naming pattern.
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }

        let candidates = candidate_file_names(name);
        self.paths.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|file| dir.join(file))
                .find(|path| path.is_file())
        })
    }
}

/// File names a library called `name` may have on disk
pub fn candidate_file_names(name: &str) -> Vec<String> {
    let mut names = vec![name.to_string()];
    if Path::new(name).extension().is_some_and(is_library_extension) {
        return names;
    }

    // Current platform first.
    let native = std::env::consts::DLL_EXTENSION;
    let prefix = std::env::consts::DLL_PREFIX;
    names.push(format!("{prefix}{name}.{native}"));
    for ext in ["so", "dylib", "dll"] {
        for candidate in [format!("lib{name}.{ext}"), format!("{name}.{ext}")] {
            if !names.contains(&candidate) {
                names.push(candidate);
            }
        }
    }
    names
}

/// Whether `path` looks like a shared library
pub fn is_shared_library(path: &Path) -> bool {
    path.extension().is_some_and(is_library_extension)
}

fn is_library_extension(ext: &OsStr) -> bool {
    matches!(ext.to_str(), Some("so" | "dylib" | "dll"))
}

/// Shared library files directly inside `dir`, sorted by path
pub fn library_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, SearchError> {
    let dir = dir.as_ref();

    if !dir.is_dir() {
        return Err(SearchError::DirectoryNotFound(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(SearchError::ReadDirectory)?;

    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if path.is_file() && is_shared_library(&path) {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Get default plugin directories for the current platform
pub fn default_plugin_dirs(app_name: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    // User-local plugins
    if let Some(data_dir) = dirs::data_local_dir() {
        dirs.push(data_dir.join(app_name).join("plugins"));
    }

    // Current directory plugins
    dirs.push(PathBuf::from("plugins"));

    dirs
}
