//! Loader configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::search::{SearchPaths, PLUGIN_PATH_ENV};

/// Settings a [`crate::Loader`] is built from
///
/// Deserializes from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched first, in order
    pub search_paths: Vec<PathBuf>,

    /// Environment variable listing more directories (`None` disables it)
    pub env_var: Option<String>,

    /// Application name used for the default plugin directories
    pub app_name: Option<String>,

    /// Whether to search the platform default directories for `app_name`
    pub include_default_dirs: bool,

    /// Pause used by [`LoaderConfig::cleanup_lost_products`], in nanoseconds
    pub safety_wait_nanos: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            env_var: Some(PLUGIN_PATH_ENV.to_string()),
            app_name: None,
            include_default_dirs: false,
            safety_wait_nanos: crate::DEFAULT_SAFETY_WAIT.as_nanos() as u64,
        }
    }
}

impl LoaderConfig {
    /// Default configuration with defaults for `app_name` enabled when
    /// `TETHER_APP_NAME` is set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(app_name) = std::env::var("TETHER_APP_NAME") {
            if !app_name.is_empty() {
                config.app_name = Some(app_name);
                config.include_default_dirs = true;
            }
        }
        config
    }

    /// Resolve the configured search directories
    ///
    /// Order: explicit paths, the environment variable, default directories.
    pub fn search_paths(&self) -> SearchPaths {
        let mut paths = SearchPaths::new();
        for path in &self.search_paths {
            paths.add_path(path.clone());
        }
        if let Some(var) = &self.env_var {
            paths.add_from_env(var);
        }
        if self.include_default_dirs {
            paths.add_default_dirs(self.app_name.as_deref().unwrap_or("tether"));
        }
        paths
    }

    pub fn safety_wait(&self) -> Duration {
        Duration::from_nanos(self.safety_wait_nanos)
    }

    /// Release lost products, waiting the configured safety period
    pub fn cleanup_lost_products(&self) {
        crate::cleanup_lost_products(self.safety_wait());
    }
}
