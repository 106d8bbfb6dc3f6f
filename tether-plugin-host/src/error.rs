//! Loader error types
//!
//! Every failure here is recoverable: the convenience entry points on
//! [`crate::Loader`] turn them into empty results plus a diagnostic.

use std::path::PathBuf;
use tether_plugin_api::Handshake;
use thiserror::Error;

use crate::registry::LookupError;

/// Errors that can occur while loading libraries or instantiating plugins
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The OS loader could not open the file
    #[error("Failed to open library '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    /// The library does not export the registration hook
    #[error("Library '{path}' does not export a tether registration hook")]
    MissingHook { path: PathBuf },

    /// The library was built against an incompatible `Info` layout
    #[error("Library '{path}' is incompatible: expected {expected}, library reports {reported}")]
    Handshake {
        path: PathBuf,
        expected: Handshake,
        reported: Handshake,
    },

    /// The handshake matched but the library handed out no plugins
    #[error("Library '{path}' accepted the handshake but provided no plugin map")]
    EmptyHook { path: PathBuf },

    /// A logical library name did not match any file on the search path
    #[error("Library '{name}' not found in {searched} search path(s)")]
    LibraryNotFound { name: String, searched: usize },

    /// Name or alias resolution failed
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The plugin is registered but its library is no longer tracked
    #[error("Plugin '{0}' has no loaded library")]
    LibraryGone(String),
}

impl LoaderError {
    /// Path of the library involved, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Open { path, .. }
            | Self::MissingHook { path }
            | Self::Handshake { path, .. }
            | Self::EmptyHook { path } => Some(path),
            _ => None,
        }
    }

    /// Whether the library was rejected by the ABI handshake
    pub fn is_incompatible(&self) -> bool {
        matches!(self, Self::Handshake { .. } | Self::EmptyHook { .. })
    }
}
