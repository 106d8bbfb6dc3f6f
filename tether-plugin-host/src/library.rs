//! Shared library handles
//!
//! A [`LibraryHandle`] owns one open library. Everything that may run code
//! from the library (the loader, every plugin instance created from it)
//! holds a [`LibraryToken`], and the library is closed when the last token
//! is dropped.
//!
//! Opening goes through a [`LibraryBackend`]: [`NativeBackend`] uses the OS
//! loader, [`InProcessBackend`] serves hooks compiled into the current
//! binary.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tether_plugin_api::{PluginHookFn, HOOK_SYMBOL};

use crate::LoaderError;

/// Shared ownership of an open library
pub type LibraryToken = Arc<LibraryHandle>;

/// Opens libraries for a loader
pub trait LibraryBackend: Send + Sync {
    /// Open the library at `path`
    fn open(&self, path: &Path) -> Result<Box<dyn OpenLibrary>, LoaderError>;
}

/// An open library. Dropping it closes the library.
pub trait OpenLibrary: Send + Sync {
    /// The exported registration hook, if there is one
    fn hook(&self) -> Option<PluginHookFn>;
}

/// Backend using the platform's dynamic loader
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl LibraryBackend for NativeBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn OpenLibrary>, LoaderError> {
        // SAFETY: loading a plugin library runs its initializers; trusting
        // the library is inherent to loading native plugins.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| LoaderError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(NativeLibrary { library }))
    }
}

struct NativeLibrary {
    library: libloading::Library,
}

impl OpenLibrary for NativeLibrary {
    fn hook(&self) -> Option<PluginHookFn> {
        // SAFETY: the symbol is declared with exactly this signature by
        // `export_plugins!`. The copied fn pointer is only called while a
        // token keeps the library open.
        let symbol = unsafe { self.library.get::<PluginHookFn>(HOOK_SYMBOL) };
        match symbol {
            Ok(symbol) => Some(*symbol),
            Err(e) => {
                tracing::debug!(error = %e, "Hook symbol lookup failed");
                None
            }
        }
    }
}

/// Backend serving libraries whose hooks are compiled into this binary
///
/// Paths are plain keys; nothing is read from disk. Open handles are counted
/// per path so callers can observe when a library would have been unloaded.
#[derive(Default)]
pub struct InProcessBackend {
    libraries: RwLock<BTreeMap<PathBuf, InProcessEntry>>,
}

#[derive(Clone)]
struct InProcessEntry {
    hook: Option<PluginHookFn>,
    open: Arc<AtomicUsize>,
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `hook` available under `path`
    pub fn add_library(&self, path: impl Into<PathBuf>, hook: PluginHookFn) {
        self.insert(path.into(), Some(hook));
    }

    /// Make a library without a registration hook available under `path`
    pub fn add_library_without_hook(&self, path: impl Into<PathBuf>) {
        self.insert(path.into(), None);
    }

    /// Number of currently open handles to `path`
    pub fn open_count(&self, path: impl AsRef<Path>) -> usize {
        self.libraries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path.as_ref())
            .map(|entry| entry.open.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn insert(&self, path: PathBuf, hook: Option<PluginHookFn>) {
        let mut libraries = self.libraries.write().unwrap_or_else(PoisonError::into_inner);
        libraries.insert(
            path,
            InProcessEntry {
                hook,
                open: Arc::new(AtomicUsize::new(0)),
            },
        );
    }
}

impl LibraryBackend for InProcessBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn OpenLibrary>, LoaderError> {
        let entry = self
            .libraries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| LoaderError::Open {
                path: path.to_path_buf(),
                reason: "no such in-process library".to_string(),
            })?;

        entry.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InProcessLibrary { entry }))
    }
}

struct InProcessLibrary {
    entry: InProcessEntry,
}

impl OpenLibrary for InProcessLibrary {
    fn hook(&self) -> Option<PluginHookFn> {
        self.entry.hook
    }
}

impl Drop for InProcessLibrary {
    fn drop(&mut self) {
        self.entry.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Open library shared through [`LibraryToken`]s
pub struct LibraryHandle {
    path: PathBuf,
    library: Option<Box<dyn OpenLibrary>>,
}

impl LibraryHandle {
    pub(crate) fn new(path: PathBuf, library: Box<dyn OpenLibrary>) -> LibraryToken {
        *live_libraries().entry(path.clone()).or_insert(0) += 1;
        tracing::debug!(path = %path.display(), "Library opened");
        Arc::new(Self {
            path,
            library: Some(library),
        })
    }

    /// Path the library was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn hook(&self) -> Option<PluginHookFn> {
        self.library.as_ref()?.hook()
    }
}

impl Drop for LibraryHandle {
    fn drop(&mut self) {
        drop(self.library.take());

        let mut live = live_libraries();
        if let Some(count) = live.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                live.remove(&self.path);
            }
        }
        tracing::debug!(path = %self.path.display(), "Library closed");
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle").field("path", &self.path).finish()
    }
}

/// Open handles per normalized path, across all loaders
static LIVE_LIBRARIES: Mutex<BTreeMap<PathBuf, usize>> = Mutex::new(BTreeMap::new());

fn live_libraries() -> MutexGuard<'static, BTreeMap<PathBuf, usize>> {
    LIVE_LIBRARIES.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether any loader still holds the library at `path` open
///
/// Plugin instances, interface handles and lost products all count.
pub fn is_library_loaded(path: impl AsRef<Path>) -> bool {
    live_libraries().contains_key(&normalize_path(path.as_ref()))
}

/// Canonical form of a library path, or the path as given when it does not
/// exist on disk
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
