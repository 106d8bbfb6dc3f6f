//! Plugin loader
//!
//! Opens plugin libraries, registers the plugins they export and creates
//! instances that keep their library loaded. Lookups fall back to the
//! plugins compiled into the host executable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tether_plugin_api::{hook, interface_id, Factory, Handshake};

use crate::config::LoaderConfig;
use crate::library::{normalize_path, LibraryBackend, LibraryHandle, LibraryToken, NativeBackend};
use crate::plugin::{InterfaceRef, PluginPtr};
use crate::registry::{LookupError, Registry, StaticRegistry};
use crate::search::{library_files, DiscoveryResult, SearchError, SearchPaths};
use crate::LoaderError;

struct LoadedLibrary {
    token: LibraryToken,
    plugins: BTreeSet<String>,
}

/// Which catalog a resolved plugin comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Library,
    Static,
}

/// Loads plugin libraries and instantiates their plugins
pub struct Loader {
    backend: Arc<dyn LibraryBackend>,
    search_paths: SearchPaths,
    registry: Registry,
    libraries: BTreeMap<PathBuf, LoadedLibrary>,
    /// Plugin name → library that provides it
    owners: BTreeMap<String, PathBuf>,
}

impl Loader {
    /// Create a loader using the platform's dynamic loader
    pub fn new() -> Self {
        Self::with_backend(Arc::new(NativeBackend))
    }

    /// Create a loader that opens libraries through `backend`
    pub fn with_backend(backend: Arc<dyn LibraryBackend>) -> Self {
        Self {
            backend,
            search_paths: SearchPaths::new(),
            registry: Registry::new(),
            libraries: BTreeMap::new(),
            owners: BTreeMap::new(),
        }
    }

    /// Create a native loader with the configured search paths
    pub fn with_config(config: &LoaderConfig) -> Self {
        let mut loader = Self::new();
        loader.search_paths = config.search_paths();
        loader
    }

    pub fn search_paths(&self) -> &SearchPaths {
        &self.search_paths
    }

    pub fn search_paths_mut(&mut self) -> &mut SearchPaths {
        &mut self.search_paths
    }

    /// Plugins registered by this loader's libraries
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load a library, returning the names of the plugins it provides.
    ///
    /// Failures are logged and yield an empty set. See
    /// [`Loader::try_load_library`].
    pub fn load_library(&mut self, path: impl AsRef<Path>) -> BTreeSet<String> {
        let path = path.as_ref();
        match self.try_load_library(path) {
            Ok(plugins) => plugins,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load library");
                BTreeSet::new()
            }
        }
    }

    /// Load a library, returning the names of the plugins it provides.
    ///
    /// Loading a path that is already loaded changes nothing and returns the
    /// same names again. A plugin whose name is already provided by another
    /// library is skipped.
    pub fn try_load_library(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<BTreeSet<String>, LoaderError> {
        let path = normalize_path(path.as_ref());

        if let Some(loaded) = self.libraries.get(&path) {
            tracing::debug!(path = %path.display(), "Library already loaded");
            return Ok(loaded.plugins.clone());
        }

        let token = LibraryHandle::new(path.clone(), self.backend.open(&path)?);
        let entry = token
            .hook()
            .ok_or_else(|| LoaderError::MissingHook { path: path.clone() })?;

        // SAFETY: `token` keeps the library loaded while the map is read, and
        // every record copied out of it is paired with the token below.
        let exported = unsafe { hook::request(entry) }
            .map_err(|reported| LoaderError::Handshake {
                path: path.clone(),
                expected: Handshake::current(),
                reported,
            })?
            .ok_or_else(|| LoaderError::EmptyHook { path: path.clone() })?;
        let exported: Vec<_> = unsafe { exported.as_ref() }.values().cloned().collect();

        let mut plugins = BTreeSet::new();
        for info in exported {
            if let Some(owner) = self.owners.get(&info.name) {
                tracing::warn!(
                    plugin = %info.name,
                    path = %path.display(),
                    owner = %owner.display(),
                    "Plugin already provided by another library, skipping"
                );
                continue;
            }
            self.owners.insert(info.name.clone(), path.clone());
            plugins.insert(info.name.clone());
            self.registry.add_info(info);
        }

        tracing::info!(path = %path.display(), count = plugins.len(), "Library loaded");
        self.libraries.insert(
            path,
            LoadedLibrary {
                token,
                plugins: plugins.clone(),
            },
        );

        Ok(plugins)
    }

    /// Load a library by logical name through the search paths
    pub fn load_library_named(&mut self, name: &str) -> BTreeSet<String> {
        match self.try_load_library_named(name) {
            Ok(plugins) => plugins,
            Err(e) => {
                tracing::warn!(library = %name, error = %e, "Failed to load library");
                BTreeSet::new()
            }
        }
    }

    pub fn try_load_library_named(&mut self, name: &str) -> Result<BTreeSet<String>, LoaderError> {
        let path = self
            .search_paths
            .find_library(name)
            .ok_or_else(|| LoaderError::LibraryNotFound {
                name: name.to_string(),
                searched: self.search_paths.len(),
            })?;
        self.try_load_library(path)
    }

    /// Load every shared library directly inside `dir`
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<DiscoveryResult, SearchError> {
        let mut result = DiscoveryResult::default();
        for path in library_files(dir)? {
            match self.try_load_library(&path) {
                Ok(plugins) => result.libraries.push((path, plugins)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to load library");
                    result.failures.push((path, e));
                }
            }
        }
        Ok(result)
    }

    /// Unregister a library's plugins and release the loader's handle.
    ///
    /// The library stays loaded while instances, interface handles or
    /// products created from it remain.
    pub fn forget_library(&mut self, path: impl AsRef<Path>) -> bool {
        let path = normalize_path(path.as_ref());
        let Some(loaded) = self.libraries.remove(&path) else {
            return false;
        };

        for name in &loaded.plugins {
            self.registry.forget_info(name);
            self.owners.remove(name);
        }

        tracing::info!(
            path = %path.display(),
            outstanding = Arc::strong_count(&loaded.token) - 1,
            "Library forgotten"
        );
        true
    }

    /// Forget the library that provides a plugin
    pub fn forget_library_of_plugin(&mut self, name_or_alias: &str) -> bool {
        let Some(path) = self
            .lookup_plugin(name_or_alias)
            .and_then(|name| self.owners.get(&name).cloned())
        else {
            return false;
        };
        self.forget_library(path)
    }

    /// Create an instance, or an empty pointer when that fails
    pub fn instantiate(&self, name_or_alias: &str) -> PluginPtr {
        match self.try_instantiate(name_or_alias) {
            Ok(plugin) => plugin,
            Err(e) => {
                tracing::warn!(plugin = %name_or_alias, error = %e, "Failed to instantiate plugin");
                PluginPtr::default()
            }
        }
    }

    /// Create an instance of a loaded or statically linked plugin
    pub fn try_instantiate(&self, name_or_alias: &str) -> Result<PluginPtr, LoaderError> {
        match self.resolve(name_or_alias)? {
            (name, Origin::Library) => {
                let (info, library) = self
                    .registry
                    .get_info(&name)
                    .zip(self.owners.get(&name).and_then(|path| self.libraries.get(path)))
                    .ok_or_else(|| LoaderError::LibraryGone(name.clone()))?;
                Ok(PluginPtr::instantiate(info, Some(library.token.clone())))
            }
            (name, Origin::Static) => {
                // The guard is released before the constructor runs
                let info = StaticRegistry::global().registry().get_info(&name);
                let info = info.ok_or(LookupError::NotFound(name))?;
                Ok(PluginPtr::instantiate(info, None))
            }
        }
    }

    /// Shared handle to the factory interface of a new instance
    pub fn factory<P, A>(&self, name_or_alias: &str) -> Option<InterfaceRef<dyn Factory<P, A>>>
    where
        P: ?Sized + 'static,
        A: 'static,
    {
        self.instantiate(name_or_alias)
            .query_interface_shared::<dyn Factory<P, A>>()
    }

    /// Plugins implementing `I`
    pub fn plugins_implementing<I: ?Sized + 'static>(&self) -> BTreeSet<String> {
        self.plugins_implementing_named(interface_id::<I>(), false)
    }

    /// Plugins implementing the named interface
    pub fn plugins_implementing_named(&self, interface: &str, demangled: bool) -> BTreeSet<String> {
        self.union(|registry| registry.plugins_implementing_named(interface, demangled))
    }

    /// Display names of every interface any plugin implements
    pub fn interfaces_implemented(&self) -> BTreeSet<String> {
        self.union(Registry::interfaces_implemented)
    }

    pub fn all_plugins(&self) -> BTreeSet<String> {
        self.union(Registry::all_plugins)
    }

    pub fn plugins_with_alias(&self, alias: &str) -> BTreeSet<String> {
        self.union(|registry| registry.plugins_with_alias(alias))
    }

    pub fn aliases_of_plugin(&self, name: &str) -> BTreeSet<String> {
        if self.registry.contains(name) {
            self.registry.aliases_of_plugin(name)
        } else {
            StaticRegistry::global().registry().aliases_of_plugin(name)
        }
    }

    /// Resolve a name or alias; `None` when unknown or ambiguous
    pub fn lookup_plugin(&self, name_or_alias: &str) -> Option<String> {
        match self.resolve(name_or_alias) {
            Ok((name, _)) => Some(name),
            Err(LookupError::NotFound(_)) => None,
            Err(e @ LookupError::AmbiguousAlias { .. }) => {
                tracing::warn!(alias = %name_or_alias, error = %e, "Refusing ambiguous alias");
                None
            }
        }
    }

    /// Paths of every library this loader holds
    pub fn loaded_libraries(&self) -> Vec<PathBuf> {
        self.libraries.keys().cloned().collect()
    }

    /// Library that provides the named plugin
    pub fn library_of_plugin(&self, name: &str) -> Option<&Path> {
        self.owners.get(name).map(PathBuf::as_path)
    }

    /// Human-readable dump of libraries and plugins
    pub fn pretty_str(&self) -> String {
        self.to_string()
    }

    /// Exact names win, loaded libraries first. Aliases are resolved over
    /// both registries together and must name a single plugin.
    fn resolve(&self, name_or_alias: &str) -> Result<(String, Origin), LookupError> {
        if self.registry.contains(name_or_alias) {
            return Ok((name_or_alias.to_string(), Origin::Library));
        }
        if StaticRegistry::global().registry().contains(name_or_alias) {
            return Ok((name_or_alias.to_string(), Origin::Static));
        }

        let candidates = self.plugins_with_alias(name_or_alias);
        let mut names = candidates.iter();
        match (names.next(), names.next()) {
            (Some(name), None) if self.registry.contains(name) => {
                Ok((name.clone(), Origin::Library))
            }
            (Some(name), None) => Ok((name.clone(), Origin::Static)),
            (None, _) => Err(LookupError::NotFound(name_or_alias.to_string())),
            _ => Err(LookupError::AmbiguousAlias {
                alias: name_or_alias.to_string(),
                candidates: candidates.iter().cloned().collect(),
            }),
        }
    }

    fn union(&self, query: impl Fn(&Registry) -> BTreeSet<String>) -> BTreeSet<String> {
        let mut names = query(&self.registry);
        names.extend(query(&*StaticRegistry::global().registry()));
        names
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Libraries ({}):", self.libraries.len())?;
        for (path, loaded) in &self.libraries {
            writeln!(f, "  {} ({} plugin(s))", path.display(), loaded.plugins.len())?;
        }
        write!(f, "{}", self.registry)?;

        let statics = StaticRegistry::global().registry();
        if !statics.is_empty() {
            writeln!(f, "Static plugins:")?;
            write!(f, "{}", statics)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("libraries", &self.libraries.keys().collect::<Vec<_>>())
            .field("plugins", &self.registry.len())
            .field("search_paths", &self.search_paths)
            .finish_non_exhaustive()
    }
}
