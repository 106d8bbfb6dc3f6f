//! Plugin registries
//!
//! [`Registry`] is the name → [`Info`] catalog owned by each loader.
//! [`StaticRegistry`] is the process-wide catalog of plugins compiled into
//! the host executable itself.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tether_plugin_api::{compiled_plugins, demangle, interface_id, Info};
use thiserror::Error;

use crate::plugin::PluginPtr;

/// Errors from resolving a plugin name or alias
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("No plugin named or aliased '{0}'")]
    NotFound(String),

    #[error("Alias '{alias}' is ambiguous, it is used by: {}", .candidates.join(", "))]
    AmbiguousAlias {
        alias: String,
        candidates: Vec<String>,
    },
}

/// Catalog of plugin records keyed by name, with an alias index
#[derive(Debug, Default, Clone)]
pub struct Registry {
    plugins: BTreeMap<String, Arc<Info>>,
    aliases: BTreeMap<String, BTreeSet<String>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin record.
    ///
    /// Returns `true` when the name was new. A record for a known name is
    /// merged into the existing one: interfaces and aliases it does not
    /// have yet are added, everything else is kept.
    pub fn add_info(&mut self, info: Arc<Info>) -> bool {
        for alias in &info.aliases {
            self.aliases
                .entry(alias.clone())
                .or_default()
                .insert(info.name.clone());
        }

        match self.plugins.entry(info.name.clone()) {
            Entry::Vacant(entry) => {
                tracing::trace!(plugin = %info.name, "Plugin registered");
                entry.insert(info);
                true
            }
            Entry::Occupied(mut entry) => {
                if !Arc::ptr_eq(entry.get(), &info) {
                    let incoming = Arc::unwrap_or_clone(info);
                    if Arc::make_mut(entry.get_mut()).merge(incoming) {
                        tracing::debug!(plugin = %entry.key(), "Merged plugin registration");
                    }
                }
                false
            }
        }
    }

    /// Remove a plugin and unregister its aliases
    pub fn forget_info(&mut self, name: &str) -> Option<Arc<Info>> {
        let info = self.plugins.remove(name)?;
        for alias in &info.aliases {
            if let Some(names) = self.aliases.get_mut(alias) {
                names.remove(name);
                if names.is_empty() {
                    self.aliases.remove(alias);
                }
            }
        }
        Some(info)
    }

    /// Record of the plugin with exactly this name
    pub fn get_info(&self, name: &str) -> Option<Arc<Info>> {
        self.plugins.get(name).cloned()
    }

    /// Whether a plugin with exactly this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Resolve a plugin name or alias to the canonical name.
    ///
    /// An exact name always wins. An alias resolves only when exactly one
    /// plugin uses it.
    pub fn resolve_plugin(&self, name_or_alias: &str) -> Result<String, LookupError> {
        if self.plugins.contains_key(name_or_alias) {
            return Ok(name_or_alias.to_string());
        }

        let candidates = self
            .aliases
            .get(name_or_alias)
            .ok_or_else(|| LookupError::NotFound(name_or_alias.to_string()))?;

        let mut names = candidates.iter();
        match (names.next(), names.next()) {
            (Some(name), None) => Ok(name.clone()),
            (None, _) => Err(LookupError::NotFound(name_or_alias.to_string())),
            _ => Err(LookupError::AmbiguousAlias {
                alias: name_or_alias.to_string(),
                candidates: candidates.iter().cloned().collect(),
            }),
        }
    }

    /// Like [`Registry::resolve_plugin`], but logs alias collisions and
    /// returns `None` on any failure
    pub fn lookup_plugin(&self, name_or_alias: &str) -> Option<String> {
        match self.resolve_plugin(name_or_alias) {
            Ok(name) => Some(name),
            Err(LookupError::NotFound(_)) => None,
            Err(e @ LookupError::AmbiguousAlias { .. }) => {
                tracing::warn!(alias = %name_or_alias, error = %e, "Refusing ambiguous alias");
                None
            }
        }
    }

    /// Names of every plugin that implements `I`
    pub fn plugins_implementing<I: ?Sized + 'static>(&self) -> BTreeSet<String> {
        self.plugins_implementing_named(interface_id::<I>(), false)
    }

    /// Names of every plugin implementing the named interface
    ///
    /// With `demangled` the name is compared against display names
    /// (`geometry::Shape`), otherwise against raw identity keys
    /// (`dyn geometry::Shape`).
    pub fn plugins_implementing_named(&self, interface: &str, demangled: bool) -> BTreeSet<String> {
        self.plugins
            .values()
            .filter(|info| info.implements_named(interface, demangled))
            .map(|info| info.name.clone())
            .collect()
    }

    /// Display names of every interface any plugin implements
    pub fn interfaces_implemented(&self) -> BTreeSet<String> {
        self.plugins
            .values()
            .flat_map(|info| info.demangled_interfaces.iter().cloned())
            .collect()
    }

    /// Plugins registered under `alias`
    pub fn plugins_with_alias(&self, alias: &str) -> BTreeSet<String> {
        self.aliases.get(alias).cloned().unwrap_or_default()
    }

    /// Aliases of the plugin with exactly this name
    pub fn aliases_of_plugin(&self, name: &str) -> BTreeSet<String> {
        self.plugins
            .get(name)
            .map(|info| info.aliases.clone())
            .unwrap_or_default()
    }

    /// Every registered plugin name
    pub fn all_plugins(&self) -> BTreeSet<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Aliases shared by more than one plugin
    pub fn alias_collisions(&self) -> BTreeMap<&str, &BTreeSet<String>> {
        self.aliases
            .iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|(alias, names)| (alias.as_str(), names))
            .collect()
    }

    /// Iterate over every record in name order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Info>> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Human-readable dump of the registry contents
    pub fn pretty_str(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interfaces = self.interfaces_implemented();
        writeln!(f, "Interfaces ({}):", interfaces.len())?;
        for interface in &interfaces {
            let providers = self.plugins_implementing_named(interface, true);
            writeln!(f, "  {} ({} plugin(s))", interface, providers.len())?;
        }

        writeln!(f, "Plugins ({}):", self.plugins.len())?;
        for info in self.plugins.values() {
            writeln!(f, "  {}", info.name)?;
            if !info.aliases.is_empty() {
                let aliases: Vec<&str> = info.aliases.iter().map(String::as_str).collect();
                writeln!(f, "    aliases: {}", aliases.join(", "))?;
            }
            for interface in &info.demangled_interfaces {
                writeln!(f, "    implements: {}", interface)?;
            }
        }

        let collisions = self.alias_collisions();
        if !collisions.is_empty() {
            writeln!(f, "Alias collisions ({}):", collisions.len())?;
            for (alias, names) in collisions {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                writeln!(f, "  {} -> {}", alias, names.join(", "))?;
            }
        }

        Ok(())
    }
}

/// Process-wide registry of plugins compiled into the host executable
///
/// Built on first access from every registration linked into the binary.
/// Instances created from it carry no library token: their code can never
/// be unloaded.
pub struct StaticRegistry {
    registry: RwLock<Registry>,
}

impl StaticRegistry {
    /// The singleton
    pub fn global() -> &'static StaticRegistry {
        static GLOBAL: OnceLock<StaticRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = StaticRegistry {
                registry: RwLock::new(Registry::new()),
            };
            for info in compiled_plugins().values() {
                registry.add_info(Info::clone(info));
            }
            tracing::debug!(count = registry.registry().len(), "Static registry initialized");
            registry
        })
    }

    /// Register a plugin at run time
    ///
    /// The name is normalized to its display form first.
    pub fn add_info(&self, mut info: Info) -> bool {
        info.name = demangle(&info.name);
        self.write().add_info(Arc::new(info))
    }

    /// Static plugins cannot be removed; this does nothing
    pub fn forget_info(&self, _name: &str) {}

    /// Read access to the underlying catalog
    pub fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an instance of a static plugin
    pub fn instantiate(&self, name_or_alias: &str) -> PluginPtr {
        let info = {
            let registry = self.registry();
            registry
                .lookup_plugin(name_or_alias)
                .and_then(|name| registry.get_info(&name))
        };
        // Constructors may register plugins themselves
        match info {
            Some(info) => PluginPtr::instantiate(info, None),
            None => PluginPtr::default(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_plugin_api::Caster;

    trait Shape: Send + Sync {
        fn sides(&self) -> u32;
    }

    trait Named: Send + Sync {}

    #[derive(Default)]
    struct Square;
    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }
    impl Named for Square {}

    #[derive(Default)]
    struct Triangle;
    impl Shape for Triangle {
        fn sides(&self) -> u32 {
            3
        }
    }

    fn square() -> Info {
        Info::of::<Square>()
            .with_name("Square")
            .with_interface(Caster::<dyn Shape>::new::<Square>(|object| object))
    }

    fn triangle() -> Info {
        Info::of::<Triangle>()
            .with_name("Triangle")
            .with_interface(Caster::<dyn Shape>::new::<Triangle>(|object| object))
    }

    #[test]
    fn test_add_and_get() {
        let mut registry = Registry::new();
        assert!(registry.add_info(Arc::new(square())));
        assert!(registry.add_info(Arc::new(triangle())));

        assert_eq!(registry.len(), 2);
        assert!(registry.get_info("Square").is_some());
        assert!(registry.get_info("square").is_none());
        assert_eq!(
            registry.plugins_implementing::<dyn Shape>(),
            BTreeSet::from(["Square".to_string(), "Triangle".to_string()])
        );
    }

    #[test]
    fn test_second_registration_merges() {
        let mut registry = Registry::new();
        registry.add_info(Arc::new(square()));

        let more = Info::of::<Square>()
            .with_name("Square")
            .with_interface(Caster::<dyn Named>::new::<Square>(|object| object))
            .with_alias("box");
        assert!(!registry.add_info(Arc::new(more)));

        let info = registry.get_info("Square").unwrap();
        assert!(info.implements::<dyn Shape>());
        assert!(info.implements::<dyn Named>());
        assert_eq!(registry.lookup_plugin("box").as_deref(), Some("Square"));
        assert_eq!(registry.interfaces_implemented().len(), 2);
    }

    #[test]
    fn test_alias_collision_fails_closed() {
        let mut registry = Registry::new();
        registry.add_info(Arc::new(square().with_alias("shape").with_alias("box")));
        registry.add_info(Arc::new(triangle().with_alias("shape")));

        assert_eq!(registry.lookup_plugin("shape"), None);
        assert_eq!(
            registry.resolve_plugin("shape"),
            Err(LookupError::AmbiguousAlias {
                alias: "shape".to_string(),
                candidates: vec!["Square".to_string(), "Triangle".to_string()],
            })
        );
        assert_eq!(registry.lookup_plugin("box").as_deref(), Some("Square"));
        assert_eq!(registry.plugins_with_alias("shape").len(), 2);
        assert_eq!(registry.alias_collisions().len(), 1);
    }

    #[test]
    fn test_exact_name_wins_over_alias() {
        let mut registry = Registry::new();
        registry.add_info(Arc::new(square()));
        registry.add_info(Arc::new(triangle().with_alias("Square")));

        assert_eq!(registry.lookup_plugin("Square").as_deref(), Some("Square"));
    }

    #[test]
    fn test_forget_info_drops_aliases() {
        let mut registry = Registry::new();
        registry.add_info(Arc::new(square().with_alias("box")));
        registry.add_info(Arc::new(triangle()));

        assert!(registry.forget_info("Square").is_some());
        assert!(registry.forget_info("Square").is_none());
        assert_eq!(registry.lookup_plugin("box"), None);
        assert!(registry.plugins_with_alias("box").is_empty());
        assert_eq!(registry.all_plugins(), BTreeSet::from(["Triangle".to_string()]));
    }

    #[test]
    fn test_named_interface_queries() {
        let mut registry = Registry::new();
        registry.add_info(Arc::new(square()));

        let raw = interface_id::<dyn Shape>();
        let display = demangle(raw);
        assert_eq!(registry.plugins_implementing_named(raw, false).len(), 1);
        assert_eq!(registry.plugins_implementing_named(&display, true).len(), 1);
        assert!(registry.plugins_implementing_named(&display, false).is_empty());
        assert!(registry.interfaces_implemented().contains(&display));
    }

    #[test]
    fn test_pretty_str_lists_everything() {
        let mut registry = Registry::new();
        registry.add_info(Arc::new(square().with_alias("shape")));
        registry.add_info(Arc::new(triangle().with_alias("shape")));

        let dump = registry.pretty_str();
        assert!(dump.contains("Plugins (2):"));
        assert!(dump.contains("Interfaces (1):"));
        assert!(dump.contains("aliases: shape"));
        assert!(dump.contains("shape -> Square, Triangle"));
    }

    #[test]
    fn test_static_registry_add_demangles() {
        let info = Info::of::<Triangle>()
            .with_name("dyn registry_test::Added")
            .with_alias("registry-test-added");
        StaticRegistry::global().add_info(info);

        let registry = StaticRegistry::global().registry();
        assert!(registry.contains("registry_test::Added"));
        drop(registry);

        StaticRegistry::global().forget_info("registry_test::Added");
        assert!(StaticRegistry::global().registry().contains("registry_test::Added"));

        let plugin = StaticRegistry::global().instantiate("registry-test-added");
        assert_eq!(plugin.name(), Some("registry_test::Added"));
    }
}
