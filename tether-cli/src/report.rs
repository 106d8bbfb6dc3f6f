//! Reports about loaded plugin libraries

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;
use tether_plugin_host::Loader;

/// What one library provides
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryReport {
    pub library: PathBuf,
    pub plugins: Vec<PluginReport>,
    pub interfaces: Vec<InterfaceReport>,
    pub alias_collisions: Vec<AliasCollision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginReport {
    pub name: String,
    pub aliases: Vec<String>,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceReport {
    pub name: String,
    pub plugins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasCollision {
    pub alias: String,
    pub plugins: Vec<String>,
}

impl LibraryReport {
    /// Describe the plugins `loader` got from `library`
    pub fn new(loader: &Loader, library: PathBuf, plugins: &BTreeSet<String>) -> Self {
        let registry = loader.registry();

        let plugin_reports: Vec<PluginReport> = plugins
            .iter()
            .filter_map(|name| registry.get_info(name))
            .map(|info| PluginReport {
                name: info.name.clone(),
                aliases: info.aliases.iter().cloned().collect(),
                interfaces: info.demangled_interfaces.iter().cloned().collect(),
            })
            .collect();

        let interfaces: BTreeSet<&String> = plugin_reports
            .iter()
            .flat_map(|plugin| plugin.interfaces.iter())
            .collect();
        let interfaces = interfaces
            .into_iter()
            .map(|interface| InterfaceReport {
                name: interface.clone(),
                plugins: plugin_reports
                    .iter()
                    .filter(|plugin| plugin.interfaces.contains(interface))
                    .map(|plugin| plugin.name.clone())
                    .collect(),
            })
            .collect();

        let alias_collisions = registry
            .alias_collisions()
            .into_iter()
            .filter(|(_, names)| names.iter().any(|name| plugins.contains(name)))
            .map(|(alias, names)| AliasCollision {
                alias: alias.to_string(),
                plugins: names.iter().cloned().collect(),
            })
            .collect();

        Self {
            library,
            plugins: plugin_reports,
            interfaces,
            alias_collisions,
        }
    }

    /// Short human-readable summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Library: {}", self.library.display());

        let _ = writeln!(out, "{} interface(s):", self.interfaces.len());
        for interface in &self.interfaces {
            let _ = writeln!(out, "  {} ({})", interface.name, interface.plugins.len());
        }

        let _ = writeln!(out, "{} plugin(s):", self.plugins.len());
        for plugin in &self.plugins {
            if plugin.aliases.is_empty() {
                let _ = writeln!(out, "  {}", plugin.name);
            } else {
                let _ = writeln!(out, "  {} [{}]", plugin.name, plugin.aliases.join(", "));
            }
        }

        for collision in &self.alias_collisions {
            let _ = writeln!(
                out,
                "warning: alias '{}' is ambiguous ({})",
                collision.alias,
                collision.plugins.join(", ")
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::sync::{Arc, OnceLock};
    use tether_plugin_api::{hook, merge_registrations, Caster, Info, InfoMap};
    use tether_plugin_host::InProcessBackend;

    trait Shape: Send + Sync {}

    #[derive(Default)]
    struct Square;
    impl Shape for Square {}

    #[derive(Default)]
    struct Disk;
    impl Shape for Disk {}

    unsafe extern "C" fn shapes_hook(
        output: *mut *const c_void,
        api_version: *mut u32,
        info_size: *mut usize,
        info_align: *mut usize,
    ) {
        static MAP: OnceLock<InfoMap> = OnceLock::new();
        let map = MAP.get_or_init(|| {
            merge_registrations([
                Info::of::<Square>()
                    .with_name("shapes::Square")
                    .with_alias("quad")
                    .with_alias("square")
                    .with_interface(Caster::<dyn Shape>::new::<Square>(|object| object)),
                Info::of::<Disk>()
                    .with_name("shapes::Disk")
                    .with_alias("quad")
                    .with_interface(Caster::<dyn Shape>::new::<Disk>(|object| object)),
            ])
        });
        hook::respond(output, api_version, info_size, info_align, map)
    }

    fn report() -> LibraryReport {
        let backend = Arc::new(InProcessBackend::new());
        backend.add_library("mem/report/libshapes.so", shapes_hook);
        let mut loader = Loader::with_backend(backend);
        let plugins = loader.load_library("mem/report/libshapes.so");
        LibraryReport::new(&loader, PathBuf::from("mem/report/libshapes.so"), &plugins)
    }

    #[test]
    fn test_report_contents() {
        let report = report();
        assert_eq!(report.plugins.len(), 2);
        assert_eq!(report.interfaces.len(), 1);
        assert_eq!(report.interfaces[0].plugins, vec!["shapes::Disk", "shapes::Square"]);
        assert_eq!(report.alias_collisions.len(), 1);
        assert_eq!(report.alias_collisions[0].alias, "quad");
    }

    #[test]
    fn test_summary() {
        let summary = report().summary();
        assert!(summary.contains("2 plugin(s):"));
        assert!(summary.contains("shapes::Square [quad, square]"));
        assert!(summary.contains("warning: alias 'quad' is ambiguous"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["plugins"][0]["name"], "shapes::Disk");
        assert_eq!(json["alias_collisions"][0]["plugins"][1], "shapes::Square");
    }
}
