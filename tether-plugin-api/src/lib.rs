//! tether-plugin-api: Shared types for the tether plugin system
//!
//! This crate defines everything a host and a plugin library must agree on:
//! the [`Info`] record describing one pluggable class, the typed
//! [`Caster`]s used to reach interfaces inside a type-erased instance, the
//! [`Factory`] protocol, and the C-linkage handshake in [`hook`].
//!
//! Plugin code normally does not use this crate directly; see
//! `tether-plugin-sdk` for the registration macros.

use std::any::type_name;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

pub mod factory;
pub mod hook;
pub mod info;

pub use factory::{Factory, Producing};
pub use hook::{Handshake, PluginHookFn, HOOK_SYMBOL, TETHER_API_VERSION};
pub use info::{default_deleter, Caster, DeleterFn, Erased, FactoryFn, Info};

#[doc(hidden)]
pub use linkme;

use linkme::distributed_slice;

/// Plugin records keyed by plugin name
pub type InfoMap = BTreeMap<String, Arc<Info>>;

/// Registrations compiled into the current binary.
///
/// Each `register_*!` invocation in the sdk contributes one entry. A shared
/// library sees only its own entries, and the host executable sees the
/// plugins statically linked into it.
#[distributed_slice]
pub static PLUGIN_REGISTRATIONS: [fn() -> Info];

/// Identity key of an interface type
///
/// Both sides of the library boundary compute this from the same type, so
/// they must be built with the same toolchain.
pub fn interface_id<I: ?Sized + 'static>() -> &'static str {
    type_name::<I>()
}

/// Turn a raw type identity into its display form.
///
/// Removes `dyn` markers and collapses runs of whitespace, so
/// `dyn geometry::Shape` becomes `geometry::Shape`.
pub fn demangle(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.trim();
    let mut at_boundary = true;

    while let Some(c) = rest.chars().next() {
        if at_boundary && rest.starts_with("dyn ") {
            rest = rest["dyn ".len()..].trim_start();
            continue;
        }
        if c.is_whitespace() {
            rest = rest.trim_start();
            if !out.ends_with(' ') {
                out.push(' ');
            }
            at_boundary = true;
            continue;
        }
        out.push(c);
        at_boundary = !(c.is_alphanumeric() || c == '_');
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Every plugin registered in the current binary, merged by name.
///
/// Built once on first access. Repeated registrations of the same plugin
/// (from different modules, or one per interface) fold into one record.
pub fn compiled_plugins() -> &'static InfoMap {
    static PLUGINS: OnceLock<InfoMap> = OnceLock::new();
    PLUGINS.get_or_init(|| merge_registrations(PLUGIN_REGISTRATIONS.iter().map(|register| register())))
}

/// Fold a sequence of records into a map, merging duplicates by name
pub fn merge_registrations(infos: impl IntoIterator<Item = Info>) -> InfoMap {
    let mut merged: BTreeMap<String, Info> = BTreeMap::new();
    for info in infos {
        match merged.get_mut(&info.name) {
            Some(existing) => {
                existing.merge(info);
            }
            None => {
                merged.insert(info.name.clone(), info);
            }
        }
    }
    merged
        .into_iter()
        .map(|(name, info)| (name, Arc::new(info)))
        .collect()
}
