//! Descriptor of one pluggable class

use std::any::{type_name, Any};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::{demangle, interface_id};

/// A type-erased plugin instance
pub type Erased = dyn Any + Send + Sync;

/// Zero-argument constructor of a plugin instance
pub type FactoryFn = fn() -> Box<Erased>;

/// Destroys an instance produced by the matching [`FactoryFn`]
pub type DeleterFn = fn(Box<Erased>);

/// Deleter used by every sdk registration
pub fn default_deleter(instance: Box<Erased>) {
    drop(instance);
}

/// Upcast from a type-erased instance to one interface it implements
///
/// Stored inside [`Info::interfaces`] behind `dyn Any` and recovered with a
/// downcast to `Caster<I>` when the host asks for `I`.
pub struct Caster<I: ?Sized + 'static> {
    cast: Box<dyn Fn(&Erased) -> Option<&I> + Send + Sync>,
}

impl<I: ?Sized + 'static> Caster<I> {
    /// Build a caster for instances of `T`
    ///
    /// `upcast` is normally the identity closure `|object| object`, which
    /// only compiles when `T` actually implements `I`.
    pub fn new<T: Any + Send + Sync>(upcast: fn(&T) -> &I) -> Self {
        Self {
            cast: Box::new(bind::<I, _>(move |object| object.downcast_ref::<T>().map(upcast))),
        }
    }

    /// Reach the interface inside `instance`, if it is the expected type
    pub fn cast<'a>(&self, instance: &'a Erased) -> Option<&'a I> {
        (self.cast)(instance)
    }
}

fn bind<I: ?Sized, F>(f: F) -> F
where
    F: for<'a> Fn(&'a Erased) -> Option<&'a I>,
{
    f
}

/// Everything the host needs to know about one plugin class
#[derive(Clone)]
pub struct Info {
    /// Canonical plugin name
    pub name: String,

    /// Alternative lookup names
    pub aliases: BTreeSet<String>,

    /// Interface identity → `Caster<I>` (as `dyn Any`)
    pub interfaces: BTreeMap<String, Arc<dyn Any + Send + Sync>>,

    /// Display names of the keys in `interfaces`
    pub demangled_interfaces: BTreeSet<String>,

    /// Creates a new instance
    pub factory: FactoryFn,

    /// Destroys an instance created by `factory`
    pub deleter: DeleterFn,
}

impl Info {
    /// Create a record with no interfaces or aliases
    pub fn new(name: impl Into<String>, factory: FactoryFn, deleter: DeleterFn) -> Self {
        Self {
            name: name.into(),
            aliases: BTreeSet::new(),
            interfaces: BTreeMap::new(),
            demangled_interfaces: BTreeSet::new(),
            factory,
            deleter,
        }
    }

    /// Create a record for `T`, named after the type
    pub fn of<T: Default + Any + Send + Sync>() -> Self {
        fn make<T: Default + Any + Send + Sync>() -> Box<Erased> {
            Box::new(T::default())
        }

        Self::new(demangle(type_name::<T>()), make::<T>, default_deleter)
    }

    /// Override the plugin name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Declare an implemented interface
    pub fn with_interface<I: ?Sized + 'static>(mut self, caster: Caster<I>) -> Self {
        let id = interface_id::<I>();
        self.demangled_interfaces.insert(demangle(id));
        self.interfaces.insert(id.to_string(), Arc::new(caster));
        self
    }

    /// Fold another registration of the same plugin into this one.
    ///
    /// Only interfaces and aliases that are not yet present are taken; the
    /// name, factory and deleter of `self` are kept. Returns whether anything
    /// was added.
    pub fn merge(&mut self, other: Info) -> bool {
        let mut changed = false;
        for (id, caster) in other.interfaces {
            if !self.interfaces.contains_key(&id) {
                self.demangled_interfaces.insert(demangle(&id));
                self.interfaces.insert(id, caster);
                changed = true;
            }
        }
        for alias in other.aliases {
            changed |= self.aliases.insert(alias);
        }
        changed
    }

    /// Whether this plugin provides `I`
    pub fn implements<I: ?Sized + 'static>(&self) -> bool {
        self.interfaces.contains_key(interface_id::<I>())
    }

    /// Whether this plugin provides the named interface
    ///
    /// `demangled` selects between display names and raw identity keys.
    pub fn implements_named(&self, interface: &str, demangled: bool) -> bool {
        if demangled {
            self.demangled_interfaces.contains(interface)
        } else {
            self.interfaces.contains_key(interface)
        }
    }

    /// Reach interface `I` inside an instance created by this record
    pub fn cast<'a, I: ?Sized + 'static>(&self, instance: &'a Erased) -> Option<&'a I> {
        self.interfaces
            .get(interface_id::<I>())?
            .downcast_ref::<Caster<I>>()?
            .cast(instance)
    }

    /// Create a new instance
    pub fn create(&self) -> Box<Erased> {
        (self.factory)()
    }

    /// Destroy an instance created by [`Info::create`]
    pub fn destroy(&self, instance: Box<Erased>) {
        (self.deleter)(instance)
    }
}

impl fmt::Debug for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Info")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("interfaces", &self.demangled_interfaces)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape {
        fn area(&self) -> f64;
    }

    trait Named {
        fn name(&self) -> &str;
    }

    #[derive(Default)]
    struct Square;

    impl Shape for Square {
        fn area(&self) -> f64 {
            4.0
        }
    }

    impl Named for Square {
        fn name(&self) -> &str {
            "square"
        }
    }

    #[derive(Default)]
    struct Unrelated;

    fn square_info() -> Info {
        Info::of::<Square>().with_interface(Caster::<dyn Shape>::new::<Square>(|object| object))
    }

    #[test]
    fn test_cast_reaches_interface() {
        let info = square_info();
        let instance = info.create();

        let shape = info.cast::<dyn Shape>(&*instance).unwrap();
        assert_eq!(shape.area(), 4.0);
        assert!(info.cast::<dyn Named>(&*instance).is_none());

        info.destroy(instance);
    }

    #[test]
    fn test_cast_rejects_foreign_instance() {
        let info = square_info();
        let foreign: Box<Erased> = Box::new(Unrelated);
        assert!(info.cast::<dyn Shape>(&*foreign).is_none());
    }

    #[test]
    fn test_merge_keeps_first_and_adds_new() {
        let mut info = square_info().with_alias("box");
        let other = Info::of::<Square>()
            .with_name("ignored")
            .with_interface(Caster::<dyn Shape>::new::<Square>(|object| object))
            .with_interface(Caster::<dyn Named>::new::<Square>(|object| object))
            .with_alias("box")
            .with_alias("tile");

        assert!(info.merge(other));
        assert!(info.name.ends_with("Square"));
        assert_eq!(info.interfaces.len(), 2);
        assert_eq!(info.demangled_interfaces.len(), 2);
        assert_eq!(info.aliases.len(), 2);

        let again = square_info().with_alias("tile");
        assert!(!info.merge(again));
    }

    #[test]
    fn test_implements_named() {
        let info = square_info();
        let raw = interface_id::<dyn Shape>();
        assert!(info.implements::<dyn Shape>());
        assert!(!info.implements::<dyn Named>());
        assert!(info.implements_named(raw, false));
        assert!(info.implements_named(&demangle(raw), true));
        assert!(!info.implements_named(raw, true));
    }
}
