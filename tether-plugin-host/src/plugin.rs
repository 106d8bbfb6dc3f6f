//! Plugin instances and the handles that share them

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::Arc;

use tether_plugin_api::{demangle, interface_id, Erased, Factory, Info};

use crate::library::LibraryToken;
use crate::product::Product;
use crate::weak::WeakPluginPtr;

/// One live plugin object together with what keeps its code loaded
pub(crate) struct PluginInstance {
    // Dropped in declaration order after `Drop::drop` destroys the object:
    // the record first, the library last.
    object: Option<Box<Erased>>,
    pub(crate) info: Arc<Info>,
    library: Option<LibraryToken>,
}

impl PluginInstance {
    fn new(info: Arc<Info>, library: Option<LibraryToken>) -> Self {
        let object = info.create();
        Self {
            object: Some(object),
            info,
            library,
        }
    }

    fn interface<I: ?Sized + 'static>(&self) -> Option<&I> {
        self.info.cast::<I>(self.object.as_deref()?)
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.info.destroy(object);
        }
        tracing::trace!(
            plugin = %self.info.name,
            library = ?self.library.as_ref().map(|library| library.path()),
            "Plugin instance destroyed"
        );
    }
}

/// Shared handle to a plugin instance
///
/// Either empty or bound to one instance. Clones share the instance, which
/// is destroyed when the last handle (including [`InterfaceRef`]s and
/// products created through it) goes away. Comparison and hashing use the
/// instance address.
#[derive(Clone, Default)]
pub struct PluginPtr {
    instance: Option<Arc<PluginInstance>>,
}

impl PluginPtr {
    pub(crate) fn instantiate(info: Arc<Info>, library: Option<LibraryToken>) -> Self {
        tracing::trace!(plugin = %info.name, "Instantiating plugin");
        Self {
            instance: Some(Arc::new(PluginInstance::new(info, library))),
        }
    }

    pub(crate) fn from_instance(instance: Arc<PluginInstance>) -> Self {
        Self {
            instance: Some(instance),
        }
    }

    pub(crate) fn instance(&self) -> Option<&Arc<PluginInstance>> {
        self.instance.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.instance.is_none()
    }

    /// Release this handle's share of the instance
    pub fn clear(&mut self) {
        self.instance = None;
    }

    /// Name of the plugin
    pub fn name(&self) -> Option<&str> {
        Some(self.instance.as_ref()?.info.name.as_str())
    }

    /// Record the instance was created from
    pub fn info(&self) -> Option<&Arc<Info>> {
        Some(&self.instance.as_ref()?.info)
    }

    /// Borrow interface `I` of the instance
    pub fn query_interface<I: ?Sized + 'static>(&self) -> Option<&I> {
        self.instance.as_ref()?.interface::<I>()
    }

    /// Shared handle to interface `I`
    ///
    /// The handle keeps the instance and its library alive on its own.
    pub fn query_interface_shared<I: ?Sized + 'static>(&self) -> Option<InterfaceRef<I>> {
        InterfaceRef::new(self.instance.as_ref()?.clone())
    }

    pub fn has_interface<I: ?Sized + 'static>(&self) -> bool {
        self.instance
            .as_ref()
            .is_some_and(|instance| instance.info.implements::<I>())
    }

    /// Whether the plugin implements the named interface
    ///
    /// See [`crate::Registry::plugins_implementing_named`] for `demangled`.
    pub fn has_interface_named(&self, interface: &str, demangled: bool) -> bool {
        self.instance
            .as_ref()
            .is_some_and(|instance| instance.info.implements_named(interface, demangled))
    }

    /// Non-owning handle to the same instance
    pub fn downgrade(&self) -> WeakPluginPtr {
        WeakPluginPtr::new(self)
    }

    fn address(&self) -> usize {
        self.instance
            .as_ref()
            .map_or(0, |instance| Arc::as_ptr(instance) as usize)
    }
}

impl PartialEq for PluginPtr {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for PluginPtr {}

impl PartialOrd for PluginPtr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PluginPtr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl Hash for PluginPtr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for PluginPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.debug_tuple("PluginPtr").field(&name).finish(),
            None => f.write_str("PluginPtr(empty)"),
        }
    }
}

/// Shared handle to one interface of a plugin instance
///
/// Dereferences to `I`. Holding it keeps the whole instance alive, and with
/// it the library the instance came from.
pub struct InterfaceRef<I: ?Sized + 'static> {
    instance: Arc<PluginInstance>,
    interface: NonNull<I>,
}

// SAFETY: the pointee lives inside the instance, which is `Send + Sync` and
// kept alive by `instance`. Only shared access to `I` is ever handed out.
unsafe impl<I: ?Sized + Sync + 'static> Send for InterfaceRef<I> {}
unsafe impl<I: ?Sized + Sync + 'static> Sync for InterfaceRef<I> {}

impl<I: ?Sized + 'static> InterfaceRef<I> {
    fn new(instance: Arc<PluginInstance>) -> Option<Self> {
        let interface = NonNull::from(instance.interface::<I>()?);
        Some(Self {
            instance,
            interface,
        })
    }

    /// Handle to the whole instance
    pub fn plugin(&self) -> PluginPtr {
        PluginPtr::from_instance(self.instance.clone())
    }

    /// Name of the plugin behind the interface
    pub fn plugin_name(&self) -> &str {
        &self.instance.info.name
    }

    /// Build a product through a factory interface
    ///
    /// The product keeps the factory's instance (and library) alive until it
    /// is dropped.
    pub fn construct<P: ?Sized, A>(&self, args: A) -> Product<P>
    where
        I: Factory<P, A>,
    {
        let value = Deref::deref(self).produce(args);
        Product::new(value, self.instance.clone())
    }
}

impl<I: ?Sized + 'static> Deref for InterfaceRef<I> {
    type Target = I;

    fn deref(&self) -> &I {
        // SAFETY: points into `self.instance`'s object, which is neither
        // moved nor destroyed while the Arc is held.
        unsafe { self.interface.as_ref() }
    }
}

impl<I: ?Sized + 'static> Clone for InterfaceRef<I> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            interface: self.interface,
        }
    }
}

impl<I: ?Sized + 'static> fmt::Debug for InterfaceRef<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceRef")
            .field("plugin", &self.instance.info.name)
            .field("interface", &demangle(interface_id::<I>()))
            .finish()
    }
}
