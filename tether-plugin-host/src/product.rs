//! Objects built by plugin factories
//!
//! A [`Product`] owns the object a factory produced and a reference to the
//! factory's instance, so the library that holds the object's code stays
//! loaded. Releasing the object to the caller ([`Product::into_box`],
//! [`Product::into_raw`]) cannot track it any further; the reference is
//! parked in a process-wide list of lost products until
//! [`cleanup_lost_products`] is called.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::plugin::{PluginInstance, PluginPtr};

/// Default pause between locking the lost-product list and releasing it
pub const DEFAULT_SAFETY_WAIT: Duration = Duration::from_nanos(5);

static LOST_PRODUCTS: Mutex<Vec<Arc<PluginInstance>>> = Mutex::new(Vec::new());

fn lost_products() -> MutexGuard<'static, Vec<Arc<PluginInstance>>> {
    LOST_PRODUCTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Number of factory references parked by released products
pub fn lost_product_count() -> usize {
    lost_products().len()
}

/// Release every parked factory reference
///
/// Only call this when no released product is still in use: libraries
/// whose last reference was parked are unloaded here. `safety_wait` gives
/// destructors that are still running on other threads time to leave
/// library code.
pub fn cleanup_lost_products(safety_wait: Duration) {
    let mut lost = lost_products();
    std::thread::sleep(safety_wait);
    let released = lost.len();
    lost.clear();
    if released > 0 {
        tracing::debug!(count = released, "Released lost products");
    }
}

/// A factory-built object tied to the factory's lifetime
pub struct Product<P: ?Sized> {
    value: ManuallyDrop<Box<P>>,
    producer: ManuallyDrop<Arc<PluginInstance>>,
}

impl<P: ?Sized> Product<P> {
    pub(crate) fn new(value: Box<P>, producer: Arc<PluginInstance>) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            producer: ManuallyDrop::new(producer),
        }
    }

    /// The factory instance that built this object
    pub fn producer(&self) -> PluginPtr {
        PluginPtr::from_instance(Arc::clone(&self.producer))
    }

    /// Take ownership of the object
    ///
    /// The factory instance is parked as a lost product.
    pub fn into_box(self) -> Box<P> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so each field is taken exactly once.
        let (value, producer) = unsafe {
            (
                ManuallyDrop::take(&mut this.value),
                ManuallyDrop::take(&mut this.producer),
            )
        };
        tracing::trace!(plugin = %producer.info.name, "Product released, factory parked");
        lost_products().push(producer);
        value
    }

    /// Take ownership of the object as a raw pointer
    ///
    /// See [`Product::into_box`].
    pub fn into_raw(self) -> *mut P {
        Box::into_raw(self.into_box())
    }
}

impl<P: ?Sized> Drop for Product<P> {
    fn drop(&mut self) {
        // SAFETY: both fields are dropped exactly once, here. The object goes
        // first, while its code is still guaranteed to be loaded.
        unsafe {
            ManuallyDrop::drop(&mut self.value);
            ManuallyDrop::drop(&mut self.producer);
        }
    }
}

impl<P: ?Sized> Deref for Product<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.value
    }
}

impl<P: ?Sized> DerefMut for Product<P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.value
    }
}

impl<P: ?Sized> fmt::Debug for Product<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Product")
            .field("producer", &self.producer.info.name)
            .finish_non_exhaustive()
    }
}
