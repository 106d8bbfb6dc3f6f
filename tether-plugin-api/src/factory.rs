//! Parameterized construction protocol
//!
//! A plugin that implements `dyn Factory<P, A>` builds products of interface
//! `P` from arguments `A`. The host wraps every product so that it keeps the
//! producing plugin instance, and therefore its library, alive.

/// Builds `P` products from `A` arguments
///
/// Arguments are passed as one tuple: `()`, `(f64, i32)`, or borrowed forms
/// such as `(&[f64],)` through a higher-ranked interface
/// (`dyn for<'a> Factory<dyn Shape, (&'a [f64],)>`).
pub trait Factory<P: ?Sized, A>: Send + Sync {
    /// Construct a new product
    fn produce(&self, args: A) -> Box<P>;
}

/// A factory backed by a plain constructor function
pub struct Producing<P: ?Sized, A> {
    produce: fn(A) -> Box<P>,
}

impl<P: ?Sized, A> Producing<P, A> {
    /// Wrap a constructor function
    pub const fn new(produce: fn(A) -> Box<P>) -> Self {
        Self { produce }
    }
}

impl<P: ?Sized, A> Factory<P, A> for Producing<P, A> {
    fn produce(&self, args: A) -> Box<P> {
        (self.produce)(args)
    }
}
