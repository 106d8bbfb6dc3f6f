//! tether-plugin-sdk: SDK for writing tether plugins
//!
//! Plugins are ordinary Rust types. Registering one records its name, the
//! interfaces it implements, and how to construct and destroy it. The same
//! registrations serve two purposes:
//!
//! - inside a shared library, [`export_plugins!`] hands them to the host's
//!   loader through the registration hook;
//! - inside the host executable, they populate the process-wide static
//!   registry.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether_plugin_sdk::prelude::*;
//!
//! pub trait Shape: Send + Sync {
//!     fn area(&self) -> f64;
//! }
//!
//! #[derive(Default)]
//! pub struct Square;
//!
//! impl Shape for Square {
//!     fn area(&self) -> f64 {
//!         1.0
//!     }
//! }
//!
//! register_plugin!(Square, dyn Shape);
//! register_alias!(Square, "square", "box");
//!
//! // Only in the crate built as a `cdylib`
//! export_plugins!();
//! ```

// Re-export everything from tether-plugin-api
pub use tether_plugin_api::*;
#[doc(hidden)]
pub use tether_plugin_api::{linkme, PLUGIN_REGISTRATIONS};

#[cfg(feature = "derive")]
pub use tether_macros::Plugin;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{export_plugins, register_alias, register_factory, register_plugin};
    pub use tether_plugin_api::{Caster, Factory, Info, Producing, TETHER_API_VERSION};

    #[cfg(feature = "derive")]
    pub use tether_macros::Plugin;
}

/// Register a plugin type and the interfaces it implements
///
/// The type must implement `Default`. The macro may be used several times for
/// the same type, in any module; the registrations are merged.
///
/// # Example
///
/// ```rust,ignore
/// register_plugin!(Square, dyn Shape, dyn Named);
/// ```
#[macro_export]
macro_rules! register_plugin {
    ($plugin:ty $(, $interface:ty)* $(,)?) => {
        const _: () = {
            #[$crate::linkme::distributed_slice($crate::PLUGIN_REGISTRATIONS)]
            #[linkme(crate = $crate::linkme)]
            static REGISTRATION: fn() -> $crate::Info = || {
                $crate::Info::of::<$plugin>()
                    $(.with_interface($crate::Caster::<$interface>::new::<$plugin>(|object| object)))*
            };
        };
    };
}

/// Register alternative lookup names for a plugin type
///
/// # Example
///
/// ```rust,ignore
/// register_alias!(Square, "square", "box");
/// ```
#[macro_export]
macro_rules! register_alias {
    ($plugin:ty $(, $alias:expr)+ $(,)?) => {
        const _: () = {
            #[$crate::linkme::distributed_slice($crate::PLUGIN_REGISTRATIONS)]
            #[linkme(crate = $crate::linkme)]
            static REGISTRATION: fn() -> $crate::Info = || {
                $crate::Info::of::<$plugin>()
                    $(.with_alias($alias))+
            };
        };
    };
}

/// Register a factory plugin producing `$product` as `$interface`
///
/// The registered plugin implements `dyn Factory<$interface, $args>` and is
/// named `<product>::factory<args>`, for example
/// `geometry::Circle::factory(f64, i32)`.
///
/// # Example
///
/// ```rust,ignore
/// register_factory!(Circle => dyn Shape, (f64, i32), |(radius, _)| Circle::new(radius));
/// register_factory!(Circle => dyn Shape, (), |()| Circle::new(1.0));
/// ```
#[macro_export]
macro_rules! register_factory {
    ($product:ty => $interface:ty, $args:ty, |$pattern:pat_param| $construct:expr $(,)?) => {
        const _: () = {
            fn make() -> ::std::boxed::Box<$crate::Erased> {
                ::std::boxed::Box::new($crate::Producing::<$interface, $args>::new(
                    |$pattern| ::std::boxed::Box::new($construct) as ::std::boxed::Box<$interface>,
                ))
            }

            #[$crate::linkme::distributed_slice($crate::PLUGIN_REGISTRATIONS)]
            #[linkme(crate = $crate::linkme)]
            static REGISTRATION: fn() -> $crate::Info = || {
                $crate::Info::new(
                    ::std::format!(
                        "{}::factory{}",
                        $crate::demangle(::std::any::type_name::<$product>()),
                        ::std::any::type_name::<$args>(),
                    ),
                    make,
                    $crate::default_deleter,
                )
                .with_interface(
                    $crate::Caster::<dyn $crate::Factory<$interface, $args>>::new::<
                        $crate::Producing<$interface, $args>,
                    >(|object| object),
                )
            };
        };
    };
}

/// Export the registration hook of a plugin library
///
/// Invoke exactly once in the crate that is built as a `cdylib`. The hook
/// answers the loader's handshake with every plugin registered in the
/// library.
#[macro_export]
macro_rules! export_plugins {
    () => {
        /// Registration hook read by the tether loader
        ///
        /// # Safety
        /// Called by the loader with valid, writable pointers.
        #[no_mangle]
        pub unsafe extern "C" fn tether_plugin_hook(
            output: *mut *const ::std::ffi::c_void,
            api_version: *mut u32,
            info_size: *mut usize,
            info_align: *mut usize,
        ) {
            $crate::hook::respond(
                output,
                api_version,
                info_size,
                info_align,
                $crate::compiled_plugins(),
            )
        }
    };
}
