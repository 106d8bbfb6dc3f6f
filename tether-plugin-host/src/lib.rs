//! tether-plugin-host: Native plugin host runtime for tether
//!
//! Loads shared libraries that export tether plugins, keeps a registry of
//! what they provide, and hands out instances whose lifetime keeps the
//! library's code mapped.
//!
//! ```rust,ignore
//! use tether_plugin_host::Loader;
//!
//! let mut loader = Loader::new();
//! loader.load_library("target/release/libgeometry_plugin.so");
//!
//! for name in loader.plugins_implementing::<dyn Shape>() {
//!     let plugin = loader.instantiate(&name);
//!     if let Some(shape) = plugin.query_interface::<dyn Shape>() {
//!         println!("{name}: {}", shape.area());
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod library;
pub mod loader;
pub mod plugin;
pub mod product;
pub mod registry;
pub mod search;
pub mod weak;

pub use config::LoaderConfig;
pub use error::LoaderError;
pub use library::{
    is_library_loaded, InProcessBackend, LibraryBackend, LibraryHandle, LibraryToken,
    NativeBackend, OpenLibrary,
};
pub use loader::Loader;
pub use plugin::{InterfaceRef, PluginPtr};
pub use product::{cleanup_lost_products, lost_product_count, Product, DEFAULT_SAFETY_WAIT};
pub use registry::{LookupError, Registry, StaticRegistry};
pub use search::{DiscoveryResult, SearchError, SearchPaths};
pub use tether_plugin_api::{Factory, Info, Producing};
pub use weak::WeakPluginPtr;
