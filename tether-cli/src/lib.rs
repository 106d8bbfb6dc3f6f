//! tether-cli: command-line inspection of tether plugin libraries
//!
//! ```text
//! tether info libgeometry_plugin.so
//! tether info geometry_plugin --plugin-path target/release --json
//! tether scan ./plugins
//! ```

pub mod cli;
pub mod report;
pub mod tracing_support;

pub use cli::{run, Cli, Command};
pub use report::LibraryReport;
