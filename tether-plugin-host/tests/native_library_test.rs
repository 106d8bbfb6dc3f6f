//! Round trip through a real shared library
//!
//! Build the plugin first:
//! `cargo build --release --manifest-path plugins/geometry-plugin/Cargo.toml`

use tether_plugin_host::{is_library_loaded, Loader};

const PLUGIN_DIR: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../plugins/geometry-plugin/target/release"
);

#[test]
#[ignore = "requires plugins/geometry-plugin to be built"]
fn test_geometry_plugin_round_trip() {
    let mut loader = Loader::new();
    loader.search_paths_mut().add_path(PLUGIN_DIR);

    let plugins = loader.load_library_named("geometry_plugin");
    assert_eq!(plugins.len(), 4);
    assert_eq!(
        loader.plugins_implementing_named("geometry_plugin::Shape", true).len(),
        2
    );
    assert_eq!(loader.lookup_plugin("square").as_deref(), Some("geometry_plugin::Square"));
    assert!(loader.lookup_plugin("quad").is_some());

    let path = loader.library_of_plugin("geometry_plugin::Disk").unwrap().to_path_buf();
    let disk = loader.instantiate("round");
    assert!(disk.has_interface_named("geometry_plugin::Named", true));
    assert!(!disk.has_interface_named("geometry_plugin::Missing", true));

    assert!(loader.forget_library(&path));
    assert!(is_library_loaded(&path));
    drop(disk);
    assert!(!is_library_loaded(&path));
}
