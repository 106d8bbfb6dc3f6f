//! Geometry Plugin - A small tether plugin library
//!
//! Demonstrates the registration forms a plugin library can use:
//! - `#[derive(Plugin)]` with interfaces and aliases
//! - `register_plugin!` / `register_alias!`, repeated and merged by name
//! - `register_factory!` for parameterized construction
//! - `export_plugins!` for the loader's registration hook

use tether_plugin_sdk::prelude::*;

/// Something with an area
pub trait Shape: Send + Sync {
    fn area(&self) -> f64;
}

/// Something with a display label
pub trait Named: Send + Sync {
    fn label(&self) -> String;
}

#[derive(Default, Plugin)]
#[tether(interfaces(dyn Shape, dyn Named), aliases("square", "quad"))]
pub struct Square;

impl Shape for Square {
    fn area(&self) -> f64 {
        1.0
    }
}

impl Named for Square {
    fn label(&self) -> String {
        "unit square".to_string()
    }
}

#[derive(Default)]
pub struct Disk;

impl Shape for Disk {
    fn area(&self) -> f64 {
        std::f64::consts::PI
    }
}

impl Named for Disk {
    fn label(&self) -> String {
        "unit disk".to_string()
    }
}

register_plugin!(Disk, dyn Shape);
register_plugin!(Disk, dyn Named);
register_alias!(Disk, "disk", "round");

pub struct Circle {
    radius: f64,
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

register_factory!(Circle => dyn Shape, (f64,), |(radius,)| Circle { radius });
register_factory!(Circle => dyn Shape, (), |()| Circle { radius: 1.0 });

export_plugins!();
