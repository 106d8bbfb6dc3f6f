//! In-process stand-ins for plugin libraries
#![allow(dead_code)]

use std::ffi::c_void;
use std::sync::{Arc, OnceLock};

use tether_plugin_api::{
    default_deleter, hook, merge_registrations, Caster, Erased, Factory, Info, InfoMap, Producing,
    TETHER_API_VERSION,
};
use tether_plugin_host::{InProcessBackend, Loader};

pub const SQUARE: &str = "geometry::Square";
pub const DISK: &str = "geometry::Disk";
pub const TRIANGLE: &str = "geometry::Triangle";
pub const CIRCLE_FACTORY: &str = "geometry::Circle::factory(f64, i32)";
pub const UNIT_CIRCLE_FACTORY: &str = "geometry::Circle::factory()";
pub const POLYGON_FACTORY: &str = "geometry::Polygon::factory(&[f64],)";

pub trait Shape: Send + Sync {
    fn area(&self) -> f64;
}

pub trait Named: Send + Sync {
    fn label(&self) -> &'static str;
}

pub trait Unused: Send + Sync {}

#[derive(Default)]
pub struct Square;

impl Shape for Square {
    fn area(&self) -> f64 {
        1.0
    }
}

impl Named for Square {
    fn label(&self) -> &'static str {
        "square"
    }
}

#[derive(Default)]
pub struct Disk;

impl Shape for Disk {
    fn area(&self) -> f64 {
        std::f64::consts::PI
    }
}

#[derive(Default)]
pub struct Triangle;

impl Shape for Triangle {
    fn area(&self) -> f64 {
        0.5
    }
}

pub struct Circle {
    pub radius: f64,
    pub segments: i32,
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

pub struct Polygon {
    pub sides: Vec<f64>,
}

impl Shape for Polygon {
    fn area(&self) -> f64 {
        self.sides.iter().sum()
    }
}

/// Factory taking a borrowed slice, usable through a higher-ranked interface
#[derive(Default)]
pub struct PolygonFactory;

impl<'a> Factory<dyn Shape, (&'a [f64],)> for PolygonFactory {
    fn produce(&self, (sides,): (&'a [f64],)) -> Box<dyn Shape> {
        Box::new(Polygon {
            sides: sides.to_vec(),
        })
    }
}

pub type PolygonFactoryInterface = dyn for<'a> Factory<dyn Shape, (&'a [f64],)>;
pub type CircleFactory = Producing<dyn Shape, (f64, i32)>;
pub type UnitCircleFactory = Producing<dyn Shape, ()>;

fn circle_factory() -> Box<Erased> {
    Box::new(CircleFactory::new(|(radius, segments)| {
        Box::new(Circle { radius, segments }) as Box<dyn Shape>
    }))
}

fn unit_circle_factory() -> Box<Erased> {
    Box::new(UnitCircleFactory::new(|()| {
        Box::new(Circle {
            radius: 1.0,
            segments: 0,
        }) as Box<dyn Shape>
    }))
}

fn geometry_plugins() -> Vec<Info> {
    vec![
        Info::of::<Square>()
            .with_name(SQUARE)
            .with_interface(Caster::<dyn Shape>::new::<Square>(|object| object))
            .with_alias("square")
            .with_alias("quad"),
        // Second registration of the same plugin, merged by name
        Info::of::<Square>()
            .with_name(SQUARE)
            .with_interface(Caster::<dyn Named>::new::<Square>(|object| object)),
        Info::of::<Disk>()
            .with_name(DISK)
            .with_interface(Caster::<dyn Shape>::new::<Disk>(|object| object))
            .with_alias("round")
            .with_alias("quad"),
        Info::new(CIRCLE_FACTORY, circle_factory, default_deleter).with_interface(
            Caster::<dyn Factory<dyn Shape, (f64, i32)>>::new::<CircleFactory>(|object| object),
        ),
        Info::new(UNIT_CIRCLE_FACTORY, unit_circle_factory, default_deleter).with_interface(
            Caster::<dyn Factory<dyn Shape, ()>>::new::<UnitCircleFactory>(|object| object),
        ),
        Info::of::<PolygonFactory>()
            .with_name(POLYGON_FACTORY)
            .with_interface(Caster::<PolygonFactoryInterface>::new::<PolygonFactory>(
                |object| object,
            )),
    ]
}

fn revised_plugins() -> Vec<Info> {
    vec![
        Info::of::<Square>()
            .with_name(SQUARE)
            .with_interface(Caster::<dyn Shape>::new::<Square>(|object| object)),
        Info::of::<Triangle>()
            .with_name(TRIANGLE)
            .with_interface(Caster::<dyn Shape>::new::<Triangle>(|object| object))
            .with_alias("triangle"),
    ]
}

/// Library exporting the geometry plugins
pub unsafe extern "C" fn geometry_hook(
    output: *mut *const c_void,
    api_version: *mut u32,
    info_size: *mut usize,
    info_align: *mut usize,
) {
    static MAP: OnceLock<InfoMap> = OnceLock::new();
    let map = MAP.get_or_init(|| merge_registrations(geometry_plugins()));
    hook::respond(output, api_version, info_size, info_align, map)
}

/// Library re-exporting `geometry::Square` next to a new plugin
pub unsafe extern "C" fn revised_hook(
    output: *mut *const c_void,
    api_version: *mut u32,
    info_size: *mut usize,
    info_align: *mut usize,
) {
    static MAP: OnceLock<InfoMap> = OnceLock::new();
    let map = MAP.get_or_init(|| merge_registrations(revised_plugins()));
    hook::respond(output, api_version, info_size, info_align, map)
}

/// Library built against a newer protocol
pub unsafe extern "C" fn future_hook(
    output: *mut *const c_void,
    api_version: *mut u32,
    info_size: *mut usize,
    info_align: *mut usize,
) {
    let _ = (output, info_align);
    *api_version = TETHER_API_VERSION + 1;
    *info_size += 16;
}

/// Paths of the fake libraries for one test
pub struct Fixture {
    pub backend: Arc<InProcessBackend>,
    pub geometry: String,
    pub revised: String,
    pub future: String,
    pub hookless: String,
}

impl Fixture {
    /// Fake libraries under a prefix unique to the calling test
    pub fn new(test: &str) -> Self {
        let backend = Arc::new(InProcessBackend::new());
        let fixture = Self {
            backend,
            geometry: format!("mem/{test}/libgeometry.so"),
            revised: format!("mem/{test}/librevised.so"),
            future: format!("mem/{test}/libfuture.so"),
            hookless: format!("mem/{test}/libplain.so"),
        };
        fixture.backend.add_library(&fixture.geometry, geometry_hook);
        fixture.backend.add_library(&fixture.revised, revised_hook);
        fixture.backend.add_library(&fixture.future, future_hook);
        fixture.backend.add_library_without_hook(&fixture.hookless);
        fixture
    }

    pub fn loader(&self) -> Loader {
        Loader::with_backend(self.backend.clone())
    }

    /// Open handles to `path`
    pub fn open(&self, path: &str) -> usize {
        self.backend.open_count(path)
    }
}
