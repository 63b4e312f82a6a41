//! # pcbmill Geometry
//!
//! Geometry kernel shared by the parsers, the clearing engine and the job
//! generator.
//!
//! - **Shapes**: polygons, paths and points, nested through [`Shape::Collection`]
//! - **Flatten / bounds**: lazy traversal of nested shapes and their enclosing box
//! - **Transforms**: scale, offset, mirror, rotate, skew and unit conversion
//! - **Arena**: shapes grouped by tool or aperture id
//! - **Ops**: buffering and boolean operations backed by Clipper
//! - **Clip**: clipping open paths against polygon regions
//! - **Spatial**: R-tree endpoint lookup for path ordering

pub mod arena;
pub mod bounds;
pub mod clip;
pub mod object;
pub mod ops;
pub mod shape;
pub mod spatial;
pub mod transform;

pub use arena::{ArenaEntry, ShapeArena, ShapeId, ShapeRole};
pub use bounds::{bounds, try_bounds, Bounds};
pub use object::GeometryObject;
pub use shape::{flatten, Flatten, Primitive, Shape};
pub use spatial::{PathStore, PointStore};
pub use transform::{Axis, ConvertUnits, Transform};

pub use geo::{Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};

/// Build a coordinate.
pub fn coord(x: f64, y: f64) -> Coord<f64> {
    Coord { x, y }
}

/// Euclidean distance between two coordinates.
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}
