//! Axis-aligned bounding boxes.

use crate::shape::Shape;
use geo::{Coord, CoordsIter};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    fn from_coord(c: Coord<f64>) -> Self {
        Self {
            min_x: c.x,
            min_y: c.y,
            max_x: c.x,
            max_y: c.y,
        }
    }

    fn include(&mut self, c: Coord<f64>) {
        self.min_x = self.min_x.min(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_x = self.max_x.max(c.x);
        self.max_y = self.max_y.max(c.y);
    }

    /// Smallest box containing both.
    pub fn merge(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// True for the all-zero placeholder returned by [`bounds`] on empty input.
    pub fn is_empty(&self) -> bool {
        *self == Bounds::default()
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }

    pub fn contains(&self, c: Coord<f64>) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

fn include(out: &mut Option<Bounds>, c: Coord<f64>) {
    match out {
        Some(b) => b.include(c),
        None => *out = Some(Bounds::from_coord(c)),
    }
}

fn visit_coords(shape: &Shape, out: &mut Option<Bounds>) {
    match shape {
        Shape::Polygon(p) => p.exterior_coords_iter().for_each(|c| include(out, c)),
        Shape::MultiPolygon(mp) => mp.exterior_coords_iter().for_each(|c| include(out, c)),
        Shape::Path(ls) => ls.coords_iter().for_each(|c| include(out, c)),
        Shape::MultiPath(mls) => mls.coords_iter().for_each(|c| include(out, c)),
        Shape::Point(pt) => include(out, pt.0),
        Shape::Collection(children) => {
            for child in children {
                visit_coords(child, out);
            }
        }
    }
}

/// Bounding box of `shapes`, or `None` when there is nothing to bound.
pub fn try_bounds<'a, I>(shapes: I) -> Option<Bounds>
where
    I: IntoIterator<Item = &'a Shape>,
{
    let mut out = None;
    for shape in shapes {
        visit_coords(shape, &mut out);
    }
    out
}

/// Bounding box of `shapes`.
///
/// Empty input yields the all-zero box, which is not a real extent; use
/// [`try_bounds`] when the distinction matters.
pub fn bounds<'a, I>(shapes: I) -> Bounds
where
    I: IntoIterator<Item = &'a Shape>,
{
    try_bounds(shapes).unwrap_or_default()
}
