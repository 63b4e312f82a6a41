//! Affine transforms and unit conversion.
//!
//! Everything that owns geometry implements [`Transform`] by applying one
//! affine matrix to all of its stores, so the stores never drift apart.

use crate::shape::Shape;
use geo::{AffineOps, AffineTransform, Coord};
use pcbmill_core::Units;

/// Mirror axis. `X` flips across a horizontal line (y changes sign), `Y`
/// across a vertical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

pub trait Transform {
    /// Apply `transform` to every coordinate.
    fn affine(&mut self, transform: &AffineTransform<f64>);

    /// Scale size metadata that is not stored as coordinates (aperture sizes,
    /// tool diameters). Only called for uniform scaling.
    fn scale_sizes(&mut self, _factor: f64) {}

    fn scale(&mut self, xfactor: f64, yfactor: f64, origin: Coord<f64>) {
        self.affine(&AffineTransform::scale(xfactor, yfactor, origin));
        if (xfactor - yfactor).abs() < 1e-12 {
            self.scale_sizes(xfactor.abs());
        }
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.affine(&AffineTransform::translate(dx, dy));
    }

    fn mirror(&mut self, axis: Axis, point: Coord<f64>) {
        let (xf, yf) = match axis {
            Axis::X => (1.0, -1.0),
            Axis::Y => (-1.0, 1.0),
        };
        self.affine(&AffineTransform::scale(xf, yf, point));
    }

    /// Rotate counter-clockwise by `angle` degrees around `origin`.
    fn rotate(&mut self, angle: f64, origin: Coord<f64>) {
        self.affine(&AffineTransform::rotate(angle, origin));
    }

    /// Shear by `angle_x` / `angle_y` degrees around `origin`.
    fn skew(&mut self, angle_x: f64, angle_y: f64, origin: Coord<f64>) {
        self.affine(&AffineTransform::skew(angle_x, angle_y, origin));
    }
}

/// Geometry that carries its own length unit.
pub trait ConvertUnits: Transform {
    fn units(&self) -> Units;

    fn set_units(&mut self, units: Units);

    /// Rescale everything about the origin into `target` and return the
    /// factor used (exactly 1.0 when the units already match).
    fn convert_units(&mut self, target: Units) -> f64 {
        let current = self.units();
        if current == target {
            return 1.0;
        }
        let factor = current.factor_to(target);
        self.affine(&AffineTransform::scale(
            factor,
            factor,
            Coord { x: 0.0, y: 0.0 },
        ));
        self.scale_sizes(factor);
        self.set_units(target);
        factor
    }
}

impl Transform for Shape {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        match self {
            Shape::Polygon(p) => p.affine_transform_mut(transform),
            Shape::MultiPolygon(mp) => mp.affine_transform_mut(transform),
            Shape::Path(ls) => ls.affine_transform_mut(transform),
            Shape::MultiPath(mls) => mls.affine_transform_mut(transform),
            Shape::Point(pt) => pt.affine_transform_mut(transform),
            Shape::Collection(children) => children.affine(transform),
        }
    }
}

impl Transform for Vec<Shape> {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        for shape in self.iter_mut() {
            shape.affine(transform);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    fn pt(shape: &Shape) -> (f64, f64) {
        match shape {
            Shape::Point(p) => (p.x(), p.y()),
            _ => panic!("not a point"),
        }
    }

    #[test]
    fn test_mirror_axes() {
        let mut s = Shape::Point(point!(x: 2.0, y: 3.0));
        s.mirror(Axis::X, Coord { x: 0.0, y: 1.0 });
        assert_eq!(pt(&s), (2.0, -1.0));
        s.mirror(Axis::Y, Coord { x: 1.0, y: 0.0 });
        assert_eq!(pt(&s), (0.0, -1.0));
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let mut s = Shape::Point(point!(x: 1.0, y: 0.0));
        s.rotate(90.0, Coord { x: 0.0, y: 0.0 });
        let (x, y) = pt(&s);
        assert!(x.abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_offset_nested() {
        let mut shapes = vec![Shape::Collection(vec![Shape::Point(point!(x: 1.0, y: 1.0))])];
        shapes.offset(2.0, -1.0);
        match &shapes[0] {
            Shape::Collection(c) => assert_eq!(pt(&c[0]), (3.0, 0.0)),
            _ => panic!("collection lost"),
        }
    }
}
