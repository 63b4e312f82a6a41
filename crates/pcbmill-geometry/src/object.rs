//! Plain geometry object: a solid store plus a follow store in one unit.

use crate::bounds::{try_bounds, Bounds};
use crate::shape::{flatten, Flatten, Primitive, Shape};
use crate::transform::{ConvertUnits, Transform};
use geo::{AffineTransform, MultiPolygon, Polygon};
use pcbmill_core::Units;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryObject {
    pub units: Units,
    /// Areas (or isolation paths once generated).
    pub solid: Vec<Shape>,
    /// Centerlines, used for follow-mode cutting.
    pub follow: Vec<Shape>,
}

impl GeometryObject {
    pub fn new(units: Units) -> Self {
        Self {
            units,
            ..Default::default()
        }
    }

    pub fn with_solid(units: Units, solid: Vec<Shape>) -> Self {
        Self {
            units,
            solid,
            follow: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.solid.iter().all(Shape::is_empty) && self.follow.iter().all(Shape::is_empty)
    }

    pub fn flatten(&self, path_only: bool) -> Flatten<'_> {
        flatten(&self.solid, path_only)
    }

    /// Polygons of the solid store, as one multipolygon (not unioned).
    pub fn solid_polygons(&self) -> MultiPolygon<f64> {
        let polys: Vec<Polygon<f64>> = self
            .flatten(false)
            .filter_map(|p| match p {
                Primitive::Polygon(poly) => Some(poly.clone()),
                _ => None,
            })
            .collect();
        MultiPolygon::new(polys)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        try_bounds(self.solid.iter().chain(self.follow.iter()))
    }
}

impl Transform for GeometryObject {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        self.solid.affine(transform);
        self.follow.affine(transform);
    }
}

impl ConvertUnits for GeometryObject {
    fn units(&self) -> Units {
        self.units
    }

    fn set_units(&mut self, units: Units) {
        self.units = units;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    #[test]
    fn test_convert_units_scales_both_stores() {
        let mut obj = GeometryObject::new(Units::In);
        obj.solid.push(Shape::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]));
        obj.follow.push(Shape::Point(point!(x: 1.0, y: 2.0)));

        let factor = obj.convert_units(Units::Mm);
        assert_eq!(factor, 25.4);
        assert_eq!(obj.units, Units::Mm);
        let b = obj.bounds().unwrap();
        assert!((b.max_x - 25.4).abs() < 1e-9);
        assert!((b.max_y - 50.8).abs() < 1e-9);

        assert_eq!(obj.convert_units(Units::Mm), 1.0);
    }

    #[test]
    fn test_solid_polygons_skips_paths() {
        let mut obj = GeometryObject::new(Units::Mm);
        obj.solid.push(Shape::Path(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)]));
        obj.solid.push(Shape::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]));
        assert_eq!(obj.solid_polygons().0.len(), 1);
        assert!(!obj.is_empty());
        assert!(GeometryObject::new(Units::Mm).is_empty());
    }
}
