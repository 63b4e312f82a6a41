//! Shapes and flattening.

use geo::{LineString, MultiLineString, MultiPolygon, Point, Polygon};

/// A geometry value: a single primitive, a homogeneous multi-geometry, or a
/// nested collection of shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
    Path(LineString<f64>),
    MultiPath(MultiLineString<f64>),
    Point(Point<f64>),
    Collection(Vec<Shape>),
}

impl Shape {
    /// True when the shape holds no coordinates at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Shape::Polygon(p) => p.exterior().0.is_empty(),
            Shape::MultiPolygon(mp) => mp.0.iter().all(|p| p.exterior().0.is_empty()),
            Shape::Path(ls) => ls.0.is_empty(),
            Shape::MultiPath(mls) => mls.0.iter().all(|ls| ls.0.is_empty()),
            Shape::Point(_) => false,
            Shape::Collection(children) => children.iter().all(Shape::is_empty),
        }
    }

    /// Every polygon reachable from this shape.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        flatten(std::slice::from_ref(self), false)
            .filter_map(|p| match p {
                Primitive::Polygon(poly) => Some(poly.clone()),
                _ => None,
            })
            .collect()
    }
}

impl From<Polygon<f64>> for Shape {
    fn from(p: Polygon<f64>) -> Self {
        Shape::Polygon(p)
    }
}

impl From<MultiPolygon<f64>> for Shape {
    fn from(mp: MultiPolygon<f64>) -> Self {
        Shape::MultiPolygon(mp)
    }
}

impl From<LineString<f64>> for Shape {
    fn from(ls: LineString<f64>) -> Self {
        Shape::Path(ls)
    }
}

impl From<Point<f64>> for Shape {
    fn from(p: Point<f64>) -> Self {
        Shape::Point(p)
    }
}

/// A leaf produced by [`flatten`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive<'a> {
    Polygon(&'a Polygon<f64>),
    Path(&'a LineString<f64>),
    Point(&'a Point<f64>),
}

impl Primitive<'_> {
    pub fn to_shape(&self) -> Shape {
        match *self {
            Primitive::Polygon(p) => Shape::Polygon(p.clone()),
            Primitive::Path(ls) => Shape::Path(ls.clone()),
            Primitive::Point(pt) => Shape::Point(*pt),
        }
    }
}

#[derive(Debug, Clone)]
enum Frame<'a> {
    Shapes(std::slice::Iter<'a, Shape>),
    Polygons(std::slice::Iter<'a, Polygon<f64>>),
    Paths(std::slice::Iter<'a, LineString<f64>>),
    Rings { polygon: &'a Polygon<f64>, next: usize },
}

enum Step<'a> {
    Shape(&'a Shape),
    Polygon(&'a Polygon<f64>),
    Yield(Primitive<'a>),
}

/// Depth-first iterator over the primitives of nested shapes.
///
/// A clone continues from the same position; call [`flatten`] again to
/// start over.
#[derive(Debug, Clone)]
pub struct Flatten<'a> {
    stack: Vec<Frame<'a>>,
    path_only: bool,
}

/// Lazily walk `shapes`, yielding polygons, paths and points in order.
///
/// With `path_only` every polygon is expanded into its exterior ring followed
/// by its interior rings, so consumers only ever see paths and points.
pub fn flatten(shapes: &[Shape], path_only: bool) -> Flatten<'_> {
    Flatten {
        stack: vec![Frame::Shapes(shapes.iter())],
        path_only,
    }
}

impl<'a> Flatten<'a> {
    fn enter_polygon(&mut self, polygon: &'a Polygon<f64>) -> Option<Primitive<'a>> {
        if self.path_only {
            self.stack.push(Frame::Rings { polygon, next: 0 });
            None
        } else {
            Some(Primitive::Polygon(polygon))
        }
    }
}

impl<'a> Iterator for Flatten<'a> {
    type Item = Primitive<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = match self.stack.last_mut()? {
                Frame::Shapes(iter) => iter.next().map(Step::Shape),
                Frame::Polygons(iter) => iter.next().map(Step::Polygon),
                Frame::Paths(iter) => iter.next().map(|ls| Step::Yield(Primitive::Path(ls))),
                Frame::Rings { polygon, next } => {
                    let polygon: &'a Polygon<f64> = *polygon;
                    let ring = if *next == 0 {
                        Some(polygon.exterior())
                    } else {
                        polygon.interiors().get(*next - 1)
                    };
                    *next += 1;
                    ring.map(|r| Step::Yield(Primitive::Path(r)))
                }
            };

            match step {
                None => {
                    self.stack.pop();
                }
                Some(Step::Yield(primitive)) => return Some(primitive),
                Some(Step::Polygon(polygon)) => {
                    if let Some(primitive) = self.enter_polygon(polygon) {
                        return Some(primitive);
                    }
                }
                Some(Step::Shape(shape)) => match shape {
                    Shape::Polygon(polygon) => {
                        if let Some(primitive) = self.enter_polygon(polygon) {
                            return Some(primitive);
                        }
                    }
                    Shape::MultiPolygon(mp) => self.stack.push(Frame::Polygons(mp.0.iter())),
                    Shape::Path(ls) => return Some(Primitive::Path(ls)),
                    Shape::MultiPath(mls) => self.stack.push(Frame::Paths(mls.0.iter())),
                    Shape::Point(pt) => return Some(Primitive::Point(pt)),
                    Shape::Collection(children) => self.stack.push(Frame::Shapes(children.iter())),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon};

    fn square_with_hole() -> Polygon<f64> {
        polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 4.0, y: 4.0), (x: 6.0, y: 4.0), (x: 6.0, y: 6.0), (x: 4.0, y: 6.0)]],
        )
    }

    #[test]
    fn test_flatten_nested_collections() {
        let shapes = vec![
            Shape::Collection(vec![
                Shape::Polygon(square_with_hole()),
                Shape::Collection(vec![Shape::Point(Point::new(1.0, 1.0))]),
            ]),
            Shape::Path(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]),
        ];

        let kinds: Vec<&str> = flatten(&shapes, false)
            .map(|p| match p {
                Primitive::Polygon(_) => "polygon",
                Primitive::Path(_) => "path",
                Primitive::Point(_) => "point",
            })
            .collect();
        assert_eq!(kinds, vec!["polygon", "point", "path"]);
    }

    #[test]
    fn test_flatten_path_only_expands_rings() {
        let shapes = vec![Shape::MultiPolygon(MultiPolygon::new(vec![square_with_hole()]))];
        let rings: Vec<_> = flatten(&shapes, true).collect();
        assert_eq!(rings.len(), 2);
        assert!(rings.iter().all(|p| matches!(p, Primitive::Path(_))));
    }

    #[test]
    fn test_flatten_is_restartable() {
        let shapes = vec![Shape::Polygon(square_with_hole())];
        assert_eq!(flatten(&shapes, true).count(), 2);
        assert_eq!(flatten(&shapes, true).count(), 2);
        assert_eq!(flatten(&[], true).count(), 0);
    }
}
