//! Polygon operations: buffering, booleans, validity repair and stroking.
//!
//! Booleans and offsets go through Clipper on integer coordinates scaled by
//! [`CLIPPER_SCALE`].

use crate::shape::{flatten, Primitive, Shape};
use geo::algorithm::orient::{Direction, Orient};
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, ConvexHull, Coord, Line, LineString, MultiPoint, MultiPolygon, Polygon};
use geo_clipper::{Clipper, EndType, JoinType};
use std::f64::consts::{PI, TAU};

/// Float to integer scale used for every Clipper call.
pub const CLIPPER_SCALE: f64 = 1e6;

/// Maximum deviation of a round join from the true arc, in geometry units.
pub const ARC_TOLERANCE: f64 = 5e-4;

/// Clipper takes the arc tolerance in its own integer units.
fn round_join() -> JoinType {
    JoinType::Round(ARC_TOLERANCE * CLIPPER_SCALE)
}

/// Segments used to approximate a full circle.
pub const STEPS_PER_CIRCLE: usize = 64;

/// Rings with more segments than this skip the self-intersection scan and
/// are normalized unconditionally.
const VALIDITY_SCAN_LIMIT: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcDirection {
    Cw,
    Ccw,
}

pub fn empty() -> MultiPolygon<f64> {
    MultiPolygon::new(Vec::new())
}

/// Grow (`distance > 0`) or shrink (`distance < 0`) a region with round joins.
///
/// A zero distance normalizes the region instead.
pub fn buffer(region: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    if region.0.is_empty() {
        return empty();
    }
    if distance == 0.0 {
        return region.union(&empty(), CLIPPER_SCALE);
    }
    region.offset(
        distance,
        round_join(),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    )
}

pub fn buffer_polygon(polygon: &Polygon<f64>, distance: f64) -> MultiPolygon<f64> {
    buffer(&MultiPolygon::new(vec![polygon.clone()]), distance)
}

pub fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() {
        return b.clone();
    }
    if b.0.is_empty() {
        return a.clone();
    }
    a.union(b, CLIPPER_SCALE)
}

pub fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() || b.0.is_empty() {
        return a.clone();
    }
    a.difference(b, CLIPPER_SCALE)
}

pub fn intersection(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() || b.0.is_empty() {
        return empty();
    }
    a.intersection(b, CLIPPER_SCALE)
}

/// Union an arbitrary set of possibly overlapping polygons.
///
/// Pieces are merged pairwise in a balanced tree, so every Clipper call sees
/// two operands that are each already free of overlaps.
pub fn union_all<I>(polygons: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = Polygon<f64>>,
{
    let mut layer: Vec<MultiPolygon<f64>> = polygons
        .into_iter()
        .filter(|p| p.exterior().0.len() >= 3)
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut pieces = layer.into_iter();
        while let Some(a) = pieces.next() {
            match pieces.next() {
                Some(b) => next.push(union(&a, &b)),
                None => next.push(a),
            }
        }
        layer = next;
    }

    layer.pop().unwrap_or_else(empty)
}

/// Union and then close gaps narrower than `2 * tolerance` by growing and
/// shrinking by `tolerance`.
pub fn merge_touching(region: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance <= 0.0 {
        return buffer(region, 0.0);
    }
    buffer(&buffer(region, tolerance), -tolerance)
}

/// Merge many possibly overlapping polygons in one Clipper pass by growing
/// them together and shrinking back. Faster than [`union_all`] on large
/// inputs; features narrower than `2 * tolerance` may be altered.
pub fn merge_buffered(polygons: Vec<Polygon<f64>>, tolerance: f64) -> MultiPolygon<f64> {
    if polygons.is_empty() {
        return empty();
    }
    let oriented: Vec<Polygon<f64>> = polygons
        .into_iter()
        .map(|p| p.orient(Direction::Default))
        .collect();
    let grown = MultiPolygon::new(oriented).offset(
        tolerance,
        round_join(),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    );
    buffer(&grown, -tolerance)
}

/// Every polygon in `shapes`, nested collections included.
pub fn polygons_of(shapes: &[Shape]) -> Vec<Polygon<f64>> {
    flatten(shapes, false)
        .filter_map(|p| match p {
            Primitive::Polygon(poly) => Some(poly.clone()),
            _ => None,
        })
        .collect()
}

pub fn area(region: &MultiPolygon<f64>) -> f64 {
    region.unsigned_area()
}

fn ring_segments(ring: &LineString<f64>) -> Vec<Line<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in &ring.0 {
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    coords.windows(2).map(|w| Line::new(w[0], w[1])).collect()
}

fn boxes_overlap(a: &Line<f64>, b: &Line<f64>) -> bool {
    a.start.x.min(a.end.x) <= b.start.x.max(b.end.x)
        && b.start.x.min(b.end.x) <= a.start.x.max(a.end.x)
        && a.start.y.min(a.end.y) <= b.start.y.max(b.end.y)
        && b.start.y.min(b.end.y) <= a.start.y.max(a.end.y)
}

/// Simple validity test: non-degenerate exterior, positive area and no ring
/// crossing itself or another ring. Rings may touch at single points.
pub fn is_valid(polygon: &Polygon<f64>) -> bool {
    if polygon.exterior().0.len() < 4 || polygon.unsigned_area() <= 0.0 {
        return false;
    }

    // (ring index, segment index, ring length)
    let mut segments: Vec<(usize, usize, usize, Line<f64>)> = Vec::new();
    for (r, ring) in std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .enumerate()
    {
        let segs = ring_segments(ring);
        let n = segs.len();
        segments.extend(segs.into_iter().enumerate().map(|(i, l)| (r, i, n, l)));
    }

    for (i, (ra, ia, na, la)) in segments.iter().enumerate() {
        for (rb, ib, _, lb) in segments.iter().skip(i + 1) {
            if ra == rb && (ib - ia == 1 || (*ia == 0 && *ib + 1 == *na)) {
                continue;
            }
            if !boxes_overlap(la, lb) {
                continue;
            }
            match line_intersection(*la, *lb) {
                Some(LineIntersection::SinglePoint { is_proper: true, .. }) => return false,
                Some(LineIntersection::Collinear { .. }) => return false,
                _ => {}
            }
        }
    }
    true
}

/// Rebuild a polygon so that it is valid, splitting bow-ties into their lobes.
pub fn repair(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon.clone()]).union(&empty(), CLIPPER_SCALE)
}

/// Return the polygon untouched when valid, repaired otherwise.
pub fn make_valid(polygon: Polygon<f64>) -> MultiPolygon<f64> {
    let segment_count: usize = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|r| r.0.len())
        .sum();
    if segment_count <= VALIDITY_SCAN_LIMIT && is_valid(&polygon) {
        MultiPolygon::new(vec![polygon])
    } else {
        repair(&polygon)
    }
}

/// Points along a circular arc, endpoints included.
///
/// Angles are in radians. Equal start and stop angles give a full circle.
pub fn arc(
    center: Coord<f64>,
    radius: f64,
    start: f64,
    stop: f64,
    direction: ArcDirection,
    steps_per_circle: usize,
) -> Vec<Coord<f64>> {
    let mut stop = stop;
    match direction {
        ArcDirection::Ccw if stop <= start => stop += TAU,
        ArcDirection::Cw if stop >= start => stop -= TAU,
        _ => {}
    }
    let sweep = (stop - start).abs();
    let steps = ((sweep / TAU * steps_per_circle as f64).ceil() as usize).max(2);
    let sign = match direction {
        ArcDirection::Cw => -1.0,
        ArcDirection::Ccw => 1.0,
    };
    let delta = sign * sweep / steps as f64;

    (0..=steps)
        .map(|i| {
            let theta = start + delta * i as f64;
            Coord {
                x: center.x + radius * theta.cos(),
                y: center.y + radius * theta.sin(),
            }
        })
        .collect()
}

pub fn circle(center: Coord<f64>, radius: f64, steps: usize) -> Polygon<f64> {
    let steps = steps.max(3);
    let ring: Vec<Coord<f64>> = (0..steps)
        .map(|i| {
            let theta = TAU * i as f64 / steps as f64;
            Coord {
                x: center.x + radius * theta.cos(),
                y: center.y + radius * theta.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::new(ring), vec![])
}

/// Convex hull of two circles of `radius` centered on `a` and `b`.
pub fn stadium(a: Coord<f64>, b: Coord<f64>, radius: f64, steps: usize) -> Polygon<f64> {
    let theta = (b.y - a.y).atan2(b.x - a.x);
    let mut ring = arc(b, radius, theta - PI / 2.0, theta + PI / 2.0, ArcDirection::Ccw, steps);
    ring.extend(arc(
        a,
        radius,
        theta + PI / 2.0,
        theta + 3.0 * PI / 2.0,
        ArcDirection::Ccw,
        steps,
    ));
    Polygon::new(LineString::new(ring), vec![])
}

/// Area covered by a round tool of diameter `width` following `path`.
pub fn stroke(path: &LineString<f64>, width: f64, steps: usize) -> MultiPolygon<f64> {
    let radius = width / 2.0;
    let pieces: Vec<Polygon<f64>> = path
        .lines()
        .filter(|l| l.start != l.end)
        .map(|l| stadium(l.start, l.end, radius, steps))
        .collect();
    if pieces.is_empty() {
        return match path.0.first() {
            Some(c) => MultiPolygon::new(vec![circle(*c, radius, steps)]),
            None => empty(),
        };
    }
    union_all(pieces)
}

fn placed(shape: &Polygon<f64>, at: Coord<f64>) -> impl Iterator<Item = Coord<f64>> + '_ {
    shape.exterior().0.iter().map(move |c| *c + at)
}

/// Area swept by a convex `shape` (given around the origin) moving along
/// `path`.
pub fn sweep(shape: &Polygon<f64>, path: &LineString<f64>) -> MultiPolygon<f64> {
    let pieces: Vec<Polygon<f64>> = path
        .lines()
        .filter(|l| l.start != l.end)
        .map(|l| {
            let hull: Vec<Coord<f64>> = placed(shape, l.start).chain(placed(shape, l.end)).collect();
            MultiPoint::from(hull).convex_hull()
        })
        .collect();
    if pieces.is_empty() {
        return match path.0.first() {
            Some(c) => {
                let hull: Vec<Coord<f64>> = placed(shape, *c).collect();
                MultiPolygon::new(vec![MultiPoint::from(hull).convex_hull()])
            }
            None => empty(),
        };
    }
    union_all(pieces)
}
