//! Clipping open paths against polygon regions.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Contains, Coord, InteriorPoint, Intersects, Line, LineString, MultiPolygon, Polygon};

const PARAM_EPS: f64 = 1e-12;

fn rings(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

/// Point-in-polygon test honouring holes. Boundary points are outside.
pub fn polygon_contains(polygon: &Polygon<f64>, c: Coord<f64>) -> bool {
    polygon.contains(&c)
}

pub fn region_contains(region: &MultiPolygon<f64>, c: Coord<f64>) -> bool {
    region.0.iter().any(|p| p.contains(&c))
}

/// Like [`region_contains`] but boundary points count as inside.
fn region_touches(region: &MultiPolygon<f64>, c: Coord<f64>) -> bool {
    region.0.iter().any(|p| p.intersects(&c))
}

fn lerp(a: Coord<f64>, b: Coord<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}

fn param(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> f64 {
    let d = b - a;
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    (((p.x - a.x) * d.x + (p.y - a.y) * d.y) / len2).clamp(0.0, 1.0)
}

fn overlaps(a: &Line<f64>, b: &Line<f64>) -> bool {
    a.start.x.min(a.end.x) <= b.start.x.max(b.end.x)
        && b.start.x.min(b.end.x) <= a.start.x.max(a.end.x)
        && a.start.y.min(a.end.y) <= b.start.y.max(b.end.y)
        && b.start.y.min(b.end.y) <= a.start.y.max(a.end.y)
}

/// Pieces of `path` that lie inside `region`, in path order.
pub fn clip_path(path: &LineString<f64>, region: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    let edges: Vec<Line<f64>> = region
        .0
        .iter()
        .flat_map(|p| rings(p).flat_map(|r| r.lines()))
        .collect();

    let mut pieces = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    let mut flush = |current: &mut Vec<Coord<f64>>| {
        if current.len() >= 2 {
            pieces.push(LineString::new(std::mem::take(current)));
        } else {
            current.clear();
        }
    };

    for seg in path.lines() {
        if seg.start == seg.end {
            continue;
        }
        let mut ts = vec![0.0, 1.0];
        for edge in edges.iter().filter(|e| overlaps(&seg, e)) {
            match line_intersection(seg, *edge) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    ts.push(param(seg.start, seg.end, intersection));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    ts.push(param(seg.start, seg.end, intersection.start));
                    ts.push(param(seg.start, seg.end, intersection.end));
                }
                None => {}
            }
        }
        ts.sort_by(|a, b| a.total_cmp(b));
        ts.dedup_by(|a, b| (*a - *b).abs() < PARAM_EPS);

        for w in ts.windows(2) {
            let mid = lerp(seg.start, seg.end, (w[0] + w[1]) / 2.0);
            if region_touches(region, mid) {
                if current.is_empty() {
                    current.push(lerp(seg.start, seg.end, w[0]));
                }
                current.push(lerp(seg.start, seg.end, w[1]));
            } else {
                flush(&mut current);
            }
        }
    }
    flush(&mut current);
    pieces
}

pub fn clip_paths(paths: &[LineString<f64>], region: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    paths.iter().flat_map(|p| clip_path(p, region)).collect()
}

/// Inside intervals of the horizontal line at `y`, sorted by x.
///
/// The polygons of `region` must not overlap each other.
pub fn scanline(region: &MultiPolygon<f64>, y: f64) -> Vec<(f64, f64)> {
    let mut xs: Vec<f64> = Vec::new();
    for polygon in &region.0 {
        for ring in rings(polygon) {
            for edge in ring.lines() {
                let (p, q) = (edge.start, edge.end);
                if (p.y <= y) != (q.y <= y) {
                    xs.push(p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y));
                }
            }
        }
    }
    xs.sort_by(|a, b| a.total_cmp(b));
    xs.chunks_exact(2)
        .map(|w| (w[0], w[1]))
        .filter(|(a, b)| b > a)
        .collect()
}

/// A point guaranteed to lie inside the polygon (unlike the centroid).
pub fn representative_point(polygon: &Polygon<f64>) -> Option<Coord<f64>> {
    polygon.interior_point().map(|p| p.0)
}
