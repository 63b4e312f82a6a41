//! Joining clearing fragments into longer continuous paths.

use geo::{Coord, LineString, MultiPolygon};
use pcbmill_geometry::clip::clip_path;
use pcbmill_geometry::ops::buffer;
use pcbmill_geometry::{coord, distance, PathStore};
use tracing::debug;

/// `max_walk` defaults to this many tool diameters.
pub const DEFAULT_MAX_WALK_FACTOR: f64 = 10.0;

fn path_length(path: &LineString<f64>) -> f64 {
    path.lines().map(|l| distance(l.start, l.end)).sum()
}

/// True when the straight move `a -> b` stays inside `allowed`.
fn stays_inside(a: Coord<f64>, b: Coord<f64>, allowed: &MultiPolygon<f64>) -> bool {
    let length = distance(a, b);
    if length == 0.0 {
        return true;
    }
    let pieces = clip_path(&LineString::new(vec![a, b]), allowed);
    pieces.len() == 1 && path_length(&pieces[0]) >= length * (1.0 - 1e-9)
}

fn append(target: &mut LineString<f64>, next: LineString<f64>) {
    let mut coords = next.0.into_iter();
    if let (Some(first), Some(last)) = (coords.next(), target.0.last()) {
        if first != *last {
            target.0.push(first);
        }
    }
    target.0.extend(coords);
}

/// Greedy nearest-neighbor walk over `paths`, joining consecutive paths with
/// a straight cut move when that move stays inside `boundary` shrunk by the
/// tool radius and is no longer than `max_walk`.
///
/// Paths that cannot be joined are returned separately, in visiting order.
pub fn paint_connect(
    paths: Vec<LineString<f64>>,
    boundary: &MultiPolygon<f64>,
    tool_diameter: f64,
    max_walk: Option<f64>,
) -> Vec<LineString<f64>> {
    let max_walk = max_walk.unwrap_or(DEFAULT_MAX_WALK_FACTOR * tool_diameter);
    let tolerance = tool_diameter * 1e-3;
    let allowed = buffer(boundary, -tool_diameter / 2.0 + tolerance);
    let total = paths.len();

    let mut store = PathStore::new(paths);
    let mut out = Vec::new();
    let Some(mut current) = store.pop_nearest(coord(0.0, 0.0)) else {
        return out;
    };
    let mut joins = 0;

    while let Some(end) = current.0.last().copied() {
        let Some(next) = store.pop_nearest(end) else {
            break;
        };
        let start = next.0.first().copied().unwrap_or(end);
        if distance(end, start) <= max_walk && stays_inside(end, start, &allowed) {
            append(&mut current, next);
            joins += 1;
        } else {
            out.push(std::mem::replace(&mut current, next));
        }
    }
    out.push(current);
    debug!("paint_connect: {} paths -> {} ({} joins)", total, out.len(), joins);
    out
}

/// Merge open paths whose endpoints coincide within `tolerance`.
pub fn path_connect(paths: Vec<LineString<f64>>, tolerance: f64) -> Vec<LineString<f64>> {
    let mut store = PathStore::new(paths);
    let mut out = Vec::new();
    let mut cursor = coord(0.0, 0.0);

    while let Some(mut current) = store.pop_nearest(cursor) {
        for _ in 0..2 {
            while !current.is_closed() {
                let Some(end) = current.0.last().copied() else {
                    break;
                };
                let Some((id, reverse)) = store.nearest(end) else {
                    break;
                };
                let matched = store.get(id).and_then(|p| {
                    if reverse {
                        p.0.last().copied()
                    } else {
                        p.0.first().copied()
                    }
                });
                if !matched.is_some_and(|m| distance(m, end) <= tolerance) {
                    break;
                }
                let Some(mut next) = store.take(id) else {
                    break;
                };
                if reverse {
                    next.0.reverse();
                }
                append(&mut current, next);
            }
            // Then try to grow the other end.
            current.0.reverse();
        }
        if let Some(end) = current.0.last() {
            cursor = *end;
        }
        out.push(current);
    }
    out
}
