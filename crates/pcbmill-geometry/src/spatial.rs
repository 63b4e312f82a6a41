//! R-tree lookup of path endpoints and drill points.
//!
//! Used to chain toolpaths by always moving to the closest unvisited start.

use geo::{Coord, LineString};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// One indexed location: a path end or a drill point.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Endpoint {
    at: [f64; 2],
    id: usize,
    /// True when this is the last coordinate of the path.
    tail: bool,
}

impl RTreeObject for Endpoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.at)
    }
}

impl PointDistance for Endpoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.at[0] - point[0];
        let dy = self.at[1] - point[1];
        dx * dx + dy * dy
    }
}

fn key(c: Coord<f64>) -> [f64; 2] {
    [c.x, c.y]
}

/// Paths indexed by both of their endpoints.
#[derive(Debug)]
pub struct PathStore {
    tree: RTree<Endpoint>,
    paths: Vec<Option<LineString<f64>>>,
    remaining: usize,
}

impl PathStore {
    pub fn new(paths: Vec<LineString<f64>>) -> Self {
        let mut points = Vec::with_capacity(paths.len() * 2);
        let mut slots = Vec::with_capacity(paths.len());
        for (id, path) in paths.into_iter().enumerate() {
            match (path.0.first(), path.0.last()) {
                (Some(first), Some(last)) => {
                    points.push(Endpoint { at: key(*first), id, tail: false });
                    if path.0.len() > 1 && first != last {
                        points.push(Endpoint { at: key(*last), id, tail: true });
                    }
                    slots.push(Some(path));
                }
                _ => slots.push(None),
            }
        }
        let remaining = slots.iter().filter(|s| s.is_some()).count();
        Self {
            tree: RTree::bulk_load(points),
            paths: slots,
            remaining,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Closest remaining path to `from`, and whether it must be reversed so
    /// that it starts at the matched end. Closed paths are never reversed.
    pub fn nearest(&self, from: Coord<f64>) -> Option<(usize, bool)> {
        self.tree
            .nearest_neighbor(&key(from))
            .map(|e| (e.id, e.tail))
    }

    pub fn get(&self, id: usize) -> Option<&LineString<f64>> {
        self.paths.get(id)?.as_ref()
    }

    /// Remove a path and both of its endpoints.
    pub fn take(&mut self, id: usize) -> Option<LineString<f64>> {
        let path = self.paths.get_mut(id)?.take()?;
        if let Some(first) = path.0.first() {
            self.tree.remove(&Endpoint { at: key(*first), id, tail: false });
        }
        if let Some(last) = path.0.last() {
            self.tree.remove(&Endpoint { at: key(*last), id, tail: true });
        }
        self.remaining -= 1;
        Some(path)
    }

    /// Remove and return the path closest to `from`, oriented so it starts at
    /// the matched end.
    pub fn pop_nearest(&mut self, from: Coord<f64>) -> Option<LineString<f64>> {
        let (id, reverse) = self.nearest(from)?;
        let mut path = self.take(id)?;
        if reverse {
            path.0.reverse();
        }
        Some(path)
    }
}

/// Points indexed for nearest-neighbor visiting order.
#[derive(Debug)]
pub struct PointStore {
    tree: RTree<Endpoint>,
}

impl PointStore {
    pub fn new(points: &[Coord<f64>]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(id, c)| Endpoint { at: key(*c), id, tail: false })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Remove and return the index of the point closest to `from`.
    pub fn pop_nearest(&mut self, from: Coord<f64>) -> Option<usize> {
        let found = *self.tree.nearest_neighbor(&key(from))?;
        self.tree.remove(&found);
        Some(found.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn test_path_store_reverses_when_tail_is_closer() {
        let mut store = PathStore::new(vec![
            line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0)],
            line_string![(x: 10.0, y: 0.0), (x: 6.0, y: 0.0)],
        ]);
        assert_eq!(store.len(), 2);

        let first = store.pop_nearest(Coord { x: 0.0, y: 0.0 }).unwrap();
        assert_eq!(first.0[0], Coord { x: 0.0, y: 0.0 });

        let second = store.pop_nearest(Coord { x: 5.0, y: 0.0 }).unwrap();
        assert_eq!(second.0[0], Coord { x: 6.0, y: 0.0 });
        assert!(store.is_empty());
        assert!(store.pop_nearest(Coord { x: 0.0, y: 0.0 }).is_none());
    }

    #[test]
    fn test_closed_paths_keep_direction() {
        let ring = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let mut store = PathStore::new(vec![ring.clone()]);
        assert_eq!(store.pop_nearest(Coord { x: 0.1, y: 0.0 }).unwrap(), ring);
    }

    #[test]
    fn test_point_store_order() {
        let pts = [
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 5.0, y: 0.0 },
        ];
        let mut store = PointStore::new(&pts);
        let mut here = Coord { x: 0.0, y: 0.0 };
        let mut order = Vec::new();
        while let Some(i) = store.pop_nearest(here) {
            order.push(i);
            here = pts[i];
        }
        assert_eq!(order, vec![1, 2, 0]);
    }
}
