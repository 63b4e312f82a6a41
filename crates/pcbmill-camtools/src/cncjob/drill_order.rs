//! Visiting order for drill hits.
//!
//! Every strategy returns a permutation of the input indices describing an
//! open tour that starts next to `start`. The local-search strategies only
//! run on 64-bit targets; elsewhere they fall back to the greedy order.

use geo::Coord;
use pcbmill_geometry::{distance, PointStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum DrillOrder {
    /// Always drill the closest remaining hole next.
    #[default]
    NearestNeighbor,
    /// Guided local search over 2-opt moves, bounded by `time_limit`.
    Metaheuristic {
        #[serde(with = "seconds")]
        time_limit: Duration,
    },
    /// 2-opt local search from the greedy tour, without penalties.
    Basic,
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// Order `points` for drilling, starting from `start`.
pub fn order_points(points: &[Coord<f64>], start: Coord<f64>, order: DrillOrder) -> Vec<usize> {
    let greedy = nearest_neighbor(points, start);
    if points.len() < 4 {
        return greedy;
    }
    match order {
        DrillOrder::NearestNeighbor => greedy,
        DrillOrder::Basic => local::two_opt(points, start, greedy),
        DrillOrder::Metaheuristic { time_limit } => {
            local::guided_local_search(points, start, greedy, time_limit)
        }
    }
}

fn nearest_neighbor(points: &[Coord<f64>], start: Coord<f64>) -> Vec<usize> {
    let mut store = PointStore::new(points);
    let mut order = Vec::with_capacity(points.len());
    let mut at = start;
    while let Some(id) = store.pop_nearest(at) {
        order.push(id);
        at = points[id];
    }
    order
}

/// Length of the open tour `start -> order[0] -> ... -> order[n-1]`.
pub fn tour_length(points: &[Coord<f64>], start: Coord<f64>, order: &[usize]) -> f64 {
    let mut at = start;
    let mut total = 0.0;
    for &i in order {
        total += distance(at, points[i]);
        at = points[i];
    }
    total
}

#[cfg(target_pointer_width = "64")]
mod local {
    use super::{debug, tour_length, Coord, Duration};
    use pcbmill_geometry::distance;
    use std::collections::HashMap;
    use std::time::Instant;

    const MAX_SWEEPS: usize = 200;
    const GLS_ALPHA: f64 = 0.1;

    /// Node `n` is the fixed start; `0..n` are the points.
    struct Nodes<'a> {
        points: &'a [Coord<f64>],
        start: Coord<f64>,
    }

    impl Nodes<'_> {
        fn at(&self, node: usize) -> Coord<f64> {
            self.points.get(node).copied().unwrap_or(self.start)
        }

        fn dist(&self, a: usize, b: usize) -> f64 {
            distance(self.at(a), self.at(b))
        }
    }

    fn edge(a: usize, b: usize) -> (usize, usize) {
        (a.min(b), a.max(b))
    }

    /// First-improvement 2-opt on an open tour with a fixed start node.
    /// Returns true when the tour changed.
    fn improve<F>(tour: &mut [usize], start_node: usize, cost: &F, deadline: Option<Instant>) -> bool
    where
        F: Fn(usize, usize) -> f64,
    {
        let n = tour.len();
        let mut changed = false;
        for _ in 0..MAX_SWEEPS {
            let mut improved = false;
            for i in 0..n - 1 {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return changed;
                }
                let prev = if i == 0 { start_node } else { tour[i - 1] };
                for j in i + 1..n {
                    let removed = cost(prev, tour[i])
                        + if j + 1 < n { cost(tour[j], tour[j + 1]) } else { 0.0 };
                    let added = cost(prev, tour[j])
                        + if j + 1 < n { cost(tour[i], tour[j + 1]) } else { 0.0 };
                    if added + 1e-12 < removed {
                        tour[i..=j].reverse();
                        improved = true;
                        changed = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }
        changed
    }

    pub fn two_opt(points: &[Coord<f64>], start: Coord<f64>, mut tour: Vec<usize>) -> Vec<usize> {
        let nodes = Nodes { points, start };
        let before = tour_length(points, start, &tour);
        improve(&mut tour, points.len(), &|a, b| nodes.dist(a, b), None);
        debug!(
            "2-opt: {:.4} -> {:.4}",
            before,
            tour_length(points, start, &tour)
        );
        tour
    }

    /// Guided local search: 2-opt on distances augmented by edge penalties.
    /// At each local optimum the edge with the highest utility is penalized.
    pub fn guided_local_search(
        points: &[Coord<f64>],
        start: Coord<f64>,
        initial: Vec<usize>,
        time_limit: Duration,
    ) -> Vec<usize> {
        let nodes = Nodes { points, start };
        let start_node = points.len();
        let deadline = Instant::now() + time_limit;

        let mut best = initial.clone();
        improve(&mut best, start_node, &|a, b| nodes.dist(a, b), Some(deadline));
        let mut best_length = tour_length(points, start, &best);
        let lambda = GLS_ALPHA * best_length / points.len() as f64;

        let mut penalties: HashMap<(usize, usize), u32> = HashMap::new();
        let mut tour = best.clone();
        let mut rounds = 0;
        while Instant::now() < deadline {
            rounds += 1;
            {
                let augmented = |a: usize, b: usize| {
                    nodes.dist(a, b)
                        + lambda * penalties.get(&edge(a, b)).copied().unwrap_or(0) as f64
                };
                improve(&mut tour, start_node, &augmented, Some(deadline));
            }

            let length = tour_length(points, start, &tour);
            if length + 1e-12 < best_length {
                best_length = length;
                best.clone_from(&tour);
            }

            let mut prev = start_node;
            let mut worst = None;
            let mut worst_utility = f64::NEG_INFINITY;
            for &node in &tour {
                let e = edge(prev, node);
                let utility =
                    nodes.dist(prev, node) / (1.0 + penalties.get(&e).copied().unwrap_or(0) as f64);
                if utility > worst_utility {
                    worst_utility = utility;
                    worst = Some(e);
                }
                prev = node;
            }
            match worst {
                Some(e) => *penalties.entry(e).or_insert(0) += 1,
                None => break,
            }
        }
        debug!("Guided local search: {} rounds, length {:.4}", rounds, best_length);
        best
    }
}

#[cfg(not(target_pointer_width = "64"))]
mod local {
    use super::{Coord, Duration};

    pub fn two_opt(_points: &[Coord<f64>], _start: Coord<f64>, tour: Vec<usize>) -> Vec<usize> {
        tour
    }

    pub fn guided_local_search(
        _points: &[Coord<f64>],
        _start: Coord<f64>,
        initial: Vec<usize>,
        _time_limit: Duration,
    ) -> Vec<usize> {
        initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcbmill_geometry::coord;
    use proptest::prelude::*;

    fn is_permutation(order: &[usize], n: usize) -> bool {
        let mut seen = vec![false; n];
        order.len() == n
            && order.iter().all(|&i| i < n && !std::mem::replace(&mut seen[i], true))
    }

    #[test]
    fn test_greedy_follows_a_line() {
        let points = vec![coord(3.0, 0.0), coord(1.0, 0.0), coord(2.0, 0.0)];
        assert_eq!(
            order_points(&points, coord(0.0, 0.0), DrillOrder::NearestNeighbor),
            vec![1, 2, 0]
        );
    }

    #[test]
    fn test_two_opt_never_worse_than_greedy() {
        // Greedy leaves the far corner for last and crosses back.
        let points = vec![
            coord(1.0, 0.0),
            coord(2.0, 0.0),
            coord(0.0, 1.1),
            coord(3.0, 0.0),
            coord(0.0, 5.0),
            coord(3.0, 5.0),
        ];
        let start = coord(0.0, 0.0);
        let greedy = order_points(&points, start, DrillOrder::NearestNeighbor);
        let basic = order_points(&points, start, DrillOrder::Basic);
        let gls = order_points(
            &points,
            start,
            DrillOrder::Metaheuristic {
                time_limit: Duration::from_millis(20),
            },
        );
        let base = tour_length(&points, start, &greedy);
        assert!(tour_length(&points, start, &basic) <= base + 1e-9);
        assert!(tour_length(&points, start, &gls) <= base + 1e-9);
        assert!(is_permutation(&basic, points.len()));
        assert!(is_permutation(&gls, points.len()));
    }

    #[test]
    fn test_empty_input() {
        assert!(order_points(&[], coord(0.0, 0.0), DrillOrder::Basic).is_empty());
    }

    proptest! {
        #[test]
        fn prop_every_strategy_returns_a_permutation(
            raw in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 0..40),
            method in 0usize..3,
        ) {
            let points: Vec<Coord<f64>> = raw.iter().map(|(x, y)| coord(*x, *y)).collect();
            let order = match method {
                0 => DrillOrder::NearestNeighbor,
                1 => DrillOrder::Basic,
                _ => DrillOrder::Metaheuristic { time_limit: Duration::from_millis(2) },
            };
            let result = order_points(&points, coord(0.0, 0.0), order);
            prop_assert!(is_permutation(&result, points.len()));
        }
    }
}
