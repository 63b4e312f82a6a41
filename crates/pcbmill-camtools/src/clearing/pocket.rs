//! Area clearing of a single polygon.
//!
//! All three strategies keep the tool center inside the polygon shrunk by
//! the tool radius, so the cutter never leaves the polygon.

use super::connect::paint_connect;
use super::{rings, stepover};
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use pcbmill_core::{CamResult, CancellationToken};
use pcbmill_geometry::clip::{clip_path, representative_point, scanline};
use pcbmill_geometry::ops::{arc, buffer, buffer_polygon, ArcDirection, STEPS_PER_CIRCLE};
use pcbmill_geometry::distance;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketParams {
    pub tool_diameter: f64,
    pub overlap: f64,
    /// Add a final pass around the shrunk outline.
    pub contour: bool,
    /// Join the resulting fragments with [`paint_connect`].
    pub connect: bool,
}

impl Default for PocketParams {
    fn default() -> Self {
        Self {
            tool_diameter: 0.8,
            overlap: 0.15,
            contour: true,
            connect: true,
        }
    }
}

fn finish(
    mut paths: Vec<LineString<f64>>,
    polygon: &Polygon<f64>,
    allowed: &MultiPolygon<f64>,
    params: &PocketParams,
) -> Vec<LineString<f64>> {
    if params.contour {
        paths.extend(rings(allowed));
    }
    paths.retain(|p| p.0.len() >= 2);
    if params.connect && paths.len() > 1 {
        let boundary = MultiPolygon::new(vec![polygon.clone()]);
        paint_connect(paths, &boundary, params.tool_diameter, None)
    } else {
        paths
    }
}

/// Concentric clearing: shrink by the tool radius, then repeatedly by the
/// stepover until nothing is left. Every ring of every step is a path.
pub fn clear_polygon(
    polygon: &Polygon<f64>,
    params: &PocketParams,
    cancel: &CancellationToken,
) -> CamResult<Vec<LineString<f64>>> {
    let step = stepover(params.tool_diameter, params.overlap)?;
    let allowed = buffer_polygon(polygon, -params.tool_diameter / 2.0);

    let mut paths = Vec::new();
    let mut current = allowed.clone();
    let mut steps = 0;
    while !current.0.is_empty() {
        cancel.check()?;
        paths.extend(rings(&current));
        current = buffer(&current, -step);
        steps += 1;
    }
    debug!("clear_polygon: {} concentric steps", steps);

    // The outline is already the first ring.
    let params = PocketParams {
        contour: false,
        ..*params
    };
    Ok(finish(paths, polygon, &allowed, &params))
}

/// Seed clearing: circles of growing radius around `seed` (or an interior
/// point), each clipped to the shrunk polygon, until a circle no longer
/// touches it.
pub fn clear_polygon2(
    polygon: &Polygon<f64>,
    seed: Option<Coord<f64>>,
    params: &PocketParams,
    cancel: &CancellationToken,
) -> CamResult<Vec<LineString<f64>>> {
    let step = stepover(params.tool_diameter, params.overlap)?;
    let allowed = buffer_polygon(polygon, -params.tool_diameter / 2.0);
    let Some(bounds) = allowed.bounding_rect() else {
        return Ok(Vec::new());
    };
    let Some(seed) = seed.or_else(|| allowed.0.iter().find_map(representative_point)) else {
        return Ok(Vec::new());
    };

    let reach = bounds
        .to_polygon()
        .exterior()
        .0
        .iter()
        .map(|c| distance(seed, *c))
        .fold(0.0, f64::max);

    let mut paths = Vec::new();
    let mut radius = step;
    let mut touched = false;
    while radius <= reach + step {
        cancel.check()?;
        let mut ring = arc(seed, radius, 0.0, 0.0, ArcDirection::Ccw, STEPS_PER_CIRCLE);
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last_mut()) {
            *last = first;
        }
        let pieces = clip_path(&LineString::new(ring), &allowed);
        if pieces.is_empty() && touched {
            break;
        }
        touched |= !pieces.is_empty();
        paths.extend(pieces);
        radius += step;
    }
    debug!("clear_polygon2: {} arcs", paths.len());
    Ok(finish(paths, polygon, &allowed, params))
}

/// Line clearing: horizontal lines no further apart than the stepover,
/// clipped exactly to the shrunk polygon.
pub fn clear_polygon3(
    polygon: &Polygon<f64>,
    params: &PocketParams,
    cancel: &CancellationToken,
) -> CamResult<Vec<LineString<f64>>> {
    let step = stepover(params.tool_diameter, params.overlap)?;
    let allowed = buffer_polygon(polygon, -params.tool_diameter / 2.0);
    let (min_y, max_y) = allowed
        .0
        .iter()
        .flat_map(|p| p.exterior().0.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c.y), hi.max(c.y)));
    if !(max_y > min_y) {
        return Ok(Vec::new());
    }

    let count = ((max_y - min_y) / step).ceil().max(1.0) as usize;
    let spacing = (max_y - min_y) / count as f64;
    let mut paths = Vec::new();
    for i in 0..count {
        cancel.check()?;
        let y = min_y + (i as f64 + 0.5) * spacing;
        let mut spans = scanline(&allowed, y);
        if i % 2 == 1 {
            spans.reverse();
        }
        for (x0, x1) in spans {
            let (a, b) = if i % 2 == 1 { (x1, x0) } else { (x0, x1) };
            paths.push(LineString::new(vec![Coord { x: a, y }, Coord { x: b, y }]));
        }
    }
    debug!("clear_polygon3: {} lines", paths.len());
    Ok(finish(paths, polygon, &allowed, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Contains};
    use pcbmill_geometry::clip::region_contains;
    use proptest::prelude::*;

    fn square(size: f64) -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
        ]
    }

    fn params() -> PocketParams {
        PocketParams {
            tool_diameter: 1.0,
            overlap: 0.1,
            contour: true,
            connect: false,
        }
    }

    fn all_inside(paths: &[LineString<f64>], polygon: &Polygon<f64>) {
        let region = buffer_polygon(polygon, 1e-6);
        for path in paths {
            for c in &path.0 {
                assert!(region_contains(&region, *c), "{:?} outside", c);
            }
        }
    }

    /// Every cut segment, not only its ends, must stay inside the polygon.
    fn all_segments_inside(paths: &[LineString<f64>], polygon: &Polygon<f64>) -> Result<(), String> {
        let region = buffer_polygon(polygon, 1e-6);
        for line in paths.iter().flat_map(|p| p.lines()) {
            if line.start == line.end {
                continue;
            }
            if !region.0.iter().any(|p| p.contains(&line)) {
                return Err(format!("segment {:?} -> {:?} leaves the pocket", line.start, line.end));
            }
        }
        Ok(())
    }

    fn u_shape() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 7.0, y: 10.0),
            (x: 7.0, y: 3.0),
            (x: 3.0, y: 3.0),
            (x: 3.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]
    }

    fn l_shape(w: f64, h: f64, notch_x: f64, notch_y: f64) -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: w, y: 0.0),
            (x: w, y: notch_y),
            (x: notch_x, y: notch_y),
            (x: notch_x, y: h),
            (x: 0.0, y: h),
        ]
    }

    #[test]
    fn test_concave_pocket_connected_moves_stay_inside() {
        let poly = u_shape();
        let p = PocketParams {
            contour: true,
            connect: true,
            ..params()
        };
        let cancel = CancellationToken::new();
        let results = [
            clear_polygon(&poly, &p, &cancel).unwrap(),
            clear_polygon2(&poly, None, &p, &cancel).unwrap(),
            clear_polygon3(&poly, &p, &cancel).unwrap(),
        ];
        for paths in &results {
            assert!(!paths.is_empty());
            all_segments_inside(paths, &poly).unwrap();
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_l_pockets_stay_inside(
            w in 4.0f64..12.0,
            h in 4.0f64..12.0,
            fx in 0.3f64..0.7,
            fy in 0.3f64..0.7,
            method in 0usize..3,
        ) {
            let poly = l_shape(w, h, w * fx, h * fy);
            let p = PocketParams {
                contour: true,
                connect: true,
                ..params()
            };
            let cancel = CancellationToken::new();
            let paths = match method {
                0 => clear_polygon(&poly, &p, &cancel),
                1 => clear_polygon2(&poly, None, &p, &cancel),
                _ => clear_polygon3(&poly, &p, &cancel),
            }
            .unwrap();
            prop_assert!(!paths.is_empty());
            let inside = all_segments_inside(&paths, &poly);
            prop_assert!(inside.is_ok(), "{:?}", inside);
        }
    }

    #[test]
    fn test_concentric_ring_count() {
        let poly = square(10.0);
        let paths = clear_polygon(&poly, &params(), &CancellationToken::new()).unwrap();
        let expected = ((5.0f64 - 0.5) / 0.9).ceil() as i64;
        assert!((paths.len() as i64 - expected).abs() <= 1, "got {}", paths.len());
        all_inside(&paths, &poly);
    }

    #[test]
    fn test_seed_clearing_stays_inside() {
        let poly = square(6.0);
        let paths = clear_polygon2(&poly, None, &params(), &CancellationToken::new()).unwrap();
        assert!(paths.len() > 2);
        all_inside(&paths, &poly);
    }

    #[test]
    fn test_line_clearing_spacing() {
        let poly = square(10.0);
        let p = PocketParams {
            contour: false,
            ..params()
        };
        let paths = clear_polygon3(&poly, &p, &CancellationToken::new()).unwrap();
        assert_eq!(paths.len(), 10);
        let ys: Vec<f64> = paths.iter().map(|l| l.0[0].y).collect();
        for w in ys.windows(2) {
            assert!(w[1] - w[0] <= 0.9 + 1e-9);
        }
        all_inside(&paths, &poly);
    }

    #[test]
    fn test_connected_lines_stay_inside() {
        let poly = square(10.0);
        let p = PocketParams {
            connect: true,
            ..params()
        };
        let paths = clear_polygon3(&poly, &p, &CancellationToken::new()).unwrap();
        assert!(paths.len() < 11);
        all_inside(&paths, &poly);
    }

    #[test]
    fn test_polygon_smaller_than_tool_is_empty() {
        let poly = square(0.5);
        let cancel = CancellationToken::new();
        assert!(clear_polygon(&poly, &params(), &cancel).unwrap().is_empty());
        assert!(clear_polygon2(&poly, None, &params(), &cancel).unwrap().is_empty());
        assert!(clear_polygon3(&poly, &params(), &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = clear_polygon(&square(10.0), &params(), &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
