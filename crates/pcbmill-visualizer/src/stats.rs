//! Job statistics from parsed G-code.

use crate::gcode::{MoveKind, MoveSpeed, ParsedGcode};
use pcbmill_geometry::Bounds;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStatistics {
    /// Distance moved with the tool in the stock.
    pub cut_distance: f64,
    /// Distance moved above the stock.
    pub travel_distance: f64,
    /// Estimated run time in minutes.
    pub estimated_minutes: f64,
    pub segments: usize,
    pub tool_changes: usize,
    /// XY extent of the cutting moves.
    #[serde(skip)]
    pub cut_bounds: Option<Bounds>,
}

/// Sum distances and estimate time. Rapid moves run at `rapid_rate`; feed
/// moves at their F word. Feed moves without an F word are not timed.
pub fn statistics(parsed: &ParsedGcode, rapid_rate: f64) -> JobStatistics {
    let mut stats = JobStatistics {
        segments: parsed.segments.len(),
        ..Default::default()
    };
    let mut untimed = 0;
    let mut last_tool = None;

    for segment in &parsed.segments {
        let length = segment.length();
        match segment.kind {
            MoveKind::Cut => stats.cut_distance += length,
            MoveKind::Travel => stats.travel_distance += length,
        }

        let rate = match segment.speed {
            MoveSpeed::Fast => rapid_rate,
            MoveSpeed::Slow => segment.feed_rate,
        };
        if rate > 0.0 {
            stats.estimated_minutes += length / rate;
        } else if length > 0.0 {
            untimed += 1;
        }

        if last_tool.is_some_and(|t| t != segment.tool) {
            stats.tool_changes += 1;
        }
        last_tool = Some(segment.tool);

        if segment.kind == MoveKind::Cut && segment.speed == MoveSpeed::Slow {
            for c in &segment.path.0 {
                let point = Bounds {
                    min_x: c.x,
                    min_y: c.y,
                    max_x: c.x,
                    max_y: c.y,
                };
                stats.cut_bounds = Some(match stats.cut_bounds {
                    Some(b) => b.merge(&point),
                    None => point,
                });
            }
        }
    }

    if untimed > 0 {
        warn!("{} moves have no feed rate and were not timed", untimed);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::gcode_parse;

    #[test]
    fn test_distances_and_time() {
        let parsed = gcode_parse(
            "G21\nG00 Z1\nG00 X3 Y4\nG01 Z-1 F60\nG01 X3 Y10 F120\nG00 Z1\n",
        );
        let stats = statistics(&parsed, 600.0);
        // Travel: 1 up, 5 across, 2 lift. Cut: 2 plunge, 6 along Y.
        assert!((stats.travel_distance - 8.0).abs() < 1e-12);
        assert!((stats.cut_distance - 8.0).abs() < 1e-12);
        let expected = 1.0 / 600.0 + 5.0 / 600.0 + 2.0 / 60.0 + 6.0 / 120.0 + 2.0 / 600.0;
        assert!((stats.estimated_minutes - expected).abs() < 1e-12);

        let b = stats.cut_bounds.unwrap();
        assert_eq!(b.as_tuple(), (3.0, 4.0, 3.0, 10.0));
    }

    #[test]
    fn test_tool_changes_counted() {
        let parsed = gcode_parse("T1\nG00 X1\nT2\nG00 X2\nG00 X3\n");
        assert_eq!(statistics(&parsed, 1000.0).tool_changes, 1);
    }
}
