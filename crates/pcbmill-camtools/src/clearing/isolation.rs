//! Copper isolation.

use super::{rings, stepover};
use crate::tool::{CutParameters, MillingDirection, OperationType, ToolEntry};
use geo::{LineString, Winding};
use pcbmill_core::{CamError, CamResult, CancellationToken};
use pcbmill_geometry::ops::buffer;
use pcbmill_geometry::{GeometryObject, Shape};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

/// Which rings of the offset region become toolpaths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationSide {
    Exterior,
    Interior,
    #[default]
    Both,
}

impl FromStr for IsolationSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exterior" | "ext" => Ok(Self::Exterior),
            "interior" | "int" => Ok(Self::Interior),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown isolation side '{}'", s)),
        }
    }
}

/// Offset contours of `source` at signed distance `offset`.
///
/// With `follow` the centerlines are returned as they are. An offset of
/// exactly zero returns the solid geometry untouched.
pub fn isolation_geometry(
    source: &GeometryObject,
    offset: f64,
    side: IsolationSide,
    follow: bool,
) -> Vec<Shape> {
    if follow {
        return source.follow.clone();
    }
    if offset == 0.0 {
        return source.solid.clone();
    }
    let region = buffer(&source.solid_polygons(), offset);
    let paths: Vec<LineString<f64>> = match side {
        IsolationSide::Both => rings(&region),
        IsolationSide::Exterior => region.0.iter().map(|p| p.exterior().clone()).collect(),
        IsolationSide::Interior => region
            .0
            .iter()
            .flat_map(|p| p.interiors().iter().cloned())
            .collect(),
    };
    paths.into_iter().map(Shape::Path).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationParams {
    pub tool_diameter: f64,
    pub passes: usize,
    /// Fraction of the tool diameter shared by neighbouring passes.
    pub overlap: f64,
    pub milling_direction: MillingDirection,
    pub side: IsolationSide,
    /// Cut along centerlines instead of around copper.
    pub follow: bool,
    pub cut: CutParameters,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            tool_diameter: 0.1,
            passes: 1,
            overlap: 0.1,
            milling_direction: MillingDirection::Climb,
            side: IsolationSide::Both,
            follow: false,
            cut: CutParameters::default(),
        }
    }
}

/// Orient a ring for the milling direction. With a clockwise spindle, climb
/// milling runs clockwise around copper and counter-clockwise inside holes.
fn orient(mut ring: LineString<f64>, exterior: bool, direction: MillingDirection) -> LineString<f64> {
    let clockwise = exterior == (direction == MillingDirection::Climb);
    if clockwise {
        ring.make_cw_winding();
    } else {
        ring.make_ccw_winding();
    }
    ring
}

/// Multi-pass isolation of `source` into a tool entry.
pub fn isolate(
    source: &GeometryObject,
    params: &IsolationParams,
    cancel: &CancellationToken,
) -> CamResult<ToolEntry> {
    let step = stepover(params.tool_diameter, params.overlap)?;
    if params.passes == 0 {
        return Err(CamError::InvalidParameters("at least one pass is required".into()));
    }

    let mut solid = Vec::new();
    if params.follow {
        solid = isolation_geometry(source, 0.0, params.side, true);
    } else {
        let region = source.solid_polygons();
        for pass in 0..params.passes {
            cancel.check()?;
            let offset = params.tool_diameter / 2.0 + pass as f64 * step;
            let grown = buffer(&region, offset);
            for polygon in &grown.0 {
                if params.side != IsolationSide::Interior {
                    let ring = orient(polygon.exterior().clone(), true, params.milling_direction);
                    solid.push(Shape::Path(ring));
                }
                if params.side != IsolationSide::Exterior {
                    for interior in polygon.interiors() {
                        let ring = orient(interior.clone(), false, params.milling_direction);
                        solid.push(Shape::Path(ring));
                    }
                }
            }
            debug!("Isolation pass {} at offset {:.4}", pass + 1, offset);
        }
    }

    if solid.is_empty() {
        return Err(CamError::OperationFailed(
            "isolation produced no geometry".to_string(),
        ));
    }
    info!(
        "Isolation: {} paths with tool {:.4} in {} pass(es)",
        solid.len(),
        params.tool_diameter,
        params.passes
    );

    let mut tool = ToolEntry::new(params.tool_diameter).with_solid(solid);
    tool.operation = OperationType::Iso;
    tool.params = CutParameters {
        overlap: params.overlap,
        milling_direction: params.milling_direction,
        ..params.cut.clone()
    };
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};
    use pcbmill_core::Units;

    fn square() -> GeometryObject {
        GeometryObject::with_solid(
            Units::Mm,
            vec![Shape::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 2.0, y: 0.0),
                (x: 2.0, y: 2.0),
                (x: 0.0, y: 2.0),
            ])],
        )
    }

    #[test]
    fn test_zero_offset_is_identity() {
        let src = square();
        assert_eq!(isolation_geometry(&src, 0.0, IsolationSide::Both, false), src.solid);
    }

    #[test]
    fn test_exterior_ring_grows() {
        let rings = isolation_geometry(&square(), 0.5, IsolationSide::Exterior, false);
        assert_eq!(rings.len(), 1);
        let Shape::Path(ring) = &rings[0] else {
            panic!("expected a path");
        };
        let enclosed = geo::Polygon::new(ring.clone(), vec![]).unsigned_area();
        assert!((enclosed - (8.0 + std::f64::consts::PI * 0.25)).abs() < 0.05);
        assert!(isolation_geometry(&square(), 0.5, IsolationSide::Interior, false).is_empty());
    }

    #[test]
    fn test_multi_pass_climb_is_clockwise() {
        let params = IsolationParams {
            tool_diameter: 0.2,
            passes: 3,
            overlap: 0.5,
            ..Default::default()
        };
        let tool = isolate(&square(), &params, &CancellationToken::new()).unwrap();
        assert_eq!(tool.solid.len(), 3);
        assert_eq!(tool.operation, OperationType::Iso);
        for shape in &tool.solid {
            let Shape::Path(ring) = shape else {
                panic!("expected a path");
            };
            assert!(ring.is_cw());
        }
    }

    #[test]
    fn test_isolating_nothing_fails() {
        let empty = GeometryObject::new(Units::Mm);
        let err = isolate(&empty, &IsolationParams::default(), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CamError::OperationFailed(_)));
    }
}
