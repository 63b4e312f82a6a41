//! Milling drill holes and slots with an end mill smaller than the hole.

use crate::excellon::ExcellonObject;
use crate::tool::{CutParameters, OperationType, ToolEntry};
use pcbmill_core::{CamError, CamResult, CancellationToken};
use pcbmill_geometry::ops::{circle, stadium, STEPS_PER_CIRCLE};
use pcbmill_geometry::Shape;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleMillingParams {
    pub tool_diameter: f64,
    /// Excellon tool ids to mill. Empty means every tool.
    pub tools: Vec<String>,
    pub cut: CutParameters,
}

impl Default for HoleMillingParams {
    fn default() -> Self {
        Self {
            tool_diameter: 1.0,
            tools: Vec::new(),
            cut: CutParameters::default(),
        }
    }
}

/// One closed path per hole and per slot, traced with the tool edge on the
/// hole wall. Holes not larger than the tool are skipped with a warning.
pub fn mill_holes(
    source: &ExcellonObject,
    params: &HoleMillingParams,
    cancel: &CancellationToken,
) -> CamResult<ToolEntry> {
    if !(params.tool_diameter > 0.0) {
        return Err(CamError::InvalidParameters(format!(
            "tool diameter must be positive, got {}",
            params.tool_diameter
        )));
    }

    let mut solid = Vec::new();
    for (id, tool) in &source.tools {
        if !params.tools.is_empty() && !params.tools.contains(id) {
            continue;
        }
        cancel.check()?;
        let radius = (tool.diameter - params.tool_diameter) / 2.0;
        if radius <= 0.0 {
            warn!(
                "T{}: hole {:.4} is not larger than the mill {:.4}, skipped",
                id, tool.diameter, params.tool_diameter
            );
            continue;
        }
        for center in source.drills_for(id) {
            solid.push(Shape::Path(circle(center, radius, STEPS_PER_CIRCLE).exterior().clone()));
        }
        for slot in source.slots_for(id) {
            let outline = stadium(slot.start, slot.stop, radius, STEPS_PER_CIRCLE);
            solid.push(Shape::Path(outline.exterior().clone()));
        }
    }

    if solid.is_empty() {
        return Err(CamError::OperationFailed(
            "no hole is larger than the milling tool".to_string(),
        ));
    }
    info!(
        "Hole milling: {} paths with tool {:.4}",
        solid.len(),
        params.tool_diameter
    );

    let mut tool = ToolEntry::new(params.tool_diameter).with_solid(solid);
    tool.operation = OperationType::Finish;
    tool.params = params.cut.clone();
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excellon::{DrillHit, ExcellonTool, Slot};
    use pcbmill_geometry::{coord, distance};

    fn board() -> ExcellonObject {
        let mut obj = ExcellonObject::default();
        for (id, diameter) in [("01", 0.8), ("02", 3.0)] {
            obj.tools.insert(
                id.to_string(),
                ExcellonTool {
                    diameter,
                    solid: Vec::new(),
                },
            );
        }
        obj.drills.push(DrillHit {
            point: coord(0.0, 0.0),
            tool: "01".into(),
        });
        obj.drills.push(DrillHit {
            point: coord(10.0, 10.0),
            tool: "02".into(),
        });
        obj.slots.push(Slot {
            start: coord(20.0, 0.0),
            stop: coord(25.0, 0.0),
            tool: "02".into(),
        });
        obj
    }

    #[test]
    fn test_small_holes_are_skipped() {
        let params = HoleMillingParams {
            tool_diameter: 1.0,
            ..Default::default()
        };
        let tool = mill_holes(&board(), &params, &CancellationToken::new()).unwrap();
        assert_eq!(tool.solid.len(), 2);

        let Shape::Path(ring) = &tool.solid[0] else {
            panic!("expected a path");
        };
        assert!(ring.is_closed());
        for c in &ring.0 {
            assert!((distance(*c, coord(10.0, 10.0)) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tool_filter() {
        let params = HoleMillingParams {
            tool_diameter: 0.5,
            tools: vec!["01".into()],
            ..Default::default()
        };
        let tool = mill_holes(&board(), &params, &CancellationToken::new()).unwrap();
        assert_eq!(tool.solid.len(), 1);
    }

    #[test]
    fn test_mill_larger_than_every_hole_fails() {
        let params = HoleMillingParams {
            tool_diameter: 3.0,
            ..Default::default()
        };
        let err = mill_holes(&board(), &params, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CamError::OperationFailed(_)));
    }
}
