//! Area clearing over a whole geometry source.

use super::pocket::{clear_polygon, clear_polygon2, clear_polygon3, PocketParams};
use crate::tool::{CutParameters, OperationType, ToolEntry};
use geo::{BoundingRect, MultiPolygon};
use pcbmill_core::{CamError, CamResult, CancellationToken};
use pcbmill_geometry::ops::{buffer, intersection, union_all};
use pcbmill_geometry::{GeometryObject, Shape};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaintMethod {
    /// Concentric shrinking.
    #[default]
    Standard,
    /// Growing circles from an interior point.
    Seed,
    /// Horizontal lines.
    Lines,
}

impl FromStr for PaintMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "seed" => Ok(Self::Seed),
            "lines" => Ok(Self::Lines),
            _ => Err(format!("unknown paint method '{}'", s)),
        }
    }
}

/// Which part of the source gets cleared.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PaintScope {
    #[default]
    All,
    /// Only where the source overlaps these polygons.
    Area(MultiPolygon<f64>),
    /// Only inside the bounding box of another object.
    Reference(GeometryObject),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaintParams {
    pub pocket: PocketParams,
    pub method: PaintMethod,
    /// Distance kept from the polygon outlines.
    pub margin: f64,
    pub scope: PaintScope,
    pub cut: CutParameters,
}

impl Default for PaintParams {
    fn default() -> Self {
        Self {
            pocket: PocketParams::default(),
            method: PaintMethod::Standard,
            margin: 0.0,
            scope: PaintScope::All,
            cut: CutParameters::default(),
        }
    }
}

fn scoped_region(source: &GeometryObject, scope: &PaintScope) -> CamResult<MultiPolygon<f64>> {
    let region = union_all(source.solid_polygons());
    Ok(match scope {
        PaintScope::All => region,
        PaintScope::Area(area) => intersection(&region, area),
        PaintScope::Reference(reference) => {
            let Some(rect) = reference.solid_polygons().bounding_rect() else {
                return Err(CamError::InvalidParameters(
                    "reference object has no area".to_string(),
                ));
            };
            intersection(&region, &MultiPolygon::new(vec![rect.to_polygon()]))
        }
    })
}

/// Clear every polygon of `source` inside `scope` with one method.
pub fn paint(
    source: &GeometryObject,
    params: &PaintParams,
    cancel: &CancellationToken,
) -> CamResult<ToolEntry> {
    let mut region = scoped_region(source, &params.scope)?;
    if params.margin > 0.0 {
        region = buffer(&region, -params.margin);
    }

    let mut solid = Vec::new();
    let mut skipped = 0;
    for polygon in &region.0 {
        cancel.check()?;
        let paths = match params.method {
            PaintMethod::Standard => clear_polygon(polygon, &params.pocket, cancel)?,
            PaintMethod::Seed => clear_polygon2(polygon, None, &params.pocket, cancel)?,
            PaintMethod::Lines => clear_polygon3(polygon, &params.pocket, cancel)?,
        };
        if paths.is_empty() {
            skipped += 1;
        }
        solid.extend(paths.into_iter().map(Shape::Path));
    }
    if skipped > 0 {
        debug!("Paint: {} polygons too small for the tool", skipped);
    }

    if solid.is_empty() {
        return Err(CamError::OperationFailed(format!(
            "no polygon could be painted with tool {:.4}",
            params.pocket.tool_diameter
        )));
    }
    info!(
        "Paint ({:?}): {} paths over {} polygons",
        params.method,
        solid.len(),
        region.0.len()
    );

    let mut tool = ToolEntry::new(params.pocket.tool_diameter).with_solid(solid);
    tool.operation = OperationType::Rough;
    tool.params = CutParameters {
        overlap: params.pocket.overlap,
        ..params.cut.clone()
    };
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use pcbmill_core::Units;

    fn two_squares() -> GeometryObject {
        GeometryObject::with_solid(
            Units::Mm,
            vec![
                Shape::Polygon(polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 5.0), (x: 0.0, y: 5.0)]),
                Shape::Polygon(polygon![(x: 10.0, y: 0.0), (x: 15.0, y: 0.0), (x: 15.0, y: 5.0), (x: 10.0, y: 5.0)]),
            ],
        )
    }

    fn params(method: PaintMethod) -> PaintParams {
        PaintParams {
            pocket: PocketParams {
                tool_diameter: 1.0,
                overlap: 0.2,
                contour: true,
                connect: true,
            },
            method,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_methods_paint_both_squares() {
        let cancel = CancellationToken::new();
        for method in [PaintMethod::Standard, PaintMethod::Seed, PaintMethod::Lines] {
            let tool = paint(&two_squares(), &params(method), &cancel).unwrap();
            let b = tool.bounds().unwrap();
            assert!(b.min_x >= 0.5 - 1e-6 && b.max_x <= 14.5 + 1e-6, "{:?}", method);
            assert!(tool.solid.len() >= 2);
        }
    }

    #[test]
    fn test_area_scope_limits_painting() {
        let mut p = params(PaintMethod::Lines);
        p.scope = PaintScope::Area(MultiPolygon::new(vec![
            polygon![(x: -1.0, y: -1.0), (x: 6.0, y: -1.0), (x: 6.0, y: 6.0), (x: -1.0, y: 6.0)],
        ]));
        let tool = paint(&two_squares(), &p, &CancellationToken::new()).unwrap();
        assert!(tool.bounds().unwrap().max_x <= 4.5 + 1e-6);
    }

    #[test]
    fn test_margin_too_large_fails() {
        let mut p = params(PaintMethod::Standard);
        p.margin = 2.2;
        let err = paint(&two_squares(), &p, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CamError::OperationFailed(_)));
    }
}
