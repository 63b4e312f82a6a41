//! Toolpath derivation from copper geometry.
//!
//! - [`isolation`]: offset contours around copper, optionally in several passes
//! - [`pocket`]: the three area-clearing strategies for a single polygon
//! - [`connect`]: joining clearing fragments to reduce tool lifts
//! - [`paint`]: applying a clearing strategy to every polygon of a source
//! - [`holes`]: milling drill holes larger than the available tool

pub mod connect;
pub mod holes;
pub mod isolation;
pub mod paint;
pub mod pocket;

pub use connect::{paint_connect, path_connect, DEFAULT_MAX_WALK_FACTOR};
pub use holes::{mill_holes, HoleMillingParams};
pub use isolation::{isolate, isolation_geometry, IsolationParams, IsolationSide};
pub use paint::{paint, PaintMethod, PaintParams, PaintScope};
pub use pocket::{clear_polygon, clear_polygon2, clear_polygon3, PocketParams};

use geo::{LineString, MultiPolygon};
use pcbmill_core::{CamError, CamResult};

/// Validate a tool diameter and overlap and return the stepover.
pub(crate) fn stepover(tool_diameter: f64, overlap: f64) -> CamResult<f64> {
    if !(tool_diameter > 0.0) || !tool_diameter.is_finite() {
        return Err(CamError::InvalidParameters(format!(
            "tool diameter must be positive, got {}",
            tool_diameter
        )));
    }
    if !(0.0..1.0).contains(&overlap) {
        return Err(CamError::InvalidParameters(format!(
            "overlap must be in [0, 1), got {}",
            overlap
        )));
    }
    Ok(tool_diameter * (1.0 - overlap))
}

/// Every ring of `region` as a closed path.
pub(crate) fn rings(region: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    region
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior().clone()).chain(p.interiors().iter().cloned()))
        .collect()
}
