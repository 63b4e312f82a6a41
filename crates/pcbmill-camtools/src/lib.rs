//! # pcbmill CAM Tools
//!
//! File import, toolpath derivation and G-code generation for PCB milling.
//!
//! ## Importers
//!
//! - **Gerber**: RS-274X copper layers, including aperture macros, regions and step-and-repeat
//! - **Excellon**: drill files with tool tables, drill hits and routed slots
//! - **HPGL2**: plotter pen strokes
//!
//! ## Clearing
//!
//! - **Isolation**: offset contours around copper, multi-pass, climb or conventional
//! - **Pocketing**: concentric, seed and line clearing of single polygons
//! - **Paint**: area clearing over a whole object, scoped and with a margin
//! - **Hole milling**: holes and slots larger than the tool
//!
//! ## Jobs
//!
//! - **Postprocessors**: `default`, `grbl_11`, `grbl_laser` and `marlin`
//! - **Drill ordering**: nearest neighbor and local-search tours
//! - **Generator**: multi-depth cuts, peck drilling, exclusion areas

pub mod clearing;
pub mod cncjob;
pub mod coords;
pub mod excellon;
pub mod gerber;
pub mod hpgl2;
pub mod tool;

// Re-export commonly used items
pub use clearing::{
    clear_polygon, clear_polygon2, clear_polygon3, isolate, isolation_geometry, mill_holes, paint,
    paint_connect, path_connect, HoleMillingParams, IsolationParams, IsolationSide, PaintMethod,
    PaintParams, PaintScope, PocketParams,
};
pub use cncjob::{
    generate_drill_job, generate_geometry_job, postprocessor, CncJob, DrillJobParams, DrillOrder,
    ExclusionArea, JobSettings, Postprocessor,
};
pub use excellon::ExcellonObject;
pub use gerber::{GerberObject, GerberOptions};
pub use hpgl2::Hpgl2Object;
pub use tool::{
    CutParameters, MillingDirection, OffsetMode, OperationType, SpindleDirection, ToolEntry,
    ToolShape,
};
