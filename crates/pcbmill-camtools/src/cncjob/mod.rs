//! G-code job generation.
//!
//! - [`postprocessor`]: controller dialects and the registry
//! - [`drill_order`]: visiting order for drill hits
//! - [`generator`]: milling and drilling jobs assembled from postprocessor output

pub mod drill_order;
pub mod generator;
pub mod postprocessor;

pub use drill_order::{order_points, tour_length, DrillOrder};
pub use generator::{
    generate_drill_job, generate_geometry_job, CncJob, DrillJobParams, ExclusionArea, JobSettings,
    JobTool,
};
pub use postprocessor::{names as postprocessor_names, postprocessor, PostContext, Postprocessor};
