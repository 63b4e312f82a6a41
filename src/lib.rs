//! # pcbmill
//!
//! PCB CAM toolkit: turns Gerber, Excellon and HPGL2 files into isolation,
//! clearing and drilling G-code.
//!
//! ## Architecture
//!
//! pcbmill is organized as a workspace with multiple crates:
//!
//! 1. **pcbmill-core** - Errors, units, cancellation and job outcomes
//! 2. **pcbmill-geometry** - Shapes, bounds, transforms, buffering and clipping
//! 3. **pcbmill-camtools** - File importers, clearing engine and G-code jobs
//! 4. **pcbmill-visualizer** - G-code reverse parser and job statistics
//! 5. **pcbmill-settings** - Configuration sections, overrides and persistence
//! 6. **pcbmill** - Command line binary that integrates all crates

pub mod cli;

pub use pcbmill_camtools::{
    excellon, gerber, hpgl2, isolate, mill_holes, paint, CncJob, ExcellonObject, GerberObject,
    Hpgl2Object, ToolEntry,
};
pub use pcbmill_core::{CamError, CamResult, CancellationToken, JobOutcome, Units};
pub use pcbmill_geometry::{Bounds, GeometryObject};
pub use pcbmill_settings::{Config, SettingsPersistence};
pub use pcbmill_visualizer::{gcode_parse, statistics, JobStatistics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output on stderr, leaving stdout for G-code
/// - RUST_LOG environment variable support
/// - `verbose` lowers the default level to DEBUG
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(verbose);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
