//! # pcbmill Visualizer
//!
//! Turns generated G-code back into tagged motion segments for plotting and
//! computes job statistics from them.

pub mod gcode;
pub mod stats;

pub use gcode::{gcode_parse, GcodeState, MoveKind, MoveSpeed, ParsedGcode, Segment};
pub use stats::{statistics, JobStatistics};
