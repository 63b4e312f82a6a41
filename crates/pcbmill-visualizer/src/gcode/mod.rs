//! G-code reverse parsing

pub mod parser;

pub use parser::{gcode_parse, GcodeState, MoveKind, MoveSpeed, ParsedGcode, Segment};
