//! Postprocessors: the text templates a job is assembled from.
//!
//! The job generator never writes G-code words itself. It updates a
//! [`PostContext`] and asks the selected [`Postprocessor`] for each piece of
//! output, so supporting another controller means adding one impl.

use crate::tool::SpindleDirection;
use pcbmill_core::{CamError, CamResult, Units};

/// Everything a template may refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct PostContext {
    pub units: Units,
    pub decimals: usize,
    /// 1-based tool number.
    pub tool: usize,
    pub tool_diameter: f64,
    pub x: f64,
    pub y: f64,
    pub prev_x: f64,
    pub prev_y: f64,
    pub z_cut: f64,
    pub z_move: f64,
    pub z_toolchange: f64,
    pub z_end: f64,
    pub z_start: Option<f64>,
    pub feedrate: f64,
    pub feedrate_z: f64,
    pub feedrate_rapid: f64,
    pub spindle_speed: Option<f64>,
    pub spindle_direction: SpindleDirection,
    /// Seconds.
    pub dwell: Option<f64>,
}

impl Default for PostContext {
    fn default() -> Self {
        Self {
            units: Units::Mm,
            decimals: 4,
            tool: 1,
            tool_diameter: 0.0,
            x: 0.0,
            y: 0.0,
            prev_x: 0.0,
            prev_y: 0.0,
            z_cut: -0.05,
            z_move: 2.0,
            z_toolchange: 15.0,
            z_end: 2.0,
            z_start: None,
            feedrate: 120.0,
            feedrate_z: 60.0,
            feedrate_rapid: 1500.0,
            spindle_speed: None,
            spindle_direction: SpindleDirection::Cw,
            dwell: None,
        }
    }
}

impl PostContext {
    /// Format a number with the job's decimals.
    pub fn num(&self, value: f64) -> String {
        let scale = 10f64.powi(self.decimals as i32);
        let rounded = (value * scale).round() / scale;
        // Avoid printing "-0.000".
        let rounded = if rounded == 0.0 { 0.0 } else { rounded };
        format!("{:.*}", self.decimals, rounded)
    }

    pub fn xy(&self) -> String {
        format!("X{} Y{}", self.num(self.x), self.num(self.y))
    }

    /// Move the current position, remembering the previous one.
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.prev_x = self.x;
        self.prev_y = self.y;
        self.x = x;
        self.y = y;
    }
}

fn generated_line(comment: &str) -> String {
    format!(
        "{} Generated: {}",
        comment,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

fn spindle_word(ctx: &PostContext) -> &'static str {
    match ctx.spindle_direction {
        SpindleDirection::Cw => "M03",
        SpindleDirection::Ccw => "M04",
    }
}

/// One G-code dialect. Every method returns zero or more lines without a
/// trailing newline; an empty string emits nothing.
pub trait Postprocessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn start_code(&self, ctx: &PostContext) -> String {
        [
            generated_line(";"),
            format!("; Units: {}", ctx.units),
            ctx.units.gcode().to_string(),
            "G90".to_string(),
            "G94".to_string(),
        ]
        .join("\n")
    }

    fn startz_code(&self, ctx: &PostContext) -> String {
        match ctx.z_start {
            Some(z) => format!("G00 Z{}", ctx.num(z)),
            None => String::new(),
        }
    }

    fn toolchange_code(&self, ctx: &PostContext) -> String {
        [
            "M05".to_string(),
            format!("G00 Z{}", ctx.num(ctx.z_toolchange)),
            format!("T{}", ctx.tool),
            "M06".to_string(),
            format!("; Tool diameter: {}", ctx.num(ctx.tool_diameter)),
            "M00".to_string(),
        ]
        .join("\n")
    }

    fn rapid_code(&self, ctx: &PostContext) -> String {
        format!("G00 {}", ctx.xy())
    }

    fn linear_code(&self, ctx: &PostContext) -> String {
        format!("G01 {}", ctx.xy())
    }

    fn down_code(&self, ctx: &PostContext) -> String {
        format!("G01 Z{}", ctx.num(ctx.z_cut))
    }

    fn up_code(&self, ctx: &PostContext) -> String {
        format!("G00 Z{}", ctx.num(ctx.z_move))
    }

    /// Retract after a drill hit.
    fn lift_code(&self, ctx: &PostContext) -> String {
        format!("G00 Z{}", ctx.num(ctx.z_move))
    }

    fn position_code(&self, ctx: &PostContext) -> String {
        ctx.xy()
    }

    fn spindle_code(&self, ctx: &PostContext) -> String {
        match ctx.spindle_speed {
            Some(speed) => format!("{} S{}", spindle_word(ctx), speed.round()),
            None => spindle_word(ctx).to_string(),
        }
    }

    fn spindle_stop_code(&self, _ctx: &PostContext) -> String {
        "M05".to_string()
    }

    fn dwell_code(&self, ctx: &PostContext) -> String {
        match ctx.dwell {
            Some(seconds) if seconds > 0.0 => format!("G04 P{}", ctx.num(seconds)),
            _ => String::new(),
        }
    }

    fn feedrate_code(&self, ctx: &PostContext) -> String {
        format!("G01 F{}", ctx.num(ctx.feedrate))
    }

    fn z_feedrate_code(&self, ctx: &PostContext) -> String {
        format!("G01 F{}", ctx.num(ctx.feedrate_z))
    }

    fn end_code(&self, ctx: &PostContext) -> String {
        [
            format!("G00 Z{}", ctx.num(ctx.z_end)),
            "G00 X0 Y0".to_string(),
            "M02".to_string(),
        ]
        .join("\n")
    }
}

/// Plain RS-274 output.
#[derive(Debug, Default)]
pub struct DefaultPost;

impl Postprocessor for DefaultPost {
    fn name(&self) -> &'static str {
        "default"
    }
}

/// GRBL 1.1: no M06, manual tool changes pause with a message.
#[derive(Debug, Default)]
pub struct Grbl11;

impl Postprocessor for Grbl11 {
    fn name(&self) -> &'static str {
        "grbl_11"
    }

    fn start_code(&self, ctx: &PostContext) -> String {
        [
            generated_line(";"),
            format!("; Units: {}", ctx.units),
            ctx.units.gcode().to_string(),
            "G90".to_string(),
            "G17".to_string(),
            "G94".to_string(),
        ]
        .join("\n")
    }

    fn toolchange_code(&self, ctx: &PostContext) -> String {
        [
            "M05".to_string(),
            format!("G00 Z{}", ctx.num(ctx.z_toolchange)),
            format!("(MSG, Change to tool T{} dia {})", ctx.tool, ctx.num(ctx.tool_diameter)),
            "M00".to_string(),
        ]
        .join("\n")
    }

    fn rapid_code(&self, ctx: &PostContext) -> String {
        format!("G0 {}", ctx.xy())
    }

    fn linear_code(&self, ctx: &PostContext) -> String {
        format!("G1 {}", ctx.xy())
    }

    fn down_code(&self, ctx: &PostContext) -> String {
        format!("G1 Z{}", ctx.num(ctx.z_cut))
    }

    fn up_code(&self, ctx: &PostContext) -> String {
        format!("G0 Z{}", ctx.num(ctx.z_move))
    }

    fn lift_code(&self, ctx: &PostContext) -> String {
        format!("G0 Z{}", ctx.num(ctx.z_move))
    }

    fn dwell_code(&self, ctx: &PostContext) -> String {
        match ctx.dwell {
            Some(seconds) if seconds > 0.0 => format!("G4 P{}", ctx.num(seconds)),
            _ => String::new(),
        }
    }

    fn feedrate_code(&self, ctx: &PostContext) -> String {
        format!("F{}", ctx.num(ctx.feedrate))
    }

    fn z_feedrate_code(&self, ctx: &PostContext) -> String {
        format!("F{}", ctx.num(ctx.feedrate_z))
    }

    fn end_code(&self, ctx: &PostContext) -> String {
        [
            format!("G0 Z{}", ctx.num(ctx.z_end)),
            "G0 X0 Y0".to_string(),
            "M2".to_string(),
        ]
        .join("\n")
    }
}

/// GRBL in laser mode: Z is ignored and the beam follows the cut state.
#[derive(Debug, Default)]
pub struct GrblLaser;

impl Postprocessor for GrblLaser {
    fn name(&self) -> &'static str {
        "grbl_laser"
    }

    fn start_code(&self, ctx: &PostContext) -> String {
        [
            generated_line(";"),
            format!("; Units: {}", ctx.units),
            ctx.units.gcode().to_string(),
            "G90".to_string(),
            "G94".to_string(),
        ]
        .join("\n")
    }

    fn startz_code(&self, _ctx: &PostContext) -> String {
        String::new()
    }

    fn toolchange_code(&self, _ctx: &PostContext) -> String {
        String::new()
    }

    fn rapid_code(&self, ctx: &PostContext) -> String {
        format!("G0 {}", ctx.xy())
    }

    fn linear_code(&self, ctx: &PostContext) -> String {
        format!("G1 {} F{}", ctx.xy(), ctx.num(ctx.feedrate))
    }

    fn down_code(&self, ctx: &PostContext) -> String {
        match ctx.spindle_speed {
            Some(power) => format!("M03 S{}", power.round()),
            None => "M03".to_string(),
        }
    }

    fn up_code(&self, _ctx: &PostContext) -> String {
        "M05".to_string()
    }

    fn lift_code(&self, _ctx: &PostContext) -> String {
        "M05".to_string()
    }

    fn spindle_code(&self, _ctx: &PostContext) -> String {
        String::new()
    }

    fn feedrate_code(&self, ctx: &PostContext) -> String {
        format!("F{}", ctx.num(ctx.feedrate))
    }

    fn z_feedrate_code(&self, _ctx: &PostContext) -> String {
        String::new()
    }

    fn end_code(&self, _ctx: &PostContext) -> String {
        ["M05".to_string(), "G0 X0 Y0".to_string(), "M2".to_string()].join("\n")
    }
}

/// Marlin: every move carries its own feed rate; dwell is in milliseconds.
#[derive(Debug, Default)]
pub struct Marlin;

impl Postprocessor for Marlin {
    fn name(&self) -> &'static str {
        "marlin"
    }

    fn toolchange_code(&self, ctx: &PostContext) -> String {
        [
            "M5".to_string(),
            format!("G0 Z{} F{}", ctx.num(ctx.z_toolchange), ctx.num(ctx.feedrate_rapid)),
            format!("M0 Change to tool T{} dia {}", ctx.tool, ctx.num(ctx.tool_diameter)),
        ]
        .join("\n")
    }

    fn rapid_code(&self, ctx: &PostContext) -> String {
        format!("G0 {} F{}", ctx.xy(), ctx.num(ctx.feedrate_rapid))
    }

    fn linear_code(&self, ctx: &PostContext) -> String {
        format!("G1 {} F{}", ctx.xy(), ctx.num(ctx.feedrate))
    }

    fn down_code(&self, ctx: &PostContext) -> String {
        format!("G1 Z{} F{}", ctx.num(ctx.z_cut), ctx.num(ctx.feedrate_z))
    }

    fn up_code(&self, ctx: &PostContext) -> String {
        format!("G0 Z{} F{}", ctx.num(ctx.z_move), ctx.num(ctx.feedrate_rapid))
    }

    fn lift_code(&self, ctx: &PostContext) -> String {
        self.up_code(ctx)
    }

    fn spindle_code(&self, ctx: &PostContext) -> String {
        let word = match ctx.spindle_direction {
            SpindleDirection::Cw => "M3",
            SpindleDirection::Ccw => "M4",
        };
        match ctx.spindle_speed {
            Some(speed) => format!("{} S{}", word, speed.round()),
            None => word.to_string(),
        }
    }

    fn spindle_stop_code(&self, _ctx: &PostContext) -> String {
        "M5".to_string()
    }

    fn dwell_code(&self, ctx: &PostContext) -> String {
        match ctx.dwell {
            Some(seconds) if seconds > 0.0 => format!("G4 P{}", (seconds * 1000.0).round()),
            _ => String::new(),
        }
    }

    // Feeds are carried by each move.
    fn feedrate_code(&self, _ctx: &PostContext) -> String {
        String::new()
    }

    fn z_feedrate_code(&self, _ctx: &PostContext) -> String {
        String::new()
    }

    fn end_code(&self, ctx: &PostContext) -> String {
        [
            format!("G0 Z{} F{}", ctx.num(ctx.z_end), ctx.num(ctx.feedrate_rapid)),
            "M84".to_string(),
        ]
        .join("\n")
    }
}

const NAMES: &[&str] = &["default", "grbl_11", "grbl_laser", "marlin"];

/// Names accepted by [`postprocessor`].
pub fn names() -> &'static [&'static str] {
    NAMES
}

/// Look up a built-in postprocessor by name.
pub fn postprocessor(name: &str) -> CamResult<Box<dyn Postprocessor>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "default" | "" => Ok(Box::new(DefaultPost)),
        "grbl_11" | "grbl" => Ok(Box::new(Grbl11)),
        "grbl_laser" => Ok(Box::new(GrblLaser)),
        "marlin" => Ok(Box::new(Marlin)),
        _ => Err(CamError::UnknownPostprocessor(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        for name in names() {
            assert_eq!(postprocessor(name).unwrap().name(), *name);
        }
        let err = postprocessor("fanuc").err().unwrap();
        assert!(matches!(err, CamError::UnknownPostprocessor(n) if n == "fanuc"));
    }

    #[test]
    fn test_number_formatting() {
        let mut ctx = PostContext {
            decimals: 3,
            ..Default::default()
        };
        ctx.move_to(1.23456, -0.0001);
        assert_eq!(DefaultPost.rapid_code(&ctx), "G00 X1.235 Y0.000");
        assert_eq!(ctx.prev_x, 0.0);
        ctx.z_cut = -0.1;
        assert_eq!(DefaultPost.down_code(&ctx), "G01 Z-0.100");
    }

    #[test]
    fn test_start_code_sets_units() {
        let ctx = PostContext {
            units: Units::In,
            ..Default::default()
        };
        let start = DefaultPost.start_code(&ctx);
        assert!(start.starts_with("; Generated: "));
        assert!(start.lines().any(|l| l == "G20"));
    }

    #[test]
    fn test_dialect_differences() {
        let ctx = PostContext {
            dwell: Some(0.5),
            spindle_speed: Some(10000.0),
            ..Default::default()
        };
        assert_eq!(Marlin.dwell_code(&ctx), "G4 P500");
        assert_eq!(DefaultPost.dwell_code(&ctx), "G04 P0.5000");
        assert_eq!(DefaultPost.spindle_code(&ctx), "M03 S10000");
        assert_eq!(GrblLaser.down_code(&ctx), "M03 S10000");
        assert!(GrblLaser.toolchange_code(&ctx).is_empty());
        assert!(Grbl11.toolchange_code(&ctx).contains("(MSG"));
    }
}
