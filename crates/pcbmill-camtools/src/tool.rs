//! Tool table entries shared by clearing results and job generation.

use geo::AffineTransform;
use pcbmill_core::DiameterKey;
use pcbmill_geometry::{try_bounds, Bounds, Shape, Transform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the tool center runs relative to the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// On the path.
    #[default]
    Path,
    /// Inside closed shapes by the tool radius.
    In,
    /// Outside closed shapes by the tool radius.
    Out,
    /// A user distance, positive outwards.
    Custom(f64),
}

impl OffsetMode {
    /// Signed offset applied to closed shapes for a tool of `diameter`.
    pub fn distance(&self, diameter: f64) -> f64 {
        match self {
            OffsetMode::Path => 0.0,
            OffsetMode::In => -diameter / 2.0,
            OffsetMode::Out => diameter / 2.0,
            OffsetMode::Custom(d) => *d,
        }
    }
}

impl FromStr for OffsetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => other
                .strip_prefix("custom:")
                .and_then(|v| v.parse().ok())
                .map(Self::Custom)
                .ok_or_else(|| format!("unknown offset mode '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    #[default]
    Rough,
    Finish,
    Iso,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolShape {
    /// Flat end mill with one to four flutes.
    #[default]
    C1,
    C2,
    C3,
    C4,
    Ball,
    V { tip_diameter: f64, tip_angle: f64 },
}

impl ToolShape {
    /// Effective cutting width of a V bit at `depth` below the surface.
    pub fn effective_diameter(&self, nominal: f64, depth: f64) -> f64 {
        match self {
            ToolShape::V {
                tip_diameter,
                tip_angle,
            } => tip_diameter + 2.0 * depth.abs() * (tip_angle.to_radians() / 2.0).tan(),
            _ => nominal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MillingDirection {
    #[default]
    Climb,
    Conventional,
}

impl FromStr for MillingDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "climb" | "cl" => Ok(Self::Climb),
            "conventional" | "cv" => Ok(Self::Conventional),
            _ => Err(format!("unknown milling direction '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpindleDirection {
    #[default]
    Cw,
    Ccw,
}

/// Cutting parameters carried by each tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutParameters {
    /// Final cut depth (negative below the surface).
    pub cut_z: f64,
    /// Safe travel height.
    pub travel_z: f64,
    /// XY feedrate.
    pub feedrate: f64,
    /// Plunge feedrate.
    pub feedrate_z: f64,
    /// Rapid feedrate for postprocessors without G0 (e.g. Marlin).
    pub feedrate_rapid: f64,
    pub spindle_speed: Option<f64>,
    pub spindle_direction: SpindleDirection,
    /// Dwell after spindle start, in seconds.
    pub dwell: Option<f64>,
    pub multidepth: bool,
    pub depth_per_cut: f64,
    /// Clearing overlap, as a fraction of the tool diameter.
    pub overlap: f64,
    pub milling_direction: MillingDirection,
    /// Re-cut the start of closed paths to remove the entry mark.
    pub extra_cut: bool,
    pub extra_cut_length: f64,
}

impl Default for CutParameters {
    fn default() -> Self {
        Self {
            cut_z: -0.05,
            travel_z: 2.0,
            feedrate: 120.0,
            feedrate_z: 60.0,
            feedrate_rapid: 1500.0,
            spindle_speed: None,
            spindle_direction: SpindleDirection::Cw,
            dwell: None,
            multidepth: false,
            depth_per_cut: 0.1,
            overlap: 0.1,
            milling_direction: MillingDirection::Climb,
            extra_cut: false,
            extra_cut_length: 0.1,
        }
    }
}

impl CutParameters {
    /// Z levels to cut at, shallowest first, always ending at `cut_z`.
    pub fn depth_passes(&self) -> Vec<f64> {
        if !self.multidepth || self.depth_per_cut <= 0.0 || self.cut_z >= 0.0 {
            return vec![self.cut_z];
        }
        let step = self.depth_per_cut.abs();
        let mut passes = Vec::new();
        let mut z = 0.0;
        while z - step > self.cut_z + 1e-9 {
            z -= step;
            passes.push(z);
        }
        passes.push(self.cut_z);
        passes
    }
}

/// One row of a tool table: a tool, how it cuts, and the paths it cuts.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEntry {
    pub diameter: f64,
    pub offset: OffsetMode,
    pub operation: OperationType,
    pub shape: ToolShape,
    pub params: CutParameters,
    pub solid: Vec<Shape>,
}

impl ToolEntry {
    pub fn new(diameter: f64) -> Self {
        Self {
            diameter,
            offset: OffsetMode::Path,
            operation: OperationType::Rough,
            shape: ToolShape::C1,
            params: CutParameters::default(),
            solid: Vec::new(),
        }
    }

    pub fn with_solid(mut self, solid: Vec<Shape>) -> Self {
        self.solid = solid;
        self
    }

    pub fn key(&self) -> DiameterKey {
        DiameterKey::new(self.diameter)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        try_bounds(self.solid.iter())
    }
}

impl Transform for ToolEntry {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        self.solid.affine(transform);
    }

    fn scale_sizes(&mut self, factor: f64) {
        self.diameter *= factor;
        if let OffsetMode::Custom(d) = &mut self.offset {
            *d *= factor;
        }
        if let ToolShape::V { tip_diameter, .. } = &mut self.shape {
            *tip_diameter *= factor;
        }
        let p = &mut self.params;
        p.cut_z *= factor;
        p.travel_z *= factor;
        p.depth_per_cut *= factor;
        p.extra_cut_length *= factor;
        p.feedrate *= factor;
        p.feedrate_z *= factor;
        p.feedrate_rapid *= factor;
    }
}

impl fmt::Display for ToolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {:?}", self.key(), self.operation, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_passes() {
        let mut p = CutParameters {
            cut_z: -0.25,
            multidepth: true,
            depth_per_cut: 0.1,
            ..Default::default()
        };
        let passes = p.depth_passes();
        assert_eq!(passes.len(), 3);
        assert!((passes[0] + 0.1).abs() < 1e-9);
        assert!((passes[1] + 0.2).abs() < 1e-9);
        assert_eq!(passes[2], -0.25);

        p.cut_z = -0.2;
        assert_eq!(p.depth_passes().len(), 2);

        p.multidepth = false;
        assert_eq!(p.depth_passes(), vec![-0.2]);
    }

    #[test]
    fn test_offset_modes() {
        assert_eq!(OffsetMode::In.distance(0.4), -0.2);
        assert_eq!(OffsetMode::Out.distance(0.4), 0.2);
        assert_eq!("custom:0.3".parse::<OffsetMode>().unwrap(), OffsetMode::Custom(0.3));
        assert!("sideways".parse::<OffsetMode>().is_err());
    }

    #[test]
    fn test_v_bit_width() {
        let v = ToolShape::V {
            tip_diameter: 0.1,
            tip_angle: 90.0,
        };
        assert!((v.effective_diameter(1.0, -0.1) - 0.3).abs() < 1e-9);
        assert_eq!(ToolShape::C1.effective_diameter(1.0, -0.1), 1.0);
    }

    #[test]
    fn test_unit_scaling_reaches_params() {
        let mut tool = ToolEntry::new(0.01);
        tool.params.cut_z = -0.002;
        tool.scale_sizes(25.4);
        assert!((tool.diameter - 0.254).abs() < 1e-12);
        assert!((tool.params.cut_z + 0.0508).abs() < 1e-12);
    }
}
