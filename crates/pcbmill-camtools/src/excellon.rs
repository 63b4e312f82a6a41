//! Excellon drill file import.
//!
//! A line-oriented state machine: the `M48` header carries units, number
//! format and the tool table; the body selects tools and lists drill hits
//! and routed slots. Files without `M48` are accepted with default format and
//! inline tool definitions.

use crate::coords::{parse_coordinate, ZeroSuppression};
use geo::{AffineTransform, Coord, Point};
use pcbmill_core::{CamError, CamResult, CancellationToken, Units};
use pcbmill_geometry::ops::{circle, stadium, STEPS_PER_CIRCLE};
use pcbmill_geometry::{try_bounds, Bounds, ConvertUnits, GeometryObject, Shape, Transform};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ExcellonTool {
    pub diameter: f64,
    /// One circle per drill and one stadium per slot, built after parsing.
    pub solid: Vec<Shape>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrillHit {
    pub point: Coord<f64>,
    pub tool: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub start: Coord<f64>,
    pub stop: Coord<f64>,
    pub tool: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExcellonObject {
    pub units: Units,
    /// Tool table keyed by normalized id (`"01"`, `"02"`, ...).
    pub tools: BTreeMap<String, ExcellonTool>,
    pub drills: Vec<DrillHit>,
    pub slots: Vec<Slot>,
    pub warnings: Vec<String>,
}

impl ExcellonObject {
    pub fn drills_for<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = Coord<f64>> + 'a {
        self.drills
            .iter()
            .filter(move |d| d.tool == tool)
            .map(|d| d.point)
    }

    pub fn slots_for<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a Slot> + 'a {
        self.slots.iter().filter(move |s| s.tool == tool)
    }

    /// Rebuild every tool's solid store from the drills and slots.
    pub fn build_solid(&mut self) {
        for (id, tool) in self.tools.iter_mut() {
            let radius = tool.diameter / 2.0;
            let mut solid = Vec::new();
            for hit in self.drills.iter().filter(|d| &d.tool == id) {
                solid.push(if radius > 0.0 {
                    Shape::Polygon(circle(hit.point, radius, STEPS_PER_CIRCLE))
                } else {
                    Shape::Point(Point::from(hit.point))
                });
            }
            for slot in self.slots.iter().filter(|s| &s.tool == id) {
                if radius > 0.0 {
                    solid.push(Shape::Polygon(stadium(slot.start, slot.stop, radius, STEPS_PER_CIRCLE)));
                }
            }
            tool.solid = solid;
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        try_bounds(self.tools.values().flat_map(|t| t.solid.iter()))
    }

    /// All tool solids in one plain geometry object.
    pub fn to_geometry(&self) -> GeometryObject {
        GeometryObject::with_solid(
            self.units,
            self.tools.values().flat_map(|t| t.solid.iter().cloned()).collect(),
        )
    }
}

impl Transform for ExcellonObject {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        for hit in &mut self.drills {
            hit.point = transform.apply(hit.point);
        }
        for slot in &mut self.slots {
            slot.start = transform.apply(slot.start);
            slot.stop = transform.apply(slot.stop);
        }
        for tool in self.tools.values_mut() {
            tool.solid.affine(transform);
        }
    }

    fn scale_sizes(&mut self, factor: f64) {
        for tool in self.tools.values_mut() {
            tool.diameter *= factor;
        }
    }
}

impl ConvertUnits for ExcellonObject {
    fn units(&self) -> Units {
        self.units
    }

    fn set_units(&mut self, units: Units) {
        self.units = units;
    }
}

/// Normalize a tool number to at least two digits: `T1` and `T01` are `"01"`.
pub fn normalize_tool_id(raw: &str) -> Option<String> {
    raw.parse::<u32>().ok().map(|n| format!("{:02}", n))
}

fn tool_def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^T(\d+)(?:[FSBHZ][-+\d.]*)*C([\d.]+)").expect("static tool regex")
    })
}

fn tool_select_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^T(\d+)$").expect("static tool regex"))
}

fn coord_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:X([-+]?[\d.]+))?(?:Y([-+]?[\d.]+))?$").expect("static coordinate regex")
    })
}

fn repeat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^R(\d+)(?:X([-+]?[\d.]+))?(?:Y([-+]?[\d.]+))?$").expect("static repeat regex")
    })
}

fn units_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(METRIC|INCH)(?:,(LZ|TZ))?(?:,(0*)\.(0*))?").expect("static units regex")
    })
}

fn file_format_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FILE_FORMAT=(\d):(\d)").expect("static format regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Before `M48` or end of header.
    Preamble,
    Header,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMode {
    Drill,
    /// `G00` seen; the next `G01` closes a slot.
    Armed,
}

fn default_digits(units: Units) -> (u32, u32) {
    match units {
        Units::In => (2, 4),
        Units::Mm => (3, 3),
    }
}

struct ExcellonParser {
    obj: ExcellonObject,
    section: Section,
    saw_m48: bool,
    zeros: ZeroSuppression,
    int_digits: u32,
    frac_digits: u32,
    /// Digits came from the file rather than the unit default.
    explicit_format: bool,
    incremental: bool,
    tool: Option<String>,
    current: Coord<f64>,
    route: RouteMode,
    slot_start: Option<(Coord<f64>, String)>,
    last_drill: Option<Coord<f64>>,
}

impl ExcellonParser {
    fn new() -> Self {
        let (int_digits, frac_digits) = default_digits(Units::In);
        Self {
            obj: ExcellonObject {
                units: Units::In,
                ..Default::default()
            },
            section: Section::Preamble,
            saw_m48: false,
            zeros: ZeroSuppression::Trailing,
            int_digits,
            frac_digits,
            explicit_format: false,
            incremental: false,
            tool: None,
            current: Coord { x: 0.0, y: 0.0 },
            route: RouteMode::Drill,
            slot_start: None,
            last_drill: None,
        }
    }

    fn warn(&mut self, message: String) {
        warn!("Excellon: {}", message);
        self.obj.warnings.push(message);
    }

    fn run(mut self, text: &str, cancel: &CancellationToken) -> CamResult<ExcellonObject> {
        for raw in text.lines() {
            cancel.check()?;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix(';') {
                self.comment(comment);
                continue;
            }
            let line = line.to_ascii_uppercase();
            if !self.statement(&line) {
                break;
            }
        }
        self.finish()
    }

    fn comment(&mut self, comment: &str) {
        if let Some(caps) = file_format_regex().captures(comment) {
            self.int_digits = caps[1].parse().unwrap_or(self.int_digits);
            self.frac_digits = caps[2].parse().unwrap_or(self.frac_digits);
            self.explicit_format = true;
            debug!("Excellon: format {}:{} from comment", self.int_digits, self.frac_digits);
        }
    }

    /// Returns false at end of program.
    fn statement(&mut self, line: &str) -> bool {
        match line {
            "M48" => {
                self.section = Section::Header;
                self.saw_m48 = true;
                return true;
            }
            "%" | "M95" => {
                if !self.saw_m48 {
                    debug!("Excellon: end of header without M48, assuming defaults");
                }
                self.section = Section::Body;
                return true;
            }
            "M30" | "M00" => return false,
            "M71" => {
                self.set_units(Units::Mm);
                return true;
            }
            "M72" => {
                self.set_units(Units::In);
                return true;
            }
            "G90" => {
                self.incremental = false;
                return true;
            }
            "G91" => {
                self.incremental = true;
                return true;
            }
            "G05" | "G81" => {
                self.route = RouteMode::Drill;
                return true;
            }
            _ => {}
        }

        if let Some(caps) = units_regex().captures(line) {
            let units = if &caps[1] == "METRIC" { Units::Mm } else { Units::In };
            match caps.get(2).map(|m| m.as_str()) {
                Some("LZ") => self.zeros = ZeroSuppression::Trailing,
                Some("TZ") => self.zeros = ZeroSuppression::Leading,
                _ => {}
            }
            if let (Some(int), Some(frac)) = (caps.get(3), caps.get(4)) {
                self.int_digits = int.as_str().len() as u32;
                self.frac_digits = frac.as_str().len() as u32;
                self.explicit_format = true;
            }
            self.set_units(units);
            return true;
        }
        if let Some(rest) = line.strip_prefix("ICI") {
            self.incremental = rest != ",OFF";
            return true;
        }
        if line.starts_with("FMAT") {
            if line != "FMAT,2" {
                self.warn(format!("'{}' is not supported, assuming format 2", line));
            }
            return true;
        }

        if let Some(caps) = tool_def_regex().captures(line) {
            let Some(id) = normalize_tool_id(&caps[1]) else {
                return true;
            };
            match caps[2].parse::<f64>() {
                Ok(diameter) => self.define_tool(id, diameter),
                Err(_) => self.warn(format!("bad tool diameter in '{}'", line)),
            }
            return true;
        }

        if self.section == Section::Header {
            debug!("Excellon: header line '{}' ignored", line);
            return true;
        }

        if let Some(caps) = tool_select_regex().captures(line) {
            self.select_tool(&caps[1]);
            return true;
        }
        if let Some(caps) = repeat_regex().captures(line) {
            self.repeat(&caps);
            return true;
        }
        if let Some((first, second)) = line.split_once("G85") {
            if let (Some(start), Some(stop)) = (self.position(first), self.position(second)) {
                self.add_slot(start, stop);
            } else {
                self.warn(format!("malformed G85 slot '{}'", line));
            }
            return true;
        }
        if let Some(rest) = line.strip_prefix("G00") {
            self.route = RouteMode::Armed;
            if let Some(target) = self.position(rest) {
                self.current = target;
                self.slot_start = self.tool.clone().map(|t| (target, t));
            }
            return true;
        }
        if let Some(rest) = line.strip_prefix("G01") {
            match (self.position(rest), self.slot_start.take()) {
                (Some(stop), Some((start, tool))) if self.route == RouteMode::Armed => {
                    if self.tool.as_deref() == Some(tool.as_str()) {
                        self.add_slot(start, stop);
                    } else {
                        self.warn("routed slot changed tool mid-way, skipped".to_string());
                    }
                }
                _ => self.warn(format!("G01 without an armed G00 start: '{}'", line)),
            }
            self.route = RouteMode::Drill;
            return true;
        }
        if matches!(line, "M15" | "M16" | "M17") || line.starts_with("G4") {
            return true;
        }
        if line.starts_with('X') || line.starts_with('Y') {
            if let Some(point) = self.position(line) {
                self.drill(point);
            } else {
                self.warn(format!("malformed coordinate '{}', line skipped", line));
            }
            return true;
        }

        debug!("Excellon: ignoring '{}'", line);
        true
    }

    fn set_units(&mut self, units: Units) {
        if !self.explicit_format {
            let (int, frac) = default_digits(units);
            self.int_digits = int;
            self.frac_digits = frac;
        }
        if units == self.obj.units {
            return;
        }
        let factor = self.obj.units.factor_to(units);
        self.obj.affine(&AffineTransform::scale(
            factor,
            factor,
            Coord { x: 0.0, y: 0.0 },
        ));
        self.obj.scale_sizes(factor);
        self.current = self.current * factor;
        if let Some(last) = &mut self.last_drill {
            *last = *last * factor;
        }
        if let Some((start, _)) = &mut self.slot_start {
            *start = *start * factor;
        }
        self.obj.units = units;
    }

    fn define_tool(&mut self, id: String, diameter: f64) {
        if diameter == 0.0 {
            self.warn(format!("tool T{} has zero diameter", id));
        }
        debug!("Excellon: tool T{} = {}", id, diameter);
        self.obj.tools.insert(
            id,
            ExcellonTool {
                diameter,
                solid: Vec::new(),
            },
        );
    }

    fn select_tool(&mut self, raw: &str) {
        let Some(id) = normalize_tool_id(raw) else {
            return;
        };
        if id == "00" {
            self.tool = None;
            return;
        }
        if !self.obj.tools.contains_key(&id) {
            self.warn(format!("tool T{} selected but not defined", id));
        }
        self.tool = Some(id);
    }

    /// Decode an `X..Y..` pair; a missing axis keeps its modal value.
    fn position(&self, text: &str) -> Option<Coord<f64>> {
        let caps = coord_regex().captures(text.trim())?;
        let value = |i: usize| -> Option<Option<f64>> {
            match caps.get(i) {
                Some(m) => parse_coordinate(m.as_str(), self.int_digits, self.frac_digits, self.zeros)
                    .map(Some),
                None => Some(None),
            }
        };
        let (x, y) = (value(1)?, value(2)?);
        if x.is_none() && y.is_none() {
            return None;
        }
        Some(if self.incremental {
            Coord {
                x: self.current.x + x.unwrap_or(0.0),
                y: self.current.y + y.unwrap_or(0.0),
            }
        } else {
            Coord {
                x: x.unwrap_or(self.current.x),
                y: y.unwrap_or(self.current.y),
            }
        })
    }

    fn known_tool(&mut self, what: &str, at: Coord<f64>) -> Option<String> {
        match &self.tool {
            Some(id) if self.obj.tools.contains_key(id) => Some(id.clone()),
            Some(id) => {
                let message = format!("{} at ({}, {}) skipped: tool T{} is undefined", what, at.x, at.y, id);
                self.warn(message);
                None
            }
            None => {
                self.warn(format!("{} at ({}, {}) skipped: no tool selected", what, at.x, at.y));
                None
            }
        }
    }

    fn drill(&mut self, point: Coord<f64>) {
        self.current = point;
        self.last_drill = Some(point);
        if let Some(tool) = self.known_tool("drill", point) {
            self.obj.drills.push(DrillHit { point, tool });
        }
    }

    fn add_slot(&mut self, start: Coord<f64>, stop: Coord<f64>) {
        self.current = stop;
        if let Some(tool) = self.known_tool("slot", start) {
            self.obj.slots.push(Slot { start, stop, tool });
        }
    }

    fn repeat(&mut self, caps: &regex::Captures<'_>) {
        let count: usize = caps[1].parse().unwrap_or(0);
        let delta = |i: usize| {
            caps.get(i)
                .and_then(|m| parse_coordinate(m.as_str(), self.int_digits, self.frac_digits, self.zeros))
                .unwrap_or(0.0)
        };
        let (dx, dy) = (delta(2), delta(3));
        let Some(mut at) = self.last_drill else {
            self.warn("repeat code without a previous drill".to_string());
            return;
        };
        for _ in 0..count {
            at = Coord {
                x: at.x + dx,
                y: at.y + dy,
            };
            self.drill(at);
        }
    }

    fn finish(mut self) -> CamResult<ExcellonObject> {
        if self.slot_start.is_some() && self.route == RouteMode::Armed {
            debug!("Excellon: dangling G00 slot start ignored");
        }
        if self.obj.drills.is_empty() && self.obj.slots.is_empty() {
            return Err(CamError::parse_failed("Excellon", "no drills or slots found"));
        }
        self.obj.build_solid();
        debug!(
            "Excellon: {} tools, {} drills, {} slots",
            self.obj.tools.len(),
            self.obj.drills.len(),
            self.obj.slots.len()
        );
        Ok(self.obj)
    }
}

/// Parse Excellon text.
pub fn parse(text: &str, cancel: &CancellationToken) -> CamResult<ExcellonObject> {
    ExcellonParser::new().run(text, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> ExcellonObject {
        parse(text, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_three_drills_two_tools() {
        let obj = parse_ok(
            "M48\nINCH,LZ\nT01C0.0135\nT02C0.0200\n%\nT01\nX010000Y010000\nX020000Y010000\nX030000Y010000\nM30\n",
        );
        assert_eq!(obj.units, Units::In);
        assert_eq!(obj.tools["01"].solid.len(), 3);
        assert!(obj.tools["02"].solid.is_empty());
        assert_eq!(obj.tools["01"].diameter, 0.0135);
        let b = obj.bounds().unwrap();
        assert!((b.min_x - (1.0 - 0.00675)).abs() < 1e-6);
        assert!((b.max_x - (3.0 + 0.00675)).abs() < 1e-6);
    }

    #[test]
    fn test_tool_ids_are_normalized() {
        assert_eq!(normalize_tool_id("1").as_deref(), Some("01"));
        assert_eq!(normalize_tool_id("01").as_deref(), Some("01"));
        assert_eq!(normalize_tool_id("100").as_deref(), Some("100"));
        let obj = parse_ok("M48\nMETRIC\nT1C0.8\n%\nT01\nX1.0Y2.0\nM30\n");
        assert_eq!(obj.drills_for("01").count(), 1);
    }

    #[test]
    fn test_headerless_file_with_inline_tools() {
        let obj = parse_ok("%\nT3C0.6\nT3\nX1.5Y1.5\nY2.5\n");
        assert_eq!(obj.drills.len(), 2);
        assert_eq!(obj.drills[1].point, Coord { x: 1.5, y: 2.5 });
    }

    #[test]
    fn test_unknown_tool_is_skipped_with_warning() {
        let obj = parse_ok("M48\nMETRIC\nT1C0.8\n%\nT2\nX1.0Y1.0\nT1\nX2.0Y2.0\nM30\n");
        assert_eq!(obj.drills.len(), 1);
        assert!(obj.warnings.iter().any(|w| w.contains("T02")));
    }

    #[test]
    fn test_zero_diameter_kept() {
        let obj = parse_ok("M48\nMETRIC\nT1C0.0\n%\nT1\nX1.0Y1.0\nM30\n");
        assert_eq!(obj.tools["01"].diameter, 0.0);
        assert!(matches!(obj.tools["01"].solid[0], Shape::Point(_)));
    }

    #[test]
    fn test_repeat_code() {
        let obj = parse_ok("M48\nMETRIC\nT1C1.0\n%\nT1\nX0.0Y0.0\nR3X2.0\nM30\n");
        let xs: Vec<f64> = obj.drills.iter().map(|d| d.point.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_routed_and_g85_slots() {
        let obj = parse_ok(
            "M48\nMETRIC\nT1C1.0\n%\nT1\nG00X0.0Y0.0\nM15\nG01X5.0Y0.0\nM16\nG05\nX0.0Y5.0G85X5.0Y5.0\nM30\n",
        );
        assert_eq!(obj.slots.len(), 2);
        assert_eq!(obj.slots[1].start, Coord { x: 0.0, y: 5.0 });
        assert_eq!(obj.tools["01"].solid.len(), 2);
    }

    #[test]
    fn test_inline_unit_change_converts_existing() {
        let obj = parse_ok("M48\nINCH\nT1C0.1\n%\nT1\nX1.0Y1.0\nM71\nX25.4Y0.0\nM30\n");
        assert_eq!(obj.units, Units::Mm);
        assert!((obj.tools["01"].diameter - 2.54).abs() < 1e-9);
        assert!((obj.drills[0].point.x - 25.4).abs() < 1e-9);
        assert!((obj.drills[1].point.x - 25.4).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_zero_format_from_header() {
        let obj = parse_ok("M48\nMETRIC,TZ,000.000\nT1C1.0\n%\nT1\nX1500Y-250\nM30\n");
        assert!((obj.drills[0].point.x - 1.5).abs() < 1e-9);
        assert!((obj.drills[0].point.y + 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_file_format_comment_and_incremental() {
        let obj = parse_ok(";FILE_FORMAT=3:3\nM48\nMETRIC,LZ\nT1C1.0\n%\nT1\nICI,ON\nX001000Y001000\nX001000\nM30\n");
        assert_eq!(obj.drills[1].point, Coord { x: 2.0, y: 1.0 });
    }

    #[test]
    fn test_empty_file_fails() {
        let err = parse("M48\nMETRIC\nT1C1.0\n%\nM30\n", &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CamError::ParseFailed { .. }));
    }
}
