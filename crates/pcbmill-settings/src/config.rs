//! Application configuration.
//!
//! One serde section per pipeline stage. Every section has sensible defaults,
//! so a config file only needs the values it changes.

use crate::error::{Result, SettingsError};
use pcbmill_camtools::cncjob::{ExclusionArea, JobSettings};
use pcbmill_camtools::{
    CutParameters, DrillJobParams, DrillOrder, GerberOptions, HoleMillingParams, IsolationParams,
    IsolationSide, MillingDirection, OffsetMode, PaintMethod, PaintParams, PocketParams,
    SpindleDirection,
};
use pcbmill_core::Units;
use pcbmill_geometry::Polygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Gerber import tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GerberSettings {
    /// Segments per full circle
    pub steps_per_circle: usize,
    /// Polygon count above which the final merge uses grow/shrink
    pub merge_threshold: usize,
    pub merge_tolerance: f64,
}

impl Default for GerberSettings {
    fn default() -> Self {
        let options = GerberOptions::default();
        Self {
            steps_per_circle: options.steps_per_circle,
            merge_threshold: options.merge_threshold,
            merge_tolerance: options.merge_tolerance,
        }
    }
}

impl GerberSettings {
    pub fn to_options(&self) -> GerberOptions {
        GerberOptions {
            steps_per_circle: self.steps_per_circle,
            merge_threshold: self.merge_threshold,
            merge_tolerance: self.merge_tolerance,
        }
    }
}

/// Drilling and hole milling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcellonSettings {
    pub cut_z: f64,
    pub travel_z: f64,
    pub feedrate_z: f64,
    pub spindle_speed: Option<f64>,
    /// Dwell at the bottom of each hole, seconds
    pub dwell: Option<f64>,
    /// Peck drilling
    pub multidepth: bool,
    pub depth_per_cut: f64,
    pub mill_slots: bool,
    /// End mill used for holes larger than any drill
    pub milling_tool: f64,
    /// Tool ids to process; empty means all
    pub selection: Vec<String>,
    pub drill_order: DrillOrder,
}

impl Default for ExcellonSettings {
    fn default() -> Self {
        Self {
            cut_z: -1.7,
            travel_z: 2.0,
            feedrate_z: 300.0,
            spindle_speed: None,
            dwell: None,
            multidepth: false,
            depth_per_cut: 0.6,
            mill_slots: true,
            milling_tool: 1.0,
            selection: Vec::new(),
            drill_order: DrillOrder::NearestNeighbor,
        }
    }
}

/// Copper isolation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationSettings {
    /// One isolation run per diameter, smallest first
    pub tooldia: Vec<f64>,
    pub passes: usize,
    pub overlap: f64,
    pub milling_direction: MillingDirection,
    pub side: IsolationSide,
    pub follow: bool,
}

impl Default for IsolationSettings {
    fn default() -> Self {
        Self {
            tooldia: vec![0.1],
            passes: 1,
            overlap: 0.1,
            milling_direction: MillingDirection::Climb,
            side: IsolationSide::Both,
            follow: false,
        }
    }
}

/// Which part of a source is painted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaintSelection {
    #[default]
    All,
    /// The rectangle in [`PaintSettings::area`]
    Area,
    /// The bounding box of a second file
    Reference,
}

impl FromStr for PaintSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "area" => Ok(Self::Area),
            "reference" | "ref" => Ok(Self::Reference),
            _ => Err(format!("unknown selection '{}'", s)),
        }
    }
}

/// Area clearing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaintSettings {
    pub tooldia: Vec<f64>,
    pub overlap: f64,
    pub margin: f64,
    pub method: PaintMethod,
    pub contour: bool,
    pub connect: bool,
    pub selection: PaintSelection,
    /// `[min_x, min_y, max_x, max_y]` for [`PaintSelection::Area`]
    pub area: Option<[f64; 4]>,
}

impl Default for PaintSettings {
    fn default() -> Self {
        Self {
            tooldia: vec![0.8],
            overlap: 0.15,
            margin: 0.0,
            method: PaintMethod::Standard,
            contour: true,
            connect: true,
            selection: PaintSelection::All,
            area: None,
        }
    }
}

/// Rectangle travel moves must clear
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub z: f64,
}

impl ExclusionRect {
    pub fn to_area(&self) -> ExclusionArea {
        ExclusionArea {
            polygon: Polygon::new(
                vec![
                    (self.min_x, self.min_y),
                    (self.max_x, self.min_y),
                    (self.max_x, self.max_y),
                    (self.min_x, self.max_y),
                    (self.min_x, self.min_y),
                ]
                .into(),
                vec![],
            ),
            z: self.z,
        }
    }
}

/// Job generation and cutting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CncJobSettings {
    pub units: Units,
    pub postprocessor: String,
    pub decimals: usize,
    pub cut_z: f64,
    pub travel_z: f64,
    pub feedrate: f64,
    pub feedrate_z: f64,
    pub feedrate_rapid: f64,
    pub spindle_speed: Option<f64>,
    pub spindle_direction: SpindleDirection,
    pub dwell: Option<f64>,
    pub multidepth: bool,
    pub depth_per_cut: f64,
    pub extra_cut: bool,
    pub extra_cut_length: f64,
    pub toolchange: bool,
    pub toolchange_z: f64,
    pub end_z: f64,
    pub start_z: Option<f64>,
    pub offset_mode: OffsetMode,
    pub exclusion_areas: Vec<ExclusionRect>,
}

impl Default for CncJobSettings {
    fn default() -> Self {
        let cut = CutParameters::default();
        let job = JobSettings::default();
        Self {
            units: job.units,
            postprocessor: job.postprocessor,
            decimals: job.decimals,
            cut_z: cut.cut_z,
            travel_z: cut.travel_z,
            feedrate: cut.feedrate,
            feedrate_z: cut.feedrate_z,
            feedrate_rapid: cut.feedrate_rapid,
            spindle_speed: cut.spindle_speed,
            spindle_direction: cut.spindle_direction,
            dwell: cut.dwell,
            multidepth: cut.multidepth,
            depth_per_cut: cut.depth_per_cut,
            extra_cut: cut.extra_cut,
            extra_cut_length: cut.extra_cut_length,
            toolchange: job.toolchange,
            toolchange_z: job.toolchange_z,
            end_z: job.end_z,
            start_z: job.start_z,
            offset_mode: OffsetMode::Path,
            exclusion_areas: Vec::new(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gerber: GerberSettings,
    pub excellon: ExcellonSettings,
    pub isolation: IsolationSettings,
    pub paint: PaintSettings,
    pub cncjob: CncJobSettings,
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| SettingsError::invalid(key, e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SettingsError::invalid(key, format!("'{}' is not a boolean", other))),
    }
}

fn parse_optional(key: &str, value: &str) -> Result<Option<f64>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        _ => parse_value(key, value).map(Some),
    }
}

/// `0.1, 0.2` or `[0.1, 0.2]`.
fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

/// `x0,y0,x1,y1,z; x0,y0,x1,y1,z`.
fn parse_exclusions(key: &str, value: &str) -> Result<Vec<ExclusionRect>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|area| {
            let v: Vec<f64> = parse_list(key, area)?;
            match v.as_slice() {
                [x0, y0, x1, y1, z] => Ok(ExclusionRect {
                    min_x: x0.min(*x1),
                    min_y: y0.min(*y1),
                    max_x: x0.max(*x1),
                    max_y: y0.max(*y1),
                    z: *z,
                }),
                _ => Err(SettingsError::invalid(key, "expected x0,y0,x1,y1,z")),
            }
        })
        .collect()
}

fn parse_drill_order(key: &str, value: &str) -> Result<DrillOrder> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "nearest" | "nearest_neighbor" | "greedy" => Ok(DrillOrder::NearestNeighbor),
        "basic" | "2opt" => Ok(DrillOrder::Basic),
        other => {
            let secs = other
                .strip_prefix("metaheuristic")
                .map(|rest| rest.trim_start_matches(':'))
                .ok_or_else(|| SettingsError::invalid(key, format!("unknown drill order '{}'", other)))?;
            let secs: f64 = if secs.is_empty() { 10.0 } else { parse_value(key, secs)? };
            Ok(DrillOrder::Metaheuristic {
                time_limit: Duration::from_secs_f64(secs.max(0.0)),
            })
        }
    }
}

const SECTIONS: &[&str] = &["gerber", "excellon", "isolation", "paint", "cncjob"];

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match extension(path)?.as_str() {
            "json" => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = match extension(path)?.as_str() {
            "json" => serde_json::to_string_pretty(self)?,
            _ => toml::to_string_pretty(self)?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let overlap = |key: &str, v: f64| {
            if (0.0..1.0).contains(&v) {
                Ok(())
            } else {
                Err(SettingsError::invalid(key, format!("{} is not in [0, 1)", v)))
            }
        };
        let diameters = |key: &str, list: &[f64]| {
            if list.iter().all(|d| *d > 0.0) {
                Ok(())
            } else {
                Err(SettingsError::invalid(key, "tool diameters must be > 0"))
            }
        };

        if self.gerber.steps_per_circle < 4 {
            return Err(SettingsError::invalid("gerber.steps_per_circle", "must be >= 4"));
        }
        overlap("isolation.overlap", self.isolation.overlap)?;
        overlap("paint.overlap", self.paint.overlap)?;
        diameters("isolation.tooldia", &self.isolation.tooldia)?;
        diameters("paint.tooldia", &self.paint.tooldia)?;
        if self.isolation.passes == 0 {
            return Err(SettingsError::invalid("isolation.passes", "must be > 0"));
        }
        if self.paint.margin < 0.0 {
            return Err(SettingsError::invalid("paint.margin", "must be >= 0"));
        }
        if self.cncjob.travel_z <= self.cncjob.cut_z {
            return Err(SettingsError::invalid("cncjob.travel_z", "must be above cut_z"));
        }
        if self.cncjob.feedrate <= 0.0 || self.cncjob.feedrate_z <= 0.0 {
            return Err(SettingsError::invalid("cncjob.feedrate", "feed rates must be > 0"));
        }
        if self.cncjob.multidepth && self.cncjob.depth_per_cut <= 0.0 {
            return Err(SettingsError::invalid("cncjob.depth_per_cut", "must be > 0"));
        }
        if self.excellon.milling_tool <= 0.0 {
            return Err(SettingsError::invalid("excellon.milling_tool", "must be > 0"));
        }
        Ok(())
    }

    /// Overlay flat `key = value` pairs. Keys are either qualified
    /// (`paint.overlap`) or bare (`overlap`), in which case every section
    /// with that key is updated.
    pub fn apply_flat(&mut self, values: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in values {
            let matched = match key.split_once('.') {
                Some((section, name)) => self.set(section, name, value)?,
                None => {
                    let mut any = false;
                    for section in SECTIONS {
                        any |= self.set(section, key, value)?;
                    }
                    any
                }
            };
            if !matched {
                return Err(SettingsError::UnknownKey(key.clone()));
            }
            debug!("Setting {} = {}", key, value);
        }
        self.validate()
    }

    /// Set one value; false when the section has no such key.
    fn set(&mut self, section: &str, name: &str, value: &str) -> Result<bool> {
        let key = format!("{}.{}", section, name);
        let k = key.as_str();
        match (section, name) {
            ("gerber", "steps_per_circle") => self.gerber.steps_per_circle = parse_value(k, value)?,
            ("gerber", "merge_threshold") => self.gerber.merge_threshold = parse_value(k, value)?,
            ("gerber", "merge_tolerance") => self.gerber.merge_tolerance = parse_value(k, value)?,

            ("excellon", "cut_z") => self.excellon.cut_z = parse_value(k, value)?,
            ("excellon", "travel_z") => self.excellon.travel_z = parse_value(k, value)?,
            ("excellon", "feedrate_z") => self.excellon.feedrate_z = parse_value(k, value)?,
            ("excellon", "spindle_speed") => self.excellon.spindle_speed = parse_optional(k, value)?,
            ("excellon", "dwell") => self.excellon.dwell = parse_optional(k, value)?,
            ("excellon", "multidepth") => self.excellon.multidepth = parse_bool(k, value)?,
            ("excellon", "depth_per_cut") => self.excellon.depth_per_cut = parse_value(k, value)?,
            ("excellon", "mill_slots") => self.excellon.mill_slots = parse_bool(k, value)?,
            ("excellon", "milling_tool") => self.excellon.milling_tool = parse_value(k, value)?,
            ("excellon", "selection") => self.excellon.selection = parse_list(k, value)?,
            ("excellon", "drill_order") => self.excellon.drill_order = parse_drill_order(k, value)?,

            ("isolation", "tooldia") => self.isolation.tooldia = parse_list(k, value)?,
            ("isolation", "passes") => self.isolation.passes = parse_value(k, value)?,
            ("isolation", "overlap") => self.isolation.overlap = parse_value(k, value)?,
            ("isolation", "milling_direction") => {
                self.isolation.milling_direction = parse_value(k, value)?
            }
            ("isolation", "side") => self.isolation.side = parse_value(k, value)?,
            ("isolation", "follow") => self.isolation.follow = parse_bool(k, value)?,

            ("paint", "tooldia") => self.paint.tooldia = parse_list(k, value)?,
            ("paint", "overlap") => self.paint.overlap = parse_value(k, value)?,
            ("paint", "margin") => self.paint.margin = parse_value(k, value)?,
            ("paint", "method") => self.paint.method = parse_value(k, value)?,
            ("paint", "contour") => self.paint.contour = parse_bool(k, value)?,
            ("paint", "connect") => self.paint.connect = parse_bool(k, value)?,
            ("paint", "selection") => self.paint.selection = parse_value(k, value)?,
            ("paint", "area") => {
                let v: Vec<f64> = parse_list(k, value)?;
                let [x0, y0, x1, y1] = v[..] else {
                    return Err(SettingsError::invalid(k, "expected x0,y0,x1,y1"));
                };
                self.paint.area = Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]);
            }

            ("cncjob", "units") => self.cncjob.units = parse_value(k, value)?,
            ("cncjob", "postprocessor") => self.cncjob.postprocessor = value.trim().to_string(),
            ("cncjob", "decimals") => self.cncjob.decimals = parse_value(k, value)?,
            ("cncjob", "cut_z") => self.cncjob.cut_z = parse_value(k, value)?,
            ("cncjob", "travel_z") => self.cncjob.travel_z = parse_value(k, value)?,
            ("cncjob", "feedrate") => self.cncjob.feedrate = parse_value(k, value)?,
            ("cncjob", "feedrate_z") => self.cncjob.feedrate_z = parse_value(k, value)?,
            ("cncjob", "feedrate_rapid") => self.cncjob.feedrate_rapid = parse_value(k, value)?,
            ("cncjob", "spindle_speed") => self.cncjob.spindle_speed = parse_optional(k, value)?,
            ("cncjob", "dwell") => self.cncjob.dwell = parse_optional(k, value)?,
            ("cncjob", "multidepth") => self.cncjob.multidepth = parse_bool(k, value)?,
            ("cncjob", "depth_per_cut") => self.cncjob.depth_per_cut = parse_value(k, value)?,
            ("cncjob", "extra_cut") => self.cncjob.extra_cut = parse_bool(k, value)?,
            ("cncjob", "extra_cut_length") => self.cncjob.extra_cut_length = parse_value(k, value)?,
            ("cncjob", "toolchange") => self.cncjob.toolchange = parse_bool(k, value)?,
            ("cncjob", "toolchange_z") => self.cncjob.toolchange_z = parse_value(k, value)?,
            ("cncjob", "end_z") => self.cncjob.end_z = parse_value(k, value)?,
            ("cncjob", "start_z") => self.cncjob.start_z = parse_optional(k, value)?,
            ("cncjob", "offset_mode") => self.cncjob.offset_mode = parse_value(k, value)?,
            ("cncjob", "exclusion_areas") => {
                self.cncjob.exclusion_areas = parse_exclusions(k, value)?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Cutting parameters for milling tools.
    pub fn cut_parameters(&self) -> CutParameters {
        let c = &self.cncjob;
        CutParameters {
            cut_z: c.cut_z,
            travel_z: c.travel_z,
            feedrate: c.feedrate,
            feedrate_z: c.feedrate_z,
            feedrate_rapid: c.feedrate_rapid,
            spindle_speed: c.spindle_speed,
            spindle_direction: c.spindle_direction,
            dwell: c.dwell,
            multidepth: c.multidepth,
            depth_per_cut: c.depth_per_cut,
            overlap: self.paint.overlap,
            milling_direction: self.isolation.milling_direction,
            extra_cut: c.extra_cut,
            extra_cut_length: c.extra_cut_length,
        }
    }

    pub fn job_settings(&self) -> JobSettings {
        let c = &self.cncjob;
        JobSettings {
            units: c.units,
            postprocessor: c.postprocessor.clone(),
            decimals: c.decimals,
            toolchange: c.toolchange,
            toolchange_z: c.toolchange_z,
            end_z: c.end_z,
            start_z: c.start_z,
            exclusion_areas: c.exclusion_areas.iter().map(ExclusionRect::to_area).collect(),
            drill_order: self.excellon.drill_order,
        }
    }

    pub fn isolation_params(&self, tool_diameter: f64) -> IsolationParams {
        let i = &self.isolation;
        IsolationParams {
            tool_diameter,
            passes: i.passes,
            overlap: i.overlap,
            milling_direction: i.milling_direction,
            side: i.side,
            follow: i.follow,
            cut: self.cut_parameters(),
        }
    }

    /// Paint parameters with the default whole-object scope.
    pub fn paint_params(&self, tool_diameter: f64) -> PaintParams {
        let p = &self.paint;
        PaintParams {
            pocket: PocketParams {
                tool_diameter,
                overlap: p.overlap,
                contour: p.contour,
                connect: p.connect,
            },
            method: p.method,
            margin: p.margin,
            cut: self.cut_parameters(),
            ..Default::default()
        }
    }

    pub fn drill_params(&self) -> DrillJobParams {
        let e = &self.excellon;
        DrillJobParams {
            tools: e.selection.clone(),
            cut: CutParameters {
                cut_z: e.cut_z,
                travel_z: e.travel_z,
                feedrate_z: e.feedrate_z,
                spindle_speed: e.spindle_speed.or(self.cncjob.spindle_speed),
                dwell: e.dwell,
                multidepth: e.multidepth,
                depth_per_cut: e.depth_per_cut,
                ..self.cut_parameters()
            },
            mill_slots: e.mill_slots,
        }
    }

    pub fn hole_milling_params(&self) -> HoleMillingParams {
        HoleMillingParams {
            tool_diameter: self.excellon.milling_tool,
            tools: self.excellon.selection.clone(),
            cut: self.cut_parameters(),
        }
    }
}

fn extension(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" | "toml" => Ok(ext),
        _ => Err(SettingsError::UnsupportedFormat(path.display().to_string())),
    }
}
