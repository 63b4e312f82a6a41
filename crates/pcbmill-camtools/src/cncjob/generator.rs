//! Assembling G-code jobs from tool entries and drill files.

use super::drill_order::{order_points, DrillOrder};
use super::postprocessor::{postprocessor, PostContext, Postprocessor};
use crate::clearing::rings;
use crate::excellon::ExcellonObject;
use crate::tool::{CutParameters, OperationType, ToolEntry};
use geo::{Coord, Intersects, Line, LineString, Polygon};
use pcbmill_core::{CamError, CamResult, CancellationToken, JobOutcome, Units};
use pcbmill_geometry::ops::buffer_polygon;
use pcbmill_geometry::{coord, distance, flatten, ConvertUnits, PathStore, Primitive};
use pcbmill_visualizer::{gcode_parse, statistics, JobStatistics, ParsedGcode};
use tracing::{debug, info};

/// A region travel moves must clear at `z`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionArea {
    pub polygon: Polygon<f64>,
    pub z: f64,
}

impl ExclusionArea {
    fn crossed_by(&self, from: Coord<f64>, to: Coord<f64>) -> bool {
        Line::new(from, to).intersects(&self.polygon)
    }
}

/// Job-wide settings; per-tool cutting parameters live on each tool.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    /// Units of the emitted G-code. Tool geometry must already be in them.
    pub units: Units,
    pub postprocessor: String,
    pub decimals: usize,
    /// Stop for a manual tool change before each tool.
    pub toolchange: bool,
    pub toolchange_z: f64,
    pub end_z: f64,
    pub start_z: Option<f64>,
    pub exclusion_areas: Vec<ExclusionArea>,
    pub drill_order: DrillOrder,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            units: Units::Mm,
            postprocessor: "default".to_string(),
            decimals: 4,
            toolchange: false,
            toolchange_z: 15.0,
            end_z: 2.0,
            start_z: None,
            exclusion_areas: Vec::new(),
            drill_order: DrillOrder::NearestNeighbor,
        }
    }
}

/// Drill job selection and cutting parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrillJobParams {
    /// Excellon tool ids to drill. Empty means every tool.
    pub tools: Vec<String>,
    pub cut: CutParameters,
    /// Also mill the slots of the selected tools.
    pub mill_slots: bool,
}

/// One tool of a finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTool {
    pub number: usize,
    pub diameter: f64,
    pub operation: OperationType,
    /// Paths cut or holes drilled.
    pub items: usize,
}

#[derive(Debug, Clone)]
pub struct CncJob {
    pub units: Units,
    pub gcode: String,
    pub gcode_parsed: ParsedGcode,
    pub statistics: JobStatistics,
    pub tools: Vec<JobTool>,
}

struct Emitter {
    post: Box<dyn Postprocessor>,
    ctx: PostContext,
    out: String,
    exclusions: Vec<ExclusionArea>,
}

impl Emitter {
    fn new(settings: &JobSettings) -> CamResult<Self> {
        let ctx = PostContext {
            units: settings.units,
            decimals: settings.decimals,
            z_toolchange: settings.toolchange_z,
            z_end: settings.end_z,
            z_start: settings.start_z,
            ..Default::default()
        };
        Ok(Self {
            post: postprocessor(&settings.postprocessor)?,
            ctx,
            out: String::new(),
            exclusions: settings.exclusion_areas.clone(),
        })
    }

    fn emit<F>(&mut self, code: F)
    where
        F: Fn(&dyn Postprocessor, &PostContext) -> String,
    {
        let text = code(self.post.as_ref(), &self.ctx);
        if !text.is_empty() {
            self.out.push_str(&text);
            self.out.push('\n');
        }
    }

    fn position(&self) -> Coord<f64> {
        coord(self.ctx.x, self.ctx.y)
    }

    fn select_tool(&mut self, number: usize, diameter: f64, params: &CutParameters, toolchange: bool) {
        let ctx = &mut self.ctx;
        ctx.tool = number;
        ctx.tool_diameter = diameter;
        ctx.z_cut = params.cut_z;
        ctx.z_move = params.travel_z;
        ctx.feedrate = params.feedrate;
        ctx.feedrate_z = params.feedrate_z;
        ctx.feedrate_rapid = params.feedrate_rapid;
        ctx.spindle_speed = params.spindle_speed;
        ctx.spindle_direction = params.spindle_direction;
        ctx.dwell = params.dwell;

        if toolchange {
            self.emit(|p, c| p.toolchange_code(c));
        }
        self.emit(|p, c| p.spindle_code(c));
        self.emit(|p, c| p.dwell_code(c));
        self.emit(|p, c| p.up_code(c));
    }

    /// Rapid to `target` at travel height, climbing over exclusion areas.
    fn travel_to(&mut self, target: Coord<f64>) {
        let from = self.position();
        if from == target {
            return;
        }
        let clearance = self
            .exclusions
            .iter()
            .filter(|a| a.crossed_by(from, target))
            .map(|a| a.z)
            .fold(f64::NEG_INFINITY, f64::max);

        if clearance > self.ctx.z_move {
            let travel_z = self.ctx.z_move;
            self.ctx.z_move = clearance;
            self.emit(|p, c| p.up_code(c));
            self.ctx.move_to(target.x, target.y);
            self.emit(|p, c| p.rapid_code(c));
            self.ctx.z_move = travel_z;
        } else {
            self.ctx.move_to(target.x, target.y);
            self.emit(|p, c| p.rapid_code(c));
        }
    }

    fn plunge(&mut self, z: f64) {
        self.ctx.z_cut = z;
        self.emit(|p, c| p.z_feedrate_code(c));
        self.emit(|p, c| p.down_code(c));
        self.emit(|p, c| p.feedrate_code(c));
    }

    fn cut_to(&mut self, target: Coord<f64>) {
        self.ctx.move_to(target.x, target.y);
        self.emit(|p, c| p.linear_code(c));
    }

    /// Cut one path at every depth. Closed paths stay down between passes;
    /// open paths lift and retrace from their start.
    fn cut_path(&mut self, path: &LineString<f64>, params: &CutParameters) {
        let Some(first) = path.0.first().copied() else {
            return;
        };
        let closed = path.is_closed() && path.0.len() > 2;
        self.travel_to(first);

        for (pass, z) in params.depth_passes().into_iter().enumerate() {
            if pass > 0 && !closed {
                self.emit(|p, c| p.up_code(c));
                self.travel_to(first);
            }
            self.plunge(z);
            for c in &path.0[1..] {
                self.cut_to(*c);
            }
        }

        if closed && params.extra_cut {
            self.extra_cut(path, params.extra_cut_length);
        }
        self.emit(|p, c| p.up_code(c));
    }

    /// Continue around a closed path for `length` past its start.
    fn extra_cut(&mut self, path: &LineString<f64>, length: f64) {
        let mut remaining = length;
        for line in path.lines() {
            if remaining <= 0.0 {
                break;
            }
            let segment = distance(line.start, line.end);
            if segment <= remaining {
                self.cut_to(line.end);
                remaining -= segment;
            } else {
                let t = remaining / segment;
                self.cut_to(coord(
                    line.start.x + (line.end.x - line.start.x) * t,
                    line.start.y + (line.end.y - line.start.y) * t,
                ));
                remaining = 0.0;
            }
        }
    }

    fn drill(&mut self, at: Coord<f64>, params: &CutParameters) {
        self.travel_to(at);
        let passes = params.depth_passes();
        let last = passes.len().saturating_sub(1);
        for (pass, z) in passes.into_iter().enumerate() {
            self.plunge(z);
            self.emit(|p, c| p.dwell_code(c));
            if pass < last {
                self.emit(|p, c| p.lift_code(c));
            }
        }
        self.emit(|p, c| p.lift_code(c));
    }

    fn begin(&mut self) {
        self.emit(|p, c| p.start_code(c));
        self.emit(|p, c| p.startz_code(c));
    }

    fn finish(mut self, units: Units, tools: Vec<JobTool>, rapid_rate: f64) -> CncJob {
        self.emit(|p, c| p.spindle_stop_code(c));
        self.emit(|p, c| p.end_code(c));
        let gcode_parsed = gcode_parse(&self.out);
        let statistics = statistics(&gcode_parsed, rapid_rate);
        CncJob {
            units,
            gcode: self.out,
            gcode_parsed,
            statistics,
            tools,
        }
    }
}

/// Paths a tool cuts, with its offset mode applied to closed shapes.
fn tool_paths(tool: &ToolEntry) -> Vec<LineString<f64>> {
    let offset = tool.offset.distance(tool.diameter);
    let mut paths = Vec::new();
    for primitive in flatten(&tool.solid, false) {
        match primitive {
            Primitive::Polygon(polygon) => {
                if offset == 0.0 {
                    paths.push(polygon.exterior().clone());
                    paths.extend(polygon.interiors().iter().cloned());
                } else {
                    paths.extend(rings(&buffer_polygon(polygon, offset)));
                }
            }
            Primitive::Path(path) => {
                if offset != 0.0 && path.is_closed() && path.0.len() > 3 {
                    let polygon = Polygon::new(path.clone(), vec![]);
                    paths.extend(rings(&buffer_polygon(&polygon, offset)));
                } else {
                    paths.push(path.clone());
                }
            }
            Primitive::Point(_) => {}
        }
    }
    paths.retain(|p| p.0.len() >= 2);
    paths
}

fn summary(job: &CncJob) -> String {
    format!(
        "{} tool(s), {:.2} {} cut, {:.1} min",
        job.tools.len(),
        job.statistics.cut_distance,
        job.units.label(),
        job.statistics.estimated_minutes
    )
}

/// Generate a milling job: every tool in order, each tool's paths visited
/// nearest-first from the current position.
pub fn generate_geometry_job(
    tools: &[ToolEntry],
    settings: &JobSettings,
    cancel: &CancellationToken,
) -> CamResult<JobOutcome<CncJob>> {
    let mut emitter = Emitter::new(settings)?;
    emitter.begin();

    let mut summaries = Vec::new();
    let mut rapid_rate: f64 = 0.0;
    for (index, tool) in tools.iter().enumerate() {
        cancel.check()?;
        let paths = tool_paths(tool);
        if paths.is_empty() {
            debug!("Tool {} has nothing to cut", tool);
            continue;
        }
        let number = index + 1;
        emitter.select_tool(number, tool.diameter, &tool.params, settings.toolchange);
        rapid_rate = rapid_rate.max(tool.params.feedrate_rapid);

        let count = paths.len();
        let mut store = PathStore::new(paths);
        while let Some(path) = store.pop_nearest(emitter.position()) {
            emitter.cut_path(&path, &tool.params);
        }
        debug!("Tool {}: {} paths", number, count);
        summaries.push(JobTool {
            number,
            diameter: tool.diameter,
            operation: tool.operation,
            items: count,
        });
    }

    if summaries.is_empty() {
        return Err(CamError::OperationFailed("no tool has paths to cut".to_string()));
    }
    let job = emitter.finish(settings.units, summaries, rapid_rate);
    let status = summary(&job);
    info!("Geometry job: {}", status);
    Ok(JobOutcome::new(job, status))
}

/// Generate a drilling job from an Excellon object, converting it to the job
/// units first.
pub fn generate_drill_job(
    source: &ExcellonObject,
    params: &DrillJobParams,
    settings: &JobSettings,
    cancel: &CancellationToken,
) -> CamResult<JobOutcome<CncJob>> {
    let mut source = source.clone();
    if source.units() != settings.units {
        source.convert_units(settings.units);
    }

    let mut emitter = Emitter::new(settings)?;
    emitter.begin();

    let mut summaries = Vec::new();
    for (index, (id, tool)) in source.tools.iter().enumerate() {
        if !params.tools.is_empty() && !params.tools.contains(id) {
            continue;
        }
        cancel.check()?;
        let points: Vec<Coord<f64>> = source.drills_for(id).collect();
        let slots: Vec<LineString<f64>> = if params.mill_slots {
            source
                .slots_for(id)
                .map(|s| LineString::new(vec![s.start, s.stop]))
                .collect()
        } else {
            Vec::new()
        };
        if points.is_empty() && slots.is_empty() {
            continue;
        }

        let number = id.parse::<usize>().unwrap_or(index + 1);
        emitter.select_tool(number, tool.diameter, &params.cut, settings.toolchange);
        for i in order_points(&points, emitter.position(), settings.drill_order) {
            emitter.drill(points[i], &params.cut);
        }
        for slot in &slots {
            emitter.cut_path(slot, &params.cut);
        }
        debug!("T{}: {} holes, {} slots", id, points.len(), slots.len());
        summaries.push(JobTool {
            number,
            diameter: tool.diameter,
            operation: OperationType::Rough,
            items: points.len() + slots.len(),
        });
    }

    if summaries.is_empty() {
        return Err(CamError::OperationFailed(
            "no drill hits for the selected tools".to_string(),
        ));
    }
    let job = emitter.finish(settings.units, summaries, params.cut.feedrate_rapid);
    let status = summary(&job);
    info!("Drill job: {}", status);
    Ok(JobOutcome::new(job, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excellon::{DrillHit, ExcellonTool};
    use crate::tool::OffsetMode;
    use geo::{line_string, polygon};
    use pcbmill_geometry::Shape;
    use pcbmill_visualizer::MoveKind;

    fn square_tool() -> ToolEntry {
        ToolEntry::new(0.2).with_solid(vec![Shape::Path(line_string![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 4.0),
            (x: 0.0, y: 0.0),
        ])])
    }

    fn count(gcode: &str, needle: &str) -> usize {
        gcode.lines().filter(|l| *l == needle).count()
    }

    #[test]
    fn test_single_pass_job() {
        let outcome =
            generate_geometry_job(&[square_tool()], &JobSettings::default(), &CancellationToken::new())
                .unwrap();
        let gcode = &outcome.value.gcode;
        assert!(gcode.lines().any(|l| l == "G21"));
        assert_eq!(count(gcode, "G01 Z-0.0500"), 1);
        assert_eq!(count(gcode, "G01 X4.0000 Y4.0000"), 1);
        assert!(gcode.trim_end().ends_with("M02"));
        assert_eq!(outcome.value.tools.len(), 1);
        // The plunge from travel height plus the square.
        assert!((outcome.value.statistics.cut_distance - 18.05).abs() < 1e-9);
    }

    #[test]
    fn test_closed_path_multidepth_stays_down() {
        let mut tool = square_tool();
        tool.params.cut_z = -0.3;
        tool.params.multidepth = true;
        tool.params.depth_per_cut = 0.1;
        let gcode = generate_geometry_job(&[tool], &JobSettings::default(), &CancellationToken::new())
            .unwrap()
            .value
            .gcode;
        assert_eq!(count(&gcode, "G01 Z-0.1000"), 1);
        assert_eq!(count(&gcode, "G01 Z-0.2000"), 1);
        assert_eq!(count(&gcode, "G01 Z-0.3000"), 1);
        // Tool start, after the path, and the end code.
        assert_eq!(count(&gcode, "G00 Z2.0000"), 3);
    }

    #[test]
    fn test_open_path_multidepth_retraces() {
        let mut tool = ToolEntry::new(0.2)
            .with_solid(vec![Shape::Path(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0)])]);
        tool.params.cut_z = -0.2;
        tool.params.multidepth = true;
        tool.params.depth_per_cut = 0.1;
        let job = generate_geometry_job(&[tool], &JobSettings::default(), &CancellationToken::new())
            .unwrap()
            .value;
        assert_eq!(count(&job.gcode, "G00 X0.0000 Y0.0000"), 1);
        assert_eq!(count(&job.gcode, "G01 X5.0000 Y0.0000"), 2);
        assert!(job.gcode_parsed.warnings.is_empty());
    }

    #[test]
    fn test_offset_out_grows_square() {
        let mut tool = square_tool();
        tool.offset = OffsetMode::Out;
        let paths = tool_paths(&tool);
        assert_eq!(paths.len(), 1);
        let max_x = paths[0].0.iter().map(|c| c.x).fold(f64::MIN, f64::max);
        assert!((max_x - 4.1).abs() < 1e-3);
    }

    #[test]
    fn test_exclusion_area_raises_travel() {
        let tools = vec![ToolEntry::new(0.2).with_solid(vec![
            Shape::Path(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)]),
            Shape::Path(line_string![(x: 10.0, y: 0.0), (x: 11.0, y: 0.0)]),
        ])];
        let settings = JobSettings {
            exclusion_areas: vec![ExclusionArea {
                polygon: polygon![(x: 4.0, y: -1.0), (x: 6.0, y: -1.0), (x: 6.0, y: 1.0), (x: 4.0, y: 1.0)],
                z: 10.0,
            }],
            ..Default::default()
        };
        let gcode = generate_geometry_job(&tools, &settings, &CancellationToken::new())
            .unwrap()
            .value
            .gcode;
        assert_eq!(count(&gcode, "G00 Z10.0000"), 1);
    }

    #[test]
    fn test_extra_cut_overlaps_start() {
        let mut tool = square_tool();
        tool.params.extra_cut = true;
        tool.params.extra_cut_length = 1.5;
        let gcode = generate_geometry_job(&[tool], &JobSettings::default(), &CancellationToken::new())
            .unwrap()
            .value
            .gcode;
        assert_eq!(count(&gcode, "G01 X1.5000 Y0.0000"), 1);
    }

    #[test]
    fn test_drill_job_pecks_and_orders() {
        let mut source = ExcellonObject::default();
        source.tools.insert(
            "01".into(),
            ExcellonTool {
                diameter: 0.8,
                solid: Vec::new(),
            },
        );
        for (x, y) in [(3.0, 0.0), (1.0, 0.0), (2.0, 0.0)] {
            source.drills.push(DrillHit {
                point: coord(x, y),
                tool: "01".into(),
            });
        }
        let params = DrillJobParams {
            cut: CutParameters {
                cut_z: -1.6,
                multidepth: true,
                depth_per_cut: 0.8,
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = JobSettings {
            toolchange: true,
            ..Default::default()
        };
        let job = generate_drill_job(&source, &params, &settings, &CancellationToken::new())
            .unwrap()
            .value;

        let xs: Vec<&str> = job
            .gcode
            .lines()
            .filter(|l| l.starts_with("G00 X") && !l.starts_with("G00 X0 "))
            .collect();
        assert_eq!(xs, vec!["G00 X1.0000 Y0.0000", "G00 X2.0000 Y0.0000", "G00 X3.0000 Y0.0000"]);
        assert_eq!(count(&job.gcode, "G01 Z-0.8000"), 3);
        assert_eq!(count(&job.gcode, "G01 Z-1.6000"), 3);
        assert!(job.gcode.lines().any(|l| l == "T1"));
        assert_eq!(job.tools[0].items, 3);
        assert!(job.gcode_parsed.cuts().all(|s| s.kind == MoveKind::Cut));
    }

    #[test]
    fn test_unknown_postprocessor_and_cancel() {
        let settings = JobSettings {
            postprocessor: "fanuc".into(),
            ..Default::default()
        };
        let err = generate_geometry_job(&[square_tool()], &settings, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, CamError::UnknownPostprocessor(_)));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = generate_geometry_job(&[square_tool()], &JobSettings::default(), &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
