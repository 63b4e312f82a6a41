//! Command line front end.
//!
//! Each subcommand loads one input file, converts it to the job units from
//! the configuration, runs the matching clearing operation and writes the
//! G-code to a file or stdout.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use pcbmill_camtools::cncjob::{generate_drill_job, generate_geometry_job};
use pcbmill_camtools::{
    excellon, gerber, hpgl2, isolate, mill_holes, paint, CncJob, PaintScope, ToolEntry,
};
use pcbmill_core::{CamError, CamResult, CancellationToken, JobOutcome};
use pcbmill_geometry::{ConvertUnits, GeometryObject, MultiPolygon, Polygon, Shape};
use pcbmill_settings::{Config, PaintSelection, SettingsPersistence};
use pcbmill_visualizer::{gcode_parse, statistics, JobStatistics};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "pcbmill", version, about = "PCB isolation, clearing and drilling G-code")]
pub struct Cli {
    /// Settings file (TOML or JSON). Defaults to the user config directory.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override a setting, e.g. `--set isolation.passes=2`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val, global = true)]
    pub overrides: Vec<(String, String)>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct Output {
    /// Write G-code here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Isolation routing around the copper of a Gerber layer
    Isolate {
        input: PathBuf,
        #[command(flatten)]
        output: Output,
    },
    /// Clear copper areas of a Gerber layer
    Paint {
        input: PathBuf,
        /// Gerber file whose bounding box limits the cleared area
        #[arg(long)]
        reference: Option<PathBuf>,
        #[command(flatten)]
        output: Output,
    },
    /// Drill (or mill) the holes of an Excellon file
    Drill {
        input: PathBuf,
        /// Mill holes and slots with the configured end mill
        #[arg(long)]
        mill: bool,
        #[command(flatten)]
        output: Output,
    },
    /// Engrave the strokes of an HPGL2 plot
    Plot {
        input: PathBuf,
        /// Engraving tool diameter; defaults to the first isolation tool
        #[arg(long)]
        tooldia: Option<f64>,
        #[command(flatten)]
        output: Output,
    },
    /// Distances and run time of a G-code file
    Inspect {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective settings as TOML, or save them
    Settings {
        /// Write the effective settings to the config file
        #[arg(long)]
        save: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

/// Load the settings file and apply `--set` overrides.
pub fn load_settings(cli: &Cli) -> anyhow::Result<SettingsPersistence> {
    let mut store = SettingsPersistence::load_or_default(cli.config.as_deref())?;
    if !cli.overrides.is_empty() {
        let flat: BTreeMap<String, String> = cli.overrides.iter().cloned().collect();
        store.config_mut().apply_flat(&flat)?;
    }
    Ok(store)
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn write_gcode(output: &Output, outcome: &JobOutcome<CncJob>) -> anyhow::Result<()> {
    match &output.output {
        Some(path) => {
            std::fs::write(path, &outcome.value.gcode)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => std::io::stdout().write_all(outcome.value.gcode.as_bytes())?,
    }
    for warning in &outcome.value.gcode_parsed.warnings {
        warn!("{}", warning);
    }
    info!("{}", outcome.status);
    Ok(())
}

fn load_gerber(text: &str, config: &Config, cancel: &CancellationToken) -> CamResult<GeometryObject> {
    let mut board = gerber::parse_with_options(text, &config.gerber.to_options(), cancel)?;
    for warning in &board.warnings {
        warn!("{}", warning);
    }
    board.convert_units(config.cncjob.units);
    Ok(board.to_geometry())
}

fn sorted(mut diameters: Vec<f64>) -> Vec<f64> {
    diameters.sort_by(f64::total_cmp);
    diameters.dedup();
    diameters
}

/// One isolation tool per configured diameter, smallest first.
pub fn isolation_job(
    text: &str,
    config: &Config,
    cancel: &CancellationToken,
) -> CamResult<JobOutcome<CncJob>> {
    let geometry = load_gerber(text, config, cancel)?;
    let tools = sorted(config.isolation.tooldia.clone())
        .into_iter()
        .map(|d| isolate(&geometry, &config.isolation_params(d), cancel))
        .collect::<CamResult<Vec<ToolEntry>>>()?;
    generate_geometry_job(&tools, &config.job_settings(), cancel)
}

fn paint_scope(
    config: &Config,
    reference: Option<&str>,
    cancel: &CancellationToken,
) -> CamResult<PaintScope> {
    match config.paint.selection {
        PaintSelection::All => Ok(PaintScope::All),
        PaintSelection::Area => {
            let [x0, y0, x1, y1] = config.paint.area.ok_or_else(|| {
                CamError::InvalidParameters("paint.area is required for area selection".into())
            })?;
            let rect = Polygon::new(
                vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)].into(),
                vec![],
            );
            Ok(PaintScope::Area(MultiPolygon::new(vec![rect])))
        }
        PaintSelection::Reference => {
            let text = reference.ok_or_else(|| {
                CamError::InvalidParameters("reference selection needs a reference file".into())
            })?;
            Ok(PaintScope::Reference(load_gerber(text, config, cancel)?))
        }
    }
}

/// Area clearing, largest tool first.
pub fn paint_job(
    text: &str,
    reference: Option<&str>,
    config: &Config,
    cancel: &CancellationToken,
) -> CamResult<JobOutcome<CncJob>> {
    let geometry = load_gerber(text, config, cancel)?;
    let scope = paint_scope(config, reference, cancel)?;
    let mut tools = Vec::new();
    for d in sorted(config.paint.tooldia.clone()).into_iter().rev() {
        let mut params = config.paint_params(d);
        params.scope = scope.clone();
        tools.push(paint(&geometry, &params, cancel)?);
    }
    generate_geometry_job(&tools, &config.job_settings(), cancel)
}

pub fn drill_job(
    text: &str,
    mill: bool,
    config: &Config,
    cancel: &CancellationToken,
) -> CamResult<JobOutcome<CncJob>> {
    let mut drills = excellon::parse(text, cancel)?;
    for warning in &drills.warnings {
        warn!("{}", warning);
    }
    let settings = config.job_settings();
    if !mill {
        return generate_drill_job(&drills, &config.drill_params(), &settings, cancel);
    }
    drills.convert_units(settings.units);
    let tool = mill_holes(&drills, &config.hole_milling_params(), cancel)?;
    generate_geometry_job(&[tool], &settings, cancel)
}

/// Strokes engraved along their centerline, offset per `cncjob.offset_mode`.
pub fn plot_job(
    text: &str,
    tooldia: Option<f64>,
    config: &Config,
    cancel: &CancellationToken,
) -> CamResult<JobOutcome<CncJob>> {
    let mut plot = hpgl2::parse(text, cancel)?;
    plot.convert_units(config.cncjob.units);
    let diameter = tooldia
        .or_else(|| config.isolation.tooldia.first().copied())
        .ok_or_else(|| CamError::InvalidParameters("no tool diameter configured".into()))?;
    let paths: Vec<Shape> = plot.paths().cloned().map(Shape::Path).collect();
    if paths.is_empty() {
        return Err(CamError::OperationFailed("plot has no strokes".into()));
    }
    let mut tool = ToolEntry::new(diameter).with_solid(paths);
    tool.offset = config.cncjob.offset_mode;
    tool.params = config.cut_parameters();
    generate_geometry_job(&[tool], &config.job_settings(), cancel)
}

pub fn inspect(text: &str, config: &Config) -> JobStatistics {
    statistics(&gcode_parse(text), config.cncjob.feedrate_rapid)
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let store = load_settings(&cli)?;
    let cancel = CancellationToken::new();
    let config = store.config().clone();
    check_tools(&config, &cli.command)?;

    match &cli.command {
        Command::Isolate { input, output } => {
            let outcome = isolation_job(&read(input)?, &config, &cancel)?;
            write_gcode(output, &outcome)
        }
        Command::Paint {
            input,
            reference,
            output,
        } => {
            let reference = reference.as_deref().map(read).transpose()?;
            let outcome = paint_job(&read(input)?, reference.as_deref(), &config, &cancel)?;
            write_gcode(output, &outcome)
        }
        Command::Drill {
            input,
            mill,
            output,
        } => {
            let outcome = drill_job(&read(input)?, *mill, &config, &cancel)?;
            write_gcode(output, &outcome)
        }
        Command::Plot {
            input,
            tooldia,
            output,
        } => {
            let outcome = plot_job(&read(input)?, *tooldia, &config, &cancel)?;
            write_gcode(output, &outcome)
        }
        Command::Inspect { input, json } => {
            let stats = inspect(&read(input)?, &config);
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("segments:       {}", stats.segments);
                println!("tool changes:   {}", stats.tool_changes);
                println!("cut distance:   {:.3}", stats.cut_distance);
                println!("travel:         {:.3}", stats.travel_distance);
                println!("estimated time: {:.1} min", stats.estimated_minutes);
                if let Some(b) = stats.cut_bounds {
                    println!(
                        "cut extent:     ({:.3}, {:.3}) - ({:.3}, {:.3})",
                        b.min_x, b.min_y, b.max_x, b.max_y
                    );
                }
            }
            Ok(())
        }
        Command::Settings { save } => {
            if *save {
                let path = store.save(cli.config.as_deref())?;
                println!("{}", path.display());
            } else {
                let text = toml::to_string_pretty(store.config())
                    .context("serializing settings")?;
                print!("{}", text);
            }
            Ok(())
        }
    }
}

/// Reject empty diameter lists up front instead of producing empty jobs.
pub fn check_tools(config: &Config, command: &Command) -> anyhow::Result<()> {
    let empty = match command {
        Command::Isolate { .. } => config.isolation.tooldia.is_empty(),
        Command::Paint { .. } => config.paint.tooldia.is_empty(),
        _ => false,
    };
    if empty {
        bail!("no tool diameters configured for this operation");
    }
    Ok(())
}
