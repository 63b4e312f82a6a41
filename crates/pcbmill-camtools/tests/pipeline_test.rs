use pcbmill_camtools::clearing::{isolate, isolation_geometry, paint};
use pcbmill_camtools::cncjob::{generate_drill_job, generate_geometry_job, DrillJobParams, JobSettings};
use pcbmill_camtools::{excellon, gerber, IsolationParams, IsolationSide, PaintParams, PocketParams};
use pcbmill_core::{CancellationToken, Units};
use pcbmill_geometry::clip::region_contains;
use pcbmill_geometry::ops::buffer;
use pcbmill_geometry::Shape;

const TRACE: &str = "%FSLAX24Y24*%%MOMM*%%ADD10C,0.5*%D10*X0Y0D02*X10000Y0D01*M02*";

const PAD: &str = "%FSLAX24Y24*%%MOMM*%\
G36*X0Y0D02*G01X50000Y0D01*X50000Y50000D01*X0Y50000D01*X0Y0D01*G37*M02*";

const DRILLS: &str =
    "M48\nINCH,LZ\nT01C0.0135\nT02C0.0200\n%\nT01\nX010000Y010000\nX020000Y010000\nX030000Y010000\nM30\n";

#[test]
fn test_trace_isolation_to_grbl_job() {
    let cancel = CancellationToken::new();
    let board = gerber::parse(TRACE, &cancel).unwrap();
    let bounds = board.bounds().unwrap();
    assert!((bounds.min_x + 0.25).abs() < 1e-3);
    assert!((bounds.max_x - 1.25).abs() < 1e-3);

    let params = IsolationParams {
        tool_diameter: 0.2,
        passes: 2,
        overlap: 0.25,
        ..Default::default()
    };
    let tool = isolate(&board.to_geometry(), &params, &cancel).unwrap();
    assert_eq!(tool.solid.len(), 2);

    let settings = JobSettings {
        postprocessor: "grbl_11".to_string(),
        ..Default::default()
    };
    let job = generate_geometry_job(&[tool], &settings, &cancel).unwrap().value;
    assert!(job.gcode.contains("G21"));
    assert!(job.gcode.contains("G1 Z-0.0500"));
    assert!(job.gcode_parsed.warnings.is_empty());

    // The outer pass runs 0.1 + 0.15 outside the copper.
    let cut = job.statistics.cut_bounds.unwrap();
    assert!(cut.max_x > 1.25 && cut.max_x < 1.25 + 0.25 + 1e-3);
}

#[test]
fn test_zero_offset_isolation_returns_copper() {
    let board = gerber::parse(TRACE, &CancellationToken::new()).unwrap();
    let geometry = board.to_geometry();
    let shapes = isolation_geometry(&geometry, 0.0, IsolationSide::Both, false);
    assert_eq!(shapes, geometry.solid);
    let follow = isolation_geometry(&geometry, 0.1, IsolationSide::Both, true);
    assert_eq!(follow, geometry.follow);
}

#[test]
fn test_painted_paths_stay_inside_pad() {
    let cancel = CancellationToken::new();
    let pad = gerber::parse(PAD, &cancel).unwrap().to_geometry();
    let params = PaintParams {
        pocket: PocketParams {
            tool_diameter: 0.8,
            overlap: 0.2,
            contour: true,
            connect: true,
        },
        ..Default::default()
    };
    let tool = paint(&pad, &params, &cancel).unwrap();
    let region = buffer(&pad.solid_polygons(), 1e-6);
    for shape in &tool.solid {
        let Shape::Path(path) = shape else {
            panic!("expected paths");
        };
        for c in &path.0 {
            assert!(region_contains(&region, *c), "{:?} outside the pad", c);
        }
    }
}

#[test]
fn test_three_drill_job_in_inches() {
    let cancel = CancellationToken::new();
    let drills = excellon::parse(DRILLS, &cancel).unwrap();
    assert_eq!(drills.tools["01"].solid.len(), 3);

    let settings = JobSettings {
        units: Units::In,
        ..Default::default()
    };
    let params = DrillJobParams {
        cut: pcbmill_camtools::CutParameters {
            cut_z: -0.07,
            travel_z: 0.1,
            ..Default::default()
        },
        ..Default::default()
    };
    let outcome = generate_drill_job(&drills, &params, &settings, &cancel).unwrap();
    let gcode = &outcome.value.gcode;
    assert!(gcode.lines().any(|l| l == "G20"));
    for x in ["1.0000", "2.0000", "3.0000"] {
        assert!(gcode.contains(&format!("G00 X{} Y1.0000", x)));
    }
    assert_eq!(gcode.lines().filter(|l| *l == "G01 Z-0.0700").count(), 3);
    assert_eq!(outcome.value.tools.len(), 1);
    assert!(outcome.status.contains("1 tool(s)"));
}

#[test]
fn test_drilling_metric_job_from_inch_file_converts() {
    let cancel = CancellationToken::new();
    let drills = excellon::parse(DRILLS, &cancel).unwrap();
    let job = generate_drill_job(&drills, &DrillJobParams::default(), &JobSettings::default(), &cancel)
        .unwrap()
        .value;
    assert!(job.gcode.contains("G00 X25.4000 Y25.4000"));
    assert!((job.tools[0].diameter - 0.3429).abs() < 1e-9);
}
