use clap::Parser;
use pcbmill::cli::{drill_job, inspect, isolation_job, load_settings, plot_job, Cli, Command};
use pcbmill::{CancellationToken, Config};

const TRACE: &str = "%FSLAX24Y24*%%MOMM*%%ADD10C,0.5*%D10*X0Y0D02*X10000Y0D01*M02*";

const BIG_HOLE: &str = "M48\nMETRIC\nT01C3.0\n%\nT01\nX10.0Y10.0\nM30\n";

#[test]
fn test_arguments_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pcbmill.toml");
    let cli = Cli::try_parse_from([
        "pcbmill",
        "--config",
        config_path.to_str().unwrap(),
        "--set",
        "isolation.passes=3",
        "--set",
        "overlap=0.2",
        "isolate",
        "board.gbr",
        "-o",
        "board.nc",
    ])
    .unwrap();
    assert!(matches!(cli.command, Command::Isolate { .. }));

    let store = load_settings(&cli).unwrap();
    assert_eq!(store.config().isolation.passes, 3);
    assert_eq!(store.config().paint.overlap, 0.2);
}

#[test]
fn test_malformed_override_is_rejected() {
    assert!(Cli::try_parse_from(["pcbmill", "--set", "passes", "inspect", "x.nc"]).is_err());
}

#[test]
fn test_isolation_with_two_tools() {
    let mut config = Config::default();
    config.isolation.tooldia = vec![0.2, 0.1];
    let outcome = isolation_job(TRACE, &config, &CancellationToken::new()).unwrap();
    assert_eq!(outcome.value.tools.len(), 2);
    assert!(outcome.value.tools[0].diameter < outcome.value.tools[1].diameter);
    assert!(outcome.status.starts_with("2 tool(s)"));
}

#[test]
fn test_hole_milling_job_stays_in_hole() {
    let config = Config::default();
    let outcome = drill_job(BIG_HOLE, true, &config, &CancellationToken::new()).unwrap();
    let cut = outcome.value.statistics.cut_bounds.unwrap();
    assert!(cut.min_x > 8.9 && cut.max_x < 11.1);
    assert!(cut.min_y > 8.9 && cut.max_y < 11.1);
}

#[test]
fn test_plot_and_inspect() {
    let config = Config::default();
    let cancel = CancellationToken::new();
    let outcome = plot_job("IN;SP1;PU0,0;PD400,0,400,400;PU;", Some(0.2), &config, &cancel).unwrap();

    let stats = inspect(&outcome.value.gcode, &config);
    assert_eq!(stats.segments, outcome.value.statistics.segments);
    // Two 10 mm strokes plus the plunge.
    assert!(stats.cut_distance >= 20.0);
    assert!(stats.cut_distance < 20.0 + config.cncjob.travel_z + 1.0);
}
