use pcbmill_camtools::{DrillOrder, OffsetMode, PaintMethod};
use pcbmill_core::Units;
use pcbmill_settings::{Config, ExclusionRect, SettingsError};
use std::collections::BTreeMap;
use std::time::Duration;

fn sample() -> Config {
    let mut config = Config::new();
    config.cncjob.units = Units::In;
    config.cncjob.postprocessor = "marlin".to_string();
    config.cncjob.offset_mode = OffsetMode::Custom(0.02);
    config.cncjob.spindle_speed = Some(12000.0);
    config.cncjob.exclusion_areas.push(ExclusionRect {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 10.0,
        max_y: 5.0,
        z: 8.0,
    });
    config.excellon.drill_order = DrillOrder::Metaheuristic {
        time_limit: Duration::from_secs(3),
    };
    config.paint.method = PaintMethod::Lines;
    config.paint.area = Some([0.0, 0.0, 20.0, 20.0]);
    config.isolation.tooldia = vec![0.1, 0.2];
    config
}

#[test]
fn test_toml_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pcbmill.toml");
    let config = sample();
    config.save_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[cncjob]"));
    assert!(text.contains("postprocessor = \"marlin\""));

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pcbmill.json");
    let config = sample();
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.cncjob.units, Units::In);
    assert_eq!(loaded.cncjob.postprocessor, "marlin");
    assert_eq!(loaded.excellon.drill_order, config.excellon.drill_order);
    assert_eq!(loaded.paint.method, PaintMethod::Lines);
    assert_eq!(loaded.cncjob.exclusion_areas.len(), 1);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "[paint]\noverlap = 0.3\n\n[cncjob]\nunits = \"IN\"\n").unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.paint.overlap, 0.3);
    assert_eq!(loaded.cncjob.units, Units::In);
    assert_eq!(loaded.isolation, Config::default().isolation);
}

#[test]
fn test_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pcbmill.yaml");
    let err = Config::new().save_to_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::UnsupportedFormat(_)));
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[isolation]\npasses = 0\n").unwrap();
    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::InvalidSetting { .. }));
}

#[test]
fn test_flat_overrides_drive_job_settings() {
    let mut config = Config::new();
    let values: BTreeMap<String, String> = [
        ("cncjob.units", "in"),
        ("cncjob.toolchange", "true"),
        ("cncjob.end_z", "1.5"),
        ("drill_order", "basic"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    config.apply_flat(&values).unwrap();

    let job = config.job_settings();
    assert_eq!(job.units, Units::In);
    assert!(job.toolchange);
    assert_eq!(job.end_z, 1.5);
    assert_eq!(job.drill_order, DrillOrder::Basic);
}
