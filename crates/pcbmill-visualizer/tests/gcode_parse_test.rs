use pcbmill_core::Units;
use pcbmill_visualizer::{gcode_parse, statistics, MoveKind, MoveSpeed};
use proptest::prelude::*;

#[test]
fn test_marlin_style_program() {
    let program = "\
G21
G90
G0 Z5 F3000
G0 X10 Y0 F3000
G1 Z-0.2 F100
G2 X10 Y0 I-5 J0 F200
G1 Z5 F100
M84
";
    let parsed = gcode_parse(program);
    assert_eq!(parsed.units, Units::Mm);
    assert_eq!(parsed.segments.len(), 5);

    let circle = &parsed.segments[3];
    assert_eq!(circle.kind, MoveKind::Cut);
    assert_eq!(circle.speed, MoveSpeed::Slow);
    assert!((circle.xy_length() - 10.0 * std::f64::consts::PI).abs() < 0.05);

    let stats = statistics(&parsed, 3000.0);
    assert!(stats.cut_distance > 31.0);
    let b = stats.cut_bounds.unwrap();
    assert!((b.min_x - 0.0).abs() < 1e-6 && (b.max_x - 10.0).abs() < 1e-9);
}

#[test]
fn test_empty_program() {
    let parsed = gcode_parse("; nothing\n(here)\n\n");
    assert!(parsed.segments.is_empty());
    assert_eq!(statistics(&parsed, 1000.0).estimated_minutes, 0.0);
}

proptest! {
    #[test]
    fn prop_rapid_moves_are_fast(xs in proptest::collection::vec(-100.0f64..100.0, 1..20)) {
        let program: String = std::iter::once("G0 Z1\n".to_string())
            .chain(xs.iter().map(|x| format!("G0 X{:.3}\n", x)))
            .collect();
        let parsed = gcode_parse(&program);
        prop_assert!(parsed.segments.iter().all(|s| s.speed == MoveSpeed::Fast));
        prop_assert!(parsed.cuts().next().is_none());
    }
}
