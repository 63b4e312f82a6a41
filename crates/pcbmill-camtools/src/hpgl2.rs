//! HPGL2 plot import.
//!
//! Pen-down strokes become paths grouped by pen number. Coordinates are
//! plotter units (0.025 mm) and the result is always in millimeters.

use geo::{AffineTransform, Coord, LineString};
use pcbmill_core::{CamError, CamResult, CancellationToken, Units};
use pcbmill_geometry::ops::{arc, ArcDirection, STEPS_PER_CIRCLE};
use pcbmill_geometry::{distance, try_bounds, Bounds, ConvertUnits, GeometryObject, Shape, Transform};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Millimeters per plotter unit.
pub const PLOTTER_UNIT_MM: f64 = 0.025;

#[derive(Debug, Clone, Default)]
pub struct Hpgl2Object {
    pub units: Units,
    /// Strokes keyed by the pen that drew them.
    pub pens: BTreeMap<u32, Vec<LineString<f64>>>,
    pub warnings: Vec<String>,
}

impl Hpgl2Object {
    pub fn paths(&self) -> impl Iterator<Item = &LineString<f64>> {
        self.pens.values().flatten()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let shapes: Vec<Shape> = self.paths().cloned().map(Shape::Path).collect();
        try_bounds(shapes.iter())
    }

    /// Every stroke as a path in one geometry object.
    pub fn to_geometry(&self) -> GeometryObject {
        GeometryObject::with_solid(self.units, self.paths().cloned().map(Shape::Path).collect())
    }
}

impl Transform for Hpgl2Object {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        for path in self.pens.values_mut().flatten() {
            path.0.iter_mut().for_each(|c| *c = transform.apply(*c));
        }
    }
}

impl ConvertUnits for Hpgl2Object {
    fn units(&self) -> Units {
        self.units
    }

    fn set_units(&mut self, units: Units) {
        self.units = units;
    }
}

struct Hpgl2Parser {
    obj: Hpgl2Object,
    absolute: bool,
    pen_down: bool,
    pen: u32,
    /// Current position in millimeters.
    current: Coord<f64>,
    path: Vec<Coord<f64>>,
}

fn numbers(args: &str) -> Option<Vec<f64>> {
    args.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok())
        .collect()
}

impl Hpgl2Parser {
    fn new() -> Self {
        Self {
            obj: Hpgl2Object {
                units: Units::Mm,
                ..Default::default()
            },
            absolute: true,
            pen_down: false,
            pen: 1,
            current: Coord { x: 0.0, y: 0.0 },
            path: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        warn!("HPGL2: {}", message);
        self.obj.warnings.push(message);
    }

    fn run(mut self, text: &str, cancel: &CancellationToken) -> CamResult<Hpgl2Object> {
        for command in text.split(';') {
            cancel.check()?;
            let command = command.trim();
            if command.len() < 2 {
                continue;
            }
            if !command.is_char_boundary(2) {
                self.warn(format!("unrecognized command '{}', skipped", command));
                continue;
            }
            let (mnemonic, args) = command.split_at(2);
            self.command(&mnemonic.to_ascii_uppercase(), args.trim());
        }
        self.flush();
        if self.obj.pens.is_empty() {
            return Err(CamError::parse_failed("HPGL2", "no pen-down strokes found"));
        }
        debug!(
            "HPGL2: {} pens, {} strokes",
            self.obj.pens.len(),
            self.obj.paths().count()
        );
        Ok(self.obj)
    }

    fn command(&mut self, mnemonic: &str, args: &str) {
        if mnemonic == "CO" {
            return;
        }
        let Some(values) = numbers(args) else {
            self.warn(format!("malformed parameters in '{}{}', skipped", mnemonic, args));
            return;
        };
        match mnemonic {
            "IN" => {
                self.flush();
                self.absolute = true;
                self.pen_down = false;
                self.current = Coord { x: 0.0, y: 0.0 };
            }
            "PA" => {
                self.absolute = true;
                self.moves(&values);
            }
            "PR" => {
                self.absolute = false;
                self.moves(&values);
            }
            "PU" => {
                self.flush();
                self.pen_down = false;
                self.moves(&values);
            }
            "PD" => {
                self.pen_down = true;
                self.moves(&values);
            }
            "SP" => {
                self.flush();
                self.pen = values.first().map(|p| *p as u32).unwrap_or(0);
            }
            "CI" => match values.first() {
                Some(r) => self.circle(r * PLOTTER_UNIT_MM),
                None => self.warn("CI without radius".to_string()),
            },
            "AA" | "AR" => {
                if values.len() < 3 {
                    self.warn(format!("{} needs center and sweep", mnemonic));
                    return;
                }
                let (cx, cy) = (values[0] * PLOTTER_UNIT_MM, values[1] * PLOTTER_UNIT_MM);
                let center = if mnemonic == "AA" {
                    Coord { x: cx, y: cy }
                } else {
                    Coord {
                        x: self.current.x + cx,
                        y: self.current.y + cy,
                    }
                };
                self.sweep_arc(center, values[2]);
            }
            "AT" => {
                if values.len() < 4 {
                    self.warn("AT needs two points".to_string());
                    return;
                }
                let through = Coord {
                    x: values[0] * PLOTTER_UNIT_MM,
                    y: values[1] * PLOTTER_UNIT_MM,
                };
                let end = Coord {
                    x: values[2] * PLOTTER_UNIT_MM,
                    y: values[3] * PLOTTER_UNIT_MM,
                };
                self.three_point_arc(through, end);
            }
            "SC" | "IP" | "IW" | "RO" | "LT" | "PW" | "WU" | "NP" | "PS" | "BP" | "PG" => {
                debug!("HPGL2: '{}' ignored", mnemonic);
            }
            other => debug!("HPGL2: unsupported command '{}'", other),
        }
    }

    fn moves(&mut self, values: &[f64]) {
        for pair in values.chunks_exact(2) {
            let (x, y) = (pair[0] * PLOTTER_UNIT_MM, pair[1] * PLOTTER_UNIT_MM);
            let target = if self.absolute {
                Coord { x, y }
            } else {
                Coord {
                    x: self.current.x + x,
                    y: self.current.y + y,
                }
            };
            self.line_to(target);
        }
    }

    fn line_to(&mut self, target: Coord<f64>) {
        if self.pen_down {
            if self.path.is_empty() {
                self.path.push(self.current);
            }
            self.path.push(target);
        }
        self.current = target;
    }

    fn flush(&mut self) {
        let path = std::mem::take(&mut self.path);
        if path.len() >= 2 {
            self.obj.pens.entry(self.pen).or_default().push(LineString::new(path));
        }
    }

    /// `CI` draws a full circle around the pen without moving it.
    fn circle(&mut self, radius: f64) {
        if radius <= 0.0 {
            return;
        }
        self.flush();
        let mut points = arc(self.current, radius, 0.0, 0.0, ArcDirection::Ccw, STEPS_PER_CIRCLE);
        if let (Some(first), Some(last)) = (points.first().copied(), points.last_mut()) {
            *last = first;
        }
        self.obj.pens.entry(self.pen).or_default().push(LineString::new(points));
    }

    fn sweep_arc(&mut self, center: Coord<f64>, sweep_degrees: f64) {
        let radius = distance(center, self.current);
        if radius == 0.0 || sweep_degrees == 0.0 {
            return;
        }
        let start = (self.current.y - center.y).atan2(self.current.x - center.x);
        let sweep = sweep_degrees.clamp(-360.0, 360.0).to_radians();
        let direction = if sweep > 0.0 {
            ArcDirection::Ccw
        } else {
            ArcDirection::Cw
        };
        let points = arc(center, radius, start, start + sweep, direction, STEPS_PER_CIRCLE);
        for p in points.into_iter().skip(1) {
            self.line_to(p);
        }
    }

    fn three_point_arc(&mut self, through: Coord<f64>, end: Coord<f64>) {
        let (a, b, c) = (self.current, through, end);
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() < 1e-12 {
            self.line_to(end);
            return;
        }
        let sq = |p: Coord<f64>| p.x * p.x + p.y * p.y;
        let center = Coord {
            x: (sq(a) * (b.y - c.y) + sq(b) * (c.y - a.y) + sq(c) * (a.y - b.y)) / d,
            y: (sq(a) * (c.x - b.x) + sq(b) * (a.x - c.x) + sq(c) * (b.x - a.x)) / d,
        };
        let angle = |p: Coord<f64>| (p.y - center.y).atan2(p.x - center.x);
        let (a0, a1, a2) = (angle(a), angle(b), angle(c));
        // Counter-clockwise when the through point lies on the ccw sweep to the end.
        let ccw = (a1 - a0).rem_euclid(std::f64::consts::TAU) < (a2 - a0).rem_euclid(std::f64::consts::TAU);
        let sweep = if ccw {
            (a2 - a0).rem_euclid(std::f64::consts::TAU)
        } else {
            -(a0 - a2).rem_euclid(std::f64::consts::TAU)
        };
        self.sweep_arc(center, sweep.to_degrees());
        self.current = end;
        if let Some(last) = self.path.last_mut() {
            *last = end;
        }
    }
}

/// Parse HPGL2 text into per-pen strokes in millimeters.
pub fn parse(text: &str, cancel: &CancellationToken) -> CamResult<Hpgl2Object> {
    Hpgl2Parser::new().run(text, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> Hpgl2Object {
        parse(text, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_square_in_plotter_units() {
        let obj = parse_ok("IN;SP1;PU0,0;PD400,0,400,400,0,400,0,0;PU;");
        assert_eq!(obj.units, Units::Mm);
        let paths: Vec<_> = obj.paths().collect();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].0.len(), 5);
        let b = obj.bounds().unwrap();
        assert!((b.max_x - 10.0).abs() < 1e-9);
        assert!((b.max_y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_relative_moves_and_pens() {
        let obj = parse_ok("IN;SP1;PA0,0;PD;PR40,0;PU;SP2;PA0,40;PD;PR0,40;PU;");
        assert_eq!(obj.pens.len(), 2);
        let end = *obj.pens[&2][0].0.last().unwrap();
        assert!(end.x.abs() < 1e-9 && (end.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_circle_and_arcs() {
        let obj = parse_ok("IN;SP1;PA400,400;CI40;PU0,0;PD;AA0,40,180;PU;PA100,0;PD;AT140,40,180,0;PU;");
        let b = obj.bounds().unwrap();
        assert!((b.max_y - 11.0).abs() < 1e-6);
        let strokes: Vec<_> = obj.paths().collect();
        assert_eq!(strokes.len(), 3);
        let semicircle = strokes[1];
        let end = *semicircle.0.last().unwrap();
        assert!((end.x - 0.0).abs() < 1e-9 && (end.y - 2.0).abs() < 1e-9);
        let three_point = strokes[2];
        let end = *three_point.0.last().unwrap();
        assert!((end.x - 4.5).abs() < 1e-9 && end.y.abs() < 1e-9);
        assert!(three_point.0.iter().any(|c| c.y > 0.9));
    }

    #[test]
    fn test_non_ascii_mnemonic_is_skipped() {
        let obj = parse_ok("IN;SP1;PD0,0,40,0;PU;X\u{e9}1;\u{e9}\u{e9};");
        assert_eq!(obj.paths().count(), 1);
        assert!(obj.warnings.iter().any(|w| w.contains("unrecognized command")));
    }

    #[test]
    fn test_no_strokes_fails() {
        let err = parse("IN;PU100,100;", &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CamError::ParseFailed { .. }));
    }
}
