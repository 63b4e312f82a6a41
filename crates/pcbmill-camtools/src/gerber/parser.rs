//! Gerber statement tokenizer and state machine.

use super::{Aperture, ApertureMacro, GerberObject, GerberOptions, REGION_GROUP};
use crate::coords::{parse_coordinate, ZeroSuppression};
use geo::{AffineOps, AffineTransform, Coord, LineString, MultiPolygon, Point, Polygon};
use pcbmill_core::{CamError, CamResult, CancellationToken, Units};
use pcbmill_geometry::ops::{self, arc, ArcDirection};
use pcbmill_geometry::{distance, Shape, ShapeRole, Transform};
use regex::Regex;
use std::f64::consts::{FRAC_PI_2, TAU};
use std::sync::OnceLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    /// One `*`-terminated part of a `%...%` block (or a whole `AM` block).
    Extended(String),
    /// An ordinary `*`-terminated statement.
    Word(String),
}

fn push_block(out: &mut Vec<Statement>, content: &str) {
    let content = content.trim();
    if content.starts_with("AM") {
        out.push(Statement::Extended(content.to_string()));
        return;
    }
    for part in content.split('*') {
        let part = part.trim();
        if !part.is_empty() {
            out.push(Statement::Extended(part.to_string()));
        }
    }
}

fn tokenize(text: &str) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_block = false;

    for c in text.chars() {
        match c {
            '%' => {
                if in_block {
                    push_block(&mut out, &current);
                } else if !current.trim().is_empty() {
                    out.push(Statement::Word(current.trim().to_string()));
                }
                current.clear();
                in_block = !in_block;
            }
            '\r' | '\n' => {}
            '*' if !in_block => {
                let word = current.trim();
                if !word.is_empty() {
                    out.push(Statement::Word(word.to_string()));
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !in_block && !current.trim().is_empty() {
        out.push(Statement::Word(current.trim().to_string()));
    }
    out
}

/// Split `G01X100Y-200D01` into letter/value words.
fn split_words(stmt: &str) -> Option<Vec<(char, &str)>> {
    let mut words = Vec::new();
    let bytes = stmt.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let letter = bytes[i] as char;
        if !letter.is_ascii_uppercase() {
            return None;
        }
        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && matches!(bytes[end], b'0'..=b'9' | b'+' | b'-' | b'.') {
            end += 1;
        }
        words.push((letter, &stmt[start..end]));
        i = end;
    }
    Some(words)
}

fn format_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([LTD])?([AI])?X(\d)(\d)Y(\d)(\d)").expect("static format regex")
    })
}

fn aperture_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^D0*(\d+)([^,]+),?(.*)$").expect("static aperture regex"))
}

fn step_repeat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^X(\d+)Y(\d+)I([\d.]+)J([\d.]+)$").expect("static step-repeat regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Dark,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interpolation {
    Linear,
    Cw,
    Ccw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quadrant {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy)]
struct CoordFormat {
    zeros: ZeroSuppression,
    incremental: bool,
    x_int: u32,
    x_frac: u32,
    y_int: u32,
    y_frac: u32,
}

impl Default for CoordFormat {
    fn default() -> Self {
        Self {
            zeros: ZeroSuppression::Leading,
            incremental: false,
            x_int: 3,
            x_frac: 4,
            y_int: 3,
            y_frac: 4,
        }
    }
}

#[derive(Debug, Clone)]
struct StepRepeat {
    x_count: u32,
    y_count: u32,
    dx: f64,
    dy: f64,
    poly_start: usize,
    follow_start: usize,
    fragment_start: usize,
}

struct GerberParser<'o> {
    options: &'o GerberOptions,
    obj: GerberObject,
    format: CoordFormat,
    interpolation: Interpolation,
    quadrant: Option<Quadrant>,
    polarity: Polarity,
    aperture: Option<String>,
    last_op: Option<u32>,
    current: Coord<f64>,
    path: Vec<Coord<f64>>,
    in_region: bool,
    poly_buffer: Vec<Polygon<f64>>,
    follow_buffer: Vec<Shape>,
    solid: MultiPolygon<f64>,
    step_repeat: Option<StepRepeat>,
}

impl<'o> GerberParser<'o> {
    fn new(options: &'o GerberOptions) -> Self {
        Self {
            options,
            obj: GerberObject {
                units: Units::In,
                ..Default::default()
            },
            format: CoordFormat::default(),
            interpolation: Interpolation::Linear,
            quadrant: None,
            polarity: Polarity::Dark,
            aperture: None,
            last_op: None,
            current: Coord { x: 0.0, y: 0.0 },
            path: Vec::new(),
            in_region: false,
            poly_buffer: Vec::new(),
            follow_buffer: Vec::new(),
            solid: ops::empty(),
            step_repeat: None,
        }
    }

    fn warn(&mut self, message: String) {
        warn!("Gerber: {}", message);
        self.obj.warnings.push(message);
    }

    fn run(mut self, text: &str, cancel: &CancellationToken) -> CamResult<GerberObject> {
        for statement in tokenize(text) {
            cancel.check()?;
            match statement {
                Statement::Extended(stmt) => self.extended(&stmt),
                Statement::Word(stmt) => {
                    if self.word(&stmt) {
                        break;
                    }
                }
            }
        }
        self.finish()
    }

    fn extended(&mut self, stmt: &str) {
        if let Some(rest) = stmt.strip_prefix("FS") {
            self.format_spec(rest);
        } else if let Some(rest) = stmt.strip_prefix("MO") {
            match rest {
                "IN" => self.set_units(Units::In),
                "MM" => self.set_units(Units::Mm),
                other => self.warn(format!("unknown unit mode '{}'", other)),
            }
        } else if let Some(rest) = stmt.strip_prefix("AD") {
            self.define_aperture(rest);
        } else if let Some(rest) = stmt.strip_prefix("AM") {
            self.define_macro(rest);
        } else if let Some(rest) = stmt.strip_prefix("LP") {
            match rest {
                "D" => self.set_polarity(Polarity::Dark),
                "C" => self.set_polarity(Polarity::Clear),
                other => self.warn(format!("unknown polarity '{}'", other)),
            }
        } else if let Some(rest) = stmt.strip_prefix("SR") {
            self.step_repeat(rest);
        } else if let Some(rest) = stmt.strip_prefix("IP") {
            if rest == "NEG" {
                self.warn("negative image polarity is not supported, ignored".to_string());
            }
        } else if let Some(rest) = stmt.strip_prefix("OF") {
            let nonzero = split_words(rest)
                .unwrap_or_default()
                .iter()
                .any(|(_, v)| v.parse::<f64>().map_or(false, |v| v != 0.0));
            if nonzero {
                self.warn(format!("image offset '{}' ignored", stmt));
            }
        } else if ["LN", "IN", "TF", "TA", "TO", "TD", "AS", "IR", "MI", "SF"]
            .iter()
            .any(|p| stmt.starts_with(p))
            || stmt.starts_with("G04")
        {
            debug!("Gerber: ignoring '{}'", stmt);
        } else {
            self.warn(format!("unrecognized extended statement '{}'", stmt));
        }
    }

    fn format_spec(&mut self, rest: &str) {
        let Some(caps) = format_regex().captures(rest) else {
            self.warn(format!("malformed format statement 'FS{}'", rest));
            return;
        };
        let digit = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
        self.format = CoordFormat {
            zeros: match caps.get(1).map(|m| m.as_str()) {
                Some("T") => ZeroSuppression::Trailing,
                _ => ZeroSuppression::Leading,
            },
            incremental: caps.get(2).map(|m| m.as_str()) == Some("I"),
            x_int: digit(3),
            x_frac: digit(4),
            y_int: digit(5),
            y_frac: digit(6),
        };
        debug!("Gerber: coordinate format {:?}", self.format);
    }

    fn set_units(&mut self, units: Units) {
        if units == self.obj.units {
            return;
        }
        let factor = self.obj.units.factor_to(units);
        let scale = AffineTransform::scale(factor, factor, Coord { x: 0.0, y: 0.0 });
        for p in &mut self.poly_buffer {
            p.affine_transform_mut(&scale);
        }
        self.follow_buffer.affine(&scale);
        self.solid.affine_transform_mut(&scale);
        self.obj.fragments.affine(&scale);
        for aperture in self.obj.apertures.values_mut() {
            aperture.scale_sizes(factor);
        }
        self.current = self.current * factor;
        for c in &mut self.path {
            *c = *c * factor;
        }
        if let Some(sr) = &mut self.step_repeat {
            sr.dx *= factor;
            sr.dy *= factor;
        }
        self.obj.units = units;
    }

    fn define_aperture(&mut self, rest: &str) {
        let Some(caps) = aperture_regex().captures(rest) else {
            self.warn(format!("malformed aperture definition 'AD{}'", rest));
            return;
        };
        let code = caps[1].to_string();
        match Aperture::parse_definition(caps[2].trim(), &caps[3]) {
            Ok(aperture) => {
                debug!("Gerber: aperture D{} = {:?}", code, aperture.kind);
                self.obj.apertures.insert(code, aperture);
            }
            Err(e) => self.warn(format!("aperture D{} skipped: {}", code, e)),
        }
    }

    fn define_macro(&mut self, rest: &str) {
        let (name, body) = rest.split_once('*').unwrap_or((rest, ""));
        match ApertureMacro::parse(name.trim(), body) {
            Ok(m) => {
                self.obj.macros.insert(m.name.clone(), m);
            }
            Err(e) => self.warn(format!("macro '{}' skipped: {}", name, e)),
        }
    }

    fn set_polarity(&mut self, polarity: Polarity) {
        if polarity == self.polarity {
            return;
        }
        self.fold_buffer();
        self.polarity = polarity;
    }

    fn step_repeat(&mut self, rest: &str) {
        self.flush_path();
        if self.step_repeat.is_some() {
            self.replicate_block();
            self.step_repeat = None;
        }
        if rest.is_empty() {
            return;
        }
        let Some(caps) = step_repeat_regex().captures(rest) else {
            self.warn(format!("malformed step-repeat 'SR{}'", rest));
            return;
        };
        let x_count: u32 = caps[1].parse().unwrap_or(1);
        let y_count: u32 = caps[2].parse().unwrap_or(1);
        if x_count <= 1 && y_count <= 1 {
            return;
        }
        self.step_repeat = Some(StepRepeat {
            x_count: x_count.max(1),
            y_count: y_count.max(1),
            dx: caps[3].parse().unwrap_or(0.0),
            dy: caps[4].parse().unwrap_or(0.0),
            poly_start: self.poly_buffer.len(),
            follow_start: self.follow_buffer.len(),
            fragment_start: self.obj.fragments.len(),
        });
    }

    /// Copy the fragments of the open step-repeat block to every other cell.
    fn replicate_block(&mut self) {
        let Some(sr) = self.step_repeat.clone() else {
            return;
        };
        let polys: Vec<Polygon<f64>> = self.poly_buffer[sr.poly_start..].to_vec();
        let follows: Vec<Shape> = self.follow_buffer[sr.follow_start..].to_vec();
        let fragments: Vec<_> = self
            .obj
            .fragments
            .iter()
            .skip(sr.fragment_start)
            .map(|e| (e.group.clone(), e.role, e.shape.clone()))
            .collect();
        for ix in 0..sr.x_count {
            for iy in 0..sr.y_count {
                if ix == 0 && iy == 0 {
                    continue;
                }
                let shift = AffineTransform::translate(ix as f64 * sr.dx, iy as f64 * sr.dy);
                self.poly_buffer
                    .extend(polys.iter().map(|p| p.affine_transform(&shift)));
                for f in &follows {
                    let mut f = f.clone();
                    f.affine(&shift);
                    self.follow_buffer.push(f);
                }
                for (group, role, shape) in &fragments {
                    let mut shape = shape.clone();
                    shape.affine(&shift);
                    self.obj.fragments.insert(group.clone(), *role, shape);
                }
            }
        }
        if let Some(open) = &mut self.step_repeat {
            open.poly_start = self.poly_buffer.len();
            open.follow_start = self.follow_buffer.len();
            open.fragment_start = self.obj.fragments.len();
        }
    }

    fn coordinate(&mut self, letter: char, raw: &str) -> Option<f64> {
        let (int, frac) = match letter {
            'X' | 'I' => (self.format.x_int, self.format.x_frac),
            _ => (self.format.y_int, self.format.y_frac),
        };
        parse_coordinate(raw, int, frac, self.format.zeros)
    }

    /// Handle one ordinary statement. Returns true at end of file.
    fn word(&mut self, stmt: &str) -> bool {
        if stmt.starts_with("G04") || stmt.starts_with("G4 ") {
            return false;
        }
        let Some(words) = split_words(stmt) else {
            self.warn(format!("unrecognized statement '{}'", stmt));
            return false;
        };

        let (mut x, mut y, mut i, mut j) = (None, None, 0.0, 0.0);
        let mut op = None;
        for (letter, value) in words {
            match letter {
                'G' => {
                    let Ok(code) = value.parse::<u32>() else {
                        self.warn(format!("malformed G code in '{}'", stmt));
                        return false;
                    };
                    self.g_code(code);
                }
                'D' => match value.parse::<u32>() {
                    Ok(code) if code >= 10 => self.select_aperture(code.to_string()),
                    Ok(code) => op = Some(code),
                    Err(_) => {
                        self.warn(format!("malformed D code in '{}'", stmt));
                        return false;
                    }
                },
                'M' => match value.parse::<u32>() {
                    Ok(0) | Ok(2) => return true,
                    _ => {}
                },
                'X' | 'Y' | 'I' | 'J' => {
                    let Some(v) = self.coordinate(letter, value) else {
                        self.warn(format!("malformed coordinate in '{}', statement skipped", stmt));
                        return false;
                    };
                    match letter {
                        'X' => x = Some(v),
                        'Y' => y = Some(v),
                        'I' => i = v,
                        _ => j = v,
                    }
                }
                other => self.warn(format!("unknown word '{}' in '{}'", other, stmt)),
            }
        }

        let has_coordinates = x.is_some() || y.is_some() || i != 0.0 || j != 0.0;
        let op = match op {
            Some(op) => Some(op),
            None if has_coordinates => self.last_op,
            None => None,
        };
        let Some(op) = op else {
            return false;
        };
        self.last_op = Some(op);

        let target = if self.format.incremental {
            Coord {
                x: self.current.x + x.unwrap_or(0.0),
                y: self.current.y + y.unwrap_or(0.0),
            }
        } else {
            Coord {
                x: x.unwrap_or(self.current.x),
                y: y.unwrap_or(self.current.y),
            }
        };

        match op {
            1 => self.interpolate(target, i, j),
            2 => self.move_to(target),
            3 => {
                self.flush_path();
                self.current = target;
                self.flash(target);
            }
            other => self.warn(format!("unknown operation D{:02}", other)),
        }
        false
    }

    fn g_code(&mut self, code: u32) {
        match code {
            1 => self.interpolation = Interpolation::Linear,
            2 => self.interpolation = Interpolation::Cw,
            3 => self.interpolation = Interpolation::Ccw,
            36 => {
                self.flush_path();
                self.in_region = true;
            }
            37 => {
                self.close_region_contour();
                self.in_region = false;
            }
            74 => self.quadrant = Some(Quadrant::Single),
            75 => self.quadrant = Some(Quadrant::Multi),
            70 => self.set_units(Units::In),
            71 => self.set_units(Units::Mm),
            90 => self.format.incremental = false,
            91 => self.format.incremental = true,
            54 | 55 => {}
            other => self.warn(format!("unsupported G{:02}", other)),
        }
    }

    fn select_aperture(&mut self, code: String) {
        self.flush_path();
        if !self.obj.apertures.contains_key(&code) {
            self.warn(format!("aperture D{} selected before definition", code));
        }
        self.aperture = Some(code);
    }

    fn interpolate(&mut self, target: Coord<f64>, i: f64, j: f64) {
        if self.path.is_empty() {
            self.path.push(self.current);
        }
        match self.interpolation {
            Interpolation::Linear => self.path.push(target),
            Interpolation::Cw | Interpolation::Ccw => {
                match self.arc_points(target, i, j) {
                    Some(points) => self.path.extend(points.into_iter().skip(1)),
                    None => self.flush_path(),
                }
            }
        }
        self.current = target;
    }

    fn arc_points(&mut self, target: Coord<f64>, i: f64, j: f64) -> Option<Vec<Coord<f64>>> {
        let direction = match self.interpolation {
            Interpolation::Cw => ArcDirection::Cw,
            _ => ArcDirection::Ccw,
        };
        let steps = self.options.steps_per_circle;
        let start = self.current;
        let angle = |c: Coord<f64>, center: Coord<f64>| (c.y - center.y).atan2(c.x - center.x);

        let Some(quadrant) = self.quadrant else {
            self.warn("arc without G74/G75 quadrant mode skipped".to_string());
            return None;
        };

        let mut points = match quadrant {
            Quadrant::Multi => {
                let center = Coord {
                    x: start.x + i,
                    y: start.y + j,
                };
                let radius = distance(start, center);
                arc(center, radius, angle(start, center), angle(target, center), direction, steps)
            }
            Quadrant::Single => {
                let candidates = [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];
                let found = candidates.iter().find_map(|(si, sj)| {
                    let center = Coord {
                        x: start.x + si * i.abs(),
                        y: start.y + sj * j.abs(),
                    };
                    let r0 = distance(start, center);
                    let r1 = distance(target, center);
                    if r0 == 0.0 || (r1 - r0).abs() > 0.05 * r0 {
                        return None;
                    }
                    let (a0, a1) = (angle(start, center), angle(target, center));
                    let sweep = match direction {
                        ArcDirection::Ccw => (a1 - a0).rem_euclid(TAU),
                        ArcDirection::Cw => (a0 - a1).rem_euclid(TAU),
                    };
                    (sweep <= FRAC_PI_2 + 1e-9).then_some((center, r0, a0, a1, sweep))
                });
                match found {
                    Some((_, _, _, _, sweep)) if sweep == 0.0 => vec![start, target],
                    Some((center, radius, a0, a1, _)) => arc(center, radius, a0, a1, direction, steps),
                    None => {
                        self.warn("single-quadrant arc has no valid center, skipped".to_string());
                        return None;
                    }
                }
            }
        };
        if let Some(last) = points.last_mut() {
            *last = target;
        }
        Some(points)
    }

    fn move_to(&mut self, target: Coord<f64>) {
        if self.in_region {
            self.close_region_contour();
        } else {
            self.flush_path();
        }
        self.current = target;
    }

    fn solid_role(&self) -> ShapeRole {
        match self.polarity {
            Polarity::Dark => ShapeRole::Solid,
            Polarity::Clear => ShapeRole::Clear,
        }
    }

    fn push_solid(&mut self, group: &str, shape: MultiPolygon<f64>) {
        let role = self.solid_role();
        for polygon in shape.0 {
            self.obj
                .fragments
                .insert(group.to_string(), role, Shape::Polygon(polygon.clone()));
            self.poly_buffer.push(polygon);
        }
    }

    fn push_follow(&mut self, group: &str, shape: Shape) {
        self.obj
            .fragments
            .insert(group.to_string(), ShapeRole::Follow, shape.clone());
        self.follow_buffer.push(shape);
    }

    /// Stroke the pending path with the current aperture.
    fn flush_path(&mut self) {
        if self.in_region {
            return;
        }
        let path = std::mem::take(&mut self.path);
        if path.len() < 2 {
            return;
        }
        let Some(code) = self.aperture.clone() else {
            self.warn("path drawn without an aperture, dropped".to_string());
            return;
        };
        let line = LineString::new(path);
        let steps = self.options.steps_per_circle;
        let stroked = match self.obj.apertures.get_mut(&code) {
            Some(aperture) if aperture.is_round() => Ok(ops::stroke(&line, aperture.size(), steps)),
            Some(aperture) => aperture
                .stroke_outline(&self.obj.macros)
                .map(|outline| ops::sweep(&outline, &line)),
            None => Err(CamError::parse_failed("Gerber", format!("undefined aperture D{}", code))),
        };
        match stroked {
            Ok(solid) => {
                self.push_follow(&code, Shape::Path(line));
                self.push_solid(&code, solid);
            }
            Err(e) => self.warn(format!("path with D{} dropped: {}", code, e)),
        }
    }

    fn flash(&mut self, at: Coord<f64>) {
        let Some(code) = self.aperture.clone() else {
            self.warn("flash without an aperture, dropped".to_string());
            return;
        };
        let shape = match self.obj.apertures.get_mut(&code) {
            Some(aperture) => aperture.flash_shape(&self.obj.macros),
            None => Err(CamError::parse_failed("Gerber", format!("undefined aperture D{}", code))),
        };
        match shape {
            Ok(mut shape) => {
                shape.affine_transform_mut(&AffineTransform::translate(at.x, at.y));
                self.push_follow(&code, Shape::Point(Point::from(at)));
                self.push_solid(&code, shape);
            }
            Err(e) => self.warn(format!("flash of D{} dropped: {}", code, e)),
        }
    }

    /// Close the contour being drawn inside a region into a polygon.
    fn close_region_contour(&mut self) {
        let contour = std::mem::take(&mut self.path);
        if contour.len() < 3 {
            return;
        }
        let polygon = Polygon::new(LineString::new(contour), vec![]);
        let outline = polygon.exterior().clone();
        let repaired = ops::make_valid(polygon);
        self.push_follow(REGION_GROUP, Shape::Path(outline));
        self.push_solid(REGION_GROUP, repaired);
    }

    /// Merge the buffered polygons into the running solid with the current
    /// polarity.
    fn fold_buffer(&mut self) {
        self.flush_path();
        self.replicate_block();
        if let Some(open) = &mut self.step_repeat {
            open.poly_start = 0;
        }
        if self.poly_buffer.is_empty() {
            return;
        }
        let polygons = std::mem::take(&mut self.poly_buffer);
        let merged = if polygons.len() > self.options.merge_threshold {
            ops::merge_buffered(polygons, self.options.merge_tolerance)
        } else {
            ops::union_all(polygons)
        };
        self.solid = match self.polarity {
            Polarity::Dark => ops::union(&self.solid, &merged),
            Polarity::Clear => ops::difference(&self.solid, &merged),
        };
    }

    fn finish(mut self) -> CamResult<GerberObject> {
        if self.in_region {
            self.warn("region not closed before end of file".to_string());
            self.close_region_contour();
            self.in_region = false;
        }
        self.flush_path();
        self.fold_buffer();
        self.step_repeat = None;

        if self.solid.0.is_empty() && self.follow_buffer.is_empty() {
            return Err(CamError::parse_failed("Gerber", "no drawable geometry"));
        }
        let mut obj = self.obj;
        obj.solid = vec![Shape::MultiPolygon(self.solid)];
        obj.follow = self.follow_buffer;
        debug!(
            "Gerber: {} apertures, {} follow shapes, {} warnings",
            obj.apertures.len(),
            obj.follow.len(),
            obj.warnings.len()
        );
        Ok(obj)
    }
}

/// Parse Gerber text with default options.
pub fn parse(text: &str, cancel: &CancellationToken) -> CamResult<GerberObject> {
    parse_with_options(text, &GerberOptions::default(), cancel)
}

pub fn parse_with_options(
    text: &str,
    options: &GerberOptions,
    cancel: &CancellationToken,
) -> CamResult<GerberObject> {
    GerberParser::new(options).run(text, cancel)
}
