//! G-code reverse parser with modal state tracking
//!
//! Reads generated G-code line by line, keeps the modal state (motion mode,
//! distance mode, units, feed, tool) and rebuilds every motion as a
//! [`Segment`] tagged by whether the tool is above the stock and whether the
//! move was rapid.

use geo::{Coord, LineString};
use pcbmill_core::Units;
use pcbmill_geometry::ops::{arc, ArcDirection, STEPS_PER_CIRCLE};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Where a move ends: above the stock (Z > 0) or in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    Travel,
    Cut,
}

/// Rapid (G0) or feed-rate (G1/G2/G3) motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveSpeed {
    Fast,
    Slow,
}

/// One motion command, flattened to a polyline in XY.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub path: LineString<f64>,
    pub z_start: f64,
    pub z_end: f64,
    pub kind: MoveKind,
    pub speed: MoveSpeed,
    /// Active F word; zero until the program sets one.
    pub feed_rate: f64,
    pub tool: u32,
    /// 1-based source line.
    pub line: usize,
}

impl Segment {
    pub fn xy_length(&self) -> f64 {
        self.path
            .lines()
            .map(|l| (l.end.x - l.start.x).hypot(l.end.y - l.start.y))
            .sum()
    }

    /// Length including the Z component.
    pub fn length(&self) -> f64 {
        self.xy_length().hypot(self.z_end - self.z_start)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedGcode {
    pub units: Units,
    pub segments: Vec<Segment>,
    pub warnings: Vec<String>,
}

impl ParsedGcode {
    pub fn cuts(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.kind == MoveKind::Cut)
    }

    pub fn travels(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.kind == MoveKind::Travel)
    }
}

/// Modal state carried from line to line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GcodeState {
    /// Motion mode - Group 1 (0=rapid, 1=linear, 2=arc CW, 3=arc CCW)
    pub motion_mode: u8,

    /// Distance mode - Group 3 (G90=absolute, G91=incremental)
    pub distance_mode: u8,

    /// Units mode - Group 6 (G20=inches, G21=millimeters)
    pub units_mode: u8,

    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Current feed rate (F value)
    pub feed_rate: f64,

    /// Tool number (T value)
    pub tool_number: u32,
}

impl Default for GcodeState {
    fn default() -> Self {
        Self {
            motion_mode: 0,    // G00
            distance_mode: 90, // G90
            units_mode: 21,    // G21
            x: 0.0,
            y: 0.0,
            z: 0.0,
            feed_rate: 0.0,
            tool_number: 0,
        }
    }
}

impl GcodeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn units(&self) -> Units {
        if self.units_mode == 20 {
            Units::In
        } else {
            Units::Mm
        }
    }

    fn target(&self, axis: Option<f64>, current: f64) -> f64 {
        match (axis, self.distance_mode) {
            (Some(v), 91) => current + v,
            (Some(v), _) => v,
            (None, _) => current,
        }
    }
}

fn comment_regex() -> &'static Regex {
    static COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    COMMENT_REGEX.get_or_init(|| Regex::new(r"\([^)]*\)|;.*").expect("invalid regex pattern"))
}

fn word_regex() -> &'static Regex {
    static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
    WORD_REGEX.get_or_init(|| {
        Regex::new(r"([A-Z])\s*([-+]?(?:\d+\.?\d*|\.\d+))").expect("invalid regex pattern")
    })
}

/// Letter/value pairs of one line, comments removed. A letter may repeat
/// (`G90 G21`).
fn fields(line: &str) -> Vec<(char, f64)> {
    let upper = line.to_ascii_uppercase();
    let cleaned = comment_regex().replace_all(&upper, "");
    word_regex()
        .captures_iter(&cleaned)
        .filter_map(|caps| {
            let letter = caps.get(1)?.as_str().chars().next()?;
            let value = caps.get(2)?.as_str().parse::<f64>().ok()?;
            Some((letter, value))
        })
        .collect()
}

fn word(fields: &[(char, f64)], letter: char) -> Option<f64> {
    fields.iter().find(|(l, _)| *l == letter).map(|(_, v)| *v)
}

fn coord(x: f64, y: f64) -> Coord<f64> {
    Coord { x, y }
}

fn arc_path(
    start: Coord<f64>,
    end: Coord<f64>,
    center: Coord<f64>,
    direction: ArcDirection,
) -> Vec<Coord<f64>> {
    let radius = (start.x - center.x).hypot(start.y - center.y);
    let a0 = (start.y - center.y).atan2(start.x - center.x);
    let a1 = (end.y - center.y).atan2(end.x - center.x);
    let mut points = arc(center, radius, a0, a1, direction, STEPS_PER_CIRCLE);
    if let Some(last) = points.last_mut() {
        *last = end;
    }
    if let Some(first) = points.first_mut() {
        *first = start;
    }
    points
}

/// Parse G-code text into motion segments.
///
/// Unknown words are ignored. A linear move that changes Z and XY at once is
/// kept but reported as a warning, since generated jobs never do that.
pub fn gcode_parse(text: &str) -> ParsedGcode {
    let mut state = GcodeState::new();
    let mut parsed = ParsedGcode::default();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let words = fields(raw);
        if words.is_empty() {
            continue;
        }

        let mut moves = true;
        for (letter, value) in &words {
            match letter {
                'G' => match value.round() as i64 {
                    code @ 0..=3 => state.motion_mode = code as u8,
                    20 => state.units_mode = 20,
                    21 => state.units_mode = 21,
                    90 => state.distance_mode = 90,
                    91 => state.distance_mode = 91,
                    4 | 10 | 28 | 30 | 53 => moves = false,
                    92 => {
                        // Redefines the current position.
                        state.x = word(&words, 'X').unwrap_or(state.x);
                        state.y = word(&words, 'Y').unwrap_or(state.y);
                        state.z = word(&words, 'Z').unwrap_or(state.z);
                        moves = false;
                    }
                    other => debug!("Line {}: ignoring G{}", line_no, other),
                },
                'F' => state.feed_rate = *value,
                'T' => state.tool_number = value.max(0.0) as u32,
                _ => {}
            }
        }

        let (x, y, z) = (word(&words, 'X'), word(&words, 'Y'), word(&words, 'Z'));
        if !moves || (x.is_none() && y.is_none() && z.is_none()) {
            continue;
        }

        let start = coord(state.x, state.y);
        let end = coord(state.target(x, state.x), state.target(y, state.y));
        let z_start = state.z;
        let z_end = state.target(z, state.z);
        let xy_moved = start != end;

        let points = match state.motion_mode {
            2 | 3 if xy_moved || word(&words, 'I').is_some() || word(&words, 'J').is_some() => {
                let center = coord(
                    start.x + word(&words, 'I').unwrap_or(0.0),
                    start.y + word(&words, 'J').unwrap_or(0.0),
                );
                let direction = if state.motion_mode == 2 {
                    ArcDirection::Cw
                } else {
                    ArcDirection::Ccw
                };
                arc_path(start, end, center, direction)
            }
            _ => {
                if xy_moved && z_start != z_end {
                    let message = format!(
                        "Line {}: non-orthogonal move from Z{} to Z{} while moving in XY",
                        line_no, z_start, z_end
                    );
                    warn!("{}", message);
                    parsed.warnings.push(message);
                }
                vec![start, end]
            }
        };

        let kind = if z_end > 0.0 {
            MoveKind::Travel
        } else {
            MoveKind::Cut
        };
        let speed = if state.motion_mode == 0 {
            MoveSpeed::Fast
        } else {
            MoveSpeed::Slow
        };
        parsed.segments.push(Segment {
            path: LineString::new(points),
            z_start,
            z_end,
            kind,
            speed,
            feed_rate: state.feed_rate,
            tool: state.tool_number,
            line: line_no,
        });

        state.x = end.x;
        state.y = end.y;
        state.z = z_end;
    }

    parsed.units = state.units();
    debug!(
        "Parsed {} segments ({} warnings)",
        parsed.segments.len(),
        parsed.warnings.len()
    );
    parsed
}
