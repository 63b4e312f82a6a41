//! Aperture macros.
//!
//! A macro is parsed once when `%AM` is seen and evaluated each time an
//! aperture instantiates it with a modifier list. Evaluation binds `$1..$n`
//! from the modifiers, runs assignments and primitives in source order, and
//! folds every primitive into the result: exposure on unions, exposure off
//! subtracts.

use geo::{AffineOps, AffineTransform, Coord, LineString, MultiPolygon, Polygon};
use pcbmill_core::{CamError, CamResult};
use pcbmill_geometry::ops::{self, circle, STEPS_PER_CIRCLE};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
enum MacroPart {
    Comment,
    Assign { var: u32, expr: String },
    Primitive { code: u32, args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApertureMacro {
    pub name: String,
    /// Macro body as written, without the `AM<name>*` header.
    pub raw: String,
    parts: Vec<MacroPart>,
}

fn macro_error(reason: impl Into<String>) -> CamError {
    CamError::parse_failed("Gerber", reason)
}

impl ApertureMacro {
    pub fn parse(name: &str, raw: &str) -> CamResult<Self> {
        let mut parts = Vec::new();
        for part in raw.split('*') {
            let part: String = part.chars().filter(|c| !c.is_whitespace() || *c == ' ').collect();
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part.starts_with('0') && !part[1..].starts_with(|c: char| c.is_ascii_digit()) {
                parts.push(MacroPart::Comment);
            } else if let Some(rest) = part.strip_prefix('$') {
                let (var, expr) = rest
                    .split_once('=')
                    .ok_or_else(|| macro_error(format!("bad assignment '{}'", part)))?;
                let var = var
                    .trim()
                    .parse()
                    .map_err(|_| macro_error(format!("bad variable in '{}'", part)))?;
                parts.push(MacroPart::Assign {
                    var,
                    expr: expr.to_string(),
                });
            } else {
                let mut fields = part.split(',');
                let code = fields
                    .next()
                    .and_then(|c| c.trim().parse().ok())
                    .ok_or_else(|| macro_error(format!("bad primitive '{}'", part)))?;
                parts.push(MacroPart::Primitive {
                    code,
                    args: fields.map(|f| f.trim().to_string()).collect(),
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn primitive_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, MacroPart::Primitive { .. }))
            .count()
    }

    /// Build the macro shape, centered on the origin, for `modifiers`.
    pub fn evaluate(&self, modifiers: &[f64]) -> CamResult<MultiPolygon<f64>> {
        let mut vars: HashMap<u32, f64> = modifiers
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u32 + 1, *v))
            .collect();
        let mut result = ops::empty();

        for part in &self.parts {
            match part {
                MacroPart::Comment => {}
                MacroPart::Assign { var, expr } => {
                    let value = evaluate_expression(expr, &vars)?;
                    vars.insert(*var, value);
                }
                MacroPart::Primitive { code, args } => {
                    let values = args
                        .iter()
                        .map(|a| evaluate_expression(a, &vars))
                        .collect::<CamResult<Vec<f64>>>()?;
                    let (shape, exposure) = match primitive(*code, &values) {
                        Ok(p) => p,
                        Err(reason) => {
                            warn!("Macro {}: skipping primitive {}: {}", self.name, code, reason);
                            continue;
                        }
                    };
                    result = if exposure {
                        ops::union(&result, &shape)
                    } else {
                        ops::difference(&result, &shape)
                    };
                }
            }
        }
        Ok(result)
    }
}

/// Gerber allows 3 to 12 polygon vertices.
const MAX_POLYGON_VERTICES: usize = 12;

const MAX_MOIRE_RINGS: usize = 100;

fn arg(values: &[f64], i: usize) -> f64 {
    values.get(i).copied().unwrap_or(0.0)
}

fn rect(min: Coord<f64>, max: Coord<f64>) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (min.x, min.y),
            (max.x, min.y),
            (max.x, max.y),
            (min.x, max.y),
        ]),
        vec![],
    )
}

fn centered_rect(center: Coord<f64>, width: f64, height: f64) -> Polygon<f64> {
    let half = Coord {
        x: width / 2.0,
        y: height / 2.0,
    };
    rect(center - half, center + half)
}

fn rotated(mut shape: MultiPolygon<f64>, degrees: f64) -> MultiPolygon<f64> {
    if degrees != 0.0 {
        shape.affine_transform_mut(&AffineTransform::rotate(degrees, Coord { x: 0.0, y: 0.0 }));
    }
    shape
}

fn single(p: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![p])
}

/// A count modifier read from the file, checked against `max`.
fn count(value: f64, what: &str, max: usize) -> Result<usize, String> {
    if value.is_finite() && value >= 0.0 && value <= max as f64 {
        Ok(value as usize)
    } else {
        Err(format!("{} {} out of range 0..={}", what, value, max))
    }
}

/// Shape and exposure of one primitive invocation, or why it was skipped.
fn primitive(code: u32, v: &[f64]) -> Result<(MultiPolygon<f64>, bool), String> {
    let exposure = arg(v, 0) != 0.0;
    let at = |i: usize| Coord {
        x: arg(v, i),
        y: arg(v, i + 1),
    };
    let shape = match code {
        // circle: exposure, diameter, x, y, [rotation]
        1 => rotated(single(circle(at(2), arg(v, 1) / 2.0, STEPS_PER_CIRCLE)), arg(v, 4)),
        // vector line: exposure, width, x1, y1, x2, y2, rotation
        2 | 20 => {
            let (start, end) = (at(2), at(4));
            let width = arg(v, 1);
            let len = (end.x - start.x).hypot(end.y - start.y);
            if len == 0.0 || width <= 0.0 {
                return Ok((ops::empty(), exposure));
            }
            let n = Coord {
                x: -(end.y - start.y) / len * width / 2.0,
                y: (end.x - start.x) / len * width / 2.0,
            };
            let poly = Polygon::new(
                LineString::new(vec![start + n, end + n, end - n, start - n]),
                vec![],
            );
            rotated(single(poly), arg(v, 6))
        }
        // center line: exposure, width, height, cx, cy, rotation
        21 => rotated(single(centered_rect(at(3), arg(v, 1), arg(v, 2))), arg(v, 5)),
        // lower-left line: exposure, width, height, x, y, rotation
        22 => {
            let min = at(3);
            let max = Coord {
                x: min.x + arg(v, 1),
                y: min.y + arg(v, 2),
            };
            rotated(single(rect(min, max)), arg(v, 5))
        }
        // outline: exposure, n, x0, y0 .. xn, yn, rotation
        4 => {
            let n = count(arg(v, 1), "outline points", v.len().saturating_sub(3) / 2)?;
            if n == 0 {
                return Err("outline without points".to_string());
            }
            let coords: Vec<Coord<f64>> = (0..=n).map(|k| at(2 + 2 * k)).collect();
            let poly = Polygon::new(LineString::new(coords), vec![]);
            rotated(ops::make_valid(poly), arg(v, 4 + 2 * n))
        }
        // polygon: exposure, vertices, cx, cy, diameter, rotation
        5 => {
            let vertices = count(arg(v, 1), "polygon vertices", MAX_POLYGON_VERTICES)?;
            if vertices < 3 {
                return Err(format!("polygon with {} vertices", vertices));
            }
            let center = at(2);
            let radius = arg(v, 4) / 2.0;
            let ring: Vec<Coord<f64>> = (0..vertices)
                .map(|k| {
                    let theta = std::f64::consts::TAU * k as f64 / vertices as f64;
                    Coord {
                        x: center.x + radius * theta.cos(),
                        y: center.y + radius * theta.sin(),
                    }
                })
                .collect();
            rotated(single(Polygon::new(LineString::new(ring), vec![])), arg(v, 5))
        }
        // moire: cx, cy, outer diameter, ring thickness, gap, max rings,
        // crosshair thickness, crosshair length, rotation
        6 => return Ok((moire(v)?, true)),
        // thermal: cx, cy, outer diameter, inner diameter, gap, rotation
        7 => return Ok((thermal(v), true)),
        _ => return Err("unsupported primitive code".to_string()),
    };
    Ok((shape, exposure))
}

fn moire(v: &[f64]) -> Result<MultiPolygon<f64>, String> {
    let center = Coord {
        x: arg(v, 0),
        y: arg(v, 1),
    };
    let (outer, thickness, gap) = (arg(v, 2), arg(v, 3), arg(v, 4));
    let max_rings = count(arg(v, 5), "moire rings", MAX_MOIRE_RINGS)?;
    let (cross_thickness, cross_length) = (arg(v, 6), arg(v, 7));

    let mut pieces = Vec::new();
    let mut radius = outer / 2.0;
    for _ in 0..max_rings {
        if radius <= 0.0 {
            break;
        }
        let ring = single(circle(center, radius, STEPS_PER_CIRCLE));
        let inner = radius - thickness;
        let ring = if inner > 0.0 {
            ops::difference(&ring, &single(circle(center, inner, STEPS_PER_CIRCLE)))
        } else {
            ring
        };
        pieces.extend(ring.0);
        if thickness + gap <= 0.0 {
            break;
        }
        radius -= thickness + gap;
    }
    if cross_thickness > 0.0 && cross_length > 0.0 {
        pieces.push(centered_rect(center, cross_length, cross_thickness));
        pieces.push(centered_rect(center, cross_thickness, cross_length));
    }
    Ok(rotated(ops::union_all(pieces), arg(v, 8)))
}

fn thermal(v: &[f64]) -> MultiPolygon<f64> {
    let center = Coord {
        x: arg(v, 0),
        y: arg(v, 1),
    };
    let (outer, inner, gap) = (arg(v, 2), arg(v, 3), arg(v, 4));
    let ring = ops::difference(
        &single(circle(center, outer / 2.0, STEPS_PER_CIRCLE)),
        &single(circle(center, inner / 2.0, STEPS_PER_CIRCLE)),
    );
    let cross = ops::union_all(vec![
        centered_rect(center, outer, gap),
        centered_rect(center, gap, outer),
    ]);
    rotated(ops::difference(&ring, &cross), arg(v, 5))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Variable(u32),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> CamResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {}
            '+' | '-' | '/' => tokens.push(Token::Op(c)),
            'x' | 'X' => tokens.push(Token::Op('x')),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '$' => {
                let mut num = String::new();
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    num.push(d);
                }
                let n = num
                    .parse()
                    .map_err(|_| macro_error(format!("invalid variable in '{}'", expr)))?;
                tokens.push(Token::Variable(n));
            }
            '0'..='9' | '.' => {
                let mut num = String::from(c);
                while let Some(d) = chars.next_if(|p| p.is_ascii_digit() || *p == '.') {
                    num.push(d);
                }
                let value = num
                    .parse()
                    .map_err(|_| macro_error(format!("invalid number '{}'", num)))?;
                tokens.push(Token::Number(value));
            }
            _ => {
                return Err(macro_error(format!(
                    "unexpected character '{}' in '{}'",
                    c, expr
                )))
            }
        }
    }
    Ok(tokens)
}

/// Evaluate a macro arithmetic expression. Unknown variables read as 0.
pub fn evaluate_expression(expr: &str, vars: &HashMap<u32, f64>) -> CamResult<f64> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Ok(0.0);
    }
    let (value, rest) = parse_additive(&tokens, vars)?;
    if rest.is_empty() {
        Ok(value)
    } else {
        Err(macro_error(format!("trailing tokens in '{}'", expr)))
    }
}

type Parsed<'a> = CamResult<(f64, &'a [Token])>;

fn parse_additive<'a>(tokens: &'a [Token], vars: &HashMap<u32, f64>) -> Parsed<'a> {
    let (mut left, mut rest) = parse_multiplicative(tokens, vars)?;
    while let Some(Token::Op(op @ ('+' | '-'))) = rest.first() {
        let (right, tail) = parse_multiplicative(&rest[1..], vars)?;
        left = if *op == '+' { left + right } else { left - right };
        rest = tail;
    }
    Ok((left, rest))
}

fn parse_multiplicative<'a>(tokens: &'a [Token], vars: &HashMap<u32, f64>) -> Parsed<'a> {
    let (mut left, mut rest) = parse_unary(tokens, vars)?;
    while let Some(Token::Op(op @ ('x' | '/'))) = rest.first() {
        let (right, tail) = parse_unary(&rest[1..], vars)?;
        left = if *op == 'x' {
            left * right
        } else if right == 0.0 {
            warn!("Division by zero in aperture macro, using 0");
            0.0
        } else {
            left / right
        };
        rest = tail;
    }
    Ok((left, rest))
}

fn parse_unary<'a>(tokens: &'a [Token], vars: &HashMap<u32, f64>) -> Parsed<'a> {
    let tail = tokens.get(1..).unwrap_or(&[]);
    match tokens.first() {
        Some(Token::Op('+')) => parse_unary(tail, vars),
        Some(Token::Op('-')) => {
            let (value, rest) = parse_unary(tail, vars)?;
            Ok((-value, rest))
        }
        Some(Token::LParen) => {
            let (value, rest) = parse_additive(tail, vars)?;
            match rest.first() {
                Some(Token::RParen) => Ok((value, &rest[1..])),
                _ => Err(macro_error("missing ')'")),
            }
        }
        Some(Token::Number(n)) => Ok((*n, tail)),
        Some(Token::Variable(n)) => Ok((vars.get(n).copied().unwrap_or(0.0), tail)),
        _ => Err(macro_error("expected number, variable or '('")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn vars(pairs: &[(u32, f64)]) -> HashMap<u32, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_expression_precedence() {
        let v = vars(&[(1, 2.0), (2, 3.0)]);
        assert_eq!(evaluate_expression("1+2x3", &v).unwrap(), 7.0);
        assert_eq!(evaluate_expression("(1+2)X3", &v).unwrap(), 9.0);
        assert_eq!(evaluate_expression("$1x$2-1", &v).unwrap(), 5.0);
        assert_eq!(evaluate_expression("-$1/4", &v).unwrap(), -0.5);
        assert_eq!(evaluate_expression("$9+1", &v).unwrap(), 1.0);
        assert!(evaluate_expression("1+(2", &v).is_err());
    }

    #[test]
    fn test_parse_classifies_parts() {
        let m = ApertureMacro::parse(
            "DONUT",
            "0 donut with a hole*\n1,1,$1,0,0*\n$3=$1x0.5*\n1,0,$3,0,0*",
        )
        .unwrap();
        assert_eq!(m.primitive_count(), 2);
        assert_eq!(m.name, "DONUT");
    }

    #[test]
    fn test_exposure_off_subtracts() {
        let m = ApertureMacro::parse("DONUT", "1,1,$1,0,0*$3=$1x0.5*1,0,$3,0,0*").unwrap();
        let shape = m.evaluate(&[2.0]).unwrap();
        let expected = std::f64::consts::PI * (1.0 - 0.25);
        assert!((shape.unsigned_area() - expected).abs() < 0.02);
        assert_eq!(shape.0[0].interiors().len(), 1);
    }

    #[test]
    fn test_rotation_about_origin() {
        // A center line offset from the origin lands on the other side after
        // a half turn.
        let m = ApertureMacro::parse("BAR", "21,1,1,1,5,0,180*").unwrap();
        let shape = m.evaluate(&[]).unwrap();
        let xs: Vec<f64> = shape.0[0].exterior().0.iter().map(|c| c.x).collect();
        assert!(xs.iter().all(|x| *x < -4.0));
    }

    #[test]
    fn test_outline_and_thermal() {
        let m = ApertureMacro::parse("TRI", "4,1,3,0,0,1,0,0,1,0,0,0*").unwrap();
        let shape = m.evaluate(&[]).unwrap();
        assert!((shape.unsigned_area() - 0.5).abs() < 1e-6);

        let t = ApertureMacro::parse("THERM", "7,0,0,2,1,0.2,0*").unwrap();
        let shape = t.evaluate(&[]).unwrap();
        assert_eq!(shape.0.len(), 4);
    }
    #[test]
    fn test_out_of_range_counts_skip_primitive() {
        let huge = ApertureMacro::parse("BIG", "4,1,100000000000000,0,0,1,0,1,1,0,0,0*").unwrap();
        assert!(huge.evaluate(&[]).unwrap().0.is_empty());

        let many = ApertureMacro::parse("POLY", "5,1,100000,0,0,2,0*1,1,1,3,0*").unwrap();
        let shape = many.evaluate(&[]).unwrap();
        // Only the circle survives.
        assert_eq!(shape.0.len(), 1);
        assert!(shape.0[0].exterior().0.iter().all(|c| c.x > 2.0));

        let rings = ApertureMacro::parse("RINGS", "6,0,0,2,0.1,0.1,1000000000,0,0,0*").unwrap();
        assert!(rings.evaluate(&[]).unwrap().0.is_empty());
    }

    #[test]
    fn test_moire_without_spacing_stops() {
        let m = ApertureMacro::parse("FLAT", "6,0,0,2,0.2,$1,1000000,0,0,0*").unwrap();
        let shape = m.evaluate(&[-0.2]).unwrap();
        assert!(shape.0.is_empty());

        let m = ApertureMacro::parse("TARGET", "6,0,0,2,0.2,$1,50,0,0,0*").unwrap();
        let shape = m.evaluate(&[-0.2]).unwrap();
        assert_eq!(shape.0.len(), 1);
        assert!((shape.unsigned_area() - std::f64::consts::PI * (1.0 - 0.64)).abs() < 0.02);
    }
}
