//! Aperture definitions and the shapes they stamp.

use super::macros::ApertureMacro;
use geo::{AffineOps, AffineTransform, ConvexHull, Coord, LineString, MultiPolygon, Polygon};
use pcbmill_core::{CamError, CamResult};
use pcbmill_geometry::ops::{self, circle, stadium, STEPS_PER_CIRCLE};
use std::collections::BTreeMap;

/// Sizes of zero are replaced by this to keep buffering well defined.
pub const MIN_APERTURE_SIZE: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub enum ApertureKind {
    Circle {
        diameter: f64,
    },
    Rectangle {
        width: f64,
        height: f64,
    },
    Obround {
        width: f64,
        height: f64,
    },
    RegularPolygon {
        diameter: f64,
        vertices: u32,
        rotation: f64,
    },
    Macro {
        name: String,
        modifiers: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aperture {
    pub kind: ApertureKind,
    /// Optional round hole punched through flashes.
    pub hole: Option<f64>,
    /// Scale applied to evaluated macro shapes after unit conversion.
    macro_scale: f64,
    /// Flash shape, filled on first use.
    shape_cache: Option<MultiPolygon<f64>>,
}

fn nonzero(size: f64) -> f64 {
    if size == 0.0 {
        MIN_APERTURE_SIZE
    } else {
        size
    }
}

fn aperture_error(reason: impl Into<String>) -> CamError {
    CamError::parse_failed("Gerber", reason)
}

impl Aperture {
    pub fn new(kind: ApertureKind) -> Self {
        Self {
            kind,
            hole: None,
            macro_scale: 1.0,
            shape_cache: None,
        }
    }

    /// Parse the body of an `AD` statement after the aperture code, e.g.
    /// `C,0.5`, `R,1.0X0.5`, `P,1.0X6X30` or `THERMAL,0.8X0.4`.
    pub fn parse_definition(template: &str, params: &str) -> CamResult<Self> {
        let values: Vec<f64> = if params.trim().is_empty() {
            Vec::new()
        } else {
            params
                .split('X')
                .map(|p| {
                    p.trim()
                        .parse::<f64>()
                        .map_err(|_| aperture_error(format!("bad parameter '{}'", p)))
                })
                .collect::<CamResult<_>>()?
        };
        let get = |i: usize| values.get(i).copied();
        let need = |i: usize| {
            get(i).ok_or_else(|| aperture_error(format!("{} needs {} parameters", template, i + 1)))
        };

        let (kind, hole_index) = match template {
            "C" => (
                ApertureKind::Circle {
                    diameter: nonzero(need(0)?),
                },
                1,
            ),
            "R" => (
                ApertureKind::Rectangle {
                    width: nonzero(need(0)?),
                    height: nonzero(need(1)?),
                },
                2,
            ),
            "O" => (
                ApertureKind::Obround {
                    width: nonzero(need(0)?),
                    height: nonzero(need(1)?),
                },
                2,
            ),
            "P" => (
                ApertureKind::RegularPolygon {
                    diameter: nonzero(need(0)?),
                    vertices: need(1)? as u32,
                    rotation: get(2).unwrap_or(0.0),
                },
                3,
            ),
            name => {
                return Ok(Self::new(ApertureKind::Macro {
                    name: name.to_string(),
                    modifiers: values,
                }))
            }
        };
        let mut aperture = Self::new(kind);
        aperture.hole = get(hole_index).filter(|h| *h > 0.0);
        Ok(aperture)
    }

    /// Nominal size: diameter for round apertures, smaller side otherwise.
    pub fn size(&self) -> f64 {
        match &self.kind {
            ApertureKind::Circle { diameter } => *diameter,
            ApertureKind::Rectangle { width, height } | ApertureKind::Obround { width, height } => {
                width.min(*height)
            }
            ApertureKind::RegularPolygon { diameter, .. } => *diameter,
            ApertureKind::Macro { .. } => 0.0,
        }
    }

    pub fn is_round(&self) -> bool {
        matches!(self.kind, ApertureKind::Circle { .. })
    }

    /// Shape stamped by a flash at the origin.
    pub fn flash_shape(&mut self, macros: &BTreeMap<String, ApertureMacro>) -> CamResult<MultiPolygon<f64>> {
        if let Some(shape) = &self.shape_cache {
            return Ok(shape.clone());
        }
        let origin = Coord { x: 0.0, y: 0.0 };
        let shape = match &self.kind {
            ApertureKind::Circle { diameter } => {
                MultiPolygon::new(vec![circle(origin, diameter / 2.0, STEPS_PER_CIRCLE)])
            }
            ApertureKind::Rectangle { width, height } => MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![
                    (-width / 2.0, -height / 2.0),
                    (width / 2.0, -height / 2.0),
                    (width / 2.0, height / 2.0),
                    (-width / 2.0, height / 2.0),
                ]),
                vec![],
            )]),
            ApertureKind::Obround { width, height } => {
                let radius = width.min(*height) / 2.0;
                let (a, b) = if width >= height {
                    let dx = width / 2.0 - radius;
                    (Coord { x: -dx, y: 0.0 }, Coord { x: dx, y: 0.0 })
                } else {
                    let dy = height / 2.0 - radius;
                    (Coord { x: 0.0, y: -dy }, Coord { x: 0.0, y: dy })
                };
                if a == b {
                    MultiPolygon::new(vec![circle(origin, radius, STEPS_PER_CIRCLE)])
                } else {
                    MultiPolygon::new(vec![stadium(a, b, radius, STEPS_PER_CIRCLE)])
                }
            }
            ApertureKind::RegularPolygon {
                diameter,
                vertices,
                rotation,
            } => {
                let n = (*vertices).max(3);
                let start = rotation.to_radians();
                let ring: Vec<Coord<f64>> = (0..n)
                    .map(|k| {
                        let theta = start + std::f64::consts::TAU * k as f64 / n as f64;
                        Coord {
                            x: diameter / 2.0 * theta.cos(),
                            y: diameter / 2.0 * theta.sin(),
                        }
                    })
                    .collect();
                MultiPolygon::new(vec![Polygon::new(LineString::new(ring), vec![])])
            }
            ApertureKind::Macro { name, modifiers } => {
                let mut shape = macros
                    .get(name)
                    .ok_or_else(|| aperture_error(format!("undefined macro '{}'", name)))?
                    .evaluate(modifiers)?;
                if self.macro_scale != 1.0 {
                    shape.affine_transform_mut(&AffineTransform::scale(
                        self.macro_scale,
                        self.macro_scale,
                        origin,
                    ));
                }
                shape
            }
        };
        let shape = match self.hole {
            Some(hole) => ops::difference(
                &shape,
                &MultiPolygon::new(vec![circle(origin, hole / 2.0, STEPS_PER_CIRCLE)]),
            ),
            None => shape,
        };
        self.shape_cache = Some(shape.clone());
        Ok(shape)
    }

    /// Convex outline used when dragging a non-round aperture along a path.
    pub fn stroke_outline(&mut self, macros: &BTreeMap<String, ApertureMacro>) -> CamResult<Polygon<f64>> {
        Ok(self.flash_shape(macros)?.convex_hull())
    }

    pub fn scale_sizes(&mut self, factor: f64) {
        match &mut self.kind {
            ApertureKind::Circle { diameter } => *diameter *= factor,
            ApertureKind::Rectangle { width, height } | ApertureKind::Obround { width, height } => {
                *width *= factor;
                *height *= factor;
            }
            ApertureKind::RegularPolygon { diameter, .. } => *diameter *= factor,
            ApertureKind::Macro { .. } => self.macro_scale *= factor,
        }
        if let Some(hole) = &mut self.hole {
            *hole *= factor;
        }
        self.shape_cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn test_parse_standard_templates() {
        let c = Aperture::parse_definition("C", "0.5").unwrap();
        assert_eq!(c.kind, ApertureKind::Circle { diameter: 0.5 });
        assert_eq!(c.size(), 0.5);

        let r = Aperture::parse_definition("R", "1.0X0.5X0.2").unwrap();
        assert_eq!(r.kind, ApertureKind::Rectangle { width: 1.0, height: 0.5 });
        assert_eq!(r.hole, Some(0.2));

        let m = Aperture::parse_definition("OC8", "1.2").unwrap();
        assert!(matches!(m.kind, ApertureKind::Macro { ref name, .. } if name == "OC8"));

        assert!(Aperture::parse_definition("R", "1.0").is_err());
    }

    #[test]
    fn test_zero_size_becomes_epsilon() {
        let c = Aperture::parse_definition("C", "0").unwrap();
        assert_eq!(c.size(), MIN_APERTURE_SIZE);
    }

    #[test]
    fn test_flash_shapes() {
        let macros = BTreeMap::new();
        let mut rect = Aperture::parse_definition("R", "2X1").unwrap();
        assert!((rect.flash_shape(&macros).unwrap().unsigned_area() - 2.0).abs() < 1e-9);

        let mut obround = Aperture::parse_definition("O", "3X1").unwrap();
        let area = obround.flash_shape(&macros).unwrap().unsigned_area();
        assert!((area - (2.0 + std::f64::consts::PI / 4.0)).abs() < 0.01);

        let mut missing = Aperture::parse_definition("NOPE", "1").unwrap();
        assert!(missing.flash_shape(&macros).is_err());
    }
}
