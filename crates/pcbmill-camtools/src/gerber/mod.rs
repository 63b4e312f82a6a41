//! Gerber RS-274X import.
//!
//! [`parse`] turns Gerber text into a [`GerberObject`]: the unioned copper
//! area, the bare centerlines of traces and flashes, and the fragments each
//! aperture produced.

pub mod aperture;
pub mod macros;
mod parser;

pub use aperture::{Aperture, ApertureKind, MIN_APERTURE_SIZE};
pub use macros::ApertureMacro;
pub use parser::{parse, parse_with_options};

use geo::{AffineTransform, MultiPolygon};
use pcbmill_core::Units;
use pcbmill_geometry::{
    try_bounds, Bounds, ConvertUnits, GeometryObject, Shape, ShapeArena, Transform,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group key used for region fragments in [`GerberObject::fragments`].
pub const REGION_GROUP: &str = "0";

/// Parser tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GerberOptions {
    /// Segments per full circle for arcs and round apertures.
    pub steps_per_circle: usize,
    /// Above this many buffered polygons the final merge grows and shrinks by
    /// `merge_tolerance` instead of running a pairwise union.
    pub merge_threshold: usize,
    /// Tolerance of the grow/shrink merge, in file units.
    pub merge_tolerance: f64,
}

impl Default for GerberOptions {
    fn default() -> Self {
        Self {
            steps_per_circle: 64,
            merge_threshold: 1000,
            merge_tolerance: 1e-5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GerberObject {
    pub units: Units,
    /// Copper area as a single multipolygon once parsing completes.
    pub solid: Vec<Shape>,
    /// Centerlines of traces, flash points and region outlines.
    pub follow: Vec<Shape>,
    pub apertures: BTreeMap<String, Aperture>,
    pub macros: BTreeMap<String, ApertureMacro>,
    /// Fragments grouped by aperture code; regions use [`REGION_GROUP`].
    pub fragments: ShapeArena<String>,
    pub warnings: Vec<String>,
}

impl GerberObject {
    /// The copper area.
    pub fn solid_region(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(pcbmill_geometry::ops::polygons_of(&self.solid))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        try_bounds(self.solid.iter().chain(self.follow.iter()))
    }

    /// Plain geometry view of the parsed layer.
    pub fn to_geometry(&self) -> GeometryObject {
        GeometryObject {
            units: self.units,
            solid: self.solid.clone(),
            follow: self.follow.clone(),
        }
    }
}

impl Transform for GerberObject {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        self.solid.affine(transform);
        self.follow.affine(transform);
        self.fragments.affine(transform);
    }

    fn scale_sizes(&mut self, factor: f64) {
        for aperture in self.apertures.values_mut() {
            aperture.scale_sizes(factor);
        }
    }
}

impl ConvertUnits for GerberObject {
    fn units(&self) -> Units {
        self.units
    }

    fn set_units(&mut self, units: Units) {
        self.units = units;
    }
}
