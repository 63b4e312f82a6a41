//! Unit handling
//!
//! Geometry is stored in the unit of the object that owns it. Conversion
//! between inch and millimeter is a single multiplicative factor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Length unit of a geometry object or job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Units {
    /// Inches
    #[serde(alias = "INCH", alias = "in")]
    In,
    /// Millimeters
    #[default]
    #[serde(alias = "METRIC", alias = "mm")]
    Mm,
}

impl Units {
    /// Factor that converts a length in `self` into `target`.
    ///
    /// Returns exactly `1.0` when the units already match.
    pub fn factor_to(self, target: Units) -> f64 {
        match (self, target) {
            (Units::In, Units::Mm) => MM_PER_INCH,
            (Units::Mm, Units::In) => 1.0 / MM_PER_INCH,
            _ => 1.0,
        }
    }

    /// G-code word selecting this unit (G20 / G21).
    pub fn gcode(self) -> &'static str {
        match self {
            Units::In => "G20",
            Units::Mm => "G21",
        }
    }

    /// Short label ("in" or "mm").
    pub fn label(self) -> &'static str {
        match self {
            Units::In => "in",
            Units::Mm => "mm",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Mm => write!(f, "MM"),
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" | "INCH" | "INCHES" | "IMPERIAL" => Ok(Self::In),
            "MM" | "METRIC" | "MILLIMETER" | "MILLIMETERS" => Ok(Self::Mm),
            _ => Err(format!("Unknown units: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_round_trip() {
        let there = Units::In.factor_to(Units::Mm);
        let back = Units::Mm.factor_to(Units::In);
        assert_eq!(there, 25.4);
        assert!((there * back - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_same_units_is_identity() {
        assert_eq!(Units::Mm.factor_to(Units::Mm), 1.0);
        assert_eq!(Units::In.factor_to(Units::In), 1.0);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("inch".parse::<Units>().unwrap(), Units::In);
        assert_eq!("METRIC".parse::<Units>().unwrap(), Units::Mm);
        assert_eq!(" mm ".parse::<Units>().unwrap(), Units::Mm);
        assert!("furlong".parse::<Units>().is_err());
        assert_eq!(Units::In.to_string(), "IN");
        assert_eq!(Units::Mm.gcode(), "G21");
    }

    #[test]
    fn test_default_is_millimeters() {
        assert_eq!(Units::default(), Units::Mm);
    }
}
