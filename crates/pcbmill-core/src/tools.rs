//! Canonical tool diameters.
//!
//! Diameters coming from files and user input are floats; two tools that
//! differ only in the last few bits must map to the same entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places kept when canonicalizing a diameter.
pub const DEFAULT_DECIMALS: u32 = 4;

/// Round a diameter to `decimals` places.
pub fn canonical_diameter(diameter: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (diameter * scale).round() / scale
}

/// Ordered, hashable key for a tool diameter.
///
/// Stores the diameter as an integer count of `10^-decimals` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiameterKey {
    scaled: i64,
    decimals: u32,
}

impl DiameterKey {
    pub fn new(diameter: f64) -> Self {
        Self::with_decimals(diameter, DEFAULT_DECIMALS)
    }

    pub fn with_decimals(diameter: f64, decimals: u32) -> Self {
        let scale = 10f64.powi(decimals as i32);
        Self {
            scaled: (diameter * scale).round() as i64,
            decimals,
        }
    }

    /// The canonical diameter this key stands for.
    pub fn diameter(&self) -> f64 {
        self.scaled as f64 / 10f64.powi(self.decimals as i32)
    }
}

impl fmt::Display for DiameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}", self.decimals as usize, self.diameter())
    }
}
