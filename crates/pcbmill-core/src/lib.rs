//! # pcbmill Core
//!
//! Core types shared by every pcbmill crate:
//! - Measurement units and conversion factors
//! - The error taxonomy for parsing, clearing and job generation
//! - Cooperative cancellation
//! - Canonical tool-diameter keys

pub mod cancel;
pub mod error;
pub mod tools;
pub mod units;

pub use cancel::CancellationToken;
pub use error::{CamError, CamResult, JobOutcome};
pub use tools::{DiameterKey, DEFAULT_DECIMALS};
pub use units::Units;
