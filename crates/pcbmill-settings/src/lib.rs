//! pcbmill Settings Crate
//!
//! Handles application configuration, flat `key=value` overrides and
//! settings persistence.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{
    CncJobSettings, Config, ExcellonSettings, ExclusionRect, GerberSettings, IsolationSettings,
    PaintSelection, PaintSettings,
};
pub use error::{Result, SettingsError};
pub use persistence::SettingsPersistence;
