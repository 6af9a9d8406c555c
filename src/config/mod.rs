//! Configuration module for Tally.
//!
//! Handles engine defaults, data source registration, and environment variables.

mod settings;

pub use settings::{
    expand_env_vars, parse_timezone, EngineSettings, Settings, SettingsError, SourceSettings,
};
