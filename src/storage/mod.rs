//! Storage Layer
//!
//! Loading of the declarative document description: per-side field lists and
//! the zone layouts persisted as JSON, plus the application directories.

pub mod schema;
pub mod zones;

pub use schema::{FieldSchema, Side};
pub use zones::{JsonZoneLayoutProvider, ZoneLayout, ZoneLayoutProvider, ZoneRect};

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "idcard-ocr", "IdCardOcr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the configuration directory (created if missing)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of user zone layouts, next to the configuration
pub fn default_zones_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("zones"))
}
