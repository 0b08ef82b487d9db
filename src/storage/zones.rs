//! Zone layout storage and loading
//!
//! A layout maps field names to fractional rectangles of the canonical frame.
//! Persisted per side as `zones_<side>.json`:
//!
//! ```json
//! {"zones": {"f_nazwisko": {"x": 0.35, "y": 0.21, "width": 0.46, "height": 0.07}}}
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::LayoutError;
use crate::storage::schema::Side;

const BUILTIN_FRONT: &str = include_str!("../../zones/zones_front.json");
const BUILTIN_BACK: &str = include_str!("../../zones/zones_back.json");

/// A region to run OCR on, as fractions of the canonical frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ZoneRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Every component must be finite and within `[0, 1]`
    pub fn validate(&self, field: &str) -> Result<(), LayoutError> {
        let components = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ];
        for (name, value) in components {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(LayoutError::InvalidZone {
                    field: field.to_string(),
                    reason: format!("{} = {} is outside [0, 1]", name, value),
                });
            }
        }
        Ok(())
    }
}

/// Zone definitions for one side of the document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneLayout {
    pub zones: HashMap<String, ZoneRect>,
}

impl ZoneLayout {
    /// Parse and validate a layout document; `origin` only labels errors
    pub fn from_json(content: &str, origin: &str) -> Result<Self, LayoutError> {
        let layout: ZoneLayout =
            serde_json::from_str(content).map_err(|source| LayoutError::Parse {
                origin: origin.to_string(),
                source,
            })?;
        for (field, zone) in &layout.zones {
            zone.validate(field)?;
        }
        Ok(layout)
    }

    pub fn get(&self, field: &str) -> Option<&ZoneRect> {
        self.zones.get(field)
    }

    /// Add or replace a zone
    pub fn insert(&mut self, field: impl Into<String>, zone: ZoneRect) {
        self.zones.insert(field.into(), zone);
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Supplies the zone layout for each side
pub trait ZoneLayoutProvider: Send + Sync {
    fn load_zones(&self, side: Side) -> Result<Arc<ZoneLayout>, LayoutError>;
}

/// Where layouts are read from
#[derive(Debug, Clone)]
enum LayoutSource {
    /// Directory holding `zones_front.json` / `zones_back.json`
    Directory(PathBuf),
    /// Layouts compiled into the binary
    Builtin,
}

/// Loads layouts from JSON and caches them per side
pub struct JsonZoneLayoutProvider {
    source: LayoutSource,
    cache: RwLock<HashMap<Side, Arc<ZoneLayout>>>,
}

impl JsonZoneLayoutProvider {
    /// Read layouts from `dir/zones_<side>.json`
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: LayoutSource::Directory(dir.into()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Use the layouts shipped with the crate
    pub fn builtin() -> Self {
        Self {
            source: LayoutSource::Builtin,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// File name of a side's layout
    pub fn file_name(side: Side) -> String {
        format!("zones_{}.json", side)
    }

    fn read(&self, side: Side) -> Result<ZoneLayout, LayoutError> {
        match &self.source {
            LayoutSource::Directory(dir) => {
                let path = dir.join(Self::file_name(side));
                let content = read_layout_file(&path)?;
                ZoneLayout::from_json(&content, &path.display().to_string())
            }
            LayoutSource::Builtin => {
                let content = match side {
                    Side::Front => BUILTIN_FRONT,
                    Side::Back => BUILTIN_BACK,
                };
                ZoneLayout::from_json(content, &format!("builtin {}", Self::file_name(side)))
            }
        }
    }
}

impl ZoneLayoutProvider for JsonZoneLayoutProvider {
    fn load_zones(&self, side: Side) -> Result<Arc<ZoneLayout>, LayoutError> {
        if let Some(layout) = self.cache.read().get(&side) {
            debug!("Using cached {} layout", side);
            return Ok(layout.clone());
        }

        let layout = Arc::new(self.read(side)?);
        info!("Loaded {} zones for {} side", layout.len(), side);
        self.cache.write().insert(side, layout.clone());
        Ok(layout)
    }
}

fn read_layout_file(path: &Path) -> Result<String, LayoutError> {
    std::fs::read_to_string(path).map_err(|source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the built-in layouts into `dir` as editable files
pub fn export_builtin_layouts(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let builtin = JsonZoneLayoutProvider::builtin();
    let mut written = Vec::new();
    for side in Side::ALL {
        let path = dir.join(JsonZoneLayoutProvider::file_name(side));
        save_layout(&*builtin.load_zones(side)?, &path)?;
        info!("Wrote {} layout to {:?}", side, path);
        written.push(path);
    }
    Ok(written)
}

/// Save a layout as pretty JSON
pub fn save_layout(layout: &ZoneLayout, path: &Path) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(layout)?;
    std::fs::write(path, content)?;
    Ok(())
}
