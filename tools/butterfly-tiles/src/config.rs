//! Router configuration
//!
//! Every field has a default, so a TOML file only needs the values it
//! overrides:
//!
//! ```toml
//! max_candidates = 5
//! merge_turn_distance_m = 40.0
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Graph candidates requested per route endpoint
    pub max_candidates: usize,
    /// Maximum snapping distance used by the reference facade
    pub snap_radius_m: f64,
    /// Upper bound on tiles visited while stitching across borders
    pub max_stitch_tiles: usize,
    /// Allowed gap between consecutive legs, in degrees
    pub continuity_epsilon_deg: f64,
    /// Feature points walked away from a junction to measure a turn angle
    pub turn_probe_max_points: usize,
    /// Walk stops at the first point further than this from the junction
    pub turn_probe_distance_m: f64,
    /// Stay-on-road instructions closer than this to a turn are merged into it
    pub merge_turn_distance_m: f64,
    /// Route points kept before a turn in its geometry
    pub turn_geometry_points_before: usize,
    /// Route points kept after a turn in its geometry
    pub turn_geometry_points_after: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            snap_radius_m: 1000.0,
            max_stitch_tiles: 64,
            continuity_epsilon_deg: 1e-6,
            turn_probe_max_points: 7,
            turn_probe_distance_m: 300.0,
            merge_turn_distance_m: 30.0,
            turn_geometry_points_before: 3,
            turn_geometry_points_after: 9,
        }
    }
}

impl RouterConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_candidates == 0 {
            return Err(ConfigError::Invalid("max_candidates must be positive".into()));
        }
        if self.max_stitch_tiles < 2 {
            return Err(ConfigError::Invalid(
                "max_stitch_tiles must allow at least two tiles".into(),
            ));
        }
        if self.turn_probe_max_points == 0 {
            return Err(ConfigError::Invalid(
                "turn_probe_max_points must be positive".into(),
            ));
        }
        if self.continuity_epsilon_deg.is_nan() || self.continuity_epsilon_deg < 0.0 {
            return Err(ConfigError::Invalid(
                "continuity_epsilon_deg must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
