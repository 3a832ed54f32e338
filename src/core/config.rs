//! Engine configuration.
//!
//! Loaded once at startup from JSON; values are not hot-reloadable while
//! grids built from them are alive.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Largest supported voxel count along one side of a cell.
pub const MAX_BITS_PER_SIDE: u32 = 64;

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Voxel grid dimensions.
    pub geometry: GeometryConfig,
    /// Model build pipeline settings.
    pub pipeline: PipelineConfig,
}

/// Voxel grid dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Voxels along one side of a cell.
    pub bits_per_side: u32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self { bits_per_side: 16 }
    }
}

/// Model build pipeline settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker threads building models.
    pub worker_threads: usize,
    /// Maximum cached artifacts (0 disables the cache).
    pub cache_capacity: usize,
    /// Worker threads are named `<prefix>-<n>`.
    pub thread_name_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            cache_capacity: 256,
            thread_name_prefix: "model-builder".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save this configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let side = self.geometry.bits_per_side;
        if side == 0 || side > MAX_BITS_PER_SIDE {
            return Err(Error::Config(format!(
                "bits_per_side must be in 1..={}, got {}",
                MAX_BITS_PER_SIDE, side
            )));
        }
        if self.pipeline.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geometry.bits_per_side, 16);
        assert_eq!(config.pipeline.worker_threads, 2);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = EngineConfig::from_json(r#"{ "pipeline": { "worker_threads": 6 } }"#).unwrap();
        assert_eq!(config.pipeline.worker_threads, 6);
        assert_eq!(config.pipeline.cache_capacity, 256);
        assert_eq!(config.geometry.bits_per_side, 16);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let result = EngineConfig::from_json(r#"{ "pipeline": { "worker_threads": 0 } }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_oversized_geometry() {
        let result = EngineConfig::from_json(r#"{ "geometry": { "bits_per_side": 65 } }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let mut config = EngineConfig::default();
        config.pipeline.worker_threads = 3;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
