//! Streaming configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Where chunk geometry is built
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Built in parallel during `tick`, ready when it returns
    #[default]
    Inline,
    /// Built on a background runtime, applied on later ticks
    Background,
}

/// Configuration for LOD chunk streaming
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Number of detail levels; level `k` uses chunks `2^k` times larger than level 0
    pub levels_of_detail: usize,
    /// Chunks kept on each side of the reference chunk, per level
    pub chunks_per_direction: u32,
    /// Grid cells per chunk edge
    pub chunk_resolution: u32,
    /// Chunk edge length of level 0 in world units
    pub starting_chunk_size: f32,
    /// Slots per level; defaults to the window size `(2r + 1)^2`
    pub pool_size: Option<usize>,
    pub build_mode: BuildMode,
    /// Worker threads of the background runtime (tokio default when unset)
    pub worker_threads: Option<usize>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            levels_of_detail: 4,
            chunks_per_direction: 2,
            chunk_resolution: 32,
            starting_chunk_size: 64.0,
            pool_size: None,
            build_mode: BuildMode::Inline,
            worker_threads: None,
        }
    }
}

impl StreamingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Chunks in one level's `(2r + 1)^2` window
    pub fn window_size(&self) -> usize {
        let side = 2 * self.chunks_per_direction as usize + 1;
        side * side
    }

    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or_else(|| self.window_size())
    }

    /// Chunk edge length at `level`
    pub fn chunk_size(&self, level: usize) -> f32 {
        self.starting_chunk_size * (1u64 << level) as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.levels_of_detail == 0 {
            return Err(Error::Config("at least one level of detail is required".into()));
        }
        if self.levels_of_detail > 32 {
            return Err(Error::Config(format!(
                "{} levels of detail exceed the supported 32",
                self.levels_of_detail
            )));
        }
        if self.chunk_resolution == 0 {
            return Err(Error::Config("chunk resolution must be at least 1".into()));
        }
        if !(self.starting_chunk_size > 0.0 && self.starting_chunk_size.is_finite()) {
            return Err(Error::Config(format!(
                "starting chunk size must be positive, got {}",
                self.starting_chunk_size
            )));
        }
        let pool = self.effective_pool_size();
        if pool < self.window_size() {
            return Err(Error::Config(format!(
                "pool of {pool} slots cannot hold the {} chunk window",
                self.window_size()
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(Error::Config("background runtime needs at least one worker".into()));
        }
        Ok(())
    }
}
