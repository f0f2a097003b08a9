//! Error types for terrain generation and streaming

use glam::IVec2;
use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration detected at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// A despawn targeted a coordinate the level does not track
    #[error("Chunk {coord} not tracked by LOD {level}")]
    ChunkNotFound { level: usize, coord: IVec2 },

    /// Spawn requested a slot but the level's pool is empty
    #[error("Chunk pool of LOD {level} exhausted while spawning {coord}")]
    PoolExhausted { level: usize, coord: IVec2 },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error signals corrupted pool/map bookkeeping.
    ///
    /// Consistency errors abort the current tick; the streamer must be
    /// `reset` before it can be trusted again.
    pub fn is_consistency(&self) -> bool {
        matches!(self, Error::ChunkNotFound { .. } | Error::PoolExhausted { .. })
    }
}
