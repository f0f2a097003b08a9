//! LOD chunk streaming around a moving reference point

pub mod config;
pub mod lod;
pub mod build_queue;
pub mod streamer;

pub use config::{BuildMode, StreamingConfig};
pub use lod::{
    is_within_finer_lod, world_to_grid, ChunkHandle, ChunkSlot, Despawn, LevelUpdate, LodLevel,
    SlotState,
};
pub use build_queue::{BackgroundBuilder, BuildOutcome};
pub use streamer::{AppliedBuilds, BuildFailure, LevelReport, TerrainStreamer, TickReport};
