//! Procedural terrain: FBM noise, scalar fields and chunk builders

pub mod params;
pub use params::{Carving, CliffSharpening, NoiseParams, Terracing, Warping};

pub mod fbm;
pub use fbm::{compute_height_bounds, FractalNoise};

pub mod field;
pub use field::{
    heightfield, DensityGradient, FieldFn, FractalField, Heightfield, HeightmapField, PerlinField,
    SampleGrid, ScalarFieldGenerator, ScalarLattice, VolumeField,
};

pub mod builder;
pub use builder::{
    BuildRequest, BuiltChunk, ChunkBuilder, HeightfieldChunkBuilder, IsosurfaceChunkBuilder,
    MeshChunkBuilder,
};
