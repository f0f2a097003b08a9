//! Terrastream - procedural terrain meshing and LOD chunk streaming
//!
//! FBM noise feeds either regular-grid patches or marching cubes isosurfaces;
//! a [`TerrainStreamer`](streaming::TerrainStreamer) keeps pooled chunks of
//! several detail levels around a moving viewpoint.

pub mod core;
pub mod math;
pub mod terrain;
pub mod mesh;
pub mod streaming;
