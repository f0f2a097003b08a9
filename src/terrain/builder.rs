//! Chunk geometry builders
//!
//! The streamer decides *which* chunks exist; a [`ChunkBuilder`] decides what
//! they contain. All builders emit chunk-local positions: vertex `(x, y, z)`
//! sits at world `(origin.x + x, y, origin.z + z)`.

use std::sync::Arc;

use glam::{IVec2, UVec3, Vec3, Vec3Swizzles};

use super::field::{heightfield, Heightfield, SampleGrid, ScalarFieldGenerator};
use super::fbm::FractalNoise;
use super::params::NoiseParams;
use crate::core::{Error, Result};
use crate::mesh::{build_mesh, extract_isosurface, Mesh};

/// Everything a builder needs to populate one chunk
#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub level: usize,
    pub coord: IVec2,
    pub origin: Vec3,
    pub chunk_size: f32,
    pub resolution: u32,
    /// Flat patch shared by every chunk of the level
    pub template: Arc<Mesh>,
    pub ticket: u64,
}

/// Geometry produced for one chunk
#[derive(Clone, Debug)]
pub struct BuiltChunk {
    pub mesh: Arc<Mesh>,
    pub heightfield: Option<Arc<Heightfield>>,
    /// World-space `(min_y, max_y)` of the produced geometry
    pub vertical_range: (f32, f32),
}

/// Populates chunk geometry. Called from worker threads.
pub trait ChunkBuilder: Send + Sync {
    fn build(&self, request: &BuildRequest) -> Result<BuiltChunk>;
}

fn warn_outside_bounds(request: &BuildRequest, noise: &FractalNoise, (min, max): (f32, f32)) {
    let (lo, hi) = noise.height_bounds();
    if min < lo || max > hi {
        // Expected for warped or terraced parameters
        log::warn!(
            "LOD {} chunk {} heights [{min:.2}, {max:.2}] escape analytic bounds [{lo:.2}, {hi:.2}]",
            request.level,
            request.coord,
        );
    }
}

/// CPU-displaced grid patch per chunk
pub struct MeshChunkBuilder {
    noise: FractalNoise,
}

impl MeshChunkBuilder {
    pub fn new(params: NoiseParams) -> Self {
        Self { noise: FractalNoise::new(params) }
    }
}

impl ChunkBuilder for MeshChunkBuilder {
    fn build(&self, request: &BuildRequest) -> Result<BuiltChunk> {
        let mesh = build_mesh(request.origin, request.chunk_size, request.resolution, &self.noise)?;
        let vertical_range = match mesh.bounds() {
            Some(b) => (b.min.y, b.max.y),
            None => self.noise.height_bounds(),
        };
        warn_outside_bounds(request, &self.noise, vertical_range);

        Ok(BuiltChunk { mesh: Arc::new(mesh), heightfield: None, vertical_range })
    }
}

/// Heights only; the mesh is the level's shared flat template, displaced by
/// the renderer.
pub struct HeightfieldChunkBuilder {
    noise: FractalNoise,
}

impl HeightfieldChunkBuilder {
    pub fn new(params: NoiseParams) -> Self {
        Self { noise: FractalNoise::new(params) }
    }
}

impl ChunkBuilder for HeightfieldChunkBuilder {
    fn build(&self, request: &BuildRequest) -> Result<BuiltChunk> {
        if request.resolution == 0 {
            return Err(Error::Config("heightfield resolution must be at least 1".into()));
        }
        let heights = heightfield(
            &self.noise,
            request.origin.xz(),
            request.chunk_size,
            request.resolution,
        );
        let vertical_range = heights.min_max().unwrap_or_else(|| self.noise.height_bounds());
        warn_outside_bounds(request, &self.noise, vertical_range);

        Ok(BuiltChunk {
            mesh: Arc::clone(&request.template),
            heightfield: Some(Arc::new(heights)),
            vertical_range,
        })
    }
}

/// Marching cubes over a fixed vertical window of any scalar field
pub struct IsosurfaceChunkBuilder<F> {
    field: F,
    pub vertical_min: f32,
    pub vertical_max: f32,
    pub iso_level: f32,
    pub smooth_normals: bool,
}

impl<F: ScalarFieldGenerator> IsosurfaceChunkBuilder<F> {
    pub fn new(field: F, vertical_min: f32, vertical_max: f32) -> Self {
        Self {
            field,
            vertical_min,
            vertical_max,
            iso_level: 0.0,
            smooth_normals: true,
        }
    }

    pub fn field(&self) -> &F {
        &self.field
    }
}

impl<F: ScalarFieldGenerator> ChunkBuilder for IsosurfaceChunkBuilder<F> {
    fn build(&self, request: &BuildRequest) -> Result<BuiltChunk> {
        if request.resolution == 0 {
            return Err(Error::Config("isosurface resolution must be at least 1".into()));
        }
        let height = self.vertical_max - self.vertical_min;
        if height <= 0.0 {
            return Err(Error::Config(format!(
                "isosurface vertical window [{}, {}] is empty",
                self.vertical_min, self.vertical_max
            )));
        }

        let voxel = request.chunk_size / request.resolution as f32;
        let origin = Vec3::new(request.origin.x, self.vertical_min, request.origin.z);
        let grid = SampleGrid {
            origin,
            voxel_size: voxel,
            cells: UVec3::new(
                request.resolution,
                (height / voxel).ceil() as u32,
                request.resolution,
            ),
        };

        let lattice = self.field.generate_scalar_field(&grid);
        let crosses = lattice
            .min_max()
            .is_some_and(|(min, max)| min < self.iso_level && max >= self.iso_level);
        let mut mesh = if crosses {
            extract_isosurface(&lattice, self.iso_level, self.smooth_normals)
        } else {
            Mesh::new()
        };
        drop(lattice);

        let shift = Vec3::new(request.origin.x, 0.0, request.origin.z);
        for p in &mut mesh.positions {
            *p -= shift;
        }

        let vertical_range = match mesh.bounds() {
            Some(b) => (b.min.y, b.max.y),
            None => (self.vertical_min, self.vertical_max),
        };

        Ok(BuiltChunk { mesh: Arc::new(mesh), heightfield: None, vertical_range })
    }
}
