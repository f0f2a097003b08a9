//! Scalar field sampling over regular lattices
//!
//! A [`ScalarFieldGenerator`] maps world positions to scalar values (negative
//! inside solid terrain by convention). Lattices are filled in parallel, one
//! value per sample, with no shared mutable state.

use glam::{UVec3, Vec2, Vec3, Vec3Swizzles};
use noise::{NoiseFn, Perlin};
use rayon::prelude::*;

use super::fbm::FractalNoise;
use super::params::NoiseParams;
use crate::core::{Error, Result};
use crate::math::lerp;

/// Regular lattice of world positions `origin + voxel_size * (x, y, z)`
/// for `0..=cells` on each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleGrid {
    pub origin: Vec3,
    pub voxel_size: f32,
    pub cells: UVec3,
}

impl SampleGrid {
    pub fn new(origin: Vec3, voxel_size: f32, cells: UVec3) -> Self {
        Self { origin, voxel_size, cells }
    }

    /// Grid covering `extent` from `origin`, rounding the cell count up.
    pub fn for_region(origin: Vec3, extent: Vec3, voxel_size: f32) -> Result<Self> {
        if !(voxel_size > 0.0 && voxel_size.is_finite()) {
            return Err(Error::Config(format!("voxel size must be positive, got {voxel_size}")));
        }
        let cells = (extent / voxel_size).ceil().max(Vec3::ZERO).as_uvec3();
        Ok(Self { origin, voxel_size, cells })
    }

    /// Samples per axis
    pub fn dims(&self) -> UVec3 {
        self.cells + UVec3::ONE
    }

    pub fn sample_count(&self) -> usize {
        let d = self.dims();
        d.x as usize * d.y as usize * d.z as usize
    }

    /// World position of the sample at linear index `i` (x fastest, then y, then z)
    pub fn position_of(&self, i: usize) -> Vec3 {
        let d = self.dims();
        let x = i % d.x as usize;
        let y = (i / d.x as usize) % d.y as usize;
        let z = i / (d.x as usize * d.y as usize);
        self.origin + Vec3::new(x as f32, y as f32, z as f32) * self.voxel_size
    }
}

/// Dense samples of a scalar field
#[derive(Clone, Debug)]
pub struct ScalarLattice {
    values: Vec<f32>,
    dims: UVec3,
    voxel_size: f32,
    origin: Vec3,
}

impl ScalarLattice {
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        x as usize + self.dims.x as usize * (y as usize + self.dims.y as usize * z as usize)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> f32 {
        self.values[self.index(x, y, z)]
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn cells(&self) -> UVec3 {
        self.dims.saturating_sub(UVec3::ONE)
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Trilinear sample at a lattice-local position, clamped to the lattice.
    pub fn sample_trilinear(&self, local: Vec3) -> f32 {
        let max = self.cells().as_vec3();
        let g = (local / self.voxel_size).clamp(Vec3::ZERO, max);
        let i0 = g.floor().as_uvec3().min(self.cells().saturating_sub(UVec3::ONE));
        let i1 = (i0 + UVec3::ONE).min(self.cells());
        let t = (g - i0.as_vec3()).clamp(Vec3::ZERO, Vec3::ONE);

        let c00 = lerp(self.get(i0.x, i0.y, i0.z), self.get(i1.x, i0.y, i0.z), t.x);
        let c10 = lerp(self.get(i0.x, i1.y, i0.z), self.get(i1.x, i1.y, i0.z), t.x);
        let c01 = lerp(self.get(i0.x, i0.y, i1.z), self.get(i1.x, i0.y, i1.z), t.x);
        let c11 = lerp(self.get(i0.x, i1.y, i1.z), self.get(i1.x, i1.y, i1.z), t.x);

        let c0 = lerp(c00, c10, t.y);
        let c1 = lerp(c01, c11, t.y);
        lerp(c0, c1, t.z)
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max(&self.values)
    }
}

fn min_max(values: &[f32]) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    Some((min, max))
}

/// Source of scalar values at world positions
pub trait ScalarFieldGenerator: Send + Sync {
    fn sample(&self, position: Vec3) -> f32;

    /// Evaluate every lattice point of `grid` in parallel.
    fn generate_scalar_field(&self, grid: &SampleGrid) -> ScalarLattice {
        let values: Vec<f32> = (0..grid.sample_count())
            .into_par_iter()
            .map(|i| self.sample(grid.position_of(i)))
            .collect();

        ScalarLattice {
            values,
            dims: grid.dims(),
            voxel_size: grid.voxel_size,
            origin: grid.origin,
        }
    }
}

/// Height-based signed distance: `y - height(x, z)`
pub struct HeightmapField {
    noise: FractalNoise,
}

impl HeightmapField {
    pub fn new(params: NoiseParams) -> Self {
        Self { noise: FractalNoise::new(params) }
    }

    pub fn noise(&self) -> &FractalNoise {
        &self.noise
    }
}

impl ScalarFieldGenerator for HeightmapField {
    fn sample(&self, position: Vec3) -> f32 {
        position.y - self.noise.sample_2d(position.xz())
    }
}

/// Linear falloff of density with altitude above `ground`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityGradient {
    pub ground: f32,
    pub falloff: f32,
}

/// 3D FBM density, allowing overhangs and caves
pub struct VolumeField {
    noise: FractalNoise,
    gradient: Option<DensityGradient>,
}

impl VolumeField {
    pub fn new(params: NoiseParams, gradient: Option<DensityGradient>) -> Self {
        Self { noise: FractalNoise::new(params), gradient }
    }
}

impl ScalarFieldGenerator for VolumeField {
    fn sample(&self, position: Vec3) -> f32 {
        let density = self.noise.sample_3d(position);
        match self.gradient {
            Some(g) => density - (position.y - g.ground) * g.falloff,
            None => density,
        }
    }
}

/// Single nested Perlin layer: `perlin(y * f, perlin(x * f, z * f)) * amplitude`
pub struct PerlinField {
    perlin: Perlin,
    frequency: f32,
    amplitude: f32,
}

impl PerlinField {
    pub fn new(seed: u32, frequency: f32, amplitude: f32) -> Self {
        Self { perlin: Perlin::new(seed), frequency, amplitude }
    }
}

fn nested_perlin(perlin: &Perlin, position: Vec3, frequency: f32) -> f32 {
    let p = (position * frequency).as_dvec3();
    let inner = perlin.get([p.x, p.z]);
    perlin.get([p.y, inner]) as f32
}

impl ScalarFieldGenerator for PerlinField {
    fn sample(&self, position: Vec3) -> f32 {
        nested_perlin(&self.perlin, position, self.frequency) * self.amplitude
    }
}

/// Octave sum of nested Perlin layers
pub struct FractalField {
    perlin: Perlin,
    pub frequency: f32,
    pub amplitude: f32,
    pub octaves: u32,
    pub lacunarity: f32,
    pub gain: f32,
}

impl FractalField {
    pub fn new(seed: u32, frequency: f32, amplitude: f32, octaves: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            frequency,
            amplitude,
            octaves,
            lacunarity: 2.0,
            gain: 0.5,
        }
    }
}

impl ScalarFieldGenerator for FractalField {
    fn sample(&self, position: Vec3) -> f32 {
        let mut frequency = self.frequency;
        let mut amplitude = self.amplitude;
        let mut total = 0.0;
        for _ in 0..self.octaves {
            total += nested_perlin(&self.perlin, position, frequency) * amplitude;
            frequency *= self.lacunarity;
            amplitude *= self.gain;
        }
        total
    }
}

/// Adapter turning any closure into a field
pub struct FieldFn<F>(pub F);

impl<F> ScalarFieldGenerator for FieldFn<F>
where
    F: Fn(Vec3) -> f32 + Send + Sync,
{
    fn sample(&self, position: Vec3) -> f32 {
        (self.0)(position)
    }
}

/// Square grid of heights, `(resolution + 1)^2` samples, row-major in z
#[derive(Clone, Debug)]
pub struct Heightfield {
    pub resolution: u32,
    pub size: f32,
    pub heights: Vec<f32>,
}

impl Heightfield {
    /// Height at grid vertex `(x, z)`
    pub fn height_at(&self, x: u32, z: u32) -> f32 {
        let stride = self.resolution as usize + 1;
        self.heights[z as usize * stride + x as usize]
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max(&self.heights)
    }
}

/// Sample FBM heights over a square XZ patch starting at `origin`.
pub fn heightfield(noise: &FractalNoise, origin: Vec2, size: f32, resolution: u32) -> Heightfield {
    let stride = resolution as usize + 1;
    let step = if resolution == 0 { 0.0 } else { size / resolution as f32 };

    let heights: Vec<f32> = (0..stride * stride)
        .into_par_iter()
        .map(|i| {
            let x = (i % stride) as f32;
            let z = (i / stride) as f32;
            noise.sample_2d(origin + Vec2::new(x, z) * step)
        })
        .collect();

    Heightfield { resolution, size, heights }
}
