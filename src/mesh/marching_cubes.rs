//! Marching cubes isosurface extraction over a [`ScalarLattice`]

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use super::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use super::Mesh;
use crate::terrain::ScalarLattice;

const EPSILON: f32 = 1e-5;

/// Corner positions (lattice-local) and values of one cell
#[derive(Clone, Copy, Debug)]
pub struct CubeSample {
    pub positions: [Vec3; 8],
    pub values: [f32; 8],
}

impl CubeSample {
    /// Gather the cell whose minimum corner is lattice point `cell`
    pub fn gather(lattice: &ScalarLattice, cell: UVec3) -> Self {
        let voxel = lattice.voxel_size();
        let mut positions = [Vec3::ZERO; 8];
        let mut values = [0.0; 8];
        for (i, [dx, dy, dz]) in CORNER_OFFSETS.into_iter().enumerate() {
            let corner = cell + UVec3::new(dx, dy, dz);
            positions[i] = corner.as_vec3() * voxel;
            values[i] = lattice.get(corner.x, corner.y, corner.z);
        }
        Self { positions, values }
    }

    /// Bit `i` is set iff corner `i` lies below `iso_level`
    pub fn cube_index(&self, iso_level: f32) -> usize {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v < iso_level)
            .fold(0, |index, (i, _)| index | (1 << i))
    }
}

/// Position of the iso crossing on the edge `p0 -> p1`
pub fn interpolate(p0: Vec3, p1: Vec3, v0: f32, v1: f32, iso_level: f32) -> Vec3 {
    if (iso_level - v0).abs() < EPSILON {
        return p0;
    }
    if (iso_level - v1).abs() < EPSILON {
        return p1;
    }
    if (v0 - v1).abs() < EPSILON {
        return p0;
    }
    p0 + (iso_level - v0) / (v1 - v0) * (p1 - p0)
}

/// Gradient direction of the trilinear field at a lattice-local position
fn estimate_normal(lattice: &ScalarLattice, local: Vec3) -> Vec3 {
    let d = lattice.voxel_size() * 0.5;
    let gradient = Vec3::new(
        lattice.sample_trilinear(local + Vec3::X * d) - lattice.sample_trilinear(local - Vec3::X * d),
        lattice.sample_trilinear(local + Vec3::Y * d) - lattice.sample_trilinear(local - Vec3::Y * d),
        lattice.sample_trilinear(local + Vec3::Z * d) - lattice.sample_trilinear(local - Vec3::Z * d),
    );
    gradient.try_normalize().unwrap_or(Vec3::Y)
}

/// Emit the triangles of one cell; normals are written only if `out` carries them
fn polygonise(lattice: &ScalarLattice, cube: &CubeSample, iso_level: f32, out: &mut Mesh) {
    let cube_index = cube.cube_index(iso_level);
    let edges = EDGE_TABLE[cube_index];
    if edges == 0 {
        return;
    }

    let mut edge_points = [Vec3::ZERO; 12];
    for (e, [a, b]) in EDGE_CORNERS.into_iter().enumerate() {
        if edges & (1 << e) != 0 {
            edge_points[e] = interpolate(
                cube.positions[a],
                cube.positions[b],
                cube.values[a],
                cube.values[b],
                iso_level,
            );
        }
    }

    let origin = lattice.origin();
    for tri in TRI_TABLE[cube_index].chunks_exact(3) {
        if tri[0] < 0 {
            break;
        }
        let base = out.positions.len() as u32;
        for &edge in tri {
            let local = edge_points[edge as usize];
            out.positions.push(origin + local);
            if let Some(normals) = out.normals.as_mut() {
                normals.push(estimate_normal(lattice, local));
            }
        }
        out.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }
}

/// Triangulate the `iso_level` surface of `lattice`.
///
/// Vertices are in world space and never shared between triangles. With
/// `smooth_normals` each vertex gets the normalized field gradient, otherwise
/// normals are left to the caller.
pub fn extract(lattice: &ScalarLattice, iso_level: f32, smooth_normals: bool) -> Mesh {
    let cells = lattice.cells();
    if cells.min_element() == 0 {
        return Mesh::new();
    }

    let slabs: Vec<Mesh> = (0..cells.z)
        .into_par_iter()
        .map(|z| {
            let mut slab = Mesh {
                normals: smooth_normals.then(Vec::new),
                ..Mesh::new()
            };
            for y in 0..cells.y {
                for x in 0..cells.x {
                    let cube = CubeSample::gather(lattice, UVec3::new(x, y, z));
                    polygonise(lattice, &cube, iso_level, &mut slab);
                }
            }
            slab
        })
        .collect();

    merge_slabs(slabs)
}

fn merge_slabs(slabs: Vec<Mesh>) -> Mesh {
    slabs.into_iter().fold(Mesh::new(), |mut merged, slab| {
        merged.append(slab);
        merged
    })
}
