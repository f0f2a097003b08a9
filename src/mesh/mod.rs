//! Triangle meshes: regular-grid patches and marching cubes isosurfaces

pub mod grid;
pub mod marching_cubes;
pub mod tables;

pub use grid::{build_mesh, flat_mesh};
pub use marching_cubes::{extract as extract_isosurface, interpolate, CubeSample};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::math::Aabb;

/// Interleaved vertex layout for renderer upload
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Indexed triangle list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether the index buffer forms whole triangles over existing vertices
    pub fn is_well_formed(&self) -> bool {
        let n = self.positions.len();
        self.indices.len() % 3 == 0
            && self.indices.iter().all(|&i| (i as usize) < n)
            && self.normals.as_ref().is_none_or(|v| v.len() == n)
            && self.uvs.as_ref().is_none_or(|v| v.len() == n)
    }

    /// Bounding box of all vertex positions, `None` for a mesh without vertices
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().copied())
    }

    /// Recompute normals from triangle faces.
    ///
    /// Face normals are accumulated per vertex, so meshes without shared
    /// vertices (marching cubes output) come out faceted.
    pub fn recalculate_flat_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];

        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let face = (self.positions[b] - self.positions[a])
                .cross(self.positions[c] - self.positions[a]);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }

        for n in &mut normals {
            *n = n.try_normalize().unwrap_or(Vec3::Y);
        }
        self.normals = Some(normals);
    }

    /// Append `other`, rebasing its indices past the current vertices.
    ///
    /// Optional attributes survive only if both meshes carry them (an empty
    /// `self` adopts `other`'s).
    pub fn append(&mut self, other: Mesh) {
        if self.positions.is_empty() && self.indices.is_empty() {
            *self = other;
            return;
        }

        let base = self.positions.len() as u32;
        self.positions.extend(other.positions);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
        self.normals = match (self.normals.take(), other.normals) {
            (Some(mut a), Some(b)) => {
                a.extend(b);
                Some(a)
            }
            _ => None,
        };
        self.uvs = match (self.uvs.take(), other.uvs) {
            (Some(mut a), Some(b)) => {
                a.extend(b);
                Some(a)
            }
            _ => None,
        };
    }

    /// Interleave attributes into a GPU-ready buffer; missing normals default
    /// to `+Y` and missing UVs to zero.
    pub fn to_vertices(&self) -> Vec<MeshVertex> {
        (0..self.positions.len())
            .map(|i| MeshVertex {
                position: self.positions[i].to_array(),
                normal: self
                    .normals
                    .as_ref()
                    .map_or(Vec3::Y, |n| n[i])
                    .to_array(),
                uv: self.uvs.as_ref().map_or(Vec2::ZERO, |uv| uv[i]).to_array(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(offset: Vec3) -> Mesh {
        Mesh {
            positions: vec![offset, offset + Vec3::Z, offset + Vec3::X],
            normals: None,
            uvs: Some(vec![Vec2::ZERO, Vec2::Y, Vec2::X]),
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_counts_and_bounds() {
        let mesh = triangle(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert!(mesh.is_well_formed());

        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bounds.max, Vec3::new(2.0, 2.0, 4.0));
        assert!(Mesh::new().bounds().is_none());
    }

    #[test]
    fn test_recalculate_flat_normals() {
        let mut mesh = triangle(Vec3::ZERO);
        mesh.recalculate_flat_normals();

        let normals = mesh.normals.as_ref().unwrap();
        assert_eq!(normals.len(), 3);
        for n in normals {
            assert!((*n - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn test_append_rebases_indices() {
        let mut mesh = triangle(Vec3::ZERO);
        mesh.append(triangle(Vec3::X * 5.0));

        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.positions[3], Vec3::X * 5.0);
        assert_eq!(mesh.uvs.as_ref().map(Vec::len), Some(6));
        assert!(mesh.normals.is_none());
        assert!(mesh.is_well_formed());

        let mut empty = Mesh::new();
        empty.append(triangle(Vec3::ZERO));
        assert_eq!(empty, triangle(Vec3::ZERO));
    }

    #[test]
    fn test_malformed_mesh_detected() {
        let mut mesh = triangle(Vec3::ZERO);
        mesh.indices.push(7);
        assert!(!mesh.is_well_formed());
    }

    #[test]
    fn test_to_vertices() {
        let vertices = triangle(Vec3::ZERO).to_vertices();
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].position, [0.0, 0.0, 1.0]);
        assert_eq!(vertices[1].normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[2].uv, [1.0, 0.0]);

        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 3 * std::mem::size_of::<MeshVertex>());
        assert_eq!(std::mem::size_of::<MeshVertex>(), 32);
    }
}
