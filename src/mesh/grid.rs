//! Regular-grid terrain patches

use glam::{Vec2, Vec3, Vec3Swizzles};
use rayon::prelude::*;

use super::Mesh;
use crate::core::{Error, Result};
use crate::terrain::{heightfield, FractalNoise};

fn check_resolution(resolution: u32) -> Result<()> {
    if resolution == 0 {
        return Err(Error::Config("mesh resolution must be at least 1".into()));
    }
    Ok(())
}

/// Triangle indices for a `resolution x resolution` quad grid, two triangles
/// per quad wound `bl, tl, br` / `br, tl, tr`.
fn grid_indices(resolution: u32) -> Vec<u32> {
    let stride = resolution + 1;
    let mut indices = Vec::with_capacity((resolution * resolution * 6) as usize);
    for z in 0..resolution {
        for x in 0..resolution {
            let bl = z * stride + x;
            let br = bl + 1;
            let tl = bl + stride;
            let tr = tl + 1;
            indices.extend_from_slice(&[bl, tl, br, br, tl, tr]);
        }
    }
    indices
}

fn grid_uvs(resolution: u32) -> Vec<Vec2> {
    let stride = resolution + 1;
    (0..stride * stride)
        .map(|i| Vec2::new((i % stride) as f32, (i / stride) as f32) / resolution as f32)
        .collect()
}

/// Flat `size x size` patch in the XZ plane with `(resolution + 1)^2` vertices.
pub fn flat_mesh(size: f32, resolution: u32) -> Result<Mesh> {
    check_resolution(resolution)?;

    let uvs = grid_uvs(resolution);
    let positions = uvs.iter().map(|uv| Vec3::new(uv.x * size, 0.0, uv.y * size)).collect();
    let normals = vec![Vec3::Y; uvs.len()];

    Ok(Mesh {
        positions,
        normals: Some(normals),
        uvs: Some(uvs),
        indices: grid_indices(resolution),
    })
}

/// Displaced terrain patch in chunk-local space.
///
/// Heights come from `noise` at `origin.xz` plus the local offset; normals are
/// central differences over a one-sample apron so adjacent chunks agree on
/// their shared edge.
pub fn build_mesh(origin: Vec3, size: f32, resolution: u32, noise: &FractalNoise) -> Result<Mesh> {
    check_resolution(resolution)?;

    let step = size / resolution as f32;
    let padded = resolution + 2;
    let apron = heightfield(noise, origin.xz() - Vec2::splat(step), size + 2.0 * step, padded);

    let stride = resolution + 1;
    let (positions, normals): (Vec<Vec3>, Vec<Vec3>) = (0..stride * stride)
        .into_par_iter()
        .map(|i| {
            let x = i % stride;
            let z = i / stride;
            // Apron coordinates are shifted by one sample
            let (ax, az) = (x + 1, z + 1);
            let h = apron.height_at(ax, az);

            let dx = apron.height_at(ax + 1, az) - apron.height_at(ax - 1, az);
            let dz = apron.height_at(ax, az + 1) - apron.height_at(ax, az - 1);
            let normal = Vec3::new(-dx, 2.0 * step, -dz).try_normalize().unwrap_or(Vec3::Y);

            (Vec3::new(x as f32 * step, h, z as f32 * step), normal)
        })
        .unzip();

    Ok(Mesh {
        positions,
        normals: Some(normals),
        uvs: Some(grid_uvs(resolution)),
        indices: grid_indices(resolution),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::NoiseParams;

    #[test]
    fn test_flat_mesh_layout() {
        let mesh = flat_mesh(10.0, 2).unwrap();
        assert_eq!(mesh.vertex_count(), 9);
        assert_eq!(mesh.indices.len(), 2 * 2 * 6);
        assert_eq!(&mesh.indices[..6], &[0, 3, 1, 1, 3, 4]);
        assert_eq!(mesh.positions[8], Vec3::new(10.0, 0.0, 10.0));
        assert_eq!(mesh.positions[1], Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(mesh.uvs.as_ref().unwrap()[5], Vec2::new(1.0, 0.5));
        assert!(mesh.is_well_formed());
    }

    #[test]
    fn test_flat_mesh_faces_up() {
        let mut mesh = flat_mesh(4.0, 3).unwrap();
        mesh.recalculate_flat_normals();
        for n in mesh.normals.unwrap() {
            assert!((n - Vec3::Y).length() < 1e-5);
        }
    }

    #[test]
    fn test_zero_resolution_is_config_error() {
        assert!(matches!(flat_mesh(1.0, 0), Err(Error::Config(_))));
        let noise = FractalNoise::new(NoiseParams::default());
        assert!(matches!(build_mesh(Vec3::ZERO, 1.0, 0, &noise), Err(Error::Config(_))));
    }

    #[test]
    fn test_build_mesh_heights() {
        let noise = FractalNoise::new(NoiseParams::default());
        let origin = Vec3::new(128.0, 0.0, -64.0);
        let mesh = build_mesh(origin, 32.0, 8, &noise).unwrap();

        assert_eq!(mesh.vertex_count(), 81);
        assert_eq!(mesh.triangle_count(), 128);
        assert!(mesh.is_well_formed());

        for (i, p) in mesh.positions.iter().enumerate() {
            let x = (i % 9) as f32 * 4.0;
            let z = (i / 9) as f32 * 4.0;
            assert_eq!(p.x, x);
            assert_eq!(p.z, z);
            let expected = noise.sample_2d(Vec2::new(origin.x + x, origin.z + z));
            assert!((p.y - expected).abs() < 1e-3, "vertex {i}: {} vs {expected}", p.y);
        }

        for n in mesh.normals.as_ref().unwrap() {
            assert!((n.length() - 1.0).abs() < 1e-4);
            assert!(n.y > 0.0);
        }
    }

    #[test]
    fn test_adjacent_chunks_share_edge() {
        let noise = FractalNoise::new(NoiseParams::default());
        let a = build_mesh(Vec3::ZERO, 16.0, 4, &noise).unwrap();
        let b = build_mesh(Vec3::new(16.0, 0.0, 0.0), 16.0, 4, &noise).unwrap();

        for z in 0..5 {
            let right = &a.positions[z * 5 + 4];
            let left = &b.positions[z * 5];
            assert!((right.y - left.y).abs() < 1e-3);
            let na = a.normals.as_ref().unwrap()[z * 5 + 4];
            let nb = b.normals.as_ref().unwrap()[z * 5];
            assert!((na - nb).length() < 1e-3);
        }
    }
}
