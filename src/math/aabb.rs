//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest AABB enclosing all points, `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Aabb::new(first, first);
        for p in iter {
            aabb.expand(p);
        }
        Some(aabb)
    }

    /// Footprint of a square chunk spanning `[origin, origin + size]` on XZ
    /// and `[min_y, max_y]` vertically.
    pub fn chunk_footprint(origin: Vec3, size: f32, min_y: f32, max_y: f32) -> Self {
        Self {
            min: Vec3::new(origin.x, origin.y + min_y, origin.z),
            max: Vec3::new(origin.x + size, origin.y + max_y, origin.z + size),
        }
    }

    /// Whether a sphere touches the box
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }

    /// Grow to include `point`
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects_sphere() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.intersects_sphere(Vec3::splat(0.5), 0.1));
        assert!(aabb.intersects_sphere(Vec3::new(2.0, 0.5, 0.5), 1.0));
        assert!(!aabb.intersects_sphere(Vec3::new(3.0, 0.5, 0.5), 1.0));
    }

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(std::iter::empty::<Vec3>()).is_none());

        let aabb = Aabb::from_points([
            Vec3::new(1.0, -2.0, 0.0),
            Vec3::new(-1.0, 3.0, 0.5),
        ]).unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 3.0, 0.5));
    }

    #[test]
    fn test_chunk_footprint() {
        let aabb = Aabb::chunk_footprint(Vec3::new(32.0, 0.0, -16.0), 16.0, -4.0, 12.0);
        assert_eq!(aabb.min, Vec3::new(32.0, -4.0, -16.0));
        assert_eq!(aabb.max, Vec3::new(48.0, 12.0, 0.0));
    }
}
