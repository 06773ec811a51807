use umbra_geom::{Aabb, Vec3, ray_triangle};
use umbra_runtime::{Occluder, RayQuery};

use crate::mesh::StaticMesh;

/// Brute-force triangle soup occluder.
///
/// Stands in for a host engine's collision world. Triangles are two-sided, so a
/// ray stops at the first surface regardless of winding.
#[derive(Clone, Debug)]
pub struct MeshCollider {
    tris: Vec<[Vec3; 3]>,
    bounds: Aabb,
}

impl MeshCollider {
    pub fn new() -> Self {
        Self {
            tris: Vec::new(),
            bounds: Aabb::EMPTY,
        }
    }

    pub fn from_meshes<'a>(meshes: impl IntoIterator<Item = &'a StaticMesh>) -> Self {
        let mut c = Self::new();
        for m in meshes {
            c.add_mesh(m);
        }
        c
    }

    pub fn add_mesh(&mut self, mesh: &StaticMesh) {
        for t in mesh.triangles() {
            self.add_triangle(t.world);
        }
    }

    pub fn add_triangle(&mut self, tri: [Vec3; 3]) {
        for p in tri {
            self.bounds.encapsulate(&Aabb::new(p, p));
        }
        self.tris.push(tri);
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn nearest(&self, ray: &RayQuery) -> Option<f32> {
        let mut best: Option<f32> = None;
        for &[a, b, c] in &self.tris {
            let limit = best.unwrap_or(ray.max_distance);
            if let Some(t) = ray_triangle(ray.origin, ray.direction, limit, a, b, c) {
                best = Some(t);
            }
        }
        best
    }
}

impl Default for MeshCollider {
    fn default() -> Self {
        Self::new()
    }
}

impl Occluder for MeshCollider {
    fn intersect(&self, ray: &RayQuery) -> Option<Vec3> {
        if self.tris.is_empty() || ray.direction.is_zero() {
            return None;
        }
        self.nearest(ray).map(|t| ray.origin + ray.direction * t)
    }
}
