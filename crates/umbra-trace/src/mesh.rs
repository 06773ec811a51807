use umbra_geom::{Aabb, Vec2, Vec3};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("mesh {id}: {positions} positions but {uv2} lightmap uvs")]
    UvCount { id: u32, positions: usize, uv2: usize },
    #[error("mesh {id}: index count {len} is not a multiple of 3")]
    PartialTriangle { id: u32, len: usize },
    #[error("mesh {id}: index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { id: u32, index: u32, vertices: usize },
}

/// Static triangle mesh in world space with its lightmap UV channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticMesh {
    pub id: u32,
    pub positions: Vec<Vec3>,
    pub uv2: Vec<Vec2>,
    pub indices: Vec<u32>,
}

/// One triangle with world corners and lightmap UVs in matching order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub world: [Vec3; 3],
    pub uv: [Vec2; 3],
}

impl Triangle {
    /// Unit face normal from the winding, or zero for a degenerate triangle.
    pub fn normal(&self) -> Vec3 {
        let [a, b, c] = self.world;
        (b - a).cross(c - a).normalized()
    }

    /// Interpolate the world position from barycentric weights.
    #[inline]
    pub fn lerp(&self, w: Vec3) -> Vec3 {
        self.world[0] * w.x + self.world[1] * w.y + self.world[2] * w.z
    }

    pub fn area(&self) -> f32 {
        let [a, b, c] = self.world;
        (b - a).cross(c - a).length() * 0.5
    }
}

impl StaticMesh {
    /// Checked constructor; the fields are public for callers that already
    /// hold valid data.
    pub fn new(
        id: u32,
        positions: Vec<Vec3>,
        uv2: Vec<Vec2>,
        indices: Vec<u32>,
    ) -> Result<Self, MeshError> {
        let mesh = Self {
            id,
            positions,
            uv2,
            indices,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.positions.len() != self.uv2.len() {
            return Err(MeshError::UvCount {
                id: self.id,
                positions: self.positions.len(),
                uv2: self.uv2.len(),
            });
        }
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::PartialTriangle {
                id: self.id,
                len: self.indices.len(),
            });
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.positions.len())
        {
            return Err(MeshError::IndexOutOfRange {
                id: self.id,
                index,
                vertices: self.positions.len(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangle(&self, i: usize) -> Triangle {
        let t = &self.indices[i * 3..i * 3 + 3];
        let (a, b, c) = (t[0] as usize, t[1] as usize, t[2] as usize);
        Triangle {
            world: [self.positions[a], self.positions[b], self.positions[c]],
            uv: [self.uv2[a], self.uv2[b], self.uv2[c]],
        }
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.triangle_count()).map(|i| self.triangle(i))
    }

    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::EMPTY;
        for &p in &self.positions {
            b.encapsulate(&Aabb::new(p, p));
        }
        b
    }

    /// Total world-space surface area.
    pub fn surface_area(&self) -> f32 {
        self.triangles().map(|t| t.area()).sum()
    }

    /// Axis-aligned quad spanning `min..max` on the plane `y = height`, facing
    /// up, with UVs covering the full unit square.
    pub fn quad_xz(id: u32, min: (f32, f32), max: (f32, f32), height: f32) -> Self {
        let (x0, z0) = min;
        let (x1, z1) = max;
        Self {
            id,
            positions: vec![
                Vec3::new(x0, height, z0),
                Vec3::new(x1, height, z0),
                Vec3::new(x1, height, z1),
                Vec3::new(x0, height, z1),
            ],
            uv2: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            // Wound so the face normal is +Y.
            indices: vec![0, 2, 1, 0, 3, 2],
        }
    }
}
