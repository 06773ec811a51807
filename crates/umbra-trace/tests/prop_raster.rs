use proptest::prelude::*;
use umbra_geom::{Vec2, Vec3, barycentric};
use umbra_trace::raster::{pixel_center, rasterize};
use umbra_trace::{StaticMesh, Triangle};

fn uv() -> impl Strategy<Value = Vec2> {
    (-0.25f32..1.25, -0.25f32..1.25).prop_map(|(u, v)| Vec2::new(u, v))
}

fn triangle() -> impl Strategy<Value = Triangle> {
    [uv(), uv(), uv()].prop_map(|uv| Triangle {
        world: uv.map(|p| Vec3::new(p.x * 3.0, 1.0, p.y * 3.0)),
        uv,
    })
}

proptest! {
    // Every emitted texel is inside the map and its center inside the triangle.
    #[test]
    fn samples_lie_inside_the_footprint(tri in triangle(), size in 1u32..48) {
        let mut out = Vec::new();
        if let Some(n) = rasterize(&tri, size, |s| out.push(s)) {
            prop_assert_eq!(n, out.len());
        }
        let [a, b, c] = tri.uv;
        for s in out {
            prop_assert!(s.x < size && s.y < size);
            let w = barycentric(pixel_center(s.x, s.y, size), a, b, c).unwrap();
            prop_assert!(w.x >= 0.0 && w.y >= 0.0 && w.z >= 0.0);
            // World position is the UV scaled by 3 on the y = 1 plane.
            prop_assert!((s.position.y - 1.0).abs() < 1e-4);
        }
    }

    // A quad with full-square UVs reaches every pixel at least once.
    #[test]
    fn unit_quad_covers_every_pixel(size in 1u32..40) {
        let quad = StaticMesh::quad_xz(0, (0.0, 0.0), (1.0, 1.0), 0.0);
        let mut hit = vec![false; (size * size) as usize];
        for tri in quad.triangles() {
            rasterize(&tri, size, |s| hit[(s.y * size + s.x) as usize] = true);
        }
        prop_assert!(hit.iter().all(|&h| h));
    }
}
