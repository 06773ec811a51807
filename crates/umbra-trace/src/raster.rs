use core::ops::Range;

use umbra_geom::{Vec2, Vec3, barycentric};

use crate::mesh::Triangle;

/// A lightmap pixel covered by a triangle, with its world-space sample point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexelSample {
    pub x: u32,
    pub y: u32,
    pub position: Vec3,
}

/// UV of the center of pixel `(x, y)` in a `size`-square lightmap.
#[inline]
pub fn pixel_center(x: u32, y: u32, size: u32) -> Vec2 {
    let s = size as f32;
    Vec2::new((x as f32 + 0.5) / s, (y as f32 + 0.5) / s)
}

/// Pixel rectangle covering the triangle's UV bounding box, clamped to the map.
pub fn pixel_bounds(uv: &[Vec2; 3], size: u32) -> Option<(Range<u32>, Range<u32>)> {
    if size == 0 {
        return None;
    }
    let lo = uv[0].min(uv[1]).min(uv[2]);
    let hi = uv[0].max(uv[1]).max(uv[2]);
    if !(lo.x.is_finite() && lo.y.is_finite() && hi.x.is_finite() && hi.y.is_finite()) {
        return None;
    }
    let s = size as f32;
    let clamp = |v: f32| v.clamp(0.0, s) as u32;
    let xs = clamp((lo.x * s).floor())..clamp((hi.x * s).ceil());
    let ys = clamp((lo.y * s).floor())..clamp((hi.y * s).ceil());
    if xs.is_empty() || ys.is_empty() {
        None
    } else {
        Some((xs, ys))
    }
}

/// Visit every pixel whose center falls inside the triangle's UV footprint.
///
/// Returns `None` for a triangle with zero UV area, which produces no samples.
/// Otherwise returns the number of samples emitted, which may be zero when the
/// footprint misses every pixel center.
pub fn rasterize<F>(tri: &Triangle, size: u32, mut emit: F) -> Option<usize>
where
    F: FnMut(TexelSample),
{
    let [a, b, c] = tri.uv;
    // Area test up front so a degenerate triangle is reported even when its
    // bounding box covers no pixel.
    barycentric(a, a, b, c)?;
    let Some((xs, ys)) = pixel_bounds(&tri.uv, size) else {
        return Some(0);
    };
    let mut n = 0;
    for y in ys {
        for x in xs.clone() {
            let Some(w) = barycentric(pixel_center(x, y, size), a, b, c) else {
                continue;
            };
            if w.x < 0.0 || w.y < 0.0 || w.z < 0.0 {
                continue;
            }
            emit(TexelSample {
                x,
                y,
                position: tri.lerp(w),
            });
            n += 1;
        }
    }
    Some(n)
}
