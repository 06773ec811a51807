//! Static light records, shadow channel assignment and the light BVH.
#![forbid(unsafe_code)]

use umbra_geom::{Aabb, Vec3};

mod bvh;
mod channels;

pub use bvh::{BvhNode, LightBvh};
pub use channels::{ChannelAssignment, assign_channels};

/// Width of a texel mask; one bit per shadow channel.
pub const MAX_CHANNELS: usize = 32;

/// A point/spot light registered for baking.
///
/// Position and radius are fixed for one bake pass. `channel` stays `None` until
/// the assignor runs, and remains `None` for lights that overflowed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub radius: f32,
    pub channel: Option<u8>,
}

impl Light {
    #[inline]
    pub fn new(position: Vec3, radius: f32) -> Self {
        Self {
            position,
            radius: radius.max(0.0),
            channel: None,
        }
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_sphere(self.position, self.radius)
    }

    /// Influence spheres touch or intersect.
    #[inline]
    pub fn overlaps(&self, other: &Light) -> bool {
        self.position.distance(other.position) <= self.radius + other.radius
    }

    #[inline]
    pub fn reaches(&self, p: Vec3) -> bool {
        self.position.distance(p) <= self.radius
    }

    /// Mask bit for the assigned channel.
    #[inline]
    pub fn channel_bit(&self) -> Option<u32> {
        self.channel.map(|c| 1u32 << c)
    }
}

#[cfg(test)]
mod tests;
