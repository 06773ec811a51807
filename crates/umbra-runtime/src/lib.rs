//! Batched visibility raycasting: pooled result handlers and a double-buffered
//! scheduler that overlaps query production with background batch execution.
#![forbid(unsafe_code)]

mod handler;
mod scheduler;

use rayon::prelude::*;
use umbra_geom::Vec3;

pub use handler::{Completion, HandlerId, HandlerKind, HandlerPool, HandlerState, Operation};
pub use scheduler::{SchedulerConfig, SchedulerStats, VisibilityScheduler};

/// One occlusion query: a ray segment from `origin` along the normalized
/// `direction`, at most `max_distance` long.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayQuery {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl RayQuery {
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction,
            max_distance,
        }
    }

    /// Ray from `from` toward `to`, limited to `max_distance`.
    #[inline]
    pub fn toward(from: Vec3, to: Vec3, max_distance: f32) -> Self {
        Self::new(from, (to - from).normalized(), max_distance)
    }
}

/// Host collision primitive over static geometry.
///
/// `intersect` returns the first hit point along the ray. The batched form is
/// what the scheduler calls from its worker pool; the default implementation
/// fans the batch out over the current rayon pool.
pub trait Occluder: Send + Sync {
    fn intersect(&self, ray: &RayQuery) -> Option<Vec3>;

    fn intersect_batch(&self, rays: &[RayQuery], hits: &mut Vec<Option<Vec3>>) {
        rays.par_iter()
            .map(|r| self.intersect(r))
            .collect_into_vec(hits);
    }
}

/// Occluder with nothing in it; every query misses.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenSky;

impl Occluder for OpenSky {
    fn intersect(&self, _ray: &RayQuery) -> Option<Vec3> {
        None
    }
}
