use std::ops::AddAssign;
use std::time::{Duration, Instant};

use umbra_geom::Vec3;
use umbra_lights::{Light, LightBvh};
use umbra_runtime::{Completion, HandlerId, Operation, RayQuery, VisibilityScheduler};

use crate::mesh::StaticMesh;
use crate::raster;

/// Distance within which a returned hit counts as reaching the sample.
pub const DEFAULT_HIT_TOLERANCE: f32 = 0.01;

/// Square grid of texel masks; bit `c` set means channel `c` reaches the texel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lightmap {
    size: u32,
    texels: Vec<u32>,
}

impl Lightmap {
    pub fn new(size: u32) -> Self {
        let n = size as usize * size as usize;
        Self {
            size,
            texels: vec![0; n],
        }
    }

    /// Wrap decoded texels; `None` if the length is not `size * size`.
    pub fn from_texels(size: u32, texels: Vec<u32>) -> Option<Self> {
        (texels.len() == size as usize * size as usize).then_some(Self { size, texels })
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn texels(&self) -> &[u32] {
        &self.texels
    }

    #[inline]
    pub fn into_texels(self) -> Vec<u32> {
        self.texels
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.size as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.texels[self.idx(x, y)]
    }

    /// Write `mask` at `(x, y)` and its four edge neighbours that lie inside the
    /// map. Later writes overwrite earlier padding.
    pub fn splat(&mut self, x: u32, y: u32, mask: u32) {
        let i = self.idx(x, y);
        self.texels[i] = mask;
        let s = self.size;
        let neighbours = [
            (x.checked_sub(1), Some(y)),
            ((x + 1 < s).then_some(x + 1), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), (y + 1 < s).then_some(y + 1)),
        ];
        for (nx, ny) in neighbours {
            if let (Some(nx), Some(ny)) = (nx, ny) {
                let i = self.idx(nx, ny);
                self.texels[i] = mask;
            }
        }
    }

    /// Texels with any channel bit set.
    pub fn covered(&self) -> usize {
        self.texels.iter().filter(|&&m| m != 0).count()
    }

    /// Per-channel count of texels with that bit set.
    pub fn channel_coverage(&self) -> [usize; 32] {
        let mut out = [0usize; 32];
        for &m in &self.texels {
            let mut bits = m;
            while bits != 0 {
                let c = bits.trailing_zeros() as usize;
                out[c] += 1;
                bits &= bits - 1;
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub triangles: u64,
    /// Zero normal or zero UV area.
    pub skipped_triangles: u64,
    pub samples: u64,
    pub rays: u64,
    /// Pixels that received a non-zero mask (padding not counted).
    pub texels_written: u64,
    pub elapsed: Duration,
}

impl AddAssign for TraceStats {
    fn add_assign(&mut self, rhs: Self) {
        self.triangles += rhs.triangles;
        self.skipped_triangles += rhs.skipped_triangles;
        self.samples += rhs.samples;
        self.rays += rhs.rays;
        self.texels_written += rhs.texels_written;
        self.elapsed += rhs.elapsed;
    }
}

/// Converts meshes into texel masks against a fixed set of channelled lights.
///
/// If a BVH is attached it must have been built from the same `lights` slice;
/// it only prunes the per-sample light list and never changes the result.
pub struct Tracer<'a> {
    lights: &'a [Light],
    bvh: Option<&'a LightBvh>,
    tolerance: f32,
}

impl<'a> Tracer<'a> {
    pub fn new(lights: &'a [Light]) -> Self {
        Self {
            lights,
            bvh: None,
            tolerance: DEFAULT_HIT_TOLERANCE,
        }
    }

    pub fn with_bvh(mut self, bvh: &'a LightBvh) -> Self {
        debug_assert_eq!(bvh.indices().len(), self.lights.len());
        self.bvh = Some(bvh);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    #[inline]
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Trace one mesh into a `size`-square lightmap.
    ///
    /// Returns once every query issued for the mesh has completed.
    pub fn trace(
        &self,
        mesh: &StaticMesh,
        size: u32,
        sched: &mut VisibilityScheduler,
    ) -> (Lightmap, TraceStats) {
        let t0 = Instant::now();
        let mut map = Lightmap::new(size);
        let mut stats = TraceStats::default();
        let mut scratch = Vec::new();

        for tri in mesh.triangles() {
            stats.triangles += 1;
            let normal = tri.normal();
            if normal.is_zero() {
                stats.skipped_triangles += 1;
                continue;
            }
            let covered = raster::rasterize(&tri, size, |s| {
                let handler = sched.begin(Operation::Texel {
                    x: s.x,
                    y: s.y,
                    sample: s.position,
                    tolerance: self.tolerance,
                });
                stats.rays += self.queue_sample(sched, handler, s.position, normal, &mut scratch);
                sched.arm(handler);
                absorb(&mut map, &mut stats, sched.drain_completions());
            });
            match covered {
                Some(n) => stats.samples += n as u64,
                None => stats.skipped_triangles += 1,
            }
        }
        sched.flush();
        absorb(&mut map, &mut stats, sched.drain_completions());

        stats.elapsed = t0.elapsed();
        log::debug!(
            target: "trace",
            "mesh {}: {} tris ({} skipped), {} samples, {} rays, {} texels in {}ms",
            mesh.id,
            stats.triangles,
            stats.skipped_triangles,
            stats.samples,
            stats.rays,
            stats.texels_written,
            stats.elapsed.as_millis()
        );
        (map, stats)
    }

    /// Queue one visibility query per channelled light that can reach `sample`
    /// from the front of `normal`. A zero `normal` disables the facing test.
    ///
    /// Returns the number of queries submitted; the caller still arms `handler`.
    pub fn queue_sample(
        &self,
        sched: &mut VisibilityScheduler,
        handler: HandlerId,
        sample: Vec3,
        normal: Vec3,
        scratch: &mut Vec<u32>,
    ) -> u64 {
        self.queue(sched, handler, sample, normal, scratch, false)
    }

    /// Like [`queue_sample`](Self::queue_sample) for a point that need not lie
    /// on a surface: rays stop just past the point, so geometry behind it does
    /// not count as a blocker.
    pub fn queue_probe(
        &self,
        sched: &mut VisibilityScheduler,
        handler: HandlerId,
        point: Vec3,
        normal: Vec3,
        scratch: &mut Vec<u32>,
    ) -> u64 {
        self.queue(sched, handler, point, normal, scratch, true)
    }

    fn queue(
        &self,
        sched: &mut VisibilityScheduler,
        handler: HandlerId,
        sample: Vec3,
        normal: Vec3,
        scratch: &mut Vec<u32>,
        clip: bool,
    ) -> u64 {
        let mut rays = 0;
        let mut visit = |light: &Light| {
            let Some(channel) = light.channel else {
                return;
            };
            if light.radius <= 0.0 || !light.reaches(sample) {
                return;
            }
            if (light.position - sample).dot(normal) < 0.0 {
                return;
            }
            let max = if clip {
                (light.position.distance(sample) + self.tolerance).min(light.radius)
            } else {
                light.radius
            };
            sched.submit(RayQuery::toward(light.position, sample, max), handler, channel);
            rays += 1;
        };
        match self.bvh {
            Some(bvh) => {
                bvh.query_overlapping(sample, scratch);
                for &li in scratch.iter() {
                    visit(&self.lights[li as usize]);
                }
            }
            None => self.lights.iter().for_each(visit),
        }
        rays
    }
}

fn absorb(map: &mut Lightmap, stats: &mut TraceStats, done: impl Iterator<Item = Completion>) {
    for c in done {
        match c {
            Completion::Texel { x, y, mask } if mask != 0 => {
                map.splat(x, y, mask);
                stats.texels_written += 1;
            }
            Completion::Texel { .. } => {}
            // Probes are flushed by whoever issued them before a trace starts.
            Completion::Probe { slot, .. } => {
                log::warn!(target: "trace", "stray probe completion {slot} during trace");
            }
        }
    }
}
