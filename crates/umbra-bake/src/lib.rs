//! Bake orchestration: channel assignment, light BVH, per-mesh tracing and
//! lightmap persistence for one scene.
#![forbid(unsafe_code)]

mod config;
mod scene;

use std::sync::Arc;
use std::time::Instant;

use umbra_geom::Vec3;
use umbra_io::{LightmapStore, MeshEntry, StoreError};
use umbra_lights::{ChannelAssignment, Light, LightBvh, assign_channels};
use umbra_runtime::{Completion, Occluder, Operation, SchedulerStats, VisibilityScheduler};
use umbra_trace::{Lightmap, MeshError, StaticMesh, TraceStats, Tracer};

pub use config::{BakeConfig, ConfigError, LightmapResolution, MAX_LIGHTMAP_SIZE};
pub use scene::{LightDesc, MeshDesc, Scene, SceneDesc, SceneError, SceneMesh};

#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("ray worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Why one mesh produced no stored lightmap.
#[derive(Debug, thiserror::Error)]
pub enum MeshFailure {
    #[error(transparent)]
    Invalid(#[from] MeshError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct BakedMesh {
    pub id: u32,
    pub size: u32,
    pub stats: TraceStats,
    pub entry: MeshEntry,
}

/// Outcome of [`BakePipeline::bake`]; failed meshes never stop the others.
#[derive(Debug, Default)]
pub struct BakeReport {
    pub scene: String,
    pub baked: Vec<BakedMesh>,
    pub failed: Vec<(u32, MeshFailure)>,
    /// Input indices of lights that got no shadow channel.
    pub overflowed_lights: Vec<usize>,
    pub totals: TraceStats,
}

impl BakeReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.overflowed_lights.is_empty()
    }
}

/// State for a single bake: channelled lights, their BVH and the ray scheduler.
///
/// Built once per bake and passed around by reference; dropping it tears down
/// the scheduler, which is always flushed between operations.
pub struct BakePipeline {
    config: BakeConfig,
    lights: Vec<Light>,
    assignment: ChannelAssignment,
    bvh: Option<LightBvh>,
    sched: VisibilityScheduler,
    store: LightmapStore,
}

impl BakePipeline {
    pub fn new(
        config: BakeConfig,
        mut lights: Vec<Light>,
        occluder: Arc<dyn Occluder>,
    ) -> Result<Self, BakeError> {
        config.validate()?;
        let assignment = assign_channels(&lights);
        assignment.apply(&mut lights);
        let bvh = (config.use_light_bvh && !lights.is_empty()).then(|| LightBvh::build(&lights));
        let sched = VisibilityScheduler::new(occluder, config.scheduler())?;
        let store = LightmapStore::new(config.output_dir.clone());
        log::info!(
            target: "bake",
            "pipeline ready: {} lights ({} channelled), bvh {}",
            lights.len(),
            assignment.assigned_count(),
            if bvh.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            config,
            lights,
            assignment,
            bvh,
            sched,
            store,
        })
    }

    /// Pipeline for a loaded scene, colliding against its occluder meshes.
    pub fn for_scene(config: BakeConfig, scene: &Scene) -> Result<Self, BakeError> {
        let collider = Arc::new(scene.collider());
        Self::new(config, scene.lights.clone(), collider)
    }

    #[inline]
    pub fn config(&self) -> &BakeConfig {
        &self.config
    }

    #[inline]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    #[inline]
    pub fn assignment(&self) -> &ChannelAssignment {
        &self.assignment
    }

    #[inline]
    pub fn store(&self) -> &LightmapStore {
        &self.store
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.sched.stats()
    }

    fn tracer<'a>(
        config: &BakeConfig,
        lights: &'a [Light],
        bvh: Option<&'a LightBvh>,
    ) -> Tracer<'a> {
        let t = Tracer::new(lights).with_tolerance(config.hit_tolerance);
        match bvh {
            Some(b) => t.with_bvh(b),
            None => t,
        }
    }

    /// Trace one mesh at the configured resolution without storing it.
    pub fn trace_mesh(&mut self, mesh: &StaticMesh) -> Result<(Lightmap, TraceStats), MeshError> {
        mesh.validate()?;
        let size = self.config.resolution.resolve(mesh, self.config.texel_density);
        let tracer = Self::tracer(&self.config, &self.lights, self.bvh.as_ref());
        Ok(tracer.trace(mesh, size, &mut self.sched))
    }

    /// Trace and store every mesh under `scene`.
    pub fn bake<'m>(
        &mut self,
        scene: &str,
        meshes: impl IntoIterator<Item = &'m StaticMesh>,
    ) -> BakeReport {
        let t0 = Instant::now();
        let mut report = BakeReport {
            scene: scene.to_string(),
            overflowed_lights: self.assignment.overflowed.clone(),
            ..Default::default()
        };
        for mesh in meshes {
            match self.bake_one(scene, mesh) {
                Ok(baked) => {
                    report.totals += baked.stats;
                    report.baked.push(baked);
                }
                Err(e) => {
                    log::warn!(target: "bake", "mesh {} skipped: {}", mesh.id, e);
                    report.failed.push((mesh.id, e));
                }
            }
        }
        log::info!(
            target: "bake",
            "scene '{}': {} baked, {} failed, {} rays, {} texels in {}ms",
            scene,
            report.baked.len(),
            report.failed.len(),
            report.totals.rays,
            report.totals.texels_written,
            t0.elapsed().as_millis()
        );
        report
    }

    fn bake_one(&mut self, scene: &str, mesh: &StaticMesh) -> Result<BakedMesh, MeshFailure> {
        let (map, stats) = self.trace_mesh(mesh)?;
        let entry = self.store.save(scene, mesh.id, map.size(), map.texels())?;
        Ok(BakedMesh {
            id: mesh.id,
            size: map.size(),
            stats,
            entry,
        })
    }

    /// Channel mask for an arbitrary world point. A zero `normal` accepts
    /// lights from every direction.
    pub fn probe(&mut self, point: Vec3, normal: Vec3) -> u32 {
        self.probe_many(&[(point, normal)])[0]
    }

    /// Channel masks for several points, in input order.
    pub fn probe_many(&mut self, points: &[(Vec3, Vec3)]) -> Vec<u32> {
        let tracer = Self::tracer(&self.config, &self.lights, self.bvh.as_ref());
        let mut scratch = Vec::new();
        let mut masks = vec![0u32; points.len()];
        for (slot, &(point, normal)) in points.iter().enumerate() {
            let h = self.sched.begin(Operation::Probe {
                slot: slot as u32,
                sample: point,
                tolerance: tracer.tolerance(),
            });
            tracer.queue_probe(&mut self.sched, h, point, normal.normalized(), &mut scratch);
            self.sched.arm(h);
        }
        self.sched.flush();
        for done in self.sched.drain_completions() {
            if let Completion::Probe { slot, mask } = done {
                masks[slot as usize] = mask;
            }
        }
        masks
    }

    /// Flush outstanding work and return the scheduler totals.
    pub fn finish(self) -> SchedulerStats {
        let (stats, _) = self.sched.finish();
        stats
    }
}

/// Bake every receiver mesh of `scene` with a fresh pipeline.
pub fn bake_scene(config: BakeConfig, scene: &Scene) -> Result<BakeReport, BakeError> {
    let mut pipeline = BakePipeline::for_scene(config, scene)?;
    let report = pipeline.bake(&scene.name, scene.receivers());
    pipeline.finish();
    Ok(report)
}
