//! Lightmap tracing: rasterize static meshes in lightmap UV space and resolve
//! per-texel light visibility through the batched scheduler.
#![forbid(unsafe_code)]

mod collider;
mod mesh;
pub mod raster;
mod tracer;

pub use collider::MeshCollider;
pub use mesh::{MeshError, StaticMesh, Triangle};
pub use tracer::{DEFAULT_HIT_TOLERANCE, Lightmap, TraceStats, Tracer};
