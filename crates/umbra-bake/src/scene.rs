use std::fs;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use serde::Deserialize;
use umbra_geom::{Vec2, Vec3};
use umbra_lights::Light;
use umbra_trace::{MeshCollider, MeshError, StaticMesh};

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse scene: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error("mesh id {0} appears more than once")]
    DuplicateMesh(u32),
    #[error("light {index}: radius {radius} is not a finite non-negative number")]
    BadLight { index: usize, radius: f32 },
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct LightDesc {
    pub position: [f32; 3],
    pub radius: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MeshDesc {
    pub id: u32,
    pub positions: Vec<[f32; 3]>,
    pub uv2: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// Blocks light for every other mesh.
    #[serde(default = "yes")]
    pub occluder: bool,
    /// Receives a lightmap.
    #[serde(default = "yes")]
    pub receiver: bool,
}

/// `scene.toml` as written on disk.
#[derive(Clone, Debug, Deserialize)]
pub struct SceneDesc {
    pub name: String,
    #[serde(default, rename = "light")]
    pub lights: Vec<LightDesc>,
    #[serde(default, rename = "mesh")]
    pub meshes: Vec<MeshDesc>,
}

#[derive(Clone, Debug)]
pub struct SceneMesh {
    pub mesh: StaticMesh,
    pub occluder: bool,
    pub receiver: bool,
}

/// Validated scene ready for baking.
#[derive(Clone, Debug)]
pub struct Scene {
    pub name: String,
    pub lights: Vec<Light>,
    pub meshes: Vec<SceneMesh>,
}

impl SceneDesc {
    pub fn from_toml_str(s: &str) -> Result<Self, SceneError> {
        Ok(toml::from_str(s)?)
    }

    pub fn into_scene(self) -> Result<Scene, SceneError> {
        let mut lights = Vec::with_capacity(self.lights.len());
        for (index, l) in self.lights.into_iter().enumerate() {
            if !(l.radius.is_finite() && l.radius >= 0.0) {
                return Err(SceneError::BadLight {
                    index,
                    radius: l.radius,
                });
            }
            lights.push(Light::new(Vec3::from(l.position), l.radius));
        }

        let mut seen = HashSet::new();
        let mut meshes = Vec::with_capacity(self.meshes.len());
        for m in self.meshes {
            if !seen.insert(m.id) {
                return Err(SceneError::DuplicateMesh(m.id));
            }
            let mesh = StaticMesh::new(
                m.id,
                m.positions.into_iter().map(Vec3::from).collect(),
                m.uv2.into_iter().map(Vec2::from).collect(),
                m.indices,
            )?;
            meshes.push(SceneMesh {
                mesh,
                occluder: m.occluder,
                receiver: m.receiver,
            });
        }
        Ok(Scene {
            name: self.name,
            lights,
            meshes,
        })
    }
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let s = fs::read_to_string(path).map_err(|source| SceneError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        SceneDesc::from_toml_str(&s)?.into_scene()
    }

    /// Collision world made of every occluding mesh.
    pub fn collider(&self) -> MeshCollider {
        MeshCollider::from_meshes(self.meshes.iter().filter(|m| m.occluder).map(|m| &m.mesh))
    }

    pub fn receivers(&self) -> impl Iterator<Item = &StaticMesh> + '_ {
        self.meshes.iter().filter(|m| m.receiver).map(|m| &m.mesh)
    }
}
