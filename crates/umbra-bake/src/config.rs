use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use umbra_runtime::SchedulerConfig;
use umbra_trace::{DEFAULT_HIT_TOLERANCE, StaticMesh};

pub use umbra_io::MAX_LIGHTMAP_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse bake config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid bake config: {0}")]
    Invalid(String),
}

/// Lightmap edge length policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawResolution")]
pub enum LightmapResolution {
    /// Square map of this edge length.
    Fixed(u32),
    /// Sized from the mesh surface area and the configured texel density.
    Unlimited,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResolution {
    Size(u32),
    Named(String),
}

impl TryFrom<RawResolution> for LightmapResolution {
    type Error = String;

    fn try_from(raw: RawResolution) -> Result<Self, Self::Error> {
        match raw {
            RawResolution::Size(0) => Err("resolution must be positive".to_string()),
            RawResolution::Size(n) => Ok(LightmapResolution::Fixed(n)),
            RawResolution::Named(s) if s.eq_ignore_ascii_case("unlimited") => {
                Ok(LightmapResolution::Unlimited)
            }
            RawResolution::Named(s) => Err(format!(
                "resolution must be a size or \"unlimited\", got \"{s}\""
            )),
        }
    }
}

impl LightmapResolution {
    /// Edge length for `mesh`, never above [`MAX_LIGHTMAP_SIZE`].
    pub fn resolve(&self, mesh: &StaticMesh, texel_density: f32) -> u32 {
        match *self {
            LightmapResolution::Fixed(n) => n.min(MAX_LIGHTMAP_SIZE),
            LightmapResolution::Unlimited => {
                let edge = (mesh.surface_area().sqrt() * texel_density).ceil();
                if edge.is_finite() && edge >= 1.0 {
                    (edge as u32).min(MAX_LIGHTMAP_SIZE)
                } else {
                    1
                }
            }
        }
    }
}

fn default_resolution() -> LightmapResolution {
    LightmapResolution::Fixed(1024)
}
fn default_texel_density() -> f32 {
    16.0
}
fn default_batch_capacity() -> usize {
    4096
}
fn default_hit_tolerance() -> f32 {
    DEFAULT_HIT_TOLERANCE
}
fn default_use_light_bvh() -> bool {
    true
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("lightmaps")
}

/// `bake.toml`. Every key is optional.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BakeConfig {
    #[serde(default = "default_resolution")]
    pub resolution: LightmapResolution,
    /// Texels per world unit along an edge, for `"unlimited"` resolution.
    #[serde(default = "default_texel_density")]
    pub texel_density: f32,
    #[serde(default = "default_batch_capacity")]
    pub batch_capacity: usize,
    #[serde(default = "default_hit_tolerance")]
    pub hit_tolerance: f32,
    #[serde(default = "default_use_light_bvh")]
    pub use_light_bvh: bool,
    /// 0 uses the available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            texel_density: default_texel_density(),
            batch_capacity: default_batch_capacity(),
            hit_tolerance: default_hit_tolerance(),
            use_light_bvh: default_use_light_bvh(),
            worker_threads: 0,
            output_dir: default_output_dir(),
        }
    }
}

impl BakeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: BakeConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution == LightmapResolution::Fixed(0) {
            return Err(ConfigError::Invalid("resolution must be at least 1".into()));
        }
        if self.batch_capacity == 0 {
            return Err(ConfigError::Invalid("batch_capacity must be at least 1".into()));
        }
        if self.hit_tolerance.is_nan() || self.hit_tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "hit_tolerance must be non-negative, got {}",
                self.hit_tolerance
            )));
        }
        if self.texel_density.is_nan() || self.texel_density <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "texel_density must be positive, got {}",
                self.texel_density
            )));
        }
        Ok(())
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            batch_capacity: self.batch_capacity,
            worker_threads: self.worker_threads,
        }
    }
}
