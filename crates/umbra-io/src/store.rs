use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError, DecodeTask};

pub const MANIFEST_FILE: &str = "manifest.toml";
pub const LIGHTMAP_EXT: &str = "lmask";

/// Largest lightmap edge whose texel count still fits below 2^31.
pub const MAX_LIGHTMAP_SIZE: u32 = 23170;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("create {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("parse {}: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("serialize manifest: {0}")]
    ManifestSerialize(#[from] toml::ser::Error),
    #[error("scene '{scene}' has no lightmap for mesh {id}")]
    NotFound { scene: String, id: u32 },
    #[error("mesh {id}: {len} texels do not fill a {size}x{size} lightmap")]
    BadLength { id: u32, size: u32, len: usize },
    #[error("mesh {id}: lightmap size {size} exceeds {}", MAX_LIGHTMAP_SIZE)]
    BadSize { id: u32, size: u32 },
    #[error("mesh {id}: {source}")]
    Codec { id: u32, source: CodecError },
}

/// One stored lightmap as recorded in the scene manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshEntry {
    pub id: u32,
    pub size: u32,
    /// Compressed size on disk.
    pub bytes: u64,
    /// Union of all texel masks.
    #[serde(default)]
    pub channels: u32,
}

impl MeshEntry {
    #[inline]
    pub fn texel_count(&self) -> usize {
        self.size as usize * self.size as usize
    }
}

/// Per-scene index; loaders read the lightmap size from here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub scene: String,
    #[serde(default, rename = "mesh")]
    pub meshes: Vec<MeshEntry>,
}

impl Manifest {
    pub fn get(&self, id: u32) -> Option<&MeshEntry> {
        self.meshes.iter().find(|m| m.id == id)
    }

    fn upsert(&mut self, entry: MeshEntry) {
        match self.meshes.iter_mut().find(|m| m.id == entry.id) {
            Some(slot) => *slot = entry,
            None => {
                self.meshes.push(entry);
                self.meshes.sort_by_key(|m| m.id);
            }
        }
    }
}

/// Decoded lightmap plus its edge length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredLightmap {
    pub size: u32,
    pub texels: Vec<u32>,
}

/// Lightmap whose decompression is still running.
pub struct PendingLightmap {
    pub id: u32,
    pub size: u32,
    task: DecodeTask,
}

impl PendingLightmap {
    pub fn is_complete(&mut self) -> bool {
        self.task.is_complete()
    }

    /// Block until decoded.
    pub fn wait(self) -> Result<StoredLightmap, StoreError> {
        let id = self.id;
        let texels = self
            .task
            .into_texels()
            .map_err(|source| StoreError::Codec { id, source })?;
        Ok(StoredLightmap {
            size: self.size,
            texels,
        })
    }
}

/// On-disk layout: `<root>/<scene>/<mesh id>.lmask` with a
/// `<root>/<scene>/manifest.toml` index.
#[derive(Clone, Debug)]
pub struct LightmapStore {
    root: PathBuf,
}

impl LightmapStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scene_dir(&self, scene: &str) -> PathBuf {
        self.root.join(scene)
    }

    pub fn lightmap_path(&self, scene: &str, id: u32) -> PathBuf {
        self.scene_dir(scene).join(format!("{id}.{LIGHTMAP_EXT}"))
    }

    /// Scene manifest; a scene that was never written has an empty one.
    pub fn manifest(&self, scene: &str) -> Result<Manifest, StoreError> {
        let path = self.scene_dir(scene).join(MANIFEST_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Manifest {
                    scene: scene.to_string(),
                    meshes: Vec::new(),
                });
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        toml::from_str(&text).map_err(|source| StoreError::ManifestParse { path, source })
    }

    fn write_manifest(&self, scene: &str, manifest: &Manifest) -> Result<(), StoreError> {
        let path = self.scene_dir(scene).join(MANIFEST_FILE);
        let text = toml::to_string_pretty(manifest)?;
        fs::write(&path, text).map_err(|source| StoreError::Write { path, source })
    }

    /// Compress and persist one lightmap, then record it in the manifest.
    pub fn save(
        &self,
        scene: &str,
        id: u32,
        size: u32,
        texels: &[u32],
    ) -> Result<MeshEntry, StoreError> {
        if size > MAX_LIGHTMAP_SIZE {
            return Err(StoreError::BadSize { id, size });
        }
        if texels.len() != size as usize * size as usize {
            return Err(StoreError::BadLength {
                id,
                size,
                len: texels.len(),
            });
        }
        let dir = self.scene_dir(scene);
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let bytes = codec::compress(texels).map_err(|source| StoreError::Codec { id, source })?;
        let path = self.lightmap_path(scene, id);
        fs::write(&path, &bytes).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;

        let entry = MeshEntry {
            id,
            size,
            bytes: bytes.len() as u64,
            channels: texels.iter().fold(0, |acc, &m| acc | m),
        };
        let mut manifest = self.manifest(scene)?;
        manifest.scene = scene.to_string();
        manifest.upsert(entry.clone());
        self.write_manifest(scene, &manifest)?;
        log::debug!(
            target: "store",
            "saved {} ({}x{}, {} bytes)",
            path.display(),
            size,
            size,
            entry.bytes
        );
        Ok(entry)
    }

    fn read_blob(&self, scene: &str, id: u32) -> Result<(MeshEntry, Vec<u8>), StoreError> {
        let manifest = self.manifest(scene)?;
        let entry = manifest.get(id).cloned().ok_or_else(|| StoreError::NotFound {
            scene: scene.to_string(),
            id,
        })?;
        if entry.size > MAX_LIGHTMAP_SIZE {
            return Err(StoreError::BadSize {
                id,
                size: entry.size,
            });
        }
        let path = self.lightmap_path(scene, id);
        let bytes = fs::read(&path).map_err(|source| StoreError::Read { path, source })?;
        Ok((entry, bytes))
    }

    pub fn load(&self, scene: &str, id: u32) -> Result<StoredLightmap, StoreError> {
        let (entry, bytes) = self.read_blob(scene, id)?;
        let texels = codec::decompress(&bytes, entry.texel_count())
            .map_err(|source| StoreError::Codec { id, source })?;
        Ok(StoredLightmap {
            size: entry.size,
            texels,
        })
    }

    /// Read the blob now and decompress it on the rayon pool.
    pub fn load_async(&self, scene: &str, id: u32) -> Result<PendingLightmap, StoreError> {
        let (entry, bytes) = self.read_blob(scene, id)?;
        Ok(PendingLightmap {
            id,
            size: entry.size,
            task: DecodeTask::spawn(bytes, entry.texel_count()),
        })
    }
}
