//! Lightmap persistence: deflate codec, background decode and the on-disk store.
#![forbid(unsafe_code)]

pub mod codec;
mod store;

pub use codec::{CodecError, DecodeTask, compress, decompress};
pub use store::{
    LIGHTMAP_EXT, LightmapStore, MANIFEST_FILE, MAX_LIGHTMAP_SIZE, Manifest, MeshEntry,
    PendingLightmap, StoreError, StoredLightmap,
};
