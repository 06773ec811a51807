use umbra_io::{LightmapStore, MANIFEST_FILE, MAX_LIGHTMAP_SIZE, StoreError};

fn checker(size: u32) -> Vec<u32> {
    (0..size * size)
        .map(|i| if (i / size + i % size) % 2 == 0 { 0b101 } else { 0 })
        .collect()
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    let texels = checker(16);
    let entry = store.save("atrium", 3, 16, &texels).unwrap();
    assert_eq!(entry.size, 16);
    assert_eq!(entry.channels, 0b101);
    assert!(store.lightmap_path("atrium", 3).is_file());
    assert!(dir.path().join("atrium").join(MANIFEST_FILE).is_file());

    let back = store.load("atrium", 3).unwrap();
    assert_eq!(back.size, 16);
    assert_eq!(back.texels, texels);
}

#[test]
fn async_load_matches_blocking_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    let texels = checker(32);
    store.save("yard", 1, 32, &texels).unwrap();
    let mut pending = store.load_async("yard", 1).unwrap();
    assert_eq!(pending.size, 32);
    while !pending.is_complete() {
        std::thread::yield_now();
    }
    assert_eq!(pending.wait().unwrap().texels, texels);
}

#[test]
fn manifest_keeps_every_mesh_and_updates_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    store.save("hall", 9, 4, &[1; 16]).unwrap();
    store.save("hall", 2, 8, &[0; 64]).unwrap();
    store.save("hall", 9, 2, &[2; 4]).unwrap();

    let m = store.manifest("hall").unwrap();
    assert_eq!(m.scene, "hall");
    let ids: Vec<u32> = m.meshes.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 9]);
    assert_eq!(m.get(9).unwrap().size, 2);
    assert_eq!(store.load("hall", 9).unwrap().texels, vec![2; 4]);
}

#[test]
fn missing_scene_has_empty_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    let m = store.manifest("nowhere").unwrap();
    assert!(m.meshes.is_empty());
    assert!(matches!(
        store.load("nowhere", 1),
        Err(StoreError::NotFound { id: 1, .. })
    ));
}

#[test]
fn wrong_texel_count_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    assert!(matches!(
        store.save("s", 1, 4, &[0; 15]),
        Err(StoreError::BadLength {
            id: 1,
            size: 4,
            len: 15
        })
    ));
}

#[test]
fn corrupt_blob_fails_only_that_mesh() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    store.save("s", 1, 8, &checker(8)).unwrap();
    store.save("s", 2, 8, &checker(8)).unwrap();
    std::fs::write(store.lightmap_path("s", 1), [0xffu8; 12]).unwrap();

    assert!(matches!(
        store.load("s", 1),
        Err(StoreError::Codec { id: 1, .. })
    ));
    assert_eq!(store.load("s", 2).unwrap().texels, checker(8));
}

#[test]
fn broken_manifest_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    std::fs::create_dir_all(store.scene_dir("s")).unwrap();
    std::fs::write(store.scene_dir("s").join(MANIFEST_FILE), "mesh = [[[").unwrap();
    assert!(matches!(
        store.manifest("s"),
        Err(StoreError::ManifestParse { .. })
    ));
}

#[test]
fn oversized_manifest_entry_fails_only_that_mesh() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    store.save("s", 1, 2, &[1; 4]).unwrap();
    store.save("s", 2, 2, &[2; 4]).unwrap();

    let path = store.scene_dir("s").join(MANIFEST_FILE);
    let mut manifest = store.manifest("s").unwrap();
    manifest.meshes[0].size = 3_000_000_000;
    std::fs::write(&path, toml::to_string(&manifest).unwrap()).unwrap();

    assert!(matches!(
        store.load("s", 1),
        Err(StoreError::BadSize {
            id: 1,
            size: 3_000_000_000
        })
    ));
    assert!(matches!(
        store.load_async("s", 1),
        Err(StoreError::BadSize { id: 1, .. })
    ));
    assert_eq!(store.load("s", 2).unwrap().texels, vec![2; 4]);
}

#[test]
fn save_refuses_sizes_past_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let store = LightmapStore::new(dir.path());
    assert!(matches!(
        store.save("s", 4, MAX_LIGHTMAP_SIZE + 1, &[]),
        Err(StoreError::BadSize { id: 4, .. })
    ));
}
