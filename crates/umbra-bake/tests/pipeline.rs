use std::sync::Arc;

use umbra_bake::{
    BakeConfig, BakeError, BakePipeline, LightmapResolution, MeshFailure, SceneDesc, bake_scene,
};
use umbra_geom::Vec3;
use umbra_io::{LightmapStore, StoreError};
use umbra_lights::Light;
use umbra_runtime::OpenSky;
use umbra_trace::{MeshCollider, StaticMesh};

fn config(dir: &std::path::Path, size: u32) -> BakeConfig {
    BakeConfig {
        resolution: LightmapResolution::Fixed(size),
        batch_capacity: 64,
        worker_threads: 2,
        output_dir: dir.to_path_buf(),
        ..BakeConfig::default()
    }
}

#[test]
fn separate_lights_share_a_channel_and_overlapping_ones_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let apart = vec![
        Light::new(Vec3::new(0.0, 0.0, 0.0), 1.0),
        Light::new(Vec3::new(10.0, 0.0, 0.0), 1.0),
    ];
    let p = BakePipeline::new(config(dir.path(), 4), apart, Arc::new(OpenSky)).unwrap();
    let ch: Vec<_> = p.lights().iter().map(|l| l.channel).collect();
    assert_eq!(ch, vec![Some(0), Some(0)]);
    p.finish();

    let close = vec![
        Light::new(Vec3::new(0.0, 0.0, 0.0), 1.0),
        Light::new(Vec3::new(1.5, 0.0, 0.0), 1.0),
    ];
    let p = BakePipeline::new(config(dir.path(), 4), close, Arc::new(OpenSky)).unwrap();
    let ch: Vec<_> = p.lights().iter().map(|l| l.channel).collect();
    assert_eq!(ch, vec![Some(0), Some(1)]);
    p.finish();
}

#[test]
fn thirty_third_stacked_light_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let lights = vec![Light::new(Vec3::new(0.0, 1.0, 0.0), 4.0); 33];
    let floor = StaticMesh::quad_xz(1, (-1.0, -1.0), (1.0, 1.0), 0.0);
    let collider = Arc::new(MeshCollider::from_meshes([&floor]));
    let mut p = BakePipeline::new(config(dir.path(), 4), lights, collider).unwrap();
    let report = p.bake("stack", [&floor]);
    p.finish();

    assert_eq!(report.overflowed_lights, vec![32]);
    assert!(!report.is_clean());
    assert_eq!(report.baked.len(), 1);
    // The 32 assigned lights fill every channel; the overflowed one adds nothing.
    assert_eq!(report.baked[0].entry.channels, u32::MAX);
}

#[test]
fn baked_lightmaps_load_back_from_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let scene = SceneDesc::from_toml_str(
        r#"
name = "hall"

[[light]]
position = [0.0, 0.0, 0.0]
radius = 5.0

[[mesh]]
id = 10
positions = [[-1.0, -2.0, -1.0], [1.0, -2.0, -1.0], [1.0, -2.0, 1.0], [-1.0, -2.0, 1.0]]
uv2 = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
indices = [0, 2, 1, 0, 3, 2]

[[mesh]]
id = 11
positions = [[-0.25, -1.0, -0.25], [0.25, -1.0, -0.25], [0.25, -1.0, 0.25], [-0.25, -1.0, 0.25]]
uv2 = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
indices = [0, 2, 1, 0, 3, 2]
receiver = false
"#,
    )
    .unwrap()
    .into_scene()
    .unwrap();

    let report = bake_scene(config(dir.path(), 16), &scene).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.baked.len(), 1);
    assert_eq!(report.baked[0].id, 10);

    let store = LightmapStore::new(dir.path());
    let loaded = store.load("hall", 10).unwrap();
    assert_eq!(loaded.size, 16);
    // Center texel is under the blocker, corners are lit.
    assert_eq!(loaded.texels[8 * 16 + 8], 0);
    assert_eq!(loaded.texels[0], 1);
    assert_eq!(loaded.texels[16 * 16 - 1], 1);
    assert!(store.load("hall", 11).is_err());
}

#[test]
fn one_failing_mesh_leaves_the_others_baked() {
    let dir = tempfile::tempdir().unwrap();
    let a = StaticMesh::quad_xz(1, (-1.0, -1.0), (1.0, 1.0), 0.0);
    let b = StaticMesh::quad_xz(2, (-1.0, -1.0), (1.0, 1.0), 0.0);
    let mut broken = StaticMesh::quad_xz(3, (-1.0, -1.0), (1.0, 1.0), 0.0);
    broken.indices.push(99);

    // A directory where mesh 2's blob should go makes its write fail.
    let store = LightmapStore::new(dir.path());
    std::fs::create_dir_all(store.lightmap_path("s", 2)).unwrap();

    let lights = vec![Light::new(Vec3::UP, 3.0)];
    let collider = Arc::new(MeshCollider::from_meshes([&a]));
    let mut p = BakePipeline::new(config(dir.path(), 8), lights, collider).unwrap();
    let report = p.bake("s", [&a, &b, &broken]);
    p.finish();

    assert_eq!(report.baked.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1]);
    assert_eq!(report.failed.len(), 2);
    assert!(matches!(
        report.failed[0],
        (2, MeshFailure::Store(StoreError::Write { .. }))
    ));
    assert!(matches!(report.failed[1], (3, MeshFailure::Invalid(_))));
    assert!(store.load("s", 1).is_ok());
}

#[test]
fn probe_reports_visible_channels() {
    let dir = tempfile::tempdir().unwrap();
    let lights = vec![
        Light::new(Vec3::new(-2.0, 2.0, 0.0), 4.0),
        Light::new(Vec3::new(2.0, 2.0, 0.0), 4.0),
    ];
    // Wall at x = 1 between the probe point and the right-hand light.
    let wall = StaticMesh {
        id: 5,
        positions: vec![
            Vec3::new(1.0, -1.0, -3.0),
            Vec3::new(1.0, 5.0, -3.0),
            Vec3::new(1.0, 5.0, 3.0),
            Vec3::new(1.0, -1.0, 3.0),
        ],
        uv2: vec![Default::default(); 4],
        indices: vec![0, 1, 2, 0, 2, 3],
    };
    let collider = Arc::new(MeshCollider::from_meshes([&wall]));
    let mut p = BakePipeline::new(config(dir.path(), 4), lights, collider).unwrap();
    assert_eq!(p.lights()[1].channel, Some(1));

    let masks = p.probe_many(&[
        (Vec3::ZERO, Vec3::ZERO),
        (Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
        (Vec3::new(-20.0, 0.0, 0.0), Vec3::ZERO),
    ]);
    assert_eq!(masks, vec![0b01, 0b00, 0]);
    assert_eq!(p.probe(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO), 0b10);
    let stats = p.finish();
    assert!(stats.rays >= 4);
}

#[test]
fn zero_resolution_is_refused_before_baking() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), 0);
    let built = BakePipeline::new(cfg, vec![Light::new(Vec3::UP, 3.0)], Arc::new(OpenSky));
    assert!(matches!(built, Err(BakeError::Config(_))));
}
