use super::*;
use umbra_geom::Vec3;

fn light(x: f32, y: f32, z: f32, r: f32) -> Light {
    Light::new(Vec3::new(x, y, z), r)
}

#[test]
fn overlap_is_inclusive_at_touching_spheres() {
    let a = light(0.0, 0.0, 0.0, 1.0);
    let b = light(2.0, 0.0, 0.0, 1.0);
    let c = light(2.5, 0.0, 0.0, 1.0);
    assert!(a.overlaps(&b));
    assert!(!a.overlaps(&c));
}

#[test]
fn negative_radius_clamps_to_zero() {
    let l = light(0.0, 0.0, 0.0, -3.0);
    assert_eq!(l.radius, 0.0);
    assert!(l.reaches(Vec3::ZERO));
    assert!(!l.reaches(Vec3::new(0.1, 0.0, 0.0)));
}

#[test]
fn disjoint_lights_share_channel_zero() {
    let lights = [light(0.0, 0.0, 0.0, 1.0), light(10.0, 0.0, 0.0, 1.0)];
    let a = assign_channels(&lights);
    assert_eq!(a.channels, vec![Some(0), Some(0)]);
    assert!(a.overflowed.is_empty());
}

#[test]
fn overlapping_lights_get_distinct_channels() {
    let lights = [light(0.0, 0.0, 0.0, 2.0), light(1.0, 0.0, 0.0, 2.0)];
    let a = assign_channels(&lights);
    assert_eq!(a.channels, vec![Some(0), Some(1)]);
}

#[test]
fn chain_reuses_channels_greedily() {
    // a-b overlap, b-c overlap, a-c disjoint: c can reuse a's channel
    let lights = [
        light(0.0, 0.0, 0.0, 1.0),
        light(1.5, 0.0, 0.0, 1.0),
        light(3.0, 0.0, 0.0, 1.0),
    ];
    let a = assign_channels(&lights);
    assert_eq!(a.channels, vec![Some(0), Some(1), Some(0)]);
}

#[test]
fn thirty_third_stacked_light_overflows_and_pass_continues() {
    let mut lights: Vec<Light> = (0..33).map(|i| light(i as f32 * 0.01, 0.0, 0.0, 5.0)).collect();
    // Far away light after the overflow still gets a channel
    lights.push(light(1000.0, 0.0, 0.0, 1.0));
    let a = assign_channels(&lights);
    assert_eq!(a.overflowed, vec![32]);
    assert_eq!(a.channels[32], None);
    assert_eq!(a.channels[33], Some(0));
    a.apply(&mut lights);
    assert_eq!(lights[31].channel_bit(), Some(1u32 << 31));
    assert_eq!(lights[32].channel_bit(), None);
    assert_eq!(a.assigned_count(), 33);
}

#[test]
fn empty_bvh_answers_nothing() {
    let bvh = LightBvh::build(&[]);
    assert!(bvh.is_empty());
    assert_eq!(bvh.nodes().len(), 1);
    let mut out = vec![7];
    bvh.query_overlapping(Vec3::ZERO, &mut out);
    assert!(out.is_empty());
}

#[test]
fn small_sets_stay_a_single_leaf() {
    let lights = [light(0.0, 0.0, 0.0, 1.0), light(5.0, 0.0, 0.0, 1.0)];
    let bvh = LightBvh::build(&lights);
    assert_eq!(bvh.nodes().len(), 1);
    assert!(bvh.nodes()[0].is_leaf());
}

#[test]
fn coincident_centers_do_not_split() {
    let lights: Vec<Light> = (0..8).map(|i| light(1.0, 1.0, 1.0, 1.0 + i as f32)).collect();
    let bvh = LightBvh::build(&lights);
    assert_eq!(bvh.nodes().len(), 1);
    assert_eq!(bvh.nodes()[0].light_range(), 0..8);
}

#[test]
fn query_returns_containing_lights() {
    let lights: Vec<Light> = (0..16).map(|i| light(i as f32 * 10.0, 0.0, 0.0, 2.0)).collect();
    let bvh = LightBvh::build(&lights);
    assert!(bvh.nodes().len() > 1);

    let mut out = Vec::new();
    bvh.query_overlapping(Vec3::new(50.5, 0.0, 0.0), &mut out);
    assert!(out.contains(&5));
    for &i in &out {
        // Candidates come from leaves around x=50 only
        assert!((lights[i as usize].position.x - 50.0).abs() <= 20.0);
    }

    bvh.query_overlapping(Vec3::new(55.0, 0.0, 0.0), &mut out);
    assert!(out.iter().all(|&i| !lights[i as usize].reaches(Vec3::new(55.0, 0.0, 0.0))));

    let boxes = bvh.query_leaf_bounds(Vec3::new(50.5, 0.0, 0.0));
    assert!(!boxes.is_empty());
    assert!(boxes.iter().all(|b| b.contains_point(Vec3::new(50.5, 0.0, 0.0))));
}
