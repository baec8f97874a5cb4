//! Cross-module scenarios from the testable-properties list that don't fit
//! naturally inside a single module's `#[cfg(test)]` block: destruction
//! spawning a rigid body, dirty-ring overflow forcing a full occupancy
//! rebuild. Single-module scenarios (raycast into a solid voxel, a sleeping
//! body staying put, connectivity honoring the anchor plane) live as unit
//! tests next to the code they exercise.

use patch_sim::connectivity::ConnectivityWorkBuffer;
use patch_sim::detachment::{self, DetachConfig};
use patch_sim::material::MATERIAL_EMPTY;
use patch_sim::math::Vec3;
use patch_sim::object_world::ObjectWorld;
use patch_sim::volume::Volume;

/// Scenario B: a 5x5x5 stone block with its supporting mid-layer cut away
/// leaves the top slab floating; `detachment::process` must lift it out as
/// exactly one new body and clear it from the volume.
#[test]
fn destruction_spawns_rigid_body() {
    let mut volume = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();

    volume.edit_begin();
    for x in 5..10 {
        for y in 5..10 {
            for z in 5..10 {
                volume.edit_set(Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5), 1);
            }
        }
    }
    volume.edit_end();

    // Cut the supporting layer at y=3 so the block above is no longer
    // connected to the anchor plane at y=0.
    volume.edit_begin();
    for x in 5..10 {
        for z in 5..10 {
            volume.edit_set(Vec3::new(x as f32 + 0.5, 3.5, z as f32 + 0.5), 0);
        }
    }
    volume.edit_end();

    let mut objects = ObjectWorld::new(8, 1.0).unwrap();
    let mut work = ConnectivityWorkBuffer::new();
    let config = DetachConfig { min_voxels_per_island: 1, ..Default::default() };

    let result = detachment::process(&mut volume, &mut objects, &config, &mut work);

    assert_eq!(result.bodies_spawned, 1);
    assert_eq!(objects.active_object_count(), 1);

    let (_, obj) = objects.iter().next().expect("spawned object present");
    assert!(obj.voxel_count > 0);

    for x in 5..10 {
        for y in 5..10 {
            for z in 5..10 {
                assert_eq!(volume.get_at(Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5)), MATERIAL_EMPTY);
            }
        }
    }
}

/// Scenario E: touching more distinct chunks in one edit batch than the
/// dirty ring's capacity must set the overflow flag and cap the recorded
/// dirty-chunk count, while a subsequent full rebuild still produces the
/// exact ground-truth solid count.
#[test]
fn dirty_overflow_triggers_full_rebuild() {
    let mut volume = Volume::with_dirty_capacity(10, 1, 1, Vec3::ZERO, 1.0, 8).unwrap();

    volume.edit_begin();
    for cx in 0..10u32 {
        let x = cx as f32 * 32.0 + 0.5;
        volume.edit_set(Vec3::new(x, 0.5, 0.5), 1);
    }
    volume.edit_end();

    assert!(volume.dirty_overflow());
    assert!(volume.dirty_chunks().count() <= 8);

    let ground_truth: u64 = (0..10u32)
        .map(|cx| {
            let x = cx as f32 * 32.0 + 0.5;
            if volume.get_at(Vec3::new(x, 0.5, 0.5)) != MATERIAL_EMPTY {
                1
            } else {
                0
            }
        })
        .sum();

    volume.rebuild_all_occupancy();
    assert_eq!(volume.total_solid_voxels(), ground_truth);
}
