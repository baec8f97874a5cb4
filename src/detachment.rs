//! Bridge between the voxel volume and the object world (§4.5).
//!
//! Grounded directly in `examples/original_source/engine/sim/detach.c`'s
//! `detach_terrain_process`: run connectivity analysis once per tick, then
//! walk its floating islands in order, deleting undersized debris outright,
//! skipping oversized or over-budget ones, and lifting the rest out of the
//! volume into freshly spawned objects.

use crate::connectivity::{self, ConnectivityWorkBuffer};
use crate::math::Quat;
use crate::object_world::{ObjectWorld, VOBJ_EDGE, VOBJ_TOTAL_VOXELS};
use crate::volume::Volume;

#[derive(Clone, Copy, Debug)]
pub struct DetachConfig {
    pub enabled: bool,
    pub anchor_y_offset: f32,
    pub max_islands_per_tick: u32,
    pub min_voxels_per_island: u32,
    pub max_voxels_per_island: u32,
    pub max_bodies_alive: u32,
}

impl Default for DetachConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anchor_y_offset: 0.5,
            max_islands_per_tick: 4,
            min_voxels_per_island: 2,
            max_voxels_per_island: (VOBJ_EDGE * VOBJ_EDGE * VOBJ_EDGE),
            max_bodies_alive: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DetachResult {
    pub islands_processed: u32,
    pub voxels_removed: u32,
    pub islands_skipped: u32,
    pub bodies_spawned: u32,
}

/// Runs one tick of detachment: analyze connectivity, then promote or
/// discard floating islands according to `config`.
pub fn process(
    volume: &mut Volume,
    objects: &mut ObjectWorld,
    config: &DetachConfig,
    work: &mut ConnectivityWorkBuffer,
) -> DetachResult {
    let mut result = DetachResult::default();
    if !config.enabled {
        return result;
    }

    // §4.8: at most one full analysis per tick unless something changed.
    // `edit_generation` only advances when an edit batch actually touched a
    // voxel, so a run of ticks with no terrain edits collapses to this
    // early return instead of re-running BFS over the whole volume.
    if work.last_seen_generation() == Some(volume.edit_generation()) {
        return result;
    }
    work.mark_generation_seen(volume.edit_generation());

    let mut active_bodies = objects.active_object_count() as u32;

    let anchor_y = volume.bounds().min.y + config.anchor_y_offset;
    let conn_result = connectivity::analyze_dirty(volume, anchor_y, work);

    let mut processed = 0u32;
    for island in &conn_result.floating_islands {
        if processed >= config.max_islands_per_tick {
            break;
        }

        result.islands_processed += 1;

        if island.voxel_count < config.min_voxels_per_island {
            connectivity::remove_island(volume, island);
            result.voxels_removed += island.voxel_count;
            processed += 1;
            continue;
        }

        if island.voxel_count > config.max_voxels_per_island {
            result.islands_skipped += 1;
            continue;
        }

        if active_bodies >= config.max_bodies_alive {
            result.islands_skipped += 1;
            continue;
        }

        let ext_size_x = ((island.aabb.max.x - island.aabb.min.x) / volume.voxel_size()).round() as u32 + 1;
        let ext_size_y = ((island.aabb.max.y - island.aabb.min.y) / volume.voxel_size()).round() as u32 + 1;
        let ext_size_z = ((island.aabb.max.z - island.aabb.min.z) / volume.voxel_size()).round() as u32 + 1;

        if ext_size_x > VOBJ_EDGE || ext_size_y > VOBJ_EDGE || ext_size_z > VOBJ_EDGE {
            result.islands_skipped += 1;
            continue;
        }

        let mut extract_buf = vec![0u8; VOBJ_TOTAL_VOXELS];
        let (extracted, extract_origin) =
            connectivity::extract_island_with_ids(volume, island, ext_size_x, ext_size_y, ext_size_z, &mut extract_buf);

        if extracted == 0 {
            continue;
        }

        // `extract_buf` is laid out at `ext_size_x * ext_size_y * ext_size_z`
        // density; re-home it into a full `VOBJ_EDGE^3` buffer before handing
        // it to the object world, which always allocates a fixed-size grid.
        let mut obj_buf = vec![0u8; VOBJ_TOTAL_VOXELS];
        for z in 0..ext_size_z.min(VOBJ_EDGE) {
            for y in 0..ext_size_y.min(VOBJ_EDGE) {
                for x in 0..ext_size_x.min(VOBJ_EDGE) {
                    let src_idx = (z * ext_size_y + y) * ext_size_x + x;
                    let Some(&m) = extract_buf.get(src_idx as usize) else { continue };
                    if m == 0 {
                        continue;
                    }
                    obj_buf[crate::object_world::local_index(x, y, z)] = m;
                }
            }
        }

        let spawned = objects.add_from_voxels(extract_origin, Quat::IDENTITY, volume.voxel_size(), &obj_buf);

        if spawned.is_some() {
            connectivity::remove_island(volume, island);
            result.bodies_spawned += 1;
            active_bodies += 1;
        }

        processed += 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn floating_pillar_is_lifted_into_an_object() {
        let mut v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        v.edit_begin();
        for y in 0..5 {
            v.edit_set(Vec3::new(0.5, y as f32 + 0.5, 0.5), 1);
        }
        for y in 10..13 {
            v.edit_set(Vec3::new(0.5, y as f32 + 0.5, 2.5), 1);
        }
        v.edit_end();

        let mut objects = ObjectWorld::new(4, 1.0).unwrap();
        let mut work = ConnectivityWorkBuffer::new();
        let config = DetachConfig { min_voxels_per_island: 1, ..Default::default() };

        let result = process(&mut v, &mut objects, &config, &mut work);

        assert_eq!(result.bodies_spawned, 1);
        assert_eq!(objects.active_object_count(), 1);
        assert_eq!(v.get_at(Vec3::new(0.5, 10.5, 2.5)), 0);
    }

    #[test]
    fn tiny_island_is_deleted_not_spawned() {
        let mut v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 10.5, 0.5), 1);
        v.edit_end();

        let mut objects = ObjectWorld::new(4, 1.0).unwrap();
        let mut work = ConnectivityWorkBuffer::new();
        let config = DetachConfig { min_voxels_per_island: 2, ..Default::default() };

        let result = process(&mut v, &mut objects, &config, &mut work);

        assert_eq!(result.bodies_spawned, 0);
        assert_eq!(result.voxels_removed, 1);
        assert_eq!(objects.active_object_count(), 0);
        assert_eq!(v.get_at(Vec3::new(0.5, 10.5, 0.5)), 0);
    }

    #[test]
    fn disabled_config_is_a_no_op() {
        let mut v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 10.5, 0.5), 1);
        v.edit_end();

        let mut objects = ObjectWorld::new(4, 1.0).unwrap();
        let mut work = ConnectivityWorkBuffer::new();
        let config = DetachConfig { enabled: false, ..Default::default() };

        let result = process(&mut v, &mut objects, &config, &mut work);
        assert_eq!(result.islands_processed, 0);
        assert_eq!(v.get_at(Vec3::new(0.5, 10.5, 0.5)), 1);
    }

    #[test]
    fn max_bodies_alive_causes_skip() {
        let mut v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        v.edit_begin();
        for y in 10..13 {
            v.edit_set(Vec3::new(0.5, y as f32 + 0.5, 0.5), 1);
        }
        v.edit_end();

        let mut objects = ObjectWorld::new(4, 1.0).unwrap();
        objects.add_sphere(Vec3::new(100.0, 100.0, 100.0), 3.0, 1);
        let mut work = ConnectivityWorkBuffer::new();
        let config = DetachConfig { max_bodies_alive: 1, min_voxels_per_island: 1, ..Default::default() };

        let result = process(&mut v, &mut objects, &config, &mut work);
        assert_eq!(result.bodies_spawned, 0);
        assert_eq!(result.islands_skipped, 1);
    }
}
