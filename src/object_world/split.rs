//! Island splitting after destructive edits (§4.4 "Island split").
//!
//! Grounded directly in `examples/original_source/engine/sim/detach.c`'s
//! `split_disconnected_islands`: an explicit FIFO work queue bounded by the
//! object capacity, iterative 6-neighbor flood fill per component (no
//! recursion), migrating voxels of every component but the first into a
//! freshly allocated object that inherits the parent's position/orientation.

use std::collections::VecDeque;

use super::{ObjectWorld, VoxelObject, VOBJ_TOTAL_VOXELS};
use crate::math::Vec3;

const NEIGHBOR_OFFSETS: [(i32, i32, i32); 6] =
    [(-1, 0, 0), (1, 0, 0), (0, -1, 0), (0, 1, 0), (0, 0, -1), (0, 0, 1)];

fn flood_fill(object: &VoxelObject, visited: &mut [bool], start: usize) {
    let mut stack = vec![start];
    visited[start] = true;
    while let Some(idx) = stack.pop() {
        let (x, y, z) = super::local_coords(idx);
        for (dx, dy, dz) in NEIGHBOR_OFFSETS {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            let nz = z as i32 + dz;
            if nx < 0 || ny < 0 || nz < 0 {
                continue;
            }
            if nx as u32 >= super::VOBJ_EDGE || ny as u32 >= super::VOBJ_EDGE || nz as u32 >= super::VOBJ_EDGE {
                continue;
            }
            let nidx = super::local_index(nx as u32, ny as u32, nz as u32);
            if visited[nidx] || object.voxels[nidx] == 0 {
                continue;
            }
            visited[nidx] = true;
            stack.push(nidx);
        }
    }
}

/// Splits `object_index`'s disconnected components into separate objects,
/// recursively processing any objects it spawns (bounded by the world's
/// object capacity, matching the original's `work_queue`).
pub fn split_disconnected_islands(world: &mut ObjectWorld, object_index: usize) {
    let mut work_queue = VecDeque::new();
    work_queue.push_back(object_index);

    while let Some(current_idx) = work_queue.pop_front() {
        let Some(obj) = world.objects.get(current_idx).and_then(|s| s.as_ref()) else { continue };
        if !obj.active || obj.voxel_count <= 1 {
            continue;
        }

        let mut visited = vec![false; VOBJ_TOTAL_VOXELS];
        let first_solid = obj.voxels.iter().position(|&m| m != 0);
        let Some(first_solid) = first_solid else { continue };

        flood_fill(obj, &mut visited, first_solid);

        let unvisited_count = obj
            .voxels
            .iter()
            .enumerate()
            .filter(|&(i, &m)| m != 0 && !visited[i])
            .count();
        if unvisited_count == 0 {
            continue;
        }

        let Some(new_idx) = world.find_free_slot() else {
            log::warn!("object world full, cannot split disconnected island");
            continue;
        };

        let (position, orientation, voxel_size) = {
            let obj = world.objects[current_idx].as_ref().unwrap();
            (obj.position, obj.orientation, obj.voxel_size)
        };

        let mut new_obj = VoxelObject::new_empty(voxel_size);
        new_obj.position = position;
        new_obj.orientation = orientation;
        new_obj.active = true;

        {
            let obj = world.objects[current_idx].as_mut().unwrap();
            for i in 0..obj.voxels.len() {
                if obj.voxels[i] != 0 && !visited[i] {
                    new_obj.voxels[i] = obj.voxels[i];
                    obj.voxels[i] = 0;
                }
            }
        }

        super::shape::recalc_shape(&mut new_obj);
        // Small separation impulse so the fragments don't re-penetrate
        // next tick, applied by the caller (detachment/solver) via the
        // velocity fields set here from the parent's current motion plus a
        // nudge along the center-of-mass difference axis.
        let parent_com;
        {
            let obj = world.objects[current_idx].as_mut().unwrap();
            super::shape::recalc_shape(obj);
            parent_com = obj.position + obj.center_of_mass_offset;
            new_obj.linear_velocity = obj.linear_velocity;
            new_obj.angular_velocity = obj.angular_velocity;
        }
        let new_com = new_obj.position + new_obj.center_of_mass_offset;
        let separation_axis = (new_com - parent_com).normalize();
        if separation_axis.length_squared() > crate::math::EPSILON {
            const SEPARATION_IMPULSE: f32 = 0.05;
            new_obj.linear_velocity = new_obj.linear_velocity + separation_axis * SEPARATION_IMPULSE;
            new_obj.angular_velocity = new_obj.angular_velocity + Vec3::new(0.0, SEPARATION_IMPULSE, 0.0);
        }

        world.objects[new_idx] = Some(Box::new(new_obj));
        world.object_count += 1;

        work_queue.push_back(current_idx);
        work_queue.push_back(new_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_world::ObjectWorld;

    #[test]
    fn splitting_two_disjoint_blobs_yields_two_objects() {
        let mut world = ObjectWorld::new(4, 1.0).unwrap();
        let idx = world.add_from_voxels_for_test(1.0, |obj| {
            obj.set(2, 2, 2, 1);
            obj.set(12, 12, 12, 1);
        });

        split_disconnected_islands(&mut world, idx);

        assert_eq!(world.active_object_count(), 2);
    }

    #[test]
    fn connected_blob_is_not_split() {
        let mut world = ObjectWorld::new(4, 1.0).unwrap();
        let idx = world.add_from_voxels_for_test(1.0, |obj| {
            obj.set(5, 5, 5, 1);
            obj.set(6, 5, 5, 1);
            obj.set(7, 5, 5, 1);
        });

        split_disconnected_islands(&mut world, idx);

        assert_eq!(world.active_object_count(), 1);
    }
}
