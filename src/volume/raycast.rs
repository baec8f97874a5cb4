//! Amanatides-Woo 3D-DDA raycast with chunk-level empty-space skipping.
//!
//! Grounded in the teacher's `systems/physics/raycast.rs` (`t_max`/`t_delta`
//! stepping, NaN/parallel-ray guards, step cap) generalized from a 2D grid to
//! a 3D chunked one; the chunk-skip jump is grounded in
//! `examples/ZZ0R0-Game/crates/voxel_engine/src/raycast.rs`, which implements
//! the same two-level (chunk, then voxel) stepping scheme.

use crate::chunk::CHUNK_EDGE;
use crate::material::MaterialId;
use crate::math::{Vec3, EPSILON};

use super::Volume;

pub struct RaycastHit {
    pub pos: Vec3,
    pub normal: Vec3,
    pub material: MaterialId,
    pub chunk_id: u32,
}

const MAX_STEPS: u32 = 100_000;
const STEP_EPSILON: f32 = 1e-4;

#[inline]
fn axis_normal(axis: usize, dir: Vec3) -> Vec3 {
    let sign = match axis {
        0 => dir.x,
        1 => dir.y,
        _ => dir.z,
    };
    let mut n = Vec3::ZERO;
    let neg = if sign > 0.0 { -1.0 } else { 1.0 };
    match axis {
        0 => n.x = neg,
        1 => n.y = neg,
        _ => n.z = neg,
    }
    n
}

/// `t` at which the ray crosses the next boundary of a cell of size
/// `cell_voxels` voxels, given the cell coordinate `(cell_x, cell_y, cell_z)`
/// that currently contains the ray (either a single voxel, `cell_voxels ==
/// 1`, or a whole chunk, `cell_voxels == CHUNK_EDGE`). Returns the crossing
/// axis alongside `t`. Axes with near-zero direction never contribute.
fn next_boundary_t(
    volume: &Volume,
    ray_origin: Vec3,
    dir: Vec3,
    cell_x: u32,
    cell_y: u32,
    cell_z: u32,
    cell_voxels: u32,
) -> Option<(f32, usize)> {
    let cell = [cell_x, cell_y, cell_z];
    let mut best: Option<(f32, usize)> = None;
    for axis in 0..3 {
        let d = dir.component(axis);
        if d.abs() < EPSILON {
            continue;
        }
        let boundary_cell = if d > 0.0 { cell[axis] + 1 } else { cell[axis] };
        let world_boundary =
            volume.origin().component(axis) + boundary_cell as f32 * cell_voxels as f32 * volume.voxel_size();
        let t = (world_boundary - ray_origin.component(axis)) / d;
        if best.is_none() || t < best.unwrap().0 {
            best = Some((t, axis));
        }
    }
    best
}

fn entry_axis(volume: &Volume, ray_origin: Vec3, dir: Vec3, t_enter: f32) -> Option<usize> {
    if t_enter <= STEP_EPSILON {
        return None;
    }
    let bounds = volume.bounds();
    for axis in 0..3 {
        let d = dir.component(axis);
        if d.abs() < EPSILON {
            continue;
        }
        let lo = bounds.min.component(axis);
        let hi = bounds.max.component(axis);
        let inv_d = 1.0 / d;
        let t1 = (lo - ray_origin.component(axis)) * inv_d;
        let t2 = (hi - ray_origin.component(axis)) * inv_d;
        let enter = t1.min(t2);
        if (enter - t_enter).abs() < 1e-3 {
            return Some(axis);
        }
    }
    None
}

pub fn cast(volume: &Volume, origin: Vec3, dir: Vec3, max_dist: f32) -> Option<RaycastHit> {
    if dir.length_squared() < EPSILON {
        return None;
    }
    let dir = dir.normalize();
    let bounds = volume.bounds();

    // Open Question resolution (SPEC_FULL §E): a ray whose origin sits
    // inside an already-solid voxel reports an immediate hit at distance 0
    // with a zero normal, rather than skipping it.
    if bounds.contains_point(origin) {
        let m = volume.get_at(origin);
        if m != 0 {
            let chunk_id = volume
                .voxel_loc_at(origin)
                .map(|loc| volume.chunk_index(loc.cx, loc.cy, loc.cz))
                .unwrap_or(0);
            return Some(RaycastHit { pos: origin, normal: Vec3::ZERO, material: m, chunk_id });
        }
    }

    let (t_enter, t_exit) = bounds.ray_intersect(origin, dir, max_dist)?;
    let mut t = t_enter.max(0.0);
    let limit = max_dist.min(t_exit);
    let mut last_axis = entry_axis(volume, origin, dir, t_enter);

    for _ in 0..MAX_STEPS {
        if t > limit {
            return None;
        }
        let pos = origin + dir * t;
        let loc = volume.voxel_loc_at(pos)?;

        match volume.chunk_at(loc.cx, loc.cy, loc.cz) {
            Some(chunk) if chunk.any_solid() => {
                let m = chunk.get(loc.lx, loc.ly, loc.lz);
                if m != 0 {
                    let normal = last_axis.map(|a| axis_normal(a, dir)).unwrap_or(Vec3::ZERO);
                    let chunk_id = volume.chunk_index(loc.cx, loc.cy, loc.cz);
                    return Some(RaycastHit { pos, normal, material: m, chunk_id });
                }
                let gx = loc.cx * CHUNK_EDGE + loc.lx;
                let gy = loc.cy * CHUNK_EDGE + loc.ly;
                let gz = loc.cz * CHUNK_EDGE + loc.lz;
                let (next_t, axis) = next_boundary_t(volume, origin, dir, gx, gy, gz, 1)?;
                t = next_t + STEP_EPSILON;
                last_axis = Some(axis);
            }
            _ => {
                let (next_t, axis) = next_boundary_t(volume, origin, dir, loc.cx, loc.cy, loc.cz, CHUNK_EDGE)?;
                t = next_t + STEP_EPSILON;
                last_axis = Some(axis);
            }
        }
    }

    log::warn!("raycast exceeded max step count, treating as a miss");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    #[test]
    fn scenario_a_raycast_into_single_solid_voxel() {
        let mut v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 0.5, 0.5), 1);
        v.edit_end();

        let hit = v
            .raycast(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0), 10.0)
            .expect("expected a hit");

        assert!((hit.pos.x - 0.0).abs() < 1e-3);
        assert!((hit.pos.y - 0.5).abs() < 1e-3);
        assert!((hit.pos.z - 0.5).abs() < 1e-3);
        assert!((hit.normal.x - (-1.0)).abs() < 1e-4);
        assert_eq!(hit.material, 1);
    }

    #[test]
    fn ray_missing_the_volume_returns_none() {
        let v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        let hit = v.raycast(Vec3::new(-1.0, 100.0, 0.5), Vec3::new(1.0, 0.0, 0.0), 10.0);
        assert!(hit.is_none());
    }

    #[test]
    fn ray_origin_inside_solid_voxel_hits_at_zero_distance() {
        let mut v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 0.5, 0.5), 3);
        v.edit_end();

        let hit = v
            .raycast(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0), 10.0)
            .unwrap();
        assert_eq!(hit.material, 3);
        assert_eq!(hit.normal, Vec3::ZERO);
    }

    #[test]
    fn repeated_raycast_on_unchanged_volume_is_stable() {
        let mut v = Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 0.5, 0.5), 1);
        v.edit_end();

        let a = v.raycast(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0), 10.0).unwrap();
        let b = v.raycast(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0), 10.0).unwrap();
        assert_eq!(a.material, b.material);
        assert!((a.pos.x - b.pos.x).abs() < 1e-6);
    }

    #[test]
    fn empty_chunk_is_skipped_without_per_voxel_stepping() {
        let v = Volume::new(4, 1, 1, Vec3::ZERO, 1.0).unwrap();
        let hit = v.raycast(
            Vec3::new(-1.0, 0.5, 0.5),
            Vec3::new(1.0, 0.0, 0.0),
            (4 * CHUNK_EDGE) as f32 + 10.0,
        );
        assert!(hit.is_none());
    }
}
