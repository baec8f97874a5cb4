//! Shape recalculation for a voxel object (§4.4 "Shape recalc").
//!
//! Generalizes the teacher's `RigidBody::new_rect`/`new_circle` mass and
//! moment-of-inertia accumulation (`Σ m*r²` over per-pixel offsets) from a
//! flat 2D pixel list to a dense 3D grid, adding the bounding-sphere,
//! support-rectangle, and center-of-mass bookkeeping the original C
//! `voxel_object_recalc_shape` also tracks.

use super::{VoxelObject, VOBJ_EDGE};
use crate::math::{Aabb, Vec3};

pub const VOXEL_DENSITY: f32 = 1.0;

/// Recomputes every derived shape quantity from `object.voxels`. Call after
/// any structural change (spawn, destroy, split).
pub fn recalc_shape(object: &mut VoxelObject) {
    let mut min = (VOBJ_EDGE, VOBJ_EDGE, VOBJ_EDGE);
    let mut max = (0u32, 0u32, 0u32);
    let mut count = 0u32;
    let mut center_sum = Vec3::ZERO;

    for idx in 0..object.voxels.len() {
        if object.voxels[idx] == 0 {
            continue;
        }
        let (x, y, z) = super::local_coords(idx);
        min.0 = min.0.min(x);
        min.1 = min.1.min(y);
        min.2 = min.2.min(z);
        max.0 = max.0.max(x);
        max.1 = max.1.max(y);
        max.2 = max.2.max(z);
        count += 1;
        center_sum = center_sum + cell_center_local(object, x, y, z);
    }

    object.voxel_count = count;

    if count == 0 {
        object.active = false;
        object.half_extents = Vec3::ZERO;
        object.center_of_mass_offset = Vec3::ZERO;
        object.radius = 0.0;
        object.support_rect = Aabb::EMPTY;
        object.mass = 0.0;
        object.inv_mass = 0.0;
        return;
    }

    // Center of mass is expressed in the object's local frame, whose origin
    // is the grid's (0,0,0) corner — not the grid's geometric center — so
    // world-space CoM is simply `position + orientation.rotate(offset)`.
    let com = center_sum * (1.0 / count as f32);
    object.center_of_mass_offset = com;

    object.half_extents = Vec3::new(
        (max.0 - min.0 + 1) as f32 * object.voxel_size * 0.5,
        (max.1 - min.1 + 1) as f32 * object.voxel_size * 0.5,
        (max.2 - min.2 + 1) as f32 * object.voxel_size * 0.5,
    );

    // Bounding sphere must enclose every *corner* of every solid voxel, not
    // just cell centers (§4.4).
    let half_cell = object.voxel_size * 0.5;
    let mut radius = 0.0f32;
    for idx in 0..object.voxels.len() {
        if object.voxels[idx] == 0 {
            continue;
        }
        let (x, y, z) = super::local_coords(idx);
        let center = cell_center_local(object, x, y, z);
        for cx in [-half_cell, half_cell] {
            for cy in [-half_cell, half_cell] {
                for cz in [-half_cell, half_cell] {
                    let corner = center + Vec3::new(cx, cy, cz);
                    let d = (corner - com).length();
                    if d > radius {
                        radius = d;
                    }
                }
            }
        }
    }
    object.radius = radius;

    let mut support = Aabb::EMPTY;
    for z in 0..VOBJ_EDGE {
        for x in 0..VOBJ_EDGE {
            if object.get(x, min.1, z) != 0 {
                let p = cell_center_local(object, x, min.1, z);
                support.extend(Vec3::new(p.x, 0.0, p.z));
            }
        }
    }
    object.support_rect = support;

    object.mass = (count as f32 * VOXEL_DENSITY).max(crate::math::EPSILON);
    object.inv_mass = 1.0 / object.mass;
}

#[inline]
fn cell_center_local(object: &VoxelObject, x: u32, y: u32, z: u32) -> Vec3 {
    Vec3::new(
        (x as f32 + 0.5) * object.voxel_size,
        (y as f32 + 0.5) * object.voxel_size,
        (z as f32 + 0.5) * object.voxel_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_world::VoxelObject;

    #[test]
    fn single_voxel_object_has_small_positive_radius() {
        let mut obj = VoxelObject::new_empty(1.0);
        obj.set(8, 8, 8, 1);
        recalc_shape(&mut obj);
        assert!(obj.radius > 0.0);
        assert_eq!(obj.voxel_count, 1);
        assert!(obj.mass > 0.0);
    }

    #[test]
    fn empty_object_deactivates() {
        let mut obj = VoxelObject::new_empty(1.0);
        recalc_shape(&mut obj);
        assert!(!obj.active);
        assert_eq!(obj.voxel_count, 0);
    }

    #[test]
    fn radius_encloses_every_corner() {
        let mut obj = VoxelObject::new_empty(1.0);
        for x in 6..10 {
            for y in 6..10 {
                for z in 6..10 {
                    obj.set(x, y, z, 1);
                }
            }
        }
        recalc_shape(&mut obj);
        let com = obj.center_of_mass_offset;
        let half_cell = obj.voxel_size * 0.5;
        for x in 6..10u32 {
            for y in 6..10u32 {
                for z in 6..10u32 {
                    let center = cell_center_local(&obj, x, y, z);
                    for cx in [-half_cell, half_cell] {
                        for cy in [-half_cell, half_cell] {
                            for cz in [-half_cell, half_cell] {
                                let corner = center + Vec3::new(cx, cy, cz);
                                assert!((corner - com).length() <= obj.radius + 1e-4);
                            }
                        }
                    }
                }
            }
        }
    }
}
