//! Terrain contact sampling and resolution (§4.6 "Terrain contacts").
//!
//! A direct port of `solve_terrain_collision`/`get_obb_sample_points`/
//! `estimate_terrain_normal`/`estimate_penetration_depth` from
//! `examples/original_source/engine/physics/rigidbody.c`, generalized only
//! in that the body's motion state lives in [`super::BodyState`] /
//! [`crate::object_world::VoxelObject`] instead of a single `RigidBody`
//! struct.

use crate::material::MaterialId;
use crate::math::Vec3;
use crate::object_world::{ObjectHandle, ObjectWorld, VoxelObject};
use crate::volume::Volume;

use super::{BodyState, RigidBodyConfig};

pub const TERRAIN_SAMPLE_POINTS: usize = 14;

#[derive(Clone, Copy, Debug)]
pub struct TerrainContactConfig {
    pub slop: f32,
    pub baumgarte: f32,
    pub restitution_floor_speed: f32,
    pub max_position_correction_factor: f32,
}

impl Default for TerrainContactConfig {
    fn default() -> Self {
        Self {
            slop: 0.01,
            baumgarte: 0.2,
            restitution_floor_speed: 0.5,
            max_position_correction_factor: 1.5,
        }
    }
}

fn obb_sample_points(obj: &VoxelObject) -> [Vec3; TERRAIN_SAMPLE_POINTS] {
    let rot = obj.orientation.to_mat3();
    let axis_x = rot.cols[0];
    let axis_y = rot.cols[1];
    let axis_z = rot.cols[2];

    let sx = axis_x * obj.half_extents.x;
    let sy = axis_y * obj.half_extents.y;
    let sz = axis_z * obj.half_extents.z;
    let c = obj.position;

    [
        c + sx + sy + sz,
        c + sx - sy + sz,
        c - sx + sy + sz,
        c - sx - sy + sz,
        c - sx + sy - sz,
        c - sx - sy - sz,
        c + sx + sy - sz,
        c + sx - sy - sz,
        c + sx,
        c - sx,
        c + sy,
        c - sy,
        c + sz,
        c - sz,
    ]
}

fn estimate_terrain_normal(terrain: &Volume, point: Vec3, probe_dist: f32) -> Vec3 {
    let occ = |p: Vec3| if terrain.get_at(p) != 0 { 1.0 } else { 0.0 };
    let dx = occ(point + Vec3::new(probe_dist, 0.0, 0.0)) - occ(point - Vec3::new(probe_dist, 0.0, 0.0));
    let dy = occ(point + Vec3::new(0.0, probe_dist, 0.0)) - occ(point - Vec3::new(0.0, probe_dist, 0.0));
    let dz = occ(point + Vec3::new(0.0, 0.0, probe_dist)) - occ(point - Vec3::new(0.0, 0.0, probe_dist));
    let gradient = Vec3::new(-dx, -dy, -dz);
    let len = gradient.length();
    if len > crate::math::EPSILON {
        gradient * (1.0 / len)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    }
}

fn estimate_penetration_depth(terrain: &Volume, point: Vec3, normal: Vec3, voxel_size: f32) -> f32 {
    let max_probe = voxel_size * 2.0;
    let step = voxel_size * 0.25;
    let mut d = 0.0f32;
    while d < max_probe {
        let probe = point + normal * d;
        if terrain.get_at(probe) == 0 {
            return d;
        }
        d += step;
    }
    max_probe
}

fn point_velocity(obj: &VoxelObject, world_point: Vec3) -> Vec3 {
    let r = world_point - obj.position;
    obj.linear_velocity + obj.angular_velocity.cross(r)
}

fn effective_mass(obj: &VoxelObject, r: Vec3, n: Vec3) -> f32 {
    if obj.inv_mass == 0.0 {
        return 0.0;
    }
    let r_cross_n = r.cross(n);
    let rot = obj.orientation.to_mat3();
    let inv_inertia = super::inv_inertia_local(obj.half_extents, obj.mass);
    let world_scaled = super::rotate_by_inv_inertia(rot, inv_inertia, r_cross_n);
    obj.inv_mass + world_scaled.cross(r).dot(n)
}

fn apply_impulse_direct(obj: &mut VoxelObject, impulse: Vec3, world_point: Vec3) {
    if obj.inv_mass == 0.0 {
        return;
    }
    let r = world_point - obj.position;
    obj.linear_velocity = obj.linear_velocity + impulse * obj.inv_mass;
    let angular_impulse = r.cross(impulse);
    let rot = obj.orientation.to_mat3();
    let inv_inertia = super::inv_inertia_local(obj.half_extents, obj.mass);
    let world_delta = super::rotate_by_inv_inertia(rot, inv_inertia, angular_impulse);
    obj.angular_velocity = obj.angular_velocity + world_delta;
}

/// Samples 14 OBB reference points against `terrain`, resolves any
/// penetrating contacts with a normal + friction impulse, and updates
/// `state.grounded`/`ground_frames` plus rest-promotion.
pub fn solve_terrain_contacts(
    objects: &mut ObjectWorld,
    terrain: &Volume,
    handle: ObjectHandle,
    state: &mut BodyState,
    config: &RigidBodyConfig,
    dt: f32,
) {
    let Some(obj) = objects.get(handle) else { return };

    let lin_speed = obj.linear_velocity.length();
    let ang_speed = obj.angular_velocity.length();
    let at_rest = state.grounded
        && state.ground_frames >= config.ground_persist_frames
        && lin_speed < config.settle_linear
        && ang_speed < config.settle_angular;

    if at_rest {
        if let Some(obj) = objects.get_mut(handle) {
            obj.linear_velocity = Vec3::ZERO;
            obj.angular_velocity = Vec3::ZERO;
        }
        return;
    }

    let sample_points = obb_sample_points(obj);
    let voxel_size = terrain.voxel_size();
    let probe_dist = voxel_size * 0.5;
    let cfg = config.terrain;

    let mut ground_contacts = 0u32;
    let mut total_correction = Vec3::ZERO;

    for point in sample_points {
        let mat: MaterialId = terrain.get_at(point);
        if mat == 0 {
            continue;
        }

        let normal = estimate_terrain_normal(terrain, point, probe_dist);
        if normal.y > 0.7 {
            ground_contacts += 1;
        }

        let penetration = estimate_penetration_depth(terrain, point, normal, voxel_size);
        if penetration < cfg.slop {
            continue;
        }

        let obj_ref = objects.get(handle).unwrap();
        let r = point - obj_ref.position;
        let pt_vel = point_velocity(obj_ref, point);
        let v_n = pt_vel.dot(normal);
        let eff_mass = effective_mass(obj_ref, r, normal);
        if eff_mass < crate::math::EPSILON {
            continue;
        }

        if v_n < -0.01 {
            let restitution = if v_n.abs() < cfg.restitution_floor_speed { 0.0 } else { state.restitution };
            let bias = -cfg.baumgarte * (1.0 / dt) * (penetration - cfg.slop).max(0.0);
            let mut j_n = (-(1.0 + restitution) * v_n + bias) / eff_mass;
            if j_n < 0.0 {
                j_n = 0.0;
            }

            if let Some(obj_mut) = objects.get_mut(handle) {
                apply_impulse_direct(obj_mut, normal * j_n, point);
            }

            let tangent_raw = pt_vel - normal * v_n;
            let tangent_len = tangent_raw.length();
            if tangent_len > crate::math::EPSILON {
                let tangent = tangent_raw * (1.0 / tangent_len);
                let v_t = tangent_len;
                let max_friction = state.friction * j_n;
                let j_t = (-v_t / eff_mass).clamp(-max_friction, max_friction);
                if let Some(obj_mut) = objects.get_mut(handle) {
                    apply_impulse_direct(obj_mut, tangent * j_t, point);
                }
            }
        }

        total_correction = total_correction + normal * penetration;
    }

    if ground_contacts >= 1 {
        state.ground_frames = config.ground_persist_frames;
        state.grounded = true;
    } else if state.ground_frames > 0 {
        state.ground_frames -= 1;
        if state.ground_frames == 0 {
            state.grounded = false;
        }
    } else {
        state.grounded = false;
    }

    if total_correction.length() > crate::math::EPSILON {
        let max_corr = voxel_size * cfg.max_position_correction_factor;
        let corr_len = total_correction.length();
        if corr_len > max_corr {
            total_correction = total_correction * (max_corr / corr_len);
        }
        if let Some(obj_mut) = objects.get_mut(handle) {
            obj_mut.position = obj_mut.position + total_correction * 0.8;
        }
    }

    if state.grounded {
        if let Some(obj_mut) = objects.get_mut(handle) {
            if obj_mut.linear_velocity.y < 0.0 && obj_mut.linear_velocity.y > -1.0 {
                obj_mut.linear_velocity.y = 0.0;
            }
            let lin_speed = obj_mut.linear_velocity.length();
            let ang_speed = obj_mut.angular_velocity.length();
            if lin_speed < config.settle_linear {
                obj_mut.linear_velocity = Vec3::ZERO;
            }
            if ang_speed < config.settle_angular {
                obj_mut.angular_velocity = Vec3::ZERO;
            }
            if state.ground_frames >= config.ground_persist_frames
                && lin_speed < config.settle_linear * 2.0
                && ang_speed < config.settle_angular * 2.0
            {
                obj_mut.linear_velocity = Vec3::ZERO;
                obj_mut.angular_velocity = Vec3::ZERO;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_world::ObjectWorld;
    use crate::rigid_body::BodyState;

    #[test]
    fn box_resting_on_floor_is_marked_grounded() {
        let mut terrain = Volume::new(4, 4, 4, Vec3::new(-64.0, -64.0, -64.0), 1.0).unwrap();
        terrain.fill_box(Vec3::new(-64.0, -64.0, -64.0), Vec3::new(128.0, 64.0, 128.0), 1);

        let mut world = ObjectWorld::new(2, 1.0).unwrap();
        let handle = world.add_box(Vec3::new(0.0, 0.3, 0.0), Vec3::new(0.5, 0.5, 0.5), 1).unwrap();

        let mut state = BodyState::default();
        let config = RigidBodyConfig::default();
        solve_terrain_contacts(&mut world, &terrain, handle, &mut state, &config, 1.0 / 60.0);

        assert!(state.grounded);
    }

    #[test]
    fn box_high_above_floor_has_no_contact() {
        let mut terrain = Volume::new(4, 4, 4, Vec3::new(-64.0, -64.0, -64.0), 1.0).unwrap();
        terrain.fill_box(Vec3::new(-64.0, -64.0, -64.0), Vec3::new(128.0, 64.0, 128.0), 1);

        let mut world = ObjectWorld::new(2, 1.0).unwrap();
        let handle = world.add_box(Vec3::new(0.0, 50.0, 0.0), Vec3::new(0.5, 0.5, 0.5), 1).unwrap();

        let mut state = BodyState::default();
        let config = RigidBodyConfig::default();
        solve_terrain_contacts(&mut world, &terrain, handle, &mut state, &config, 1.0 / 60.0);

        assert!(!state.grounded);
    }
}
