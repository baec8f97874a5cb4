//! Rigid-body solver for voxel objects (§4.6).
//!
//! Grounded directly in `examples/original_source/engine/physics/rigidbody.c`:
//! body slots are keyed by the owning [`ObjectHandle`] rather than a
//! separate free-list array (the object world already owns slot lifetime),
//! but every numeric step below — gravity/damping/clamp integration, 14-point
//! OBB terrain sampling, central-difference normals, penetration probing,
//! effective-mass impulse resolution with Baumgarte bias, ground/sleep frame
//! counters — follows that file's `integrate_body`/`solve_terrain_collision`/
//! `update_sleep_state` exactly.

mod body_body;
mod contacts;
mod integrate;

use std::collections::HashMap;

use crate::math::{Mat3, Vec3};
use crate::object_world::{ObjectHandle, ObjectWorld};
use crate::volume::Volume;

pub use body_body::BodyBodyConfig;
pub use contacts::TerrainContactConfig;

const DEFAULT_RESTITUTION: f32 = 0.3;
const DEFAULT_FRICTION: f32 = 0.6;
const WAKE_IMPULSE_THRESHOLD: f32 = 0.1;

#[derive(Clone, Copy, Debug)]
pub struct RigidBodyConfig {
    pub gravity: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub ground_linear_damping: f32,
    pub ground_angular_damping: f32,
    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,
    pub terrain: TerrainContactConfig,
    pub ground_persist_frames: u32,
    pub settle_linear: f32,
    pub settle_angular: f32,
    pub sleep_linear: f32,
    pub sleep_angular: f32,
    pub sleep_frames: u32,
    pub body_body: BodyBodyConfig,
}

impl Default for RigidBodyConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            linear_damping: 0.999,
            angular_damping: 0.98,
            ground_linear_damping: 0.9,
            ground_angular_damping: 0.85,
            max_linear_velocity: 20.0,
            max_angular_velocity: 10.0,
            terrain: TerrainContactConfig::default(),
            ground_persist_frames: 6,
            settle_linear: 0.02,
            settle_angular: 0.02,
            sleep_linear: 0.01,
            sleep_angular: 0.01,
            sleep_frames: 30,
            body_body: BodyBodyConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BodyState {
    pub grounded: bool,
    pub ground_frames: u32,
    pub sleeping: bool,
    pub sleep_frames: u32,
    pub restitution: f32,
    pub friction: f32,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            grounded: false,
            ground_frames: 0,
            sleeping: false,
            sleep_frames: 0,
            restitution: DEFAULT_RESTITUTION,
            friction: DEFAULT_FRICTION,
        }
    }
}

/// Per-tick bookkeeping layered over [`ObjectWorld`]: one [`BodyState`] per
/// object handle that has been registered via [`add_body`].
pub struct RigidBodySystem {
    states: HashMap<u32, BodyState>,
    config: RigidBodyConfig,
}

impl RigidBodySystem {
    pub fn new(config: RigidBodyConfig) -> Self {
        Self { states: HashMap::new(), config }
    }

    pub fn config(&self) -> &RigidBodyConfig {
        &self.config
    }

    pub fn body_count(&self) -> usize {
        self.states.len()
    }

    /// Registers an object as a physically-simulated body. Returns `None`
    /// if the object handle doesn't resolve to an active object.
    pub fn add_body(&mut self, objects: &ObjectWorld, handle: ObjectHandle) -> Option<()> {
        if !objects.get(handle).map(|o| o.active).unwrap_or(false) {
            return None;
        }
        self.states.entry(handle.0).or_insert_with(BodyState::default);
        Some(())
    }

    pub fn remove_body(&mut self, handle: ObjectHandle) {
        self.states.remove(&handle.0);
    }

    pub fn find_body_for_object(&self, handle: ObjectHandle) -> Option<ObjectHandle> {
        if self.states.contains_key(&handle.0) {
            Some(handle)
        } else {
            None
        }
    }

    pub fn is_sleeping(&self, handle: ObjectHandle) -> bool {
        self.states.get(&handle.0).map(|s| s.sleeping).unwrap_or(true)
    }

    pub fn wake(&mut self, handle: ObjectHandle) {
        if let Some(state) = self.states.get_mut(&handle.0) {
            state.sleeping = false;
            state.sleep_frames = 0;
        }
    }

    pub fn set_velocity(&mut self, objects: &mut ObjectWorld, handle: ObjectHandle, velocity: Vec3) {
        if let Some(obj) = objects.get_mut(handle) {
            obj.linear_velocity = velocity;
        }
        self.wake(handle);
    }

    pub fn set_angular_velocity(&mut self, objects: &mut ObjectWorld, handle: ObjectHandle, angular_velocity: Vec3) {
        if let Some(obj) = objects.get_mut(handle) {
            obj.angular_velocity = angular_velocity;
        }
        self.wake(handle);
    }

    /// Applies an impulse at a world-space point, mirroring
    /// `physics_body_apply_impulse`'s rotation of the angular component
    /// through the object's local inverse inertia tensor.
    pub fn apply_impulse(&mut self, objects: &mut ObjectWorld, handle: ObjectHandle, impulse: Vec3, world_point: Vec3) {
        let magnitude = impulse.length();
        if magnitude < 0.001 {
            return;
        }
        let Some(obj) = objects.get_mut(handle) else { return };
        if obj.inv_mass == 0.0 {
            return;
        }
        let r = world_point - obj.position;
        obj.linear_velocity = obj.linear_velocity + impulse * obj.inv_mass;

        let angular_impulse = r.cross(impulse);
        let rot = obj.orientation.to_mat3();
        let inv_inertia = inv_inertia_local(obj.half_extents, obj.mass);
        let world_delta = rotate_by_inv_inertia(rot, inv_inertia, angular_impulse);
        obj.angular_velocity = obj.angular_velocity + world_delta;

        if magnitude > WAKE_IMPULSE_THRESHOLD {
            self.wake(handle);
        }
    }

    /// Runs one fixed-timestep solve: integration, terrain contacts, sleep
    /// bookkeeping, then bounded body-body contacts. Sleeping bodies are
    /// skipped entirely (no integration, no contact resolution).
    pub fn step(&mut self, objects: &mut ObjectWorld, terrain: &Volume, dt: f32) {
        let handles: Vec<ObjectHandle> = self.states.keys().map(|&id| ObjectHandle(id)).collect();

        for &handle in &handles {
            if self.is_sleeping(handle) {
                continue;
            }
            if !objects.get(handle).map(|o| o.active).unwrap_or(false) {
                self.states.remove(&handle.0);
                continue;
            }
            let grounded = self.states.get(&handle.0).map(|s| s.grounded).unwrap_or(false);
            integrate::integrate_body(objects, handle, &self.config, grounded, dt);
        }

        for &handle in &handles {
            if self.is_sleeping(handle) {
                continue;
            }
            if !objects.get(handle).map(|o| o.active).unwrap_or(false) {
                continue;
            }
            let Some(mut state) = self.states.get(&handle.0).copied() else { continue };
            contacts::solve_terrain_contacts(objects, terrain, handle, &mut state, &self.config, dt);
            self.states.insert(handle.0, state);
        }

        for &handle in &handles {
            let Some(state) = self.states.get_mut(&handle.0) else { continue };
            if state.sleeping {
                continue;
            }
            let Some(obj) = objects.get(handle) else { continue };
            let linear_speed = obj.linear_velocity.length();
            let angular_speed = obj.angular_velocity.length();
            if linear_speed < self.config.sleep_linear && angular_speed < self.config.sleep_angular {
                state.sleep_frames += 1;
                if state.sleep_frames >= self.config.sleep_frames {
                    state.sleeping = true;
                    if let Some(obj) = objects.get_mut(handle) {
                        obj.linear_velocity = Vec3::ZERO;
                        obj.angular_velocity = Vec3::ZERO;
                    }
                }
            } else {
                state.sleep_frames = 0;
            }
        }

        body_body::solve_body_body_contacts(objects, &mut self.states, &self.config.body_body);
    }
}

/// Box-shape inverse local inertia tensor (diagonal), grounded in
/// `physics_body_compute_inertia`'s `m/12 * (h²+d²)` formula.
pub(crate) fn inv_inertia_local(half_extents: Vec3, mass: f32) -> Vec3 {
    let w = half_extents.x * 2.0;
    let h = half_extents.y * 2.0;
    let d = half_extents.z * 2.0;
    let factor = mass / 12.0;
    let ix = factor * (h * h + d * d);
    let iy = factor * (w * w + d * d);
    let iz = factor * (w * w + h * h);
    Vec3::new(
        if ix > crate::math::EPSILON { 1.0 / ix } else { 0.0 },
        if iy > crate::math::EPSILON { 1.0 / iy } else { 0.0 },
        if iz > crate::math::EPSILON { 1.0 / iz } else { 0.0 },
    )
}

pub(crate) fn rotate_by_inv_inertia(rot: Mat3, inv_inertia: Vec3, v: Vec3) -> Vec3 {
    let local = rot.transpose().mul_vec3(v);
    let scaled = Vec3::new(local.x * inv_inertia.x, local.y * inv_inertia.y, local.z * inv_inertia.z);
    rot.mul_vec3(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialId;
    use crate::object_world::ObjectWorld;

    fn spawn_box(world: &mut ObjectWorld) -> ObjectHandle {
        world.add_box(Vec3::new(50.0, 50.0, 50.0), Vec3::new(1.0, 1.0, 1.0), 1 as MaterialId).unwrap()
    }

    #[test]
    fn add_body_fails_for_inactive_handle() {
        let world = ObjectWorld::new(2, 1.0).unwrap();
        let mut system = RigidBodySystem::new(RigidBodyConfig::default());
        assert!(system.add_body(&world, ObjectHandle(0)).is_none());
    }

    #[test]
    fn apply_impulse_changes_linear_velocity() {
        let mut world = ObjectWorld::new(2, 1.0).unwrap();
        let handle = spawn_box(&mut world);
        let mut system = RigidBodySystem::new(RigidBodyConfig::default());
        system.add_body(&world, handle).unwrap();

        let before = world.get(handle).unwrap().linear_velocity;
        system.apply_impulse(&mut world, handle, Vec3::new(0.0, 10.0, 0.0), world.get(handle).unwrap().position);
        let after = world.get(handle).unwrap().linear_velocity;
        assert!((after - before).length() > 0.0);
    }

    #[test]
    fn gravity_increases_downward_speed_over_a_step_when_airborne() {
        let mut world = ObjectWorld::new(2, 1.0).unwrap();
        let handle = spawn_box(&mut world);
        let mut system = RigidBodySystem::new(RigidBodyConfig::default());
        system.add_body(&world, handle).unwrap();
        let terrain = Volume::new(1, 1, 1, Vec3::new(-1000.0, -1000.0, -1000.0), 1.0).unwrap();

        system.step(&mut world, &terrain, 0.016);
        let v = world.get(handle).unwrap().linear_velocity;
        assert!(v.y < 0.0);
    }

    #[test]
    fn sleeping_body_skips_integration() {
        let mut world = ObjectWorld::new(2, 1.0).unwrap();
        let handle = spawn_box(&mut world);
        let mut system = RigidBodySystem::new(RigidBodyConfig::default());
        system.add_body(&world, handle).unwrap();
        system.states.get_mut(&handle.0).unwrap().sleeping = true;
        let terrain = Volume::new(1, 1, 1, Vec3::new(-1000.0, -1000.0, -1000.0), 1.0).unwrap();

        let before = world.get(handle).unwrap().position;
        system.step(&mut world, &terrain, 0.016);
        let after = world.get(handle).unwrap().position;
        assert_eq!(before.x, after.x);
        assert_eq!(before.y, after.y);
        assert_eq!(before.z, after.z);
    }
}
