//! Bounded body-body contact resolution (§4.6 "Body-body contacts").
//!
//! Broadphase reuses [`crate::spatial_hash::SpatialHash`] — the same type
//! the teacher shares between particle and rigid-body broadphase — keyed by
//! body center with a cell size scaled to the largest body radius seen this
//! tick. Narrowphase is sphere-sphere using each object's bounding sphere,
//! grounded in the same impulse math as `contacts.rs`
//! (`physics_body_apply_impulse`) but without the rotational term, matching
//! the spec's "standard impulse with restitution" for this pass.

use std::collections::HashMap;

use crate::math::Vec3;
use crate::object_world::ObjectWorld;
use crate::spatial_hash::SpatialHash;

use super::BodyState;

#[derive(Clone, Copy, Debug)]
pub struct BodyBodyConfig {
    pub max_pairs_per_tick: usize,
    pub wake_impulse_threshold: f32,
}

impl Default for BodyBodyConfig {
    fn default() -> Self {
        Self { max_pairs_per_tick: 256, wake_impulse_threshold: 0.1 }
    }
}

pub fn solve_body_body_contacts(objects: &mut ObjectWorld, states: &mut HashMap<u32, BodyState>, config: &BodyBodyConfig) {
    let mut entries: Vec<(u32, Vec3, f32)> = Vec::new();
    let mut max_radius = 0.1f32;
    for (handle, obj) in objects.iter() {
        if !obj.active || !states.contains_key(&handle.0) {
            continue;
        }
        let sleeping = states.get(&handle.0).map(|s| s.sleeping).unwrap_or(false);
        if sleeping {
            continue;
        }
        let center = obj.world_center_of_mass();
        entries.push((handle.0, center, obj.radius));
        max_radius = max_radius.max(obj.radius);
    }

    if entries.len() < 2 {
        return;
    }

    let cell_size = (1.5 * max_radius).max(0.25);
    let mut hash: SpatialHash<u32> = SpatialHash::new(cell_size);
    hash.rebuild(entries.iter().map(|&(id, center, _)| (center, id)));

    let radius_of: HashMap<u32, (Vec3, f32)> = entries.iter().map(|&(id, c, r)| (id, (c, r))).collect();

    let mut pairs_done = 0usize;
    let mut seen: std::collections::HashSet<(u32, u32)> = std::collections::HashSet::new();

    'outer: for &(id_a, center_a, radius_a) in &entries {
        let mut neighbors = Vec::new();
        hash.for_each_neighbor(center_a, |id_b| neighbors.push(id_b));
        for id_b in neighbors {
            if id_b == id_a {
                continue;
            }
            let key = if id_a < id_b { (id_a, id_b) } else { (id_b, id_a) };
            if !seen.insert(key) {
                continue;
            }
            if pairs_done >= config.max_pairs_per_tick {
                break 'outer;
            }
            pairs_done += 1;

            let Some(&(center_b, radius_b)) = radius_of.get(&id_b) else { continue };
            let delta = center_b - center_a;
            let dist = delta.length();
            let combined_radius = radius_a + radius_b;
            if dist >= combined_radius || dist < crate::math::EPSILON {
                continue;
            }

            let normal = delta * (1.0 / dist);
            let penetration = combined_radius - dist;

            resolve_sphere_pair(objects, states, id_a, id_b, normal, penetration, config);
        }
    }
}

fn resolve_sphere_pair(
    objects: &mut ObjectWorld,
    states: &mut HashMap<u32, BodyState>,
    id_a: u32,
    id_b: u32,
    normal: Vec3,
    penetration: f32,
    config: &BodyBodyConfig,
) {
    use crate::object_world::ObjectHandle;
    let handle_a = ObjectHandle(id_a);
    let handle_b = ObjectHandle(id_b);

    let (inv_mass_a, vel_a) = match objects.get(handle_a) {
        Some(o) => (o.inv_mass, o.linear_velocity),
        None => return,
    };
    let (inv_mass_b, vel_b) = match objects.get(handle_b) {
        Some(o) => (o.inv_mass, o.linear_velocity),
        None => return,
    };

    let inv_mass_sum = inv_mass_a + inv_mass_b;
    if inv_mass_sum < crate::math::EPSILON {
        return;
    }

    let relative_vel = vel_b - vel_a;
    let v_n = relative_vel.dot(normal);
    if v_n > 0.0 {
        return;
    }

    let restitution_a = states.get(&id_a).map(|s| s.restitution).unwrap_or(0.3);
    let restitution_b = states.get(&id_b).map(|s| s.restitution).unwrap_or(0.3);
    let restitution = restitution_a.min(restitution_b);

    let j = -(1.0 + restitution) * v_n / inv_mass_sum;
    let impulse = normal * j;

    if let Some(obj_a) = objects.get_mut(handle_a) {
        obj_a.linear_velocity = obj_a.linear_velocity - impulse * inv_mass_a;
    }
    if let Some(obj_b) = objects.get_mut(handle_b) {
        obj_b.linear_velocity = obj_b.linear_velocity + impulse * inv_mass_b;
    }

    let correction = normal * (penetration / inv_mass_sum * 0.5);
    if let Some(obj_a) = objects.get_mut(handle_a) {
        obj_a.position = obj_a.position - correction * inv_mass_a;
    }
    if let Some(obj_b) = objects.get_mut(handle_b) {
        obj_b.position = obj_b.position + correction * inv_mass_b;
    }

    if j.abs() > config.wake_impulse_threshold {
        if let Some(state) = states.get_mut(&id_a) {
            state.sleeping = false;
            state.sleep_frames = 0;
        }
        if let Some(state) = states.get_mut(&id_b) {
            state.sleeping = false;
            state.sleep_frames = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_world::ObjectHandle;

    #[test]
    fn overlapping_spheres_separate_after_resolution() {
        let mut world = ObjectWorld::new(4, 1.0).unwrap();
        let a = world.add_sphere(Vec3::new(0.0, 0.0, 0.0), 3.0, 1).unwrap();
        let b = world.add_sphere(Vec3::new(4.0, 0.0, 0.0), 3.0, 1).unwrap();

        let mut states = HashMap::new();
        states.insert(a.0, BodyState::default());
        states.insert(b.0, BodyState::default());

        world.get_mut(a).unwrap().linear_velocity = Vec3::new(1.0, 0.0, 0.0);
        world.get_mut(b).unwrap().linear_velocity = Vec3::new(-1.0, 0.0, 0.0);

        let config = BodyBodyConfig::default();
        solve_body_body_contacts(&mut world, &mut states, &config);

        let va = world.get(a).unwrap().linear_velocity;
        let vb = world.get(ObjectHandle(b.0)).unwrap().linear_velocity;
        assert!(va.x <= 1.0);
        assert!(vb.x >= -1.0);
    }

    #[test]
    fn single_body_is_a_no_op() {
        let mut world = ObjectWorld::new(4, 1.0).unwrap();
        let a = world.add_sphere(Vec3::new(0.0, 0.0, 0.0), 3.0, 1).unwrap();
        let mut states = HashMap::new();
        states.insert(a.0, BodyState::default());
        let config = BodyBodyConfig::default();
        solve_body_body_contacts(&mut world, &mut states, &config);
        assert_eq!(world.get(a).unwrap().linear_velocity, Vec3::ZERO);
    }
}
