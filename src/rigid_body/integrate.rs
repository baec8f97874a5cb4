//! Forces and integration (§4.6 "Forces and integration").
//!
//! Direct port of `integrate_body` from
//! `examples/original_source/engine/physics/rigidbody.c`: gravity only while
//! airborne, damping stronger while grounded, velocity clamps, then a
//! symplectic-Euler position/orientation update.

use crate::object_world::{ObjectHandle, ObjectWorld};

use super::RigidBodyConfig;

pub fn integrate_body(objects: &mut ObjectWorld, handle: ObjectHandle, config: &RigidBodyConfig, grounded: bool, dt: f32) {
    let Some(obj) = objects.get_mut(handle) else { return };

    if !grounded {
        obj.linear_velocity = obj.linear_velocity + config.gravity * dt;
    }

    let linear_damp = if grounded { config.ground_linear_damping } else { config.linear_damping };
    let angular_damp = if grounded { config.ground_angular_damping } else { config.angular_damping };

    obj.linear_velocity = obj.linear_velocity * linear_damp;
    obj.angular_velocity = obj.angular_velocity * angular_damp;

    obj.linear_velocity = obj.linear_velocity.clamp_length(config.max_linear_velocity);
    obj.angular_velocity = obj.angular_velocity.clamp_length(config.max_angular_velocity);

    obj.position = obj.position + obj.linear_velocity * dt;
    obj.orientation = obj.orientation.integrate(obj.angular_velocity, dt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::object_world::ObjectWorld;

    #[test]
    fn gravity_applies_only_when_airborne() {
        let mut world = ObjectWorld::new(2, 1.0).unwrap();
        let handle = world.add_box(Vec3::new(10.0, 10.0, 10.0), Vec3::new(0.5, 0.5, 0.5), 1).unwrap();
        let config = RigidBodyConfig::default();

        integrate_body(&mut world, handle, &config, true, 1.0 / 60.0);
        assert_eq!(world.get(handle).unwrap().linear_velocity.y, 0.0);

        integrate_body(&mut world, handle, &config, false, 1.0 / 60.0);
        assert!(world.get(handle).unwrap().linear_velocity.y < 0.0);
    }

    #[test]
    fn velocity_is_clamped() {
        let mut world = ObjectWorld::new(2, 1.0).unwrap();
        let handle = world.add_box(Vec3::new(10.0, 10.0, 10.0), Vec3::new(0.5, 0.5, 0.5), 1).unwrap();
        world.get_mut(handle).unwrap().linear_velocity = Vec3::new(1000.0, 0.0, 0.0);
        let config = RigidBodyConfig::default();

        integrate_body(&mut world, handle, &config, false, 1.0 / 60.0);
        assert!(world.get(handle).unwrap().linear_velocity.length() <= config.max_linear_velocity + 1.0);
    }
}
