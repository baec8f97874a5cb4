//! Cosmetic debris particles (§4.7): gravity, floor bounce, and bounded
//! particle-particle collision. Not integrated with [`crate::rigid_body`] —
//! particles never push on or get pushed by voxel objects.
//!
//! Grounded directly in
//! `examples/original_source/engine/physics/particles.h`/`particles.c`:
//! same circular-buffer slot allocation, same young-particle-priority +
//! budgeted-round-robin update split, same two-pass `pickup_nearest`
//! (settled first, any active as fallback). Broadphase is
//! [`crate::spatial_hash::SpatialHash`] instead of the original's bespoke
//! `SpatialHashGrid`, since this crate already has one generic type shared
//! with [`crate::rigid_body::body_body`].

use crate::error::SimResult;
use crate::math::{Aabb, Vec3};
use crate::rng::Rng;
use crate::spatial_hash::SpatialHash;

pub const PARTICLE_MAX_COUNT: usize = 65536;
pub const PARTICLE_MAX_UPDATES_PER_TICK: usize = 16384;
pub const PARTICLE_YOUNG_AGE_THRESHOLD: f32 = 1.0;
pub const PARTICLE_SETTLE_VELOCITY: f32 = 0.15;

/// Not named in the original header; no collision-pair cap is defined
/// anywhere in the pack. Chosen to bound a worst-case frame where every
/// particle in `PARTICLE_MAX_UPDATES_PER_TICK` has a full cell of neighbors.
const PARTICLE_MAX_COLLISION_PAIRS: usize = 4096;

const CELL_SIZE: f32 = 0.25;

#[derive(Clone, Copy, Debug)]
pub struct Particle {
    pub position: Vec3,
    pub prev_position: Vec3,
    pub velocity: Vec3,
    pub rotation: Vec3,
    pub prev_rotation: Vec3,
    pub angular_velocity: Vec3,
    pub color: Vec3,
    pub radius: f32,
    pub lifetime: f32,
    pub active: bool,
    pub settled: bool,
}

impl Particle {
    const fn empty() -> Self {
        Self {
            position: Vec3::ZERO,
            prev_position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            rotation: Vec3::ZERO,
            prev_rotation: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            color: Vec3::ZERO,
            radius: 0.0,
            lifetime: 0.0,
            active: false,
            settled: false,
        }
    }
}

pub struct ParticleSystem {
    particles: Vec<Particle>,
    count: usize,
    next_slot: usize,
    bounds: Aabb,
    gravity: Vec3,
    damping: f32,
    restitution: f32,
    floor_friction: f32,
    enable_particle_collision: bool,
    collision_grid: SpatialHash<usize>,
    update_cursor: usize,
    active_count: usize,
}

impl ParticleSystem {
    pub fn new(bounds: Aabb) -> SimResult<Self> {
        let mut particles = Vec::new();
        particles.try_reserve_exact(PARTICLE_MAX_COUNT).map_err(|_| crate::error::SimError::OutOfMemory {
            what: "particle slots",
            requested: PARTICLE_MAX_COUNT,
        })?;
        particles.resize(PARTICLE_MAX_COUNT, Particle::empty());
        Ok(Self {
            particles,
            count: 0,
            next_slot: 0,
            bounds,
            gravity: Vec3::new(0.0, -18.0, 0.0),
            damping: 0.985,
            restitution: 0.45,
            floor_friction: 0.88,
            enable_particle_collision: true,
            collision_grid: SpatialHash::new(CELL_SIZE),
            update_cursor: 0,
            active_count: 0,
        })
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn capacity(&self) -> usize {
        PARTICLE_MAX_COUNT
    }

    pub fn clear(&mut self) {
        self.count = 0;
        self.next_slot = 0;
        self.active_count = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles[..self.count].iter().filter(|p| p.active)
    }

    /// Claims the next circular-buffer slot, overwriting the oldest particle
    /// once the system is at capacity.
    fn add_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) % PARTICLE_MAX_COUNT;
        if self.count < PARTICLE_MAX_COUNT {
            self.count += 1;
        }
        slot
    }

    pub fn add(&mut self, rng: &mut Rng, position: Vec3, velocity: Vec3, color: Vec3, radius: f32) -> usize {
        let slot = self.add_slot();
        if !self.particles[slot].active {
            self.active_count += 1;
        }
        self.particles[slot] = Particle {
            position,
            prev_position: position,
            velocity,
            rotation: Vec3::ZERO,
            prev_rotation: Vec3::ZERO,
            angular_velocity: random_spin(rng),
            color,
            radius,
            lifetime: 0.0,
            active: true,
            settled: false,
        };
        slot
    }

    /// Runs one fixed-timestep update: age-prioritized budgeted physics,
    /// bounded particle-particle collision, then settle detection.
    pub fn update(&mut self, dt: f32) {
        let max_velocity = (0.03 / dt).clamp(10.0, 30.0);

        for p in self.particles[..self.count].iter_mut() {
            if !p.active {
                continue;
            }
            p.prev_position = p.position;
            p.prev_rotation = p.rotation;
        }

        for p in self.particles[..self.count].iter_mut() {
            if !p.active {
                continue;
            }
            p.lifetime += dt;
        }

        let mut processed = 0usize;

        for i in 0..self.count {
            let p = &mut self.particles[i];
            if !p.active || p.settled {
                continue;
            }
            if p.lifetime > PARTICLE_YOUNG_AGE_THRESHOLD {
                continue;
            }
            step_particle(p, &self.bounds, self.gravity, self.damping, self.restitution, self.floor_friction, max_velocity, dt);
        }

        let mut cursor = self.update_cursor;
        let mut checked = 0usize;
        while processed < PARTICLE_MAX_UPDATES_PER_TICK && checked < self.count {
            if cursor >= self.count {
                cursor = 0;
            }
            let i = cursor;
            cursor += 1;
            checked += 1;

            let p = &mut self.particles[i];
            if !p.active || p.settled || p.lifetime <= PARTICLE_YOUNG_AGE_THRESHOLD {
                continue;
            }
            step_particle(p, &self.bounds, self.gravity, self.damping, self.restitution, self.floor_friction, max_velocity, dt);
            processed += 1;
        }
        self.update_cursor = cursor;

        if self.enable_particle_collision {
            self.resolve_collisions();
        }

        for p in self.particles[..self.count].iter_mut() {
            if !p.active || p.settled {
                continue;
            }
            let floor_dist = p.position.y - p.radius - self.bounds.min.y;
            if p.velocity.length() < PARTICLE_SETTLE_VELOCITY && floor_dist < 0.02 {
                p.settled = true;
                p.velocity = Vec3::ZERO;
            }
        }
    }

    fn resolve_collisions(&mut self) {
        self.collision_grid.clear();
        for i in 0..self.count {
            let p = &self.particles[i];
            if !p.active || p.settled {
                continue;
            }
            self.collision_grid.insert(p.position, i);
        }

        let mut pair_budget = PARTICLE_MAX_COLLISION_PAIRS;
        for i in 0..self.count {
            if pair_budget == 0 {
                break;
            }
            if !self.particles[i].active || self.particles[i].settled {
                continue;
            }

            let mut neighbors = Vec::new();
            self.collision_grid.for_each_neighbor(self.particles[i].position, |j| neighbors.push(j));

            for j in neighbors {
                if pair_budget == 0 {
                    break;
                }
                if j <= i {
                    continue;
                }
                if !self.particles[j].active || self.particles[j].settled {
                    continue;
                }
                let (a, b) = index_pair_mut(&mut self.particles, i, j);
                resolve_particle_pair(a, b, self.restitution);
                pair_budget -= 1;
            }
        }
    }

    pub fn spawn_explosion(&mut self, rng: &mut Rng, center: Vec3, radius: f32, color: Vec3, count: u32, force: f32) -> u32 {
        let mut spawned = 0u32;
        for _ in 0..count {
            let theta = rng.next_f32() * 2.0 * std::f32::consts::PI;
            let phi = rng.next_f32() * std::f32::consts::PI;
            let r = rng.next_f32() * radius * 0.8;

            let sin_phi = phi.sin();
            let offset = Vec3::new(r * sin_phi * theta.cos(), r * phi.cos(), r * sin_phi * theta.sin());

            let dir = if offset.length() > 0.001 { offset.normalize() } else { Vec3::new(0.0, 1.0, 0.0) };

            let speed_variation = 0.5 + rng.next_f32() * 1.0;
            let mut vel = dir * (force * speed_variation);
            vel.y += force * 0.3 * rng.next_f32();

            let color_variation = 0.9 + rng.next_f32() * 0.2;
            let particle_color = (color * color_variation).clamp01();

            let slot = self.add_slot();
            if !self.particles[slot].active {
                self.active_count += 1;
            }
            self.particles[slot] = Particle {
                position: center + offset,
                prev_position: center + offset,
                velocity: vel,
                rotation: Vec3::ZERO,
                prev_rotation: Vec3::ZERO,
                angular_velocity: random_spin(rng),
                color: particle_color,
                radius: 0.04 + rng.next_f32() * 0.03,
                lifetime: 0.0,
                active: true,
                settled: false,
            };
            spawned += 1;
        }
        spawned
    }

    pub fn spawn_at_impact(
        &mut self,
        rng: &mut Rng,
        impact_point: Vec3,
        ball_center: Vec3,
        ball_radius: f32,
        color: Vec3,
        count: u32,
        force: f32,
    ) -> u32 {
        let mut spawned = 0u32;

        let impact_raw = impact_point - ball_center;
        let impact_len = impact_raw.length();
        let impact_dir = if impact_len > 0.001 { impact_raw * (1.0 / impact_len) } else { Vec3::new(0.0, 1.0, 0.0) };

        for _ in 0..count {
            let spread_theta = rng.signed_half() * std::f32::consts::PI * 0.8;
            let spread_phi = rng.next_f32() * 2.0 * std::f32::consts::PI;
            let r = rng.next_f32() * ball_radius * 0.3;

            let up = if impact_dir.y.abs() < 0.9 { Vec3::new(0.0, 1.0, 0.0) } else { Vec3::new(1.0, 0.0, 0.0) };
            let right = up.cross(impact_dir).normalize();
            let tangent = impact_dir.cross(right);

            let dir = (impact_dir * spread_theta.cos()
                + right * (spread_theta.sin() * spread_phi.cos())
                + tangent * (spread_theta.sin() * spread_phi.sin()))
            .normalize();

            let mut offset = dir * r;
            offset = offset + impact_dir * (ball_radius * 0.1);

            let speed_variation = 0.5 + rng.next_f32() * 1.0;
            let vel = dir * (force * speed_variation);

            let color_variation = 0.85 + rng.next_f32() * 0.3;
            let particle_color = (color * color_variation).clamp01();

            let slot = self.add_slot();
            if !self.particles[slot].active {
                self.active_count += 1;
            }
            self.particles[slot] = Particle {
                position: impact_point + offset,
                prev_position: impact_point + offset,
                velocity: vel,
                rotation: Vec3::ZERO,
                prev_rotation: Vec3::ZERO,
                angular_velocity: random_spin(rng),
                color: particle_color,
                radius: 0.03 + rng.next_f32() * 0.04,
                lifetime: 0.0,
                active: true,
                settled: false,
            };
            spawned += 1;
        }
        spawned
    }

    /// Deactivates and returns the color of the nearest settled particle
    /// within `max_dist` (measured on the horizontal plane); falls back to
    /// the nearest active particle of any settle state if none are settled.
    pub fn pickup_nearest(&mut self, position: Vec3, max_dist: f32) -> Option<Vec3> {
        let mut nearest_idx: Option<usize> = None;
        let mut nearest_dist = max_dist;

        for i in 0..self.count {
            let p = &self.particles[i];
            if !p.active || !p.settled {
                continue;
            }
            let mut to_particle = p.position - position;
            to_particle.y = 0.0;
            let dist = to_particle.length();
            if dist < nearest_dist {
                nearest_dist = dist;
                nearest_idx = Some(i);
            }
        }

        if nearest_idx.is_none() {
            nearest_dist = max_dist;
            for i in 0..self.count {
                let p = &self.particles[i];
                if !p.active {
                    continue;
                }
                let mut to_particle = p.position - position;
                to_particle.y = 0.0;
                let dist = to_particle.length();
                if dist < nearest_dist {
                    nearest_dist = dist;
                    nearest_idx = Some(i);
                }
            }
        }

        let idx = nearest_idx?;
        let color = self.particles[idx].color;
        self.particles[idx].active = false;
        self.active_count -= 1;
        Some(color)
    }
}

fn random_spin(rng: &mut Rng) -> Vec3 {
    Vec3::new(rng.signed_half() * 20.0, rng.signed_half() * 20.0, rng.signed_half() * 20.0)
}

#[allow(clippy::too_many_arguments)]
fn step_particle(p: &mut Particle, bounds: &Aabb, gravity: Vec3, damping: f32, restitution: f32, floor_friction: f32, max_velocity: f32, dt: f32) {
    p.velocity = p.velocity + gravity * dt;

    let speed_sq = p.velocity.length_squared();
    if speed_sq > max_velocity * max_velocity {
        let speed = speed_sq.sqrt();
        p.velocity = p.velocity * (max_velocity / speed);
    }

    p.velocity = p.velocity * damping;

    let floor_dist = p.position.y - p.radius - bounds.min.y;
    if floor_dist < 0.05 {
        p.velocity.x *= floor_friction;
        p.velocity.z *= floor_friction;
        p.angular_velocity = p.angular_velocity * 0.9;
    }

    p.position = p.position + p.velocity * dt;
    p.rotation = p.rotation + p.angular_velocity * dt;
    p.angular_velocity = p.angular_velocity * 0.995;

    if p.position.y - p.radius < bounds.min.y {
        p.position.y = bounds.min.y + p.radius;
        p.velocity.y = -p.velocity.y * restitution;
    }
}

fn resolve_particle_pair(a: &mut Particle, b: &mut Particle, restitution: f32) {
    let delta = b.position - a.position;
    let dist = delta.length();
    let min_dist = a.radius + b.radius;

    if dist >= min_dist || dist < crate::math::EPSILON {
        return;
    }

    let normal = delta * (1.0 / dist);
    let overlap = min_dist - dist;

    a.position = a.position - normal * (overlap * 0.5);
    b.position = b.position + normal * (overlap * 0.5);

    let rel_vel = a.velocity - b.velocity;
    let vel_along_normal = rel_vel.dot(normal);
    if vel_along_normal > 0.0 {
        return;
    }

    let j = -(1.0 + restitution) * vel_along_normal * 0.5;
    let impulse = normal * j;

    a.velocity = a.velocity + impulse;
    b.velocity = b.velocity - impulse;
}

fn index_pair_mut(particles: &mut [Particle], i: usize, j: usize) -> (&mut Particle, &mut Particle) {
    debug_assert_ne!(i, j);
    if i < j {
        let (left, right) = particles.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = particles.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Aabb {
        Aabb::from_min_max(Vec3::new(-50.0, 0.0, -50.0), Vec3::new(50.0, 50.0, 50.0))
    }

    #[test]
    fn add_reuses_slots_in_circular_order() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(1);
        let a = sys.add(&mut rng, Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::ZERO, 0.1);
        let b = sys.add(&mut rng, Vec3::new(1.0, 5.0, 0.0), Vec3::ZERO, Vec3::ZERO, 0.1);
        assert_ne!(a, b);
        assert_eq!(sys.active_count(), 2);
    }

    #[test]
    fn gravity_pulls_particle_downward_after_update() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(1);
        sys.add(&mut rng, Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0.1);
        sys.update(1.0 / 60.0);
        let p = sys.iter().next().unwrap();
        assert!(p.velocity.y < 0.0);
    }

    #[test]
    fn particle_bounces_off_floor() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(1);
        sys.add(&mut rng, Vec3::new(0.0, 0.05, 0.0), Vec3::new(0.0, -5.0, 0.0), Vec3::ZERO, 0.1);
        sys.update(1.0 / 60.0);
        let p = sys.iter().next().unwrap();
        assert!(p.position.y >= 0.0);
    }

    #[test]
    fn slow_particle_near_floor_settles() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(1);
        sys.add(&mut rng, Vec3::new(0.0, 0.11, 0.0), Vec3::new(0.0, -0.01, 0.0), Vec3::ZERO, 0.1);
        sys.update(1.0 / 60.0);
        let p = sys.iter().next().unwrap();
        assert!(p.settled);
        assert_eq!(p.velocity, Vec3::ZERO);
    }

    #[test]
    fn pickup_nearest_prefers_settled_particle() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(1);
        let settled_slot = sys.add(&mut rng, Vec3::new(0.0, 0.01, 0.0), Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0.1);
        sys.particles[settled_slot].settled = true;
        sys.add(&mut rng, Vec3::new(0.05, 0.01, 0.0), Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), 0.1);

        let picked = sys.pickup_nearest(Vec3::new(0.0, 0.0, 0.0), 1.0);
        assert_eq!(picked, Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(sys.active_count(), 1);
    }

    #[test]
    fn pickup_nearest_falls_back_to_any_active_when_none_settled() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(1);
        sys.add(&mut rng, Vec3::new(0.2, 5.0, 0.0), Vec3::ZERO, Vec3::new(0.5, 0.5, 0.5), 0.1);

        let picked = sys.pickup_nearest(Vec3::ZERO, 1.0);
        assert_eq!(picked, Some(Vec3::new(0.5, 0.5, 0.5)));
        assert_eq!(sys.active_count(), 0);
    }

    #[test]
    fn pickup_nearest_returns_none_when_out_of_range() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(1);
        sys.add(&mut rng, Vec3::new(100.0, 5.0, 0.0), Vec3::ZERO, Vec3::ZERO, 0.1);
        assert_eq!(sys.pickup_nearest(Vec3::ZERO, 1.0), None);
    }

    #[test]
    fn spawn_explosion_creates_requested_count() {
        let mut sys = ParticleSystem::new(bounds()).unwrap();
        let mut rng = Rng::new(7);
        let spawned = sys.spawn_explosion(&mut rng, Vec3::new(0.0, 5.0, 0.0), 1.0, Vec3::new(1.0, 0.5, 0.2), 20, 3.0);
        assert_eq!(spawned, 20);
        assert_eq!(sys.active_count(), 20);
    }
}
