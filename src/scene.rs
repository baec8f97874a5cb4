//! Fixed-timestep scene tick loop and scene-kind dispatch (§4.8).
//!
//! Grounded in `examples/original_source/engine/sim/scene.h`'s
//! `SIM_TIMESTEP`/`SIM_MAX_FRAME_TIME` constants and `scene_update`'s
//! accumulator loop (clamp incoming `dt`, drain a fixed-step accumulator).
//! Per the REDESIGN FLAGS, the original's `SceneVTable` function-pointer
//! dispatch (`init`/`destroy`/`tick`/`handle_input`/`render`/`get_name`) is
//! replaced with a plain `enum SceneKind` matched in [`Scene::fixed_tick`].
//! `BallPit` and `Roam` are supplemented from
//! `examples/original_source/game/ball_pit.c` and `game/roam.c` (present in
//! the original, dropped by the distillation); `Stress` has no original
//! counterpart and exists to exercise every system at once from the
//! `STRESS_OBJECTS` knob named in §6.

use crate::detachment::{self, DetachConfig};
use crate::connectivity::ConnectivityWorkBuffer;
use crate::error::SimResult;
use crate::material::{MaterialId, MaterialRegistry};
use crate::math::{Aabb, Vec3};
use crate::object_world::ObjectWorld;
use crate::particle::ParticleSystem;
use crate::rigid_body::{RigidBodyConfig, RigidBodySystem};
use crate::rng::Rng;
use crate::volume::Volume;

pub const SIM_TIMESTEP: f32 = 1.0 / 60.0;
pub const SIM_MAX_FRAME_TIME: f32 = 0.25;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SceneKind {
    BallPit,
    Roam,
    Stress,
}

impl SceneKind {
    pub fn name(self) -> &'static str {
        match self {
            SceneKind::BallPit => "Ball Pit",
            SceneKind::Roam => "Roam",
            SceneKind::Stress => "Stress",
        }
    }

    /// Order matching `SCENE_ID_*` in the original's registration table, so
    /// `--scene <id>` can index straight into this list.
    pub fn from_id(id: u32) -> Option<SceneKind> {
        match id {
            0 => Some(SceneKind::BallPit),
            1 => Some(SceneKind::Roam),
            2 => Some(SceneKind::Stress),
            _ => None,
        }
    }

    pub const COUNT: u32 = 3;
}

struct SceneDescriptor {
    bounds: Aabb,
    chunks: (u32, u32, u32),
    voxel_size: f32,
    rng_seed: u64,
    max_entities: usize,
    max_spawns: u32,
}

fn descriptor_for(kind: SceneKind) -> SceneDescriptor {
    match kind {
        // Matches `g_scenes[SCENE_TYPE_BALL_PIT]` in `content/scenes.c` exactly.
        SceneKind::BallPit => SceneDescriptor {
            bounds: Aabb::from_min_max(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 8.0, 5.0)),
            chunks: (4, 4, 4),
            voxel_size: 0.1,
            rng_seed: 0x12345678,
            max_entities: 64,
            max_spawns: 1024,
        },
        // Not present in `content/scenes.c` (only Ball Pit is registered
        // there); a wider, flatter volume suits terrain generation.
        SceneKind::Roam => SceneDescriptor {
            bounds: Aabb::from_min_max(Vec3::new(-16.0, 0.0, -16.0), Vec3::new(16.0, 12.8, 16.0)),
            chunks: (10, 4, 10),
            voxel_size: 0.1,
            rng_seed: 0xA5A5A5A5,
            max_entities: 64,
            max_spawns: 0,
        },
        // Has no original counterpart; a tall narrow drop column is the
        // cheapest way to put `max_bodies_alive` bodies in the air at once.
        SceneKind::Stress => SceneDescriptor {
            bounds: Aabb::from_min_max(Vec3::new(-8.0, 0.0, -8.0), Vec3::new(8.0, 32.0, 8.0)),
            chunks: (5, 10, 5),
            voxel_size: 0.1,
            rng_seed: 0xC0FFEE,
            max_entities: 512,
            max_spawns: 256,
        },
    }
}

/// Per-tick counters a profiling harness or test can inspect after
/// [`Scene::advance`] without re-deriving them from the subsystems.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickInfo {
    pub islands_detached: u32,
    pub voxels_removed: u32,
    pub bodies_spawned: u32,
    pub bodies_active: u32,
    pub particles_active: u32,
    pub dirty_chunks: u32,
    pub dirty_overflow: bool,
}

/// Ball-Pit-specific spawn bookkeeping, named after `BallPitParams`/
/// `BallPitStats` in `game/ball_pit.h` (the given `ball_pit.c` in the pack
/// only stubs `spawn_count` bookkeeping without ever instantiating a body;
/// this fills that gap so the scene actually exercises `object_world` and
/// `rigid_body`, per the supplement rule).
struct BallPitState {
    spawn_timer: f32,
    spawn_interval: f32,
    spawn_batch: u32,
    max_spawns: u32,
    spawn_count: u32,
}

pub struct Scene {
    pub kind: SceneKind,
    bounds: Aabb,
    rng: Rng,
    sim_accumulator: f32,
    materials: MaterialRegistry,

    terrain: Volume,
    objects: ObjectWorld,
    bodies: RigidBodySystem,
    particles: ParticleSystem,

    detach_config: DetachConfig,
    detach_work: ConnectivityWorkBuffer,

    ball_pit: Option<BallPitState>,
    last_tick: TickInfo,
}

impl Scene {
    /// Builds a scene of `kind`, applying `RNG_SEED`/`STRESS_OBJECTS`
    /// overrides from the environment the way
    /// `examples/original_source/game/ball_pit.c`'s `ball_pit_init` reads
    /// `PATCH_STRESS_OBJECTS`.
    pub fn new(kind: SceneKind) -> SimResult<Scene> {
        let desc = descriptor_for(kind);

        let seed = std::env::var("RNG_SEED").ok().and_then(|s| s.parse::<u64>().ok()).unwrap_or(desc.rng_seed);
        let mut rng = Rng::new(seed);

        let origin = desc.bounds.min;
        let mut terrain = Volume::new(desc.chunks.0, desc.chunks.1, desc.chunks.2, origin, desc.voxel_size)?;
        let objects = ObjectWorld::new(desc.max_entities, desc.voxel_size)?;
        let bodies = RigidBodySystem::new(RigidBodyConfig::default());
        let particles = ParticleSystem::new(desc.bounds)?;

        let ball_pit = match kind {
            SceneKind::BallPit => {
                terrain.fill_box(Vec3::new(desc.bounds.min.x, desc.bounds.min.y, desc.bounds.min.z), Vec3::new(desc.bounds.max.x - desc.bounds.min.x, desc.voxel_size * 2.0, desc.bounds.max.z - desc.bounds.min.z), 1);
                Some(BallPitState { spawn_timer: 1.0, spawn_interval: 1.0, spawn_batch: 1, max_spawns: desc.max_spawns, spawn_count: 0 })
            }
            SceneKind::Roam => {
                generate_roam_terrain(&mut terrain, &mut rng, desc.bounds);
                None
            }
            SceneKind::Stress => {
                terrain.fill_box(Vec3::new(desc.bounds.min.x, desc.bounds.min.y, desc.bounds.min.z), Vec3::new(desc.bounds.max.x - desc.bounds.min.x, desc.voxel_size * 2.0, desc.bounds.max.z - desc.bounds.min.z), 4);
                None
            }
        };

        terrain.rebuild_all_occupancy();

        let mut scene = Scene {
            kind,
            bounds: desc.bounds,
            rng,
            sim_accumulator: 0.0,
            materials: MaterialRegistry::default_table(),
            terrain,
            objects,
            bodies,
            particles,
            detach_config: DetachConfig::default(),
            detach_work: ConnectivityWorkBuffer::new(),
            ball_pit,
            last_tick: TickInfo::default(),
        };

        if kind == SceneKind::Stress {
            let stress_objects = std::env::var("STRESS_OBJECTS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(desc.max_spawns)
                .min(desc.max_spawns);
            scene.spawn_stress_bodies(stress_objects);
        }

        Ok(scene)
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn terrain(&self) -> &Volume {
        &self.terrain
    }

    pub fn objects(&self) -> &ObjectWorld {
        &self.objects
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn last_tick(&self) -> TickInfo {
        self.last_tick
    }

    fn spawn_stress_bodies(&mut self, count: u32) {
        for i in 0..count {
            let x = (self.rng.signed_half()) * (self.bounds.max.x - self.bounds.min.x) * 0.6;
            let z = (self.rng.signed_half()) * (self.bounds.max.z - self.bounds.min.z) * 0.6;
            let y = self.bounds.min.y + 4.0 + (i as f32) * 0.35;
            let material: MaterialId = 1 + (i % 4) as u8;
            if let Some(handle) = self.objects.add_sphere(Vec3::new(x, y, z), 0.15, material) {
                self.bodies.add_body(&self.objects, handle);
            }
        }
    }

    /// Runs `scene_update`'s accumulator loop: clamp `dt` to
    /// `SIM_MAX_FRAME_TIME`, then drain `SIM_TIMESTEP`-sized ticks. Returns
    /// how many fixed ticks actually ran.
    pub fn advance(&mut self, dt: f32) -> u32 {
        let dt = dt.min(SIM_MAX_FRAME_TIME);
        self.sim_accumulator += dt;

        let mut ticks = 0u32;
        while self.sim_accumulator >= SIM_TIMESTEP {
            self.fixed_tick();
            self.sim_accumulator -= SIM_TIMESTEP;
            ticks += 1;
        }
        ticks
    }

    fn fixed_tick(&mut self) {
        match self.kind {
            SceneKind::BallPit => self.tick_ball_pit(),
            SceneKind::Roam => self.tick_roam(),
            SceneKind::Stress => self.tick_stress(),
        }
    }

    fn tick_ball_pit(&mut self) {
        if let Some(state) = self.ball_pit.as_mut() {
            state.spawn_timer -= SIM_TIMESTEP;
            if state.spawn_timer <= 0.0 && state.spawn_count < state.max_spawns {
                let batch = state.spawn_batch;
                let timer_reset = state.spawn_interval;
                for _ in 0..batch {
                    let x = self.rng.range_f32(self.bounds.min.x * 0.5, self.bounds.max.x * 0.5);
                    let z = self.rng.range_f32(self.bounds.min.z * 0.5, self.bounds.max.z * 0.5);
                    let material: MaterialId = 1 + (self.rng.range_u32(4) as u8);
                    if let Some(handle) = self.objects.add_sphere(Vec3::new(x, self.bounds.max.y - 0.5, z), 0.2, material) {
                        self.bodies.add_body(&self.objects, handle);
                    }
                }
                if let Some(state) = self.ball_pit.as_mut() {
                    state.spawn_count += batch;
                    state.spawn_timer = timer_reset;
                }
            }
        }

        self.bodies.step(&mut self.objects, &self.terrain, SIM_TIMESTEP);
        let detach_result = detachment::process(&mut self.terrain, &mut self.objects, &self.detach_config, &mut self.detach_work);
        self.particles.update(SIM_TIMESTEP);

        self.last_tick = TickInfo {
            islands_detached: detach_result.islands_processed,
            voxels_removed: detach_result.voxels_removed,
            bodies_spawned: detach_result.bodies_spawned,
            bodies_active: self.objects.active_object_count() as u32,
            particles_active: self.particles.active_count() as u32,
            dirty_chunks: self.terrain.dirty_chunks().count() as u32,
            dirty_overflow: self.terrain.dirty_overflow(),
        };
    }

    fn tick_roam(&mut self) {
        self.particles.update(SIM_TIMESTEP);
        self.bodies.step(&mut self.objects, &self.terrain, SIM_TIMESTEP);
        let detach_result = detachment::process(&mut self.terrain, &mut self.objects, &self.detach_config, &mut self.detach_work);

        self.last_tick = TickInfo {
            islands_detached: detach_result.islands_processed,
            voxels_removed: detach_result.voxels_removed,
            bodies_spawned: detach_result.bodies_spawned,
            bodies_active: self.objects.active_object_count() as u32,
            particles_active: self.particles.active_count() as u32,
            dirty_chunks: self.terrain.dirty_chunks().count() as u32,
            dirty_overflow: self.terrain.dirty_overflow(),
        };
    }

    fn tick_stress(&mut self) {
        self.bodies.step(&mut self.objects, &self.terrain, SIM_TIMESTEP);
        let detach_result = detachment::process(&mut self.terrain, &mut self.objects, &self.detach_config, &mut self.detach_work);

        self.last_tick = TickInfo {
            islands_detached: detach_result.islands_processed,
            voxels_removed: detach_result.voxels_removed,
            bodies_spawned: detach_result.bodies_spawned,
            bodies_active: self.objects.active_object_count() as u32,
            particles_active: self.particles.active_count() as u32,
            dirty_chunks: self.terrain.dirty_chunks().count() as u32,
            dirty_overflow: self.terrain.dirty_overflow(),
        };
    }

    /// Digs a spherical cavity at the terrain point `origin`/`dir` hits,
    /// spawning destruction particles — the `Roam` scene's left-click
    /// behavior in `roam_handle_input`.
    pub fn dig(&mut self, origin: Vec3, dir: Vec3) -> bool {
        let Some(hit) = self.terrain.raycast(origin, dir, 100.0) else { return false };

        let count = 3 + self.rng.range_i32(0, 3);
        let color = self.materials.get(hit.material).map(|m| Vec3::new(m.color[0], m.color[1], m.color[2])).unwrap_or(Vec3::ZERO);
        for _ in 0..count {
            let vel = Vec3::new(
                hit.normal.x * 2.0 + self.rng.signed_half() * 3.0,
                hit.normal.y * 2.0 + self.rng.next_f32() * 4.0 + 1.0,
                hit.normal.z * 2.0 + self.rng.signed_half() * 3.0,
            );
            let size = self.terrain.voxel_size() * (0.3 + self.rng.next_f32() * 0.4);
            self.particles.add(&mut self.rng, hit.pos, vel, color, size);
        }

        let radius = self.terrain.voxel_size() * 3.0;
        self.terrain.edit_begin();
        let steps = (radius * 2.0 / self.terrain.voxel_size()).ceil() as i32;
        for ix in 0..=steps {
            for iy in 0..=steps {
                for iz in 0..=steps {
                    let dx = -radius + ix as f32 * self.terrain.voxel_size();
                    let dy = -radius + iy as f32 * self.terrain.voxel_size();
                    let dz = -radius + iz as f32 * self.terrain.voxel_size();
                    if dx * dx + dy * dy + dz * dz <= radius * radius {
                        self.terrain.edit_set(hit.pos + Vec3::new(dx, dy, dz), 0);
                    }
                }
            }
        }
        self.terrain.edit_end();
        true
    }
}

/// Layered height-field terrain for the `Roam` scene, re-expressed from
/// `game/roam.c`'s `generate_terrain`/`noise_2d` value-noise octaves using
/// this crate's own `Rng` in place of the original's hash function.
fn generate_roam_terrain(volume: &mut Volume, rng: &mut Rng, bounds: Aabb) {
    let voxel_size = volume.voxel_size();
    let base_height = 2.0f32;
    let amplitude = 1.5f32;

    let mut x = bounds.min.x;
    while x < bounds.max.x {
        let mut z = bounds.min.z;
        while z < bounds.max.z {
            let h = layered_noise(x, z, amplitude) + rng.signed_half() * 0.05;
            let surface_y = (base_height + h).clamp(bounds.min.y, bounds.max.y);

            let mut y = bounds.min.y;
            while y < surface_y {
                let depth = surface_y - y;
                let material: MaterialId = if depth < voxel_size * 4.0 { 2 } else { 1 };
                volume.fill_box(Vec3::new(x, y, z), Vec3::splat(voxel_size), material);
                y += voxel_size;
            }
            z += voxel_size;
        }
        x += voxel_size;
    }
}

fn hash2(x: i32, z: i32) -> f32 {
    let mut n = (x as u32).wrapping_add((z as u32).wrapping_mul(57)).wrapping_add(131);
    n = (n << 13) ^ n;
    let n = n.wrapping_mul(n.wrapping_mul(15731).wrapping_add(789221)).wrapping_add(1376312589);
    1.0 - ((n & 0x7FFF_FFFF) as f32) / 1_073_741_824.0
}

fn smooth(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn layered_noise(x: f32, z: f32, amplitude: f32) -> f32 {
    let mut height = 0.0f32;
    let mut amp = amplitude;
    let mut freq = 0.1f32;
    for _ in 0..4 {
        let fx = x * freq;
        let fz = z * freq;
        let ix = fx.floor() as i32;
        let iz = fz.floor() as i32;
        let tx = smooth(fx - ix as f32);
        let tz = smooth(fz - iz as f32);

        let v00 = hash2(ix, iz);
        let v10 = hash2(ix + 1, iz);
        let v01 = hash2(ix, iz + 1);
        let v11 = hash2(ix + 1, iz + 1);

        let nx0 = v00 + tx * (v10 - v00);
        let nx1 = v01 + tx * (v11 - v01);
        height += (nx0 + tz * (nx1 - nx0)) * amp;

        amp *= 0.5;
        freq *= 2.0;
    }
    height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_runs_integer_number_of_fixed_ticks() {
        let mut scene = Scene::new(SceneKind::BallPit).unwrap();
        let ticks = scene.advance(SIM_TIMESTEP * 3.0);
        assert_eq!(ticks, 3);
    }

    #[test]
    fn advance_clamps_huge_dt_to_max_frame_time() {
        let mut scene = Scene::new(SceneKind::BallPit).unwrap();
        let ticks = scene.advance(10.0);
        let expected = (SIM_MAX_FRAME_TIME / SIM_TIMESTEP) as u32;
        assert_eq!(ticks, expected);
    }

    #[test]
    fn ball_pit_spawns_a_body_after_its_interval() {
        let mut scene = Scene::new(SceneKind::BallPit).unwrap();
        for _ in 0..65 {
            scene.advance(SIM_TIMESTEP);
        }
        assert!(scene.objects().active_object_count() >= 1);
    }

    #[test]
    fn stress_scene_prespawns_requested_body_count() {
        std::env::set_var("STRESS_OBJECTS", "10");
        let scene = Scene::new(SceneKind::Stress).unwrap();
        std::env::remove_var("STRESS_OBJECTS");
        assert_eq!(scene.objects().active_object_count(), 10);
    }

    #[test]
    fn roam_scene_generates_solid_terrain() {
        let scene = Scene::new(SceneKind::Roam).unwrap();
        assert!(scene.terrain().total_solid_voxels() > 0);
    }

    #[test]
    fn scene_kind_from_id_round_trips() {
        assert_eq!(SceneKind::from_id(0), Some(SceneKind::BallPit));
        assert_eq!(SceneKind::from_id(1), Some(SceneKind::Roam));
        assert_eq!(SceneKind::from_id(2), Some(SceneKind::Stress));
        assert_eq!(SceneKind::from_id(3), None);
    }
}
