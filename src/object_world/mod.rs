//! Voxel object world (§4.4): small, dense, free-standing voxel blobs that
//! detach from the main volume and fall under rigid-body control.
//!
//! Mirrors `chunk.rs`'s dense grid + index-math layout at a smaller fixed
//! size (`VOBJ_EDGE`), and the teacher's `RigidBody` pose/velocity fields
//! (`systems/rigid_body/body.rs`) for the motion state each object carries
//! once it leaves the volume. Slot management follows
//! `original_source/engine/physics/rigidbody.c`'s `find_free_slot`: a
//! `Vec<Option<Box<VoxelObject>>>` of fixed capacity with an explicit free
//! list, rather than the teacher's `Vec::swap_remove` — handles must stay
//! stable across removal here because the solver and detachment bridge hold
//! onto them across ticks.

pub mod shape;
pub mod split;

use crate::error::SimResult;
use crate::material::MaterialId;
use crate::math::{Aabb, Quat, Vec3};

pub const VOBJ_EDGE: u32 = 16;
pub const VOBJ_TOTAL_VOXELS: usize = (VOBJ_EDGE * VOBJ_EDGE * VOBJ_EDGE) as usize;

#[inline]
pub fn local_index(x: u32, y: u32, z: u32) -> usize {
    debug_assert!(x < VOBJ_EDGE && y < VOBJ_EDGE && z < VOBJ_EDGE);
    (z as usize * VOBJ_EDGE as usize + y as usize) * VOBJ_EDGE as usize + x as usize
}

#[inline]
pub fn local_coords(idx: usize) -> (u32, u32, u32) {
    let edge = VOBJ_EDGE as usize;
    let x = idx % edge;
    let y = (idx / edge) % edge;
    let z = idx / (edge * edge);
    (x as u32, y as u32, z as u32)
}

/// A small dense voxel blob with its own rigid-body pose and motion state.
///
/// `position` is the world-space location of the grid's local `(0,0,0)`
/// corner; `orientation` rotates the local frame into world space. Every
/// other local-frame quantity (`center_of_mass_offset`, `support_rect`) is
/// expressed relative to that same corner, so a solid point's world
/// position is `position + orientation.rotate(local_point)`.
pub struct VoxelObject {
    pub voxels: Vec<MaterialId>,
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub voxel_size: f32,
    pub voxel_count: u32,
    pub half_extents: Vec3,
    pub center_of_mass_offset: Vec3,
    pub radius: f32,
    pub support_rect: Aabb,
    pub mass: f32,
    pub inv_mass: f32,
    pub active: bool,
    pub sleeping: bool,
}

impl VoxelObject {
    pub fn new_empty(voxel_size: f32) -> Self {
        Self {
            voxels: vec![0; VOBJ_TOTAL_VOXELS],
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            voxel_size,
            voxel_count: 0,
            half_extents: Vec3::ZERO,
            center_of_mass_offset: Vec3::ZERO,
            radius: 0.0,
            support_rect: Aabb::EMPTY,
            mass: 0.0,
            inv_mass: 0.0,
            active: false,
            sleeping: false,
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> MaterialId {
        self.voxels[local_index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, z: u32, material: MaterialId) {
        self.voxels[local_index(x, y, z)] = material;
    }

    /// World-space position of a local voxel's cell center.
    pub fn world_point(&self, local: Vec3) -> Vec3 {
        self.position + self.orientation.rotate(local)
    }

    pub fn world_center_of_mass(&self) -> Vec3 {
        self.world_point(self.center_of_mass_offset)
    }
}

/// A handle to a slot in an [`ObjectWorld`]. Stable across removal of other
/// objects; invalidated only when the slot it names is itself removed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ObjectHandle(pub u32);

pub struct ObjectWorld {
    objects: Vec<Option<Box<VoxelObject>>>,
    free_list: Vec<usize>,
    capacity: usize,
    object_count: u32,
    default_voxel_size: f32,
}

impl ObjectWorld {
    pub fn new(capacity: usize, default_voxel_size: f32) -> SimResult<Self> {
        let mut objects = Vec::new();
        objects
            .try_reserve_exact(capacity)
            .map_err(|_| crate::error::SimError::OutOfMemory { what: "object world slots", requested: capacity })?;
        objects.resize_with(capacity, || None);
        Ok(Self {
            objects,
            free_list: Vec::new(),
            capacity,
            object_count: 0,
            default_voxel_size,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total objects ever appended (not the currently-active count); used by
    /// callers that want a stable upper bound for iteration.
    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    pub fn active_object_count(&self) -> usize {
        self.objects.iter().filter(|s| matches!(s, Some(o) if o.active)).count()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&VoxelObject> {
        self.objects.get(handle.0 as usize)?.as_deref()
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut VoxelObject> {
        self.objects.get_mut(handle.0 as usize)?.as_deref_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &VoxelObject)> {
        self.objects.iter().enumerate().filter_map(|(i, s)| {
            s.as_deref().map(|o| (ObjectHandle(i as u32), o))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectHandle, &mut VoxelObject)> {
        self.objects.iter_mut().enumerate().filter_map(|(i, s)| {
            s.as_deref_mut().map(|o| (ObjectHandle(i as u32), o))
        })
    }

    /// Finds a reusable slot: the free list first, then any stray `None`
    /// slot left over from construction. Returns `None` when the world is
    /// at capacity.
    pub fn find_free_slot(&mut self) -> Option<usize> {
        if let Some(idx) = self.free_list.pop() {
            return Some(idx);
        }
        self.objects.iter().position(|s| s.is_none())
    }

    fn insert_at(&mut self, idx: usize, object: VoxelObject) -> ObjectHandle {
        self.objects[idx] = Some(Box::new(object));
        self.object_count += 1;
        ObjectHandle(idx as u32)
    }

    pub fn add_sphere(&mut self, position: Vec3, radius: f32, material: MaterialId) -> Option<ObjectHandle> {
        let idx = self.find_free_slot()?;
        let voxel_size = self.default_voxel_size;
        let mut obj = VoxelObject::new_empty(voxel_size);
        obj.position = position - Vec3::splat(VOBJ_EDGE as f32 * 0.5 * voxel_size);
        obj.active = true;
        let center = Vec3::splat(VOBJ_EDGE as f32 * 0.5);
        for z in 0..VOBJ_EDGE {
            for y in 0..VOBJ_EDGE {
                for x in 0..VOBJ_EDGE {
                    let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
                    if (p - center).length() * voxel_size <= radius {
                        obj.set(x, y, z, material);
                    }
                }
            }
        }
        shape::recalc_shape(&mut obj);
        if obj.voxel_count == 0 {
            return None;
        }
        Some(self.insert_at(idx, obj))
    }

    pub fn add_box(&mut self, position: Vec3, half_extents: Vec3, material: MaterialId) -> Option<ObjectHandle> {
        let idx = self.find_free_slot()?;
        let voxel_size = self.default_voxel_size;
        let mut obj = VoxelObject::new_empty(voxel_size);
        obj.position = position - Vec3::splat(VOBJ_EDGE as f32 * 0.5 * voxel_size);
        obj.active = true;
        let center = Vec3::splat(VOBJ_EDGE as f32 * 0.5) * voxel_size;
        for z in 0..VOBJ_EDGE {
            for y in 0..VOBJ_EDGE {
                for x in 0..VOBJ_EDGE {
                    let p = Vec3::new(
                        (x as f32 + 0.5) * voxel_size,
                        (y as f32 + 0.5) * voxel_size,
                        (z as f32 + 0.5) * voxel_size,
                    ) - center;
                    if p.x.abs() <= half_extents.x && p.y.abs() <= half_extents.y && p.z.abs() <= half_extents.z {
                        obj.set(x, y, z, material);
                    }
                }
            }
        }
        shape::recalc_shape(&mut obj);
        if obj.voxel_count == 0 {
            return None;
        }
        Some(self.insert_at(idx, obj))
    }

    /// Spawns an object from an already-extracted dense voxel buffer (used by
    /// the detachment bridge when lifting a floating island out of a
    /// [`crate::volume::Volume`]). `src` is indexed the same way
    /// [`local_index`] indexes `VoxelObject::voxels`.
    pub fn add_from_voxels(
        &mut self,
        position: Vec3,
        orientation: Quat,
        voxel_size: f32,
        src: &[MaterialId],
    ) -> Option<ObjectHandle> {
        if src.len() != VOBJ_TOTAL_VOXELS {
            log::warn!("add_from_voxels: buffer size {} does not match VOBJ_TOTAL_VOXELS", src.len());
            return None;
        }
        let idx = self.find_free_slot()?;
        let mut obj = VoxelObject::new_empty(voxel_size);
        obj.position = position;
        obj.orientation = orientation;
        obj.active = true;
        obj.voxels.copy_from_slice(src);
        shape::recalc_shape(&mut obj);
        if obj.voxel_count == 0 {
            return None;
        }
        Some(self.insert_at(idx, obj))
    }

    /// Deactivates and frees an object's slot. The handle becomes invalid.
    pub fn remove(&mut self, handle: ObjectHandle) {
        let idx = handle.0 as usize;
        if idx >= self.objects.len() {
            return;
        }
        if self.objects[idx].take().is_some() {
            self.free_list.push(idx);
        }
    }

    /// Removes the voxels of `object` within `radius` of `world_point`,
    /// recomputes its shape, and splits any disconnected remainder into new
    /// objects. Returns the number of voxels removed.
    pub fn destroy_at_point(&mut self, handle: ObjectHandle, world_point: Vec3, radius: f32) -> u32 {
        let idx = handle.0 as usize;
        let mut removed = 0u32;
        {
            let Some(obj) = self.objects.get_mut(idx).and_then(|s| s.as_mut()) else { return 0 };
            if !obj.active {
                return 0;
            }
            for i in 0..obj.voxels.len() {
                if obj.voxels[i] == 0 {
                    continue;
                }
                let (x, y, z) = local_coords(i);
                let local = Vec3::new(
                    (x as f32 + 0.5) * obj.voxel_size,
                    (y as f32 + 0.5) * obj.voxel_size,
                    (z as f32 + 0.5) * obj.voxel_size,
                );
                let world = obj.world_point(local);
                if (world - world_point).length() <= radius {
                    obj.voxels[i] = 0;
                    removed += 1;
                }
            }
            if removed == 0 {
                return 0;
            }
            shape::recalc_shape(obj);
        }

        if self.objects[idx].as_ref().map(|o| o.voxel_count).unwrap_or(0) == 0 {
            self.remove(ObjectHandle(idx as u32));
        } else {
            split::split_disconnected_islands(self, idx);
        }
        removed
    }

    /// Raycasts every active object's bounding sphere first, then the
    /// matching object's dense grid in local space, returning the closest
    /// hit across the whole world.
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_dist: f32) -> Option<(ObjectHandle, Vec3, Vec3, MaterialId)> {
        if dir.length_squared() < crate::math::EPSILON {
            return None;
        }
        let dir = dir.normalize();
        let mut best: Option<(f32, ObjectHandle, Vec3, Vec3, MaterialId)> = None;
        for (handle, obj) in self.iter() {
            if !obj.active {
                continue;
            }
            let center = obj.world_center_of_mass();
            let to_center = center - origin;
            let proj = to_center.dot(dir);
            if proj < -obj.radius || proj > max_dist + obj.radius {
                continue;
            }
            let closest = origin + dir * proj.max(0.0);
            if (closest - center).length() > obj.radius {
                continue;
            }
            if let Some((t, pos, normal, material)) = raycast_object_local(obj, origin, dir, max_dist) {
                if best.is_none() || t < best.as_ref().unwrap().0 {
                    best = Some((t, handle, pos, normal, material));
                }
            }
        }
        best.map(|(_, h, pos, normal, material)| (h, pos, normal, material))
    }
}

/// Steps a ray through one object's local voxel grid using simple fixed-step
/// marching (the grid is tiny — `VOBJ_EDGE^3` — so a DDA's complexity isn't
/// warranted here).
fn raycast_object_local(obj: &VoxelObject, origin: Vec3, dir: Vec3, max_dist: f32) -> Option<(f32, Vec3, Vec3, MaterialId)> {
    let inv_rot = obj.orientation.conjugate();
    let local_origin = inv_rot.rotate(origin - obj.position);
    let local_dir = inv_rot.rotate(dir);
    let grid_min = Vec3::ZERO;
    let grid_max = Vec3::splat(VOBJ_EDGE as f32) * obj.voxel_size;
    let bounds = Aabb::from_min_max(grid_min, grid_max);
    let (t_enter, t_exit) = bounds.ray_intersect(local_origin, local_dir, max_dist)?;

    let step = obj.voxel_size * 0.5;
    let mut t = t_enter.max(0.0);
    let limit = max_dist.min(t_exit);
    let mut last_voxel: Option<(u32, u32, u32)> = None;
    while t <= limit {
        let p = local_origin + local_dir * t;
        let gx = (p.x / obj.voxel_size).floor();
        let gy = (p.y / obj.voxel_size).floor();
        let gz = (p.z / obj.voxel_size).floor();
        if gx >= 0.0 && gy >= 0.0 && gz >= 0.0 {
            let (x, y, z) = (gx as u32, gy as u32, gz as u32);
            if x < VOBJ_EDGE && y < VOBJ_EDGE && z < VOBJ_EDGE {
                let m = obj.get(x, y, z);
                if m != 0 {
                    let world_pos = obj.position + obj.orientation.rotate(p);
                    let normal = last_voxel
                        .map(|(lx, ly, lz)| {
                            let dx = x as i32 - lx as i32;
                            let dy = y as i32 - ly as i32;
                            let dz = z as i32 - lz as i32;
                            obj.orientation.rotate(Vec3::new(-(dx as f32), -(dy as f32), -(dz as f32)))
                        })
                        .unwrap_or(Vec3::ZERO);
                    return Some((t, world_pos, normal, m));
                }
                last_voxel = Some((x, y, z));
            }
        }
        t += step;
    }
    None
}

#[cfg(test)]
impl ObjectWorld {
    /// Test-only convenience: allocates an object via `find_free_slot` and
    /// runs `fill` over it before inserting, returning the raw slot index
    /// (not a handle) so split/merge tests can address slots directly.
    pub fn add_from_voxels_for_test(&mut self, voxel_size: f32, fill: impl FnOnce(&mut VoxelObject)) -> usize {
        let idx = self.find_free_slot().expect("object world full in test");
        let mut obj = VoxelObject::new_empty(voxel_size);
        obj.active = true;
        fill(&mut obj);
        shape::recalc_shape(&mut obj);
        self.insert_at(idx, obj);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_world_has_no_active_objects() {
        let world = ObjectWorld::new(8, 1.0).unwrap();
        assert_eq!(world.active_object_count(), 0);
    }

    #[test]
    fn add_sphere_populates_voxels_and_shape() {
        let mut world = ObjectWorld::new(4, 1.0).unwrap();
        let handle = world.add_sphere(Vec3::new(10.0, 10.0, 10.0), 3.0, 1).expect("sphere should fit");
        let obj = world.get(handle).unwrap();
        assert!(obj.voxel_count > 0);
        assert!(obj.radius > 0.0);
    }

    #[test]
    fn remove_frees_the_slot_for_reuse() {
        let mut world = ObjectWorld::new(1, 1.0).unwrap();
        let handle = world.add_sphere(Vec3::ZERO, 3.0, 1).unwrap();
        world.remove(handle);
        assert_eq!(world.active_object_count(), 0);
        assert!(world.add_sphere(Vec3::ZERO, 3.0, 1).is_some());
    }

    #[test]
    fn destroy_at_point_removes_nearby_voxels() {
        let mut world = ObjectWorld::new(4, 1.0).unwrap();
        let handle = world.add_sphere(Vec3::new(8.0, 8.0, 8.0), 5.0, 1).unwrap();
        let before = world.get(handle).unwrap().voxel_count;
        let removed = world.destroy_at_point(handle, Vec3::new(8.0, 8.0, 8.0), 2.0);
        assert!(removed > 0);
        if let Some(obj) = world.get(handle) {
            assert!(obj.voxel_count < before);
        }
    }

    #[test]
    fn world_full_returns_none_on_add() {
        let mut world = ObjectWorld::new(1, 1.0).unwrap();
        world.add_sphere(Vec3::ZERO, 3.0, 1).unwrap();
        assert!(world.add_sphere(Vec3::new(100.0, 100.0, 100.0), 3.0, 1).is_none());
    }
}
