//! Sparse chunked voxel volume (§4.2).
//!
//! A dense array of lazily-allocated chunks (grounded in teacher
//! `spatial::chunks::mod.rs`'s dirty-bitset lifecycle, generalized here from
//! "one bit per chunk, always allocated" to "one slot per chunk, allocated on
//! first write"). Groups of edits are bracketed by [`Volume::edit_begin`] and
//! [`Volume::edit_end`]; the latter is the only place chunk `version`s bump
//! and dirty entries are pushed, matching §4.1's invariant that `version`
//! changes "on any write committed during `edit_end`".

mod dirty;
mod raycast;

use std::collections::HashSet;

use crate::chunk::{Chunk, CHUNK_EDGE};
use crate::error::{SimError, SimResult};
use crate::material::MaterialId;
use crate::math::{Aabb, Vec3};

pub use dirty::DirtyRing;
pub use raycast::RaycastHit;

pub const DEFAULT_DIRTY_CAPACITY: usize = 4096;

pub struct Volume {
    chunks: Vec<Option<Box<Chunk>>>,
    chunks_x: u32,
    chunks_y: u32,
    chunks_z: u32,
    origin: Vec3,
    voxel_size: f32,

    dirty: DirtyRing,
    edit_in_progress: bool,
    touched: HashSet<u32>,
    last_touched: HashSet<u32>,
    total_solid_voxels: u64,
    last_edit_count: u32,
    edit_generation: u64,
}

impl Volume {
    pub fn new(chunks_x: u32, chunks_y: u32, chunks_z: u32, origin: Vec3, voxel_size: f32) -> SimResult<Self> {
        Self::with_dirty_capacity(chunks_x, chunks_y, chunks_z, origin, voxel_size, DEFAULT_DIRTY_CAPACITY)
    }

    pub fn with_dirty_capacity(
        chunks_x: u32,
        chunks_y: u32,
        chunks_z: u32,
        origin: Vec3,
        voxel_size: f32,
        dirty_capacity: usize,
    ) -> SimResult<Self> {
        let total = (chunks_x as usize) * (chunks_y as usize) * (chunks_z as usize);
        if total == 0 {
            return Err(SimError::OutOfMemory { what: "volume chunks", requested: 0 });
        }
        let mut chunks = Vec::new();
        chunks
            .try_reserve_exact(total)
            .map_err(|_| SimError::OutOfMemory { what: "volume chunks", requested: total })?;
        chunks.resize_with(total, || None);

        Ok(Self {
            chunks,
            chunks_x,
            chunks_y,
            chunks_z,
            origin,
            voxel_size,
            dirty: DirtyRing::new(dirty_capacity),
            edit_in_progress: false,
            touched: HashSet::new(),
            last_touched: HashSet::new(),
            total_solid_voxels: 0,
            last_edit_count: 0,
            edit_generation: 0,
        })
    }

    #[inline]
    pub fn chunks_x(&self) -> u32 {
        self.chunks_x
    }
    #[inline]
    pub fn chunks_y(&self) -> u32 {
        self.chunks_y
    }
    #[inline]
    pub fn chunks_z(&self) -> u32 {
        self.chunks_z
    }
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }
    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }
    #[inline]
    pub fn total_solid_voxels(&self) -> u64 {
        self.total_solid_voxels
    }
    #[inline]
    pub fn last_edit_count(&self) -> u32 {
        self.last_edit_count
    }
    #[inline]
    pub fn dirty_chunks(&self) -> impl Iterator<Item = u32> + '_ {
        self.dirty.iter()
    }
    #[inline]
    pub fn dirty_overflow(&self) -> bool {
        self.dirty.overflow()
    }
    #[inline]
    pub fn last_touched_chunks(&self) -> &HashSet<u32> {
        &self.last_touched
    }
    /// Bumps on every `edit_end` that actually changed a voxel. Callers that
    /// must do work only when the volume has changed since they last looked
    /// (connectivity/detachment throttling) compare this instead of
    /// `last_edit_count`, which resets to 0 on every `edit_begin` and so
    /// cannot distinguish "nothing changed in ages" from "haven't checked
    /// since the last batch".
    #[inline]
    pub fn edit_generation(&self) -> u64 {
        self.edit_generation
    }

    pub fn bounds(&self) -> Aabb {
        let extent = Vec3::new(
            self.chunks_x as f32 * CHUNK_EDGE as f32 * self.voxel_size,
            self.chunks_y as f32 * CHUNK_EDGE as f32 * self.voxel_size,
            self.chunks_z as f32 * CHUNK_EDGE as f32 * self.voxel_size,
        );
        Aabb::from_min_max(self.origin, self.origin + extent)
    }

    #[inline]
    pub(crate) fn chunk_index(&self, cx: u32, cy: u32, cz: u32) -> u32 {
        (cz * self.chunks_y + cy) * self.chunks_x + cx
    }

    #[inline]
    fn chunk_dims(&self) -> (u32, u32, u32) {
        (self.chunks_x, self.chunks_y, self.chunks_z)
    }

    pub(crate) fn chunk_at(&self, cx: u32, cy: u32, cz: u32) -> Option<&Chunk> {
        if cx >= self.chunks_x || cy >= self.chunks_y || cz >= self.chunks_z {
            return None;
        }
        let idx = self.chunk_index(cx, cy, cz) as usize;
        self.chunks[idx].as_deref()
    }

    fn chunk_at_mut_or_create(&mut self, cx: u32, cy: u32, cz: u32) -> &mut Chunk {
        let idx = self.chunk_index(cx, cy, cz) as usize;
        self.chunks[idx].get_or_insert_with(|| Box::new(Chunk::new_empty()))
    }

    /// Resolves a world position to chunk + local voxel coordinates. Returns
    /// `None` outside the volume's bounds.
    pub(crate) fn voxel_loc_at(&self, pos: Vec3) -> Option<VoxelLoc> {
        let rel = (pos - self.origin) / self.voxel_size;
        if rel.x < 0.0 || rel.y < 0.0 || rel.z < 0.0 {
            return None;
        }
        let gx = rel.x.floor() as u32;
        let gy = rel.y.floor() as u32;
        let gz = rel.z.floor() as u32;
        let (cdx, cdy, cdz) = self.chunk_dims();
        if gx >= cdx * CHUNK_EDGE || gy >= cdy * CHUNK_EDGE || gz >= cdz * CHUNK_EDGE {
            return None;
        }
        Some(VoxelLoc {
            cx: gx / CHUNK_EDGE,
            cy: gy / CHUNK_EDGE,
            cz: gz / CHUNK_EDGE,
            lx: gx % CHUNK_EDGE,
            ly: gy % CHUNK_EDGE,
            lz: gz % CHUNK_EDGE,
        })
    }

    #[inline]
    pub fn get_at(&self, pos: Vec3) -> MaterialId {
        match self.voxel_loc_at(pos) {
            Some(loc) => match self.chunk_at(loc.cx, loc.cy, loc.cz) {
                Some(chunk) => chunk.get(loc.lx, loc.ly, loc.lz),
                None => 0,
            },
            None => 0,
        }
    }

    pub fn edit_begin(&mut self) {
        self.touched.clear();
        self.last_edit_count = 0;
        self.edit_in_progress = true;
    }

    /// Writes a single voxel. Silently dropped if `pos` is outside the
    /// volume, or if `material` equals the voxel's current value (no dirty
    /// mark, no version bump — see `chunk::Chunk::set_idx`).
    pub fn edit_set(&mut self, pos: Vec3, material: MaterialId) {
        let Some(loc) = self.voxel_loc_at(pos) else {
            log::debug!("edit_set outside volume bounds, dropped");
            return;
        };
        let chunk_idx = self.chunk_index(loc.cx, loc.cy, loc.cz);
        let chunk = self.chunk_at_mut_or_create(loc.cx, loc.cy, loc.cz);
        let before = chunk.solid_count();
        if !chunk.set(loc.lx, loc.ly, loc.lz, material) {
            return;
        }
        let after = chunk.solid_count();
        if after != before {
            self.total_solid_voxels = (self.total_solid_voxels as i64 + (after as i64 - before as i64)) as u64;
        }
        self.touched.insert(chunk_idx);
        self.last_edit_count += 1;
    }

    pub fn edit_end(&mut self) {
        if !self.touched.is_empty() {
            self.edit_generation += 1;
        }
        for &idx in &self.touched {
            self.dirty.push(idx);
        }
        self.last_touched = std::mem::take(&mut self.touched);
        self.edit_in_progress = false;
    }

    #[inline]
    pub fn edit_in_progress(&self) -> bool {
        self.edit_in_progress
    }

    pub fn fill_sphere(&mut self, center: Vec3, radius: f32, material: MaterialId) {
        self.edit_begin();
        let steps = (radius / self.voxel_size).ceil() as i64 + 1;
        let r2 = radius * radius;
        for iz in -steps..=steps {
            for iy in -steps..=steps {
                for ix in -steps..=steps {
                    let offset = Vec3::new(ix as f32, iy as f32, iz as f32) * self.voxel_size;
                    if offset.length_squared() > r2 {
                        continue;
                    }
                    self.edit_set(center + offset, material);
                }
            }
        }
        self.edit_end();
    }

    pub fn fill_box(&mut self, min: Vec3, extent: Vec3, material: MaterialId) {
        self.edit_begin();
        let steps_x = (extent.x / self.voxel_size).ceil() as i64;
        let steps_y = (extent.y / self.voxel_size).ceil() as i64;
        let steps_z = (extent.z / self.voxel_size).ceil() as i64;
        for iz in 0..steps_z.max(1) {
            for iy in 0..steps_y.max(1) {
                for ix in 0..steps_x.max(1) {
                    let offset = Vec3::new(ix as f32, iy as f32, iz as f32) * self.voxel_size;
                    self.edit_set(min + offset, material);
                }
            }
        }
        self.edit_end();
    }

    pub fn mark_chunks_uploaded(&mut self, indices: &[u32]) {
        self.dirty.mark_uploaded(indices);
    }

    /// Full reconcile of `solid_count` per chunk and `total_solid_voxels`,
    /// for recovery after out-of-band loads (teacher's
    /// `rebuild_particle_counts` full-rescan, generalized per-chunk).
    pub fn rebuild_all_occupancy(&mut self) {
        let mut total = 0u64;
        for slot in self.chunks.iter_mut() {
            if let Some(chunk) = slot {
                chunk.rebuild_solid_count();
                total += chunk.solid_count() as u64;
            }
        }
        self.total_solid_voxels = total;
    }

    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_dist: f32) -> Option<RaycastHit> {
        raycast::cast(self, origin, dir, max_dist)
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct VoxelLoc {
    pub cx: u32,
    pub cy: u32,
    pub cz: u32,
    pub lx: u32,
    pub ly: u32,
    pub lz: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_volume() -> Volume {
        Volume::new(1, 1, 1, Vec3::ZERO, 1.0).unwrap()
    }

    #[test]
    fn fresh_volume_has_no_solid_voxels() {
        let v = small_volume();
        assert_eq!(v.total_solid_voxels(), 0);
    }

    #[test]
    fn edit_set_then_get_round_trips() {
        let mut v = small_volume();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 0.5, 0.5), 1);
        v.edit_end();
        assert_eq!(v.get_at(Vec3::new(0.5, 0.5, 0.5)), 1);
        assert_eq!(v.total_solid_voxels(), 1);
    }

    #[test]
    fn out_of_bounds_read_is_air() {
        let v = small_volume();
        assert_eq!(v.get_at(Vec3::new(1000.0, 0.0, 0.0)), 0);
    }

    #[test]
    fn duplicate_write_same_material_does_not_bump_dirty_twice() {
        let mut v = small_volume();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 0.5, 0.5), 1);
        v.edit_end();
        let after_first = v.dirty_chunks().count();

        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 0.5, 0.5), 1);
        v.edit_end();
        // no new content change -> no new touched chunk -> dirty set unchanged
        assert_eq!(v.last_edit_count(), 0);
        assert_eq!(v.dirty_chunks().count(), after_first);
    }

    #[test]
    fn dirty_overflow_is_reported() {
        let mut v = Volume::with_dirty_capacity(4, 1, 1, Vec3::ZERO, 1.0, 2).unwrap();
        v.edit_begin();
        for i in 0..4 {
            v.edit_set(Vec3::new(i as f32 * CHUNK_EDGE as f32 + 0.5, 0.5, 0.5), 1);
        }
        v.edit_end();
        assert!(v.dirty_overflow());
        assert!(v.dirty_chunks().count() <= 2);
    }

    #[test]
    fn rebuild_all_occupancy_matches_incremental_total() {
        let mut v = small_volume();
        v.edit_begin();
        v.edit_set(Vec3::new(0.5, 0.5, 0.5), 1);
        v.edit_set(Vec3::new(1.5, 0.5, 0.5), 2);
        v.edit_end();
        let incremental = v.total_solid_voxels();
        v.rebuild_all_occupancy();
        assert_eq!(v.total_solid_voxels(), incremental);
    }
}
