//! Fixed-size chunk storage (§4.1).
//!
//! Generalizes the teacher's `spatial::chunks` bitset bookkeeping
//! (`set_bit`/`clear_bit`/`check_bit` over a packed `Vec<u64>`) from
//! one-bit-per-chunk dirty tracking to one-bit-per-voxel occupancy within a
//! single chunk, plus a per-chunk version counter used by the volume's dirty
//! ring (§4.2) instead of the teacher's `dirty_bits`/`visual_dirty_bits` pair.

use crate::material::MaterialId;

pub const CHUNK_EDGE: u32 = 32;
pub const CHUNK_VOLUME: usize = (CHUNK_EDGE * CHUNK_EDGE * CHUNK_EDGE) as usize;

#[inline]
fn bit_words(count: usize) -> usize {
    (count + 63) / 64
}

#[inline]
pub fn local_index(x: u32, y: u32, z: u32) -> usize {
    debug_assert!(x < CHUNK_EDGE && y < CHUNK_EDGE && z < CHUNK_EDGE);
    (z as usize * CHUNK_EDGE as usize + y as usize) * CHUNK_EDGE as usize + x as usize
}

#[inline]
pub fn local_coords(idx: usize) -> (u32, u32, u32) {
    let edge = CHUNK_EDGE as usize;
    let x = idx % edge;
    let y = (idx / edge) % edge;
    let z = idx / (edge * edge);
    (x as u32, y as u32, z as u32)
}

/// One 32^3 block of material ids plus an occupancy bitmask kept in sync on
/// every write, mirroring the teacher's branchless `set_bit`/`clear_bit`
/// pair.
#[derive(Clone)]
pub struct Chunk {
    voxels: Vec<MaterialId>,
    occupancy: Vec<u64>,
    solid_count: u32,
    version: u64,
}

impl Chunk {
    pub fn new_empty() -> Self {
        Self {
            voxels: vec![0; CHUNK_VOLUME],
            occupancy: vec![0u64; bit_words(CHUNK_VOLUME)],
            solid_count: 0,
            version: 0,
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> MaterialId {
        self.voxels[local_index(x, y, z)]
    }

    #[inline]
    pub fn get_idx(&self, idx: usize) -> MaterialId {
        self.voxels[idx]
    }

    /// Writes a voxel and keeps the occupancy bitmask and solid count in
    /// sync. Returns `true` iff the stored material actually changed —
    /// writing the same material twice is a no-op that neither bumps
    /// `version` nor counts as a second dirty mark upstream.
    pub fn set(&mut self, x: u32, y: u32, z: u32, material: MaterialId) -> bool {
        let idx = local_index(x, y, z);
        self.set_idx(idx, material)
    }

    pub fn set_idx(&mut self, idx: usize, material: MaterialId) -> bool {
        let old = self.voxels[idx];
        if old == material {
            return false;
        }
        let was_solid = self.check_bit(idx);
        let is_solid = material != 0;
        self.voxels[idx] = material;
        if was_solid != is_solid {
            if is_solid {
                self.set_bit(idx);
                self.solid_count += 1;
            } else {
                self.clear_bit(idx);
                self.solid_count -= 1;
            }
        }
        self.version = self.version.wrapping_add(1);
        true
    }

    #[inline]
    fn set_bit(&mut self, idx: usize) {
        self.occupancy[idx / 64] |= 1u64 << (idx % 64);
    }

    #[inline]
    fn clear_bit(&mut self, idx: usize) {
        self.occupancy[idx / 64] &= !(1u64 << (idx % 64));
    }

    #[inline]
    pub fn check_bit(&self, idx: usize) -> bool {
        (self.occupancy[idx / 64] >> (idx % 64)) & 1 != 0
    }

    #[inline]
    pub fn is_solid(&self, x: u32, y: u32, z: u32) -> bool {
        self.check_bit(local_index(x, y, z))
    }

    #[inline]
    pub fn solid_count(&self) -> u32 {
        self.solid_count
    }

    #[inline]
    pub fn any_solid(&self) -> bool {
        self.solid_count > 0
    }

    #[inline]
    pub fn is_fully_empty(&self) -> bool {
        self.solid_count == 0
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Enumerates local indices of non-air voxels (§4.1 `iter_solid`), used
    /// by renderers, occupancy debuggers, and connectivity analysis.
    pub fn iter_solid_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupancy.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            let base = word_idx * 64;
            std::iter::from_fn(move || {
                if bits == 0 {
                    None
                } else {
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(base + tz)
                }
            })
        })
    }

    /// Recomputes `solid_count` from the occupancy bitmask via popcount, used
    /// after bulk edits to recover from any drift (teacher's
    /// `rebuild_particle_counts` full-rescan pattern, generalized to a single
    /// chunk).
    pub fn rebuild_solid_count(&mut self) {
        self.solid_count = self.occupancy.iter().map(|w| w.count_ones()).sum();
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_chunk_is_empty() {
        let c = Chunk::new_empty();
        assert!(c.is_fully_empty());
        assert_eq!(c.solid_count(), 0);
    }

    #[test]
    fn set_updates_occupancy_and_count() {
        let mut c = Chunk::new_empty();
        assert!(c.set(1, 2, 3, 5));
        assert!(c.is_solid(1, 2, 3));
        assert_eq!(c.solid_count(), 1);
        assert_eq!(c.get(1, 2, 3), 5);
    }

    #[test]
    fn clearing_a_voxel_decrements_count() {
        let mut c = Chunk::new_empty();
        c.set(0, 0, 0, 1);
        assert!(c.set(0, 0, 0, 0));
        assert!(!c.is_solid(0, 0, 0));
        assert_eq!(c.solid_count(), 0);
    }

    #[test]
    fn rewriting_same_solidity_still_reports_material_change() {
        let mut c = Chunk::new_empty();
        c.set(4, 4, 4, 1);
        assert!(c.set(4, 4, 4, 2));
        assert_eq!(c.solid_count(), 1);
        assert_eq!(c.get(4, 4, 4), 2);
    }

    #[test]
    fn rewriting_same_material_is_a_no_op() {
        let mut c = Chunk::new_empty();
        c.set(2, 2, 2, 7);
        let v1 = c.version();
        assert!(!c.set(2, 2, 2, 7));
        assert_eq!(c.version(), v1);
    }

    #[test]
    fn version_increments_on_every_write() {
        let mut c = Chunk::new_empty();
        let v0 = c.version();
        c.set(0, 0, 0, 1);
        assert!(c.version() > v0);
    }

    #[test]
    fn iter_solid_indices_matches_solid_count() {
        let mut c = Chunk::new_empty();
        c.set(0, 0, 0, 1);
        c.set(5, 5, 5, 2);
        c.set(31, 31, 31, 3);
        let indices: Vec<_> = c.iter_solid_indices().collect();
        assert_eq!(indices.len(), c.solid_count() as usize);
        for idx in indices {
            let (x, y, z) = local_coords(idx);
            assert!(c.is_solid(x, y, z));
        }
    }

    #[test]
    fn local_coords_is_inverse_of_local_index() {
        let (x, y, z) = (7, 11, 19);
        let idx = local_index(x, y, z);
        assert_eq!(local_coords(idx), (x, y, z));
    }

    #[test]
    fn rebuild_matches_incremental_count() {
        let mut c = Chunk::new_empty();
        for i in 0..10 {
            c.set(i, 0, 0, 1);
        }
        let incremental = c.solid_count();
        c.rebuild_solid_count();
        assert_eq!(c.solid_count(), incremental);
    }
}
