//! Generic cell-bucket broadphase (§4.3 pre-requisite, shared by rigid body
//! and particle systems per §5).
//!
//! Grounded in the original's `SpatialHashGrid` field of `ParticleSystem`
//! (`engine/physics/particles.h`): a uniform grid of buckets keyed by
//! truncated cell coordinates, rebuilt every tick rather than incrementally
//! maintained, since both consumers rebuild once per step anyway.

use std::collections::HashMap;

use crate::math::Vec3;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct CellKey(i32, i32, i32);

/// Buckets arbitrary handles (`T`) by the grid cell their position falls in.
/// Rebuilt wholesale via [`SpatialHash::rebuild`] each tick; querying a
/// neighborhood walks the 27 cells around a point.
pub struct SpatialHash<T: Copy> {
    cell_size: f32,
    buckets: HashMap<CellKey, Vec<T>>,
}

impl<T: Copy> SpatialHash<T> {
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        Self {
            cell_size,
            buckets: HashMap::new(),
        }
    }

    #[inline]
    fn key_of(&self, pos: Vec3) -> CellKey {
        CellKey(
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn insert(&mut self, pos: Vec3, item: T) {
        self.buckets.entry(self.key_of(pos)).or_default().push(item);
    }

    /// Rebuilds the whole structure from an iterator of `(position, item)`
    /// pairs, discarding any prior contents.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = (Vec3, T)>) {
        self.clear();
        for (pos, item) in items {
            self.insert(pos, item);
        }
    }

    /// Invokes `visit` for every item in the 27-cell neighborhood of `pos`.
    pub fn for_each_neighbor(&self, pos: Vec3, mut visit: impl FnMut(T)) {
        let center = self.key_of(pos);
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let key = CellKey(center.0 + dx, center.1 + dy, center.2 + dz);
                    if let Some(bucket) = self.buckets.get(&key) {
                        for &item in bucket {
                            visit(item);
                        }
                    }
                }
            }
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_only_include_nearby_cells() {
        let mut hash = SpatialHash::new(1.0);
        hash.insert(Vec3::new(0.1, 0.1, 0.1), 1u32);
        hash.insert(Vec3::new(50.0, 50.0, 50.0), 2u32);

        let mut found = Vec::new();
        hash.for_each_neighbor(Vec3::new(0.0, 0.0, 0.0), |item| found.push(item));

        assert_eq!(found, vec![1]);
    }

    #[test]
    fn rebuild_clears_prior_contents() {
        let mut hash = SpatialHash::new(2.0);
        hash.insert(Vec3::ZERO, 1u32);
        hash.rebuild(std::iter::empty());
        assert_eq!(hash.bucket_count(), 0);
    }
}
