//! Bounded dirty-chunk ring (§4.2 "Dirty ring").
//!
//! Generalizes the teacher's per-chunk dirty bitset lifecycle
//! (`spatial::chunks::{mark_dirty_idx, end_chunk_update, reset}`) to a FIFO
//! of chunk indices with an explicit capacity and overflow flag, since the
//! uploader here consumes an ordered list rather than scanning a bitset.

use std::collections::{HashSet, VecDeque};

pub struct DirtyRing {
    capacity: usize,
    queue: VecDeque<u32>,
    present: HashSet<u32>,
    overflow: bool,
}

impl DirtyRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::with_capacity(capacity.max(1)),
            present: HashSet::new(),
            overflow: false,
        }
    }

    /// Marks `chunk_index` dirty. A no-op if it is already pending upload
    /// (each index appears at most once until uploaded, per §4.2).
    pub fn push(&mut self, chunk_index: u32) {
        if self.present.contains(&chunk_index) {
            return;
        }
        if self.queue.len() >= self.capacity {
            self.overflow = true;
            return;
        }
        self.queue.push_back(chunk_index);
        self.present.insert(chunk_index);
    }

    pub fn mark_uploaded(&mut self, indices: &[u32]) {
        for idx in indices {
            if self.present.remove(idx) {
                if let Some(pos) = self.queue.iter().position(|v| v == idx) {
                    self.queue.remove(pos);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.present.clear();
        self.overflow = false;
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.queue.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_push_is_ignored() {
        let mut ring = DirtyRing::new(8);
        ring.push(3);
        ring.push(3);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn overflow_sets_flag_and_caps_length() {
        let mut ring = DirtyRing::new(8);
        for i in 0..10u32 {
            ring.push(i);
        }
        assert!(ring.overflow());
        assert!(ring.len() <= 8);
    }

    #[test]
    fn mark_uploaded_removes_entries() {
        let mut ring = DirtyRing::new(8);
        ring.push(1);
        ring.push(2);
        ring.mark_uploaded(&[1]);
        assert_eq!(ring.len(), 1);
        assert!(ring.iter().collect::<Vec<_>>().contains(&2));
    }
}
