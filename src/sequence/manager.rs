use std::collections::BTreeMap;

use crate::error::{MeshError, MeshResult};
use crate::handle::{id_of, make_handle, EntityType, Handle};

use super::data::{SequenceData, SequenceShape};
use super::iterator::RangeIntersectionIter;

/// Index into `TypeSequenceManager::datas`. Entries are never removed so
/// that existing `EntitySequence`s referencing them stay valid; this mirrors
/// handles themselves, which are never reused within a session.
pub type DataId = usize;

/// A half-open... well, inclusive `[start,end]` sub-range of a `SequenceData`.
/// Multiple live sequences may share one `SequenceData` after a split; no two
/// live sequences of the same type overlap.
#[derive(Debug, Clone, Copy)]
pub struct EntitySequence {
    pub start: Handle,
    pub end: Handle,
    pub data_id: DataId,
}

impl EntitySequence {
    pub fn size(&self) -> u64 {
        id_of(self.end) - id_of(self.start) + 1
    }

    pub fn contains(&self, h: Handle) -> bool {
        h >= self.start && h <= self.end
    }
}

/// Per entity-type collection of non-overlapping `EntitySequence`s plus the
/// `SequenceData` arena backing them.
pub struct TypeSequenceManager {
    pub entity_type: EntityType,
    datas: Vec<SequenceData>,
    /// Keyed by `EntitySequence::start` so lookup-by-handle is a single
    /// `range(..=h).next_back()` binary search.
    sequences: BTreeMap<Handle, EntitySequence>,
    next_free_id: u64,
}

/// Minimum size for a freshly allocated `SequenceData` when no caller hint is
/// given, doubled against the manager's running total the way an arena
/// allocator typically amortizes growth.
const DEFAULT_BLOCK: u64 = 1024;

impl TypeSequenceManager {
    pub fn new(entity_type: EntityType) -> Self {
        Self { entity_type, datas: Vec::new(), sequences: BTreeMap::new(), next_free_id: 1 }
    }

    pub fn data(&self, id: DataId) -> &SequenceData {
        &self.datas[id]
    }

    pub fn data_mut(&mut self, id: DataId) -> &mut SequenceData {
        &mut self.datas[id]
    }

    pub fn locate(&self, h: Handle) -> Option<&EntitySequence> {
        self.sequences.range(..=h).next_back().map(|(_, s)| s).filter(|s| s.contains(h))
    }

    fn locate_start_mut(&mut self, h: Handle) -> Option<Handle> {
        self.sequences.range(..=h).next_back().map(|(k, _)| *k).filter(|k| self.sequences[k].contains(h))
    }

    /// Mutable access to both the owning sequence and its backing data for `h`.
    pub fn locate_data_mut(&mut self, h: Handle) -> MeshResult<&mut SequenceData> {
        let seq = self.locate(h).copied().ok_or(MeshError::EntityNotFound)?;
        Ok(&mut self.datas[seq.data_id])
    }

    pub fn locate_data(&self, h: Handle) -> MeshResult<&SequenceData> {
        let seq = self.locate(h).ok_or(MeshError::EntityNotFound)?;
        Ok(&self.datas[seq.data_id])
    }

    pub fn sequences(&self) -> impl Iterator<Item = &EntitySequence> {
        self.sequences.values()
    }

    pub fn num_entities(&self) -> u64 {
        self.sequences.values().map(|s| s.size()).sum()
    }

    /// Allocate a contiguous block of `count` entities matching `shape`,
    /// reusing free capacity at the tail of a compatible `SequenceData` when
    /// one exists, else allocating a new one starting at or after `start_hint`.
    pub fn allocate_block(&mut self, count: u64, start_hint: Option<u64>, shape: SequenceShape) -> MeshResult<Handle> {
        if count == 0 {
            return Err(MeshError::InvalidSize);
        }
        if let Some((data_id, data_start_off)) = self.find_reusable(count, shape) {
            let data = &mut self.datas[data_id];
            let first = data.start + data_start_off;
            data.high_water += count;
            let last = first + count - 1;
            self.sequences.insert(first, EntitySequence { start: first, end: last, data_id });
            self.bump_next_free(last);
            return Ok(first);
        }

        let capacity = count.max(DEFAULT_BLOCK);
        let start_id = start_hint.unwrap_or(self.next_free_id).max(self.next_free_id);
        let start = make_handle(self.entity_type, start_id)?;
        let mut data = match shape {
            SequenceShape::Vertex => SequenceData::new_vertex(start, capacity),
            SequenceShape::Element { nodes_per_element } => {
                SequenceData::new_element(self.entity_type, start, capacity, nodes_per_element)
            }
            SequenceShape::Poly => SequenceData::new_poly(self.entity_type, start, capacity),
            SequenceShape::Set => SequenceData::new_set(start, capacity),
        };
        data.high_water = count;
        let data_id = self.datas.len();
        self.datas.push(data);
        let last = start + count - 1;
        self.sequences.insert(start, EntitySequence { start, end: last, data_id });
        self.bump_next_free(last);
        Ok(start)
    }

    fn bump_next_free(&mut self, last_allocated: Handle) {
        let next = id_of(last_allocated) + 1;
        if next > self.next_free_id {
            self.next_free_id = next;
        }
    }

    fn find_reusable(&self, count: u64, shape: SequenceShape) -> Option<(DataId, u64)> {
        self.datas.iter().enumerate().find_map(|(id, d)| {
            if d.shape() == shape && d.free_capacity() >= count {
                Some((id, d.high_water))
            } else {
                None
            }
        })
    }

    /// Split the sequence owning `h` into `[start,h-1]` and `[h,end]`,
    /// sharing the same backing `SequenceData`. `h` becomes the start of the
    /// new second sequence.
    pub fn split_at(&mut self, h: Handle) -> MeshResult<()> {
        let start_key = self.locate_start_mut(h).ok_or(MeshError::EntityNotFound)?;
        let seq = self.sequences[&start_key];
        if h == seq.start || h > seq.end {
            return Err(MeshError::IndexOutOfRange);
        }
        let first_half = EntitySequence { start: seq.start, end: h - 1, data_id: seq.data_id };
        let second_half = EntitySequence { start: h, end: seq.end, data_id: seq.data_id };
        self.sequences.insert(first_half.start, first_half);
        self.sequences.insert(second_half.start, second_half);
        Ok(())
    }

    /// Merge the sequence starting at `first_start` with the next one if they
    /// are adjacent, share a `SequenceData`, and have the same shape.
    pub fn try_merge_adjacent(&mut self, first_start: Handle) -> bool {
        let Some(&first) = self.sequences.get(&first_start) else { return false };
        let Some((&second_start, &second)) = self.sequences.range((first.end + 1)..).next() else { return false };
        if second_start != first.end + 1 || second.data_id != first.data_id {
            return false;
        }
        self.sequences.remove(&first_start);
        self.sequences.remove(&second_start);
        self.sequences.insert(first.start, EntitySequence { start: first.start, end: second.end, data_id: first.data_id });
        true
    }

    /// Drop the entire sequence owning `h` (used by `delete_entities`).
    /// `SequenceData` memory is retained; only the `EntitySequence` entry is removed.
    pub fn free_handle(&mut self, h: Handle) -> MeshResult<()> {
        let start_key = self.locate_start_mut(h).ok_or(MeshError::EntityNotFound)?;
        let seq = self.sequences[&start_key];
        if seq.start == seq.end {
            self.sequences.remove(&start_key);
            return Ok(());
        }
        // Deleting a single entity out of a multi-entity sequence: split
        // around it, then drop the singleton piece.
        if h == seq.start {
            self.sequences.remove(&start_key);
            if h != seq.end {
                self.sequences.insert(h + 1, EntitySequence { start: h + 1, end: seq.end, data_id: seq.data_id });
            }
            return Ok(());
        }
        if h == seq.end {
            self.sequences.insert(seq.start, EntitySequence { start: seq.start, end: h - 1, data_id: seq.data_id });
            return Ok(());
        }
        self.sequences.insert(seq.start, EntitySequence { start: seq.start, end: h - 1, data_id: seq.data_id });
        if h != seq.end {
            self.sequences.insert(h + 1, EntitySequence { start: h + 1, end: seq.end, data_id: seq.data_id });
        }
        Ok(())
    }

    /// Shrink the sequence starting at `seq_start` by removing `n` entities
    /// from its front. Tag/adjacency slots for the removed entities are left
    /// untouched in the `SequenceData` (it isn't shrunk), only the sequence's
    /// visible range moves.
    pub fn pop_front(&mut self, seq_start: Handle, n: u64) -> MeshResult<()> {
        let seq = *self.sequences.get(&seq_start).ok_or(MeshError::EntityNotFound)?;
        if n > seq.size() {
            return Err(MeshError::IndexOutOfRange);
        }
        self.sequences.remove(&seq_start);
        if n < seq.size() {
            let new_start = seq.start + n;
            self.sequences.insert(new_start, EntitySequence { start: new_start, end: seq.end, data_id: seq.data_id });
        }
        Ok(())
    }

    pub fn pop_back(&mut self, seq_start: Handle, n: u64) -> MeshResult<()> {
        let seq = *self.sequences.get(&seq_start).ok_or(MeshError::EntityNotFound)?;
        if n > seq.size() {
            return Err(MeshError::IndexOutOfRange);
        }
        self.sequences.remove(&seq_start);
        if n < seq.size() {
            self.sequences.insert(seq_start, EntitySequence { start: seq.start, end: seq.end - n, data_id: seq.data_id });
        }
        Ok(())
    }

    /// Walk a sorted input handle range, yielding `(sequence, data)` pairs for
    /// the contiguous runs that overlap live sequences, in handle order. The
    /// fast path for bulk tag get/set per the design notes.
    pub fn iter_range<'a>(&'a self, range: std::ops::RangeInclusive<Handle>) -> RangeIntersectionIter<'a> {
        RangeIntersectionIter::new(&self.sequences, range)
    }

    /// Visits every backing `SequenceData`, live or not yet fully consumed —
    /// used by tag deletion to drop a dense array wherever it was allocated.
    pub fn for_each_data_mut(&mut self, mut f: impl FnMut(&mut SequenceData)) {
        for d in self.datas.iter_mut() {
            f(d);
        }
    }
}

#[cfg(test)]
mod manager_tests {
    use super::*;

    #[test]
    fn allocate_then_locate() {
        let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
        let first = mgr.allocate_block(10, None, SequenceShape::Vertex).unwrap();
        for i in 0..10 {
            let h = first + i;
            assert!(mgr.locate(h).is_some());
        }
        assert!(mgr.locate(first + 10).is_none());
    }

    #[test]
    fn split_produces_two_contiguous_sequences() {
        let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
        let first = mgr.allocate_block(10, None, SequenceShape::Vertex).unwrap();
        mgr.split_at(first + 5).unwrap();
        let s1 = *mgr.locate(first).unwrap();
        let s2 = *mgr.locate(first + 5).unwrap();
        assert_eq!(s1.end, first + 4);
        assert_eq!(s2.start, first + 5);
        assert_eq!(s2.end, first + 9);
        assert_eq!(s1.data_id, s2.data_id);
    }

    #[test]
    fn merge_reverses_split() {
        let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
        let first = mgr.allocate_block(10, None, SequenceShape::Vertex).unwrap();
        mgr.split_at(first + 5).unwrap();
        assert!(mgr.try_merge_adjacent(first));
        let merged = *mgr.locate(first).unwrap();
        assert_eq!(merged.start, first);
        assert_eq!(merged.end, first + 9);
    }

    #[test]
    fn free_handle_removes_single_entity_sequence() {
        let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
        let first = mgr.allocate_block(1, None, SequenceShape::Vertex).unwrap();
        mgr.free_handle(first).unwrap();
        assert!(mgr.locate(first).is_none());
    }

    #[test]
    fn pop_front_shrinks_visible_range() {
        let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
        let first = mgr.allocate_block(5, None, SequenceShape::Vertex).unwrap();
        mgr.pop_front(first, 2).unwrap();
        assert!(mgr.locate(first).is_none());
        assert!(mgr.locate(first + 2).is_some());
    }

    #[test]
    fn allocation_reuses_free_tail_capacity() {
        let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
        let first = mgr.allocate_block(5, None, SequenceShape::Vertex).unwrap();
        let second = mgr.allocate_block(5, None, SequenceShape::Vertex).unwrap();
        // Both fit inside the same doubled-up SequenceData's default block.
        let s1 = mgr.locate(first).unwrap();
        let s2 = mgr.locate(second).unwrap();
        assert_eq!(s1.data_id, s2.data_id);
    }
}
