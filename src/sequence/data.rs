use std::collections::HashMap;

use smallvec::SmallVec;

use crate::error::{MeshError, MeshResult};
use crate::handle::{id_of, EntityType, Handle};
use crate::meshset::MeshSet;
use crate::tag::TagId;

/// Small inline adjacency lists: most entities have a handful of incident
/// entities, so `SmallVec` avoids a heap allocation for the common case —
/// the same trade-off the `crucible` example pack makes for per-entity
/// component lists.
pub type AdjacencyList = SmallVec<[Handle; 8]>;

/// The shape a block of entities must match to share a `SequenceData`.
/// Vertices and sets have a single shape; fixed-arity elements are keyed by
/// nodes-per-element; polygons/polyhedra never share (each grows its own
/// variable-length handle list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceShape {
    Vertex,
    Element { nodes_per_element: usize },
    Poly,
    Set,
}

#[derive(Debug)]
pub enum SequenceDataKind {
    Vertex { x: Vec<f64>, y: Vec<f64>, z: Vec<f64> },
    Element { nodes_per_element: usize, connectivity: Vec<Handle> },
    /// `index_end[i]` marks the end (exclusive) of entity `i`'s handles in
    /// `handles`; entity `i`'s handles occupy `handles[index_end[i-1]..index_end[i]]`.
    Poly { index_end: Vec<u32>, handles: Vec<Handle> },
    Set { sets: Vec<MeshSet> },
}

/// Owns the raw arrays for a contiguous handle range. Handles are stable
/// pointers into these arrays — they are never reallocated across the life
/// of the `SequenceData`, only ever grown (append) by `TypeSequenceManager`.
#[derive(Debug)]
pub struct SequenceData {
    pub entity_type: EntityType,
    pub start: Handle,
    pub capacity: u64,
    /// Monotonically increasing count of slots handed out to an
    /// `EntitySequence` so far. Freed handles are never reused within a
    /// session, so this never decreases.
    pub high_water: u64,
    pub kind: SequenceDataKind,
    /// Adjacency list slot per entity, owned logically by L2 (`AEntityFactory`)
    /// but stored here for O(1) lookup and to avoid a pointer graph that could
    /// dangle across split/merge, per the design notes.
    adjacency: Vec<Option<AdjacencyList>>,
    /// Dense tag arrays: `tag_id -> bytes_per_entity * capacity` bytes.
    dense_tags: HashMap<TagId, (usize, Vec<u8>)>,
}

impl SequenceData {
    pub fn new_vertex(start: Handle, capacity: u64) -> Self {
        let cap = capacity as usize;
        Self {
            entity_type: EntityType::Vertex,
            start,
            capacity,
            high_water: 0,
            kind: SequenceDataKind::Vertex { x: vec![0.0; cap], y: vec![0.0; cap], z: vec![0.0; cap] },
            adjacency: vec![None; cap],
            dense_tags: HashMap::new(),
        }
    }

    pub fn new_element(entity_type: EntityType, start: Handle, capacity: u64, nodes_per_element: usize) -> Self {
        let cap = capacity as usize;
        Self {
            entity_type,
            start,
            capacity,
            high_water: 0,
            kind: SequenceDataKind::Element {
                nodes_per_element,
                connectivity: vec![0; cap * nodes_per_element],
            },
            adjacency: vec![None; cap],
            dense_tags: HashMap::new(),
        }
    }

    pub fn new_poly(entity_type: EntityType, start: Handle, capacity: u64) -> Self {
        let cap = capacity as usize;
        Self {
            entity_type,
            start,
            capacity,
            high_water: 0,
            kind: SequenceDataKind::Poly { index_end: vec![0; cap], handles: Vec::new() },
            adjacency: vec![None; cap],
            dense_tags: HashMap::new(),
        }
    }

    pub fn new_set(start: Handle, capacity: u64) -> Self {
        let cap = capacity as usize;
        let mut sets = Vec::with_capacity(cap);
        sets.resize_with(cap, MeshSet::empty_placeholder);
        Self {
            entity_type: EntityType::EntitySet,
            start,
            capacity,
            high_water: 0,
            kind: SequenceDataKind::Set { sets },
            adjacency: vec![None; cap],
            dense_tags: HashMap::new(),
        }
    }

    pub fn shape(&self) -> SequenceShape {
        match &self.kind {
            SequenceDataKind::Vertex { .. } => SequenceShape::Vertex,
            SequenceDataKind::Element { nodes_per_element, .. } => {
                SequenceShape::Element { nodes_per_element: *nodes_per_element }
            }
            SequenceDataKind::Poly { .. } => SequenceShape::Poly,
            SequenceDataKind::Set { .. } => SequenceShape::Set,
        }
    }

    pub fn end(&self) -> Handle {
        self.start + self.capacity - 1
    }

    pub fn free_capacity(&self) -> u64 {
        self.capacity - self.high_water
    }

    /// Offset of `h` within this data's arrays. Caller must ensure `h` is in range.
    fn offset(&self, h: Handle) -> usize {
        (id_of(h) - id_of(self.start)) as usize
    }

    pub fn contains(&self, h: Handle) -> bool {
        h >= self.start && h <= self.end()
    }

    // ---- coordinates ----

    pub fn set_vertex_coords(&mut self, h: Handle, xyz: (f64, f64, f64)) -> MeshResult<()> {
        let off = self.offset(h);
        match &mut self.kind {
            SequenceDataKind::Vertex { x, y, z } => {
                x[off] = xyz.0;
                y[off] = xyz.1;
                z[off] = xyz.2;
                Ok(())
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    pub fn vertex_coords(&self, h: Handle) -> MeshResult<(f64, f64, f64)> {
        let off = self.offset(h);
        match &self.kind {
            SequenceDataKind::Vertex { x, y, z } => Ok((x[off], y[off], z[off])),
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    /// Raw coordinate buffers for a block, for a reader to fill in place.
    pub fn vertex_buffers_mut(&mut self, start_off: usize, count: usize) -> MeshResult<(&mut [f64], &mut [f64], &mut [f64])> {
        match &mut self.kind {
            SequenceDataKind::Vertex { x, y, z } => {
                Ok((&mut x[start_off..start_off + count], &mut y[start_off..start_off + count], &mut z[start_off..start_off + count]))
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    // ---- connectivity ----

    pub fn set_connectivity(&mut self, h: Handle, conn: &[Handle]) -> MeshResult<()> {
        match &mut self.kind {
            SequenceDataKind::Element { nodes_per_element, connectivity } => {
                if conn.len() != *nodes_per_element {
                    return Err(MeshError::InvalidSize);
                }
                let off = (id_of(h) - id_of(self.start)) as usize * *nodes_per_element;
                connectivity[off..off + *nodes_per_element].copy_from_slice(conn);
                Ok(())
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    pub fn connectivity(&self, h: Handle) -> MeshResult<&[Handle]> {
        match &self.kind {
            SequenceDataKind::Element { nodes_per_element, connectivity } => {
                let off = (id_of(h) - id_of(self.start)) as usize * *nodes_per_element;
                Ok(&connectivity[off..off + *nodes_per_element])
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    /// Raw connectivity buffer for a block, for a reader to fill in place.
    pub fn connectivity_buffer_mut(&mut self, start_off: usize, count: usize) -> MeshResult<&mut [Handle]> {
        match &mut self.kind {
            SequenceDataKind::Element { nodes_per_element, connectivity } => {
                let npe = *nodes_per_element;
                Ok(&mut connectivity[start_off * npe..(start_off + count) * npe])
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    // ---- polygon/polyhedron ----

    pub fn set_poly_handles(&mut self, h: Handle, handles: &[Handle]) -> MeshResult<()> {
        let off = self.offset(h);
        match &mut self.kind {
            SequenceDataKind::Poly { index_end, handles: all } => {
                // Only supports appending the next un-set entity in order,
                // matching the append-only growth the reader path uses.
                let prev_end = if off == 0 { 0 } else { index_end[off - 1] };
                if (all.len() as u32) != prev_end {
                    return Err(MeshError::UnsupportedOperation);
                }
                all.extend_from_slice(handles);
                index_end[off] = all.len() as u32;
                Ok(())
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    pub fn poly_handles(&self, h: Handle) -> MeshResult<&[Handle]> {
        let off = self.offset(h);
        match &self.kind {
            SequenceDataKind::Poly { index_end, handles } => {
                let start = if off == 0 { 0 } else { index_end[off - 1] } as usize;
                let end = index_end[off] as usize;
                Ok(&handles[start..end])
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    // ---- sets ----

    pub fn set_mut(&mut self, h: Handle) -> MeshResult<&mut MeshSet> {
        let off = self.offset(h);
        match &mut self.kind {
            SequenceDataKind::Set { sets } => Ok(&mut sets[off]),
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    pub fn set_ref(&self, h: Handle) -> MeshResult<&MeshSet> {
        let off = self.offset(h);
        match &self.kind {
            SequenceDataKind::Set { sets } => Ok(&sets[off]),
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    pub fn install_set(&mut self, h: Handle, set: MeshSet) -> MeshResult<()> {
        let off = self.offset(h);
        match &mut self.kind {
            SequenceDataKind::Set { sets } => {
                sets[off] = set;
                Ok(())
            }
            _ => Err(MeshError::UnsupportedOperation),
        }
    }

    // ---- adjacency ----

    pub fn adjacency(&self, h: Handle) -> &[Handle] {
        let off = self.offset(h);
        self.adjacency[off].as_deref().unwrap_or(&[])
    }

    pub fn adjacency_mut(&mut self, h: Handle) -> &mut AdjacencyList {
        let off = self.offset(h);
        self.adjacency[off].get_or_insert_with(SmallVec::new)
    }

    pub fn clear_adjacency(&mut self, h: Handle) {
        let off = self.offset(h);
        self.adjacency[off] = None;
    }

    // ---- dense tags ----

    pub fn ensure_dense_tag(&mut self, tag: TagId, bytes_per_entity: usize, default: &[u8]) {
        self.dense_tags.entry(tag).or_insert_with(|| {
            let cap = self.capacity as usize;
            let mut buf = Vec::with_capacity(cap * bytes_per_entity);
            for _ in 0..cap {
                buf.extend_from_slice(default);
            }
            (bytes_per_entity, buf)
        });
    }

    pub fn has_dense_tag(&self, tag: TagId) -> bool {
        self.dense_tags.contains_key(&tag)
    }

    pub fn dense_tag_value(&self, tag: TagId, h: Handle) -> Option<&[u8]> {
        let (size, buf) = self.dense_tags.get(&tag)?;
        let off = self.offset(h) * size;
        Some(&buf[off..off + size])
    }

    pub fn set_dense_tag_value(&mut self, tag: TagId, h: Handle, value: &[u8]) -> MeshResult<()> {
        let off = self.offset(h);
        let (size, buf) = self.dense_tags.get_mut(&tag).ok_or(MeshError::TagNotFound)?;
        if value.len() != *size {
            return Err(MeshError::InvalidSize);
        }
        let start = off * *size;
        buf[start..start + *size].copy_from_slice(value);
        Ok(())
    }

    pub fn drop_dense_tag(&mut self, tag: TagId) {
        self.dense_tags.remove(&tag);
    }
}
