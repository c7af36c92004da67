//! L0: packs/unpacks `(EntityType, id)` into a fixed-width handle.
//!
//! Layout mirrors `original_source/src/moab/Core.hpp` / `MBInternals.hpp`: a
//! high type field and a low id field, handle 0 reserved as invalid, and
//! handles of one type forming a contiguous numeric range.

use crate::error::{MeshError, MeshResult};

/// Handle width is a compile-time constant; 64-bit gives us a generous id space.
pub type Handle = u64;

/// Number of bits used to encode the entity type. 4 bits covers the 11
/// concrete element types, the entity-set type, and the `MaxType` marker.
const TYPE_BITS: u32 = 4;
const ID_BITS: u32 = (Handle::BITS) - TYPE_BITS;
pub const MAX_ID: u64 = (1u64 << ID_BITS) - 1;
pub const MAX_TYPE_VALUE: u8 = (1u8 << TYPE_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EntityType {
    Vertex = 0,
    Edge = 1,
    Triangle = 2,
    Quadrilateral = 3,
    Polygon = 4,
    Tetrahedron = 5,
    Pyramid = 6,
    Prism = 7,
    Knife = 8,
    Hexahedron = 9,
    Polyhedron = 10,
    EntitySet = 11,
    /// Sentinel maximum, one past the last real type.
    MaxType = 12,
}

pub const ALL_ENTITY_TYPES: [EntityType; 12] = [
    EntityType::Vertex,
    EntityType::Edge,
    EntityType::Triangle,
    EntityType::Quadrilateral,
    EntityType::Polygon,
    EntityType::Tetrahedron,
    EntityType::Pyramid,
    EntityType::Prism,
    EntityType::Knife,
    EntityType::Hexahedron,
    EntityType::Polyhedron,
    EntityType::EntitySet,
];

impl EntityType {
    pub fn from_u8(v: u8) -> MeshResult<EntityType> {
        ALL_ENTITY_TYPES
            .iter()
            .copied()
            .find(|t| *t as u8 == v)
            .ok_or(MeshError::TypeOutOfRange)
    }

    /// Fixed topological dimension, or `None` for the variable-arity polygon
    /// and polyhedron types and for entity-sets (which have no dimension).
    pub fn dimension(self) -> Option<u8> {
        use EntityType::*;
        match self {
            Vertex => Some(0),
            Edge => Some(1),
            Triangle | Quadrilateral | Polygon => Some(2),
            Tetrahedron | Pyramid | Prism | Knife | Hexahedron | Polyhedron => Some(3),
            EntitySet | MaxType => None,
        }
    }

    /// Fixed nodes-per-element count, or `None` for variable-arity types.
    pub fn canonical_num_nodes(self) -> Option<usize> {
        use EntityType::*;
        match self {
            Vertex => Some(1),
            Edge => Some(2),
            Triangle => Some(3),
            Quadrilateral => Some(4),
            Tetrahedron => Some(4),
            Pyramid => Some(5),
            Prism => Some(6),
            Knife => Some(5),
            Hexahedron => Some(8),
            Polygon | Polyhedron | EntitySet | MaxType => None,
        }
    }

    pub fn is_variable_arity(self) -> bool {
        matches!(self, EntityType::Polygon | EntityType::Polyhedron)
    }
}

/// `(t << id_width) | i`. Id 0 is reserved (invalid) for every type.
pub fn make_handle(t: EntityType, id: u64) -> MeshResult<Handle> {
    if id == 0 || id > MAX_ID {
        return Err(MeshError::IndexOutOfRange);
    }
    let tv = t as u64;
    if tv > MAX_TYPE_VALUE as u64 {
        return Err(MeshError::TypeOutOfRange);
    }
    Ok((tv << ID_BITS) | id)
}

pub fn type_of(h: Handle) -> MeshResult<EntityType> {
    EntityType::from_u8(((h >> ID_BITS) & MAX_TYPE_VALUE as u64) as u8)
}

pub fn id_of(h: Handle) -> u64 {
    h & MAX_ID
}

/// First valid handle of `t` (id 1).
pub fn first_handle(t: EntityType) -> Handle {
    ((t as u64) << ID_BITS) | 1
}

/// Last valid handle of `t` (id == MAX_ID). Handles of the same type form
/// the contiguous numeric range `[first_handle(t), last_handle(t)]`.
pub fn last_handle(t: EntityType) -> Handle {
    ((t as u64) << ID_BITS) | MAX_ID
}

/// Half-open interval `[first_handle(t), first_handle(t+1))` covering every
/// possible handle of type `t`, usable to describe "all edges", etc.
pub fn type_range(t: EntityType) -> MeshResult<std::ops::Range<Handle>> {
    let next = EntityType::from_u8(t as u8 + 1).unwrap_or(EntityType::MaxType);
    let end = if next == EntityType::MaxType {
        last_handle(t) + 1
    } else {
        first_handle(next)
    };
    Ok(first_handle(t)..end)
}

pub const INVALID_HANDLE: Handle = 0;

#[cfg(test)]
#[path = "handle_tests.rs"]
mod handle_tests;
