//! Aggregates one `TypeSequenceManager` per `EntityType` and dispatches
//! handle-keyed operations to the right one by decoding the handle's type
//! field. This is the shared L1 state that L2 (`AEntityFactory`), L3
//! (`TagServer`), and L4 (`MeshSet` installation) all operate against.

use std::collections::HashMap;

use crate::error::{MeshError, MeshResult};
use crate::handle::{type_of, EntityType, Handle, ALL_ENTITY_TYPES};
use crate::sequence::{SequenceData, SequenceShape, TypeSequenceManager};

pub struct SequenceStore {
    managers: HashMap<EntityType, TypeSequenceManager>,
}

impl SequenceStore {
    pub fn new() -> Self {
        let mut managers = HashMap::new();
        for t in ALL_ENTITY_TYPES {
            managers.insert(t, TypeSequenceManager::new(t));
        }
        Self { managers }
    }

    pub fn manager(&self, t: EntityType) -> &TypeSequenceManager {
        self.managers.get(&t).expect("every entity type has a manager")
    }

    pub fn manager_mut(&mut self, t: EntityType) -> &mut TypeSequenceManager {
        self.managers.get_mut(&t).expect("every entity type has a manager")
    }

    pub fn locate_data(&self, h: Handle) -> MeshResult<&SequenceData> {
        let t = type_of(h)?;
        self.manager(t).locate_data(h)
    }

    pub fn locate_data_mut(&mut self, h: Handle) -> MeshResult<&mut SequenceData> {
        let t = type_of(h)?;
        self.manager_mut(t).locate_data_mut(h)
    }

    pub fn exists(&self, h: Handle) -> bool {
        self.locate_data(h).is_ok()
    }

    pub fn allocate_block(&mut self, t: EntityType, count: u64, start_hint: Option<u64>, shape: SequenceShape) -> MeshResult<Handle> {
        self.manager_mut(t).allocate_block(count, start_hint, shape)
    }

    pub fn free_handle(&mut self, h: Handle) -> MeshResult<()> {
        let t = type_of(h)?;
        self.manager_mut(t).free_handle(h)
    }

    /// Connectivity / vertex-set for any entity: fixed-arity elements read
    /// their connectivity array directly, polygons/polyhedra their variable
    /// handle list, and vertices return themselves (dimension-0 identity).
    pub fn down_adjacent_vertices(&self, h: Handle) -> MeshResult<Vec<Handle>> {
        let t = type_of(h)?;
        match t {
            EntityType::Vertex => Ok(vec![h]),
            EntityType::Polyhedron => {
                let data = self.locate_data(h)?;
                let faces = data.poly_handles(h)?;
                let mut verts = Vec::new();
                for &f in faces {
                    for v in self.down_adjacent_vertices(f)? {
                        if !verts.contains(&v) {
                            verts.push(v);
                        }
                    }
                }
                Ok(verts)
            }
            EntityType::Polygon => {
                let data = self.locate_data(h)?;
                Ok(data.poly_handles(h)?.to_vec())
            }
            _ => {
                let data = self.locate_data(h)?;
                Ok(data.connectivity(h)?.to_vec())
            }
        }
    }

    pub fn adjacency_list(&self, h: Handle) -> MeshResult<&[Handle]> {
        Ok(self.locate_data(h)?.adjacency(h))
    }

    pub fn adjacency_list_mut(&mut self, h: Handle) -> MeshResult<&mut smallvec::SmallVec<[Handle; 8]>> {
        Ok(self.locate_data_mut(h)?.adjacency_mut(h))
    }

    pub fn entity_type_of(&self, h: Handle) -> MeshResult<EntityType> {
        type_of(h)
    }

    pub fn dimension_of(&self, h: Handle) -> MeshResult<u8> {
        type_of(h)?.dimension().ok_or(MeshError::UnsupportedOperation)
    }

    /// Drop a dense tag's array wherever it has been allocated, across every
    /// entity type — used when a tag is deleted.
    pub fn drop_tag_everywhere(&mut self, tag: crate::tag::TagId) {
        for mgr in self.managers.values_mut() {
            mgr.for_each_data_mut(|d| d.drop_dense_tag(tag));
        }
    }
}

impl Default for SequenceStore {
    fn default() -> Self {
        Self::new()
    }
}
