//! L5: `Interface` — the public facade. Owns one `SequenceStore`, one
//! `AEntityFactory`, one `TagServer`, and the root-set registry; dispatches
//! create/query/tag/set operations to L1–L4 and tracks the rank-local last
//! error. Grounded on `original_source/src/Core.hpp`: the C++ `Core` class
//! plays the same owning-facade role over the same four subsystems.

use tracing::info;

use crate::adjacency::{AEntityFactory, AEntityFactoryConfig};
use crate::error::{LastError, MeshError, MeshResult};
use crate::handle::{type_of, EntityType, Handle, ALL_ENTITY_TYPES};
use crate::meshset::{MeshSet, MeshSetOptions, SetResolver};
use crate::sequence::SequenceShape;
use crate::store::SequenceStore;
use crate::tag::{TagId, TagServer, TagSize, TagStorage};

pub struct Interface {
    store: SequenceStore,
    adjacency: AEntityFactory,
    tags: TagServer,
    last_error: LastError,
    root_set: Handle,
}

impl Interface {
    pub fn new(config: AEntityFactoryConfig) -> MeshResult<Self> {
        let mut store = SequenceStore::new();
        let root_set = store.allocate_block(EntityType::EntitySet, 1, None, SequenceShape::Set)?;
        store.locate_data_mut(root_set)?.install_set(root_set, MeshSet::new(MeshSetOptions { ordered: true, track_owners: false }))?;
        Ok(Self {
            store,
            adjacency: AEntityFactory::new(config),
            tags: TagServer::new(),
            last_error: LastError::new(),
            root_set,
        })
    }

    pub fn root_set(&self) -> Handle {
        self.root_set
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    fn fail<T>(&self, err: MeshError) -> MeshResult<T> {
        self.last_error.set(&err);
        Err(err)
    }

    // ---- L1: creation ----

    /// `create_vertex(xyz) -> handle`. Allocates a single vertex slot and
    /// writes its coordinates.
    pub fn create_vertex(&mut self, xyz: (f64, f64, f64)) -> MeshResult<Handle> {
        let h = match self.store.allocate_block(EntityType::Vertex, 1, None, SequenceShape::Vertex) {
            Ok(h) => h,
            Err(e) => return self.fail(e),
        };
        self.store.locate_data_mut(h)?.set_vertex_coords(h, xyz)?;
        Ok(h)
    }

    /// Bulk vertex block, mirroring the reader path's `get_node_arrays`.
    pub fn create_vertex_block(&mut self, count: u64) -> MeshResult<Handle> {
        match self.store.allocate_block(EntityType::Vertex, count, None, SequenceShape::Vertex) {
            Ok(h) => Ok(h),
            Err(e) => self.fail(e),
        }
    }

    /// `create_element(type, connectivity) -> handle`. Validates the
    /// connectivity length against the type's canonical arity (when fixed),
    /// allocates a slot, writes connectivity, and notifies L2.
    pub fn create_element(&mut self, t: EntityType, connectivity: &[Handle]) -> MeshResult<Handle> {
        if let Some(n) = t.canonical_num_nodes() {
            if connectivity.len() != n {
                return self.fail(MeshError::InvalidSize);
            }
        }
        let shape = if t.is_variable_arity() {
            SequenceShape::Poly
        } else {
            SequenceShape::Element { nodes_per_element: connectivity.len() }
        };
        let h = match self.store.allocate_block(t, 1, None, shape) {
            Ok(h) => h,
            Err(e) => return self.fail(e),
        };
        if t.is_variable_arity() {
            self.store.locate_data_mut(h)?.set_poly_handles(h, connectivity)?;
        } else {
            self.store.locate_data_mut(h)?.set_connectivity(h, connectivity)?;
        }
        self.adjacency.notify_create_entity(&mut self.store, h, connectivity);
        info!(target: "meshcore::interface", handle = h, entity_type = ?t, "create_element");
        Ok(h)
    }

    /// `set_connectivity(e, new_conn)`: overwrite and notify L2 of the change.
    pub fn set_connectivity(&mut self, e: Handle, new_conn: &[Handle]) -> MeshResult<()> {
        let old = self.store.down_adjacent_vertices(e)?;
        self.store.locate_data_mut(e)?.set_connectivity(e, new_conn)?;
        self.adjacency.notify_change_connectivity(&mut self.store, e, &old, new_conn);
        Ok(())
    }

    /// `delete_entities(handles)`: drop adjacency, drop tag values, remove
    /// from any `track_owners` set, then free the L1 slot. Cascades in the
    /// order the data model's lifecycle section specifies.
    pub fn delete_entities(&mut self, handles: &[Handle]) -> MeshResult<()> {
        for &h in handles {
            // Must run before `notify_delete_entity`, which clears `h`'s own
            // adjacency list (where owning-set back-references live).
            self.remove_from_owning_sets(h)?;
            self.adjacency.notify_delete_entity(&mut self.store, h)?;
            self.tags.drop_entity_everywhere(h);
            self.store.free_handle(h)?;
        }
        Ok(())
    }

    fn remove_from_owning_sets(&mut self, e: Handle) -> MeshResult<()> {
        let owners: Vec<Handle> = self.store.adjacency_list(e)?.iter().copied().filter(|h| type_of(*h).ok() == Some(EntityType::EntitySet)).collect();
        for set_h in owners {
            if let Ok(set) = self.store.locate_data_mut(set_h).and_then(|d| d.set_mut(set_h)) {
                if set.options.track_owners {
                    set.remove_entities(&[e]);
                }
            }
        }
        Ok(())
    }

    // ---- L2: adjacency ----

    pub fn get_adjacencies(&mut self, source: Handle, target_dim: u8, create_if_missing: bool) -> MeshResult<Vec<Handle>> {
        match self.adjacency.get_adjacencies(&mut self.store, source, target_dim, create_if_missing) {
            Ok(r) => {
                if r.ambiguous {
                    self.last_error.set(&MeshError::MultipleEntitiesFound(r.handles[0]));
                }
                Ok(r.handles)
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn add_adjacency(&mut self, a: Handle, b: Handle, both_ways: bool) -> MeshResult<()> {
        self.adjacency.add_adjacency(&mut self.store, a, b, both_ways)
    }

    pub fn remove_adjacency(&mut self, a: Handle, b: Handle) -> MeshResult<()> {
        self.adjacency.remove_adjacency(&mut self.store, a, b)
    }

    // ---- L3: tags ----

    pub fn create_tag(
        &mut self,
        name: &str,
        storage: TagStorage,
        size: TagSize,
        default: Option<Vec<u8>>,
        allow_existing: bool,
    ) -> MeshResult<TagId> {
        match self.tags.create_tag(name, storage, size, default, allow_existing) {
            Ok(id) => Ok(id),
            Err(e) => self.fail(e),
        }
    }

    pub fn tag_get_handle(&self, name: &str) -> MeshResult<TagId> {
        self.tags.tag_id(name)
    }

    pub fn tag_set_data(&mut self, tag: TagId, entity: Option<Handle>, value: &[u8]) -> MeshResult<()> {
        match self.tags.write(&mut self.store, tag, entity, value) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    pub fn tag_get_data(&mut self, tag: TagId, entity: Option<Handle>) -> MeshResult<Vec<u8>> {
        match self.tags.read(&self.store, tag, entity) {
            Ok(v) => Ok(v),
            Err(e) => self.fail(e),
        }
    }

    pub fn tag_delete(&mut self, tag: TagId) -> MeshResult<()> {
        self.tags.delete_tag(&mut self.store, tag)
    }

    // ---- L4: sets ----

    pub fn create_meshset(&mut self, options: MeshSetOptions) -> MeshResult<Handle> {
        let h = self.store.allocate_block(EntityType::EntitySet, 1, None, SequenceShape::Set)?;
        self.store.locate_data_mut(h)?.install_set(h, MeshSet::new(options))?;
        Ok(h)
    }

    pub fn set_mut(&mut self, set: Handle) -> MeshResult<&mut MeshSet> {
        self.store.locate_data_mut(set)?.set_mut(set)
    }

    pub fn set_ref(&self, set: Handle) -> MeshResult<&MeshSet> {
        self.store.locate_data(set)?.set_ref(set)
    }

    /// `add_entities` with `track_owners` back-reference bookkeeping.
    pub fn set_add_entities(&mut self, set: Handle, handles: &[Handle]) -> MeshResult<()> {
        let track = self.set_ref(set)?.options.track_owners;
        self.set_mut(set)?.add_entities(handles);
        if track {
            for &h in handles {
                self.adjacency.add_adjacency(&mut self.store, h, set, false)?;
            }
        }
        Ok(())
    }

    pub fn set_remove_entities(&mut self, set: Handle, handles: &[Handle]) -> MeshResult<()> {
        let track = self.set_ref(set)?.options.track_owners;
        self.set_mut(set)?.remove_entities(handles);
        if track {
            for &h in handles {
                self.adjacency.remove_adjacency(&mut self.store, h, set)?;
            }
        }
        Ok(())
    }

    pub fn add_parent_child(&mut self, parent: Handle, child: Handle) -> MeshResult<()> {
        self.set_mut(child)?.add_parent(parent);
        self.set_mut(parent)?.add_child(child);
        Ok(())
    }

    pub fn get_entities_recursive(&self, root: Handle, selector: Option<crate::meshset::EntitySelector>) -> MeshResult<Vec<Handle>> {
        crate::meshset::get_entities_recursive(self, root, selector)
    }

    pub fn transitive_children(&self, root: Handle, depth: u32) -> MeshResult<Vec<Handle>> {
        crate::meshset::transitive_relations(self, root, depth, true)
    }

    pub fn transitive_parents(&self, root: Handle, depth: u32) -> MeshResult<Vec<Handle>> {
        crate::meshset::transitive_relations(self, root, depth, false)
    }

    pub fn store(&self) -> &SequenceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SequenceStore {
        &mut self.store
    }

    pub fn vertex_coords(&self, h: Handle) -> MeshResult<(f64, f64, f64)> {
        self.store.locate_data(h)?.vertex_coords(h)
    }

    /// Every live handle of topological dimension `dim`, across all entity
    /// types that share it (e.g. triangles and quads are both dimension 2).
    /// Used by `ParallelComm` to enumerate resolution/ghost candidates.
    pub fn entities_of_dimension(&self, dim: u8) -> Vec<Handle> {
        let mut out = Vec::new();
        for t in ALL_ENTITY_TYPES {
            if t.dimension() != Some(dim) {
                continue;
            }
            for seq in self.store.manager(t).sequences() {
                out.extend(seq.start..=seq.end);
            }
        }
        out
    }
}

impl SetResolver for Interface {
    fn resolve(&self, h: Handle) -> MeshResult<&MeshSet> {
        self.set_ref(h)
    }
}

/// Merge two entities sharing a vertex set into one handle, rewriting all
/// explicit adjacencies of `victim` onto `survivor` before deleting it — the
/// operation the equivalent-entities guard (L2) exists to detect the need for.
pub fn merge_entities(iface: &mut Interface, survivor: Handle, victim: Handle) -> MeshResult<()> {
    if type_of(survivor)? != type_of(victim)? {
        return Err(MeshError::InvalidSize);
    }
    let victim_adj: Vec<Handle> = iface.store.adjacency_list(victim)?.to_vec();
    for up in victim_adj {
        iface.add_adjacency(up, survivor, true)?;
        iface.remove_adjacency(up, victim)?;
    }
    iface.delete_entities(&[victim])
}

#[cfg(test)]
#[path = "interface_tests.rs"]
mod interface_tests;
