//! L2: `AEntityFactory` — answers adjacency queries and maintains
//! vertex→element lists when enabled. Grounded on
//! `original_source/src/AEntityFactory.{hpp,cpp}`.

use std::collections::HashSet;

use tracing::trace;

use crate::error::{MeshError, MeshResult};
use crate::handle::{EntityType, Handle};
use crate::sequence::SequenceShape;
use crate::store::SequenceStore;

/// Canonical subfacet vertex-index tuples for the fixed-arity shapes this
/// crate derives side entities for.
fn canonical_subfacets(t: EntityType, target_dim: u8) -> Option<&'static [&'static [usize]]> {
    use EntityType::*;
    match (t, target_dim) {
        (Triangle, 1) => Some(&[&[0, 1], &[1, 2], &[2, 0]]),
        (Quadrilateral, 1) => Some(&[&[0, 1], &[1, 2], &[2, 3], &[3, 0]]),
        (Tetrahedron, 1) => Some(&[&[0, 1], &[1, 2], &[2, 0], &[0, 3], &[1, 3], &[2, 3]]),
        (Tetrahedron, 2) => Some(&[&[0, 1, 3], &[1, 2, 3], &[2, 0, 3], &[0, 2, 1]]),
        (Hexahedron, 1) => Some(&[
            &[0, 1], &[1, 2], &[2, 3], &[3, 0],
            &[4, 5], &[5, 6], &[6, 7], &[7, 4],
            &[0, 4], &[1, 5], &[2, 6], &[3, 7],
        ]),
        (Hexahedron, 2) => Some(&[
            &[0, 1, 2, 3], &[4, 5, 6, 7], &[0, 1, 5, 4],
            &[1, 2, 6, 5], &[2, 3, 7, 6], &[3, 0, 4, 7],
        ]),
        _ => None,
    }
}

/// The canonical side-entity type for a subfacet of `nverts` vertices at `target_dim`.
fn side_entity_type(nverts: usize, target_dim: u8) -> MeshResult<EntityType> {
    match (target_dim, nverts) {
        (1, 2) => Ok(EntityType::Edge),
        (2, 3) => Ok(EntityType::Triangle),
        (2, 4) => Ok(EntityType::Quadrilateral),
        _ => Err(MeshError::NotImplemented),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AEntityFactoryConfig {
    pub vertex_adjacencies_enabled: bool,
}

pub struct AEntityFactory {
    pub config: AEntityFactoryConfig,
}

/// Outcome of an adjacency lookup that may have more than one legal answer,
/// e.g. two entities sharing a vertex set at a material interface.
pub struct AdjacencyResult {
    pub handles: Vec<Handle>,
    pub ambiguous: bool,
}

impl AEntityFactory {
    pub fn new(config: AEntityFactoryConfig) -> Self {
        Self { config }
    }

    /// `get_adjacencies(source, target_dim, create_if_missing)`.
    pub fn get_adjacencies(
        &self,
        store: &mut SequenceStore,
        source: Handle,
        target_dim: u8,
        create_if_missing: bool,
    ) -> MeshResult<AdjacencyResult> {
        let source_dim = store.dimension_of(source)?;

        if source_dim == target_dim {
            return Ok(AdjacencyResult { handles: vec![source], ambiguous: false });
        }

        if target_dim == 0 {
            let verts = store.down_adjacent_vertices(source)?;
            return Ok(AdjacencyResult { handles: verts, ambiguous: false });
        }

        if source_dim == 0 {
            let candidates: Vec<Handle> = store
                .adjacency_list(source)?
                .iter()
                .copied()
                .filter(|h| store.dimension_of(*h).ok() == Some(target_dim))
                .collect();
            return Ok(AdjacencyResult { handles: candidates, ambiguous: false });
        }

        if source_dim > target_dim {
            return self.derive_side_entities(store, source, target_dim, create_if_missing);
        }

        // source_dim < target_dim: intersect the up-adjacency lists of source's vertices.
        let verts = store.down_adjacent_vertices(source)?;
        let mut iter = verts.iter();
        let Some(&first) = iter.next() else {
            return Ok(AdjacencyResult { handles: Vec::new(), ambiguous: false });
        };
        let mut common: HashSet<Handle> = store.adjacency_list(first)?.iter().copied().collect();
        for &v in iter {
            let set: HashSet<Handle> = store.adjacency_list(v)?.iter().copied().collect();
            common.retain(|h| set.contains(h));
        }
        let handles: Vec<Handle> = common
            .into_iter()
            .filter(|h| store.dimension_of(*h).ok() == Some(target_dim))
            .collect();
        Ok(AdjacencyResult { handles, ambiguous: false })
    }

    fn derive_side_entities(
        &self,
        store: &mut SequenceStore,
        source: Handle,
        target_dim: u8,
        create_if_missing: bool,
    ) -> MeshResult<AdjacencyResult> {
        let source_type = store.entity_type_of(source)?;
        let conn = store.down_adjacent_vertices(source)?;
        let subfacets = canonical_subfacets(source_type, target_dim).ok_or(MeshError::NotImplemented)?;

        let mut results = Vec::with_capacity(subfacets.len());
        let mut any_ambiguous = false;
        for indices in subfacets {
            let facet_verts: Vec<Handle> = indices.iter().map(|&i| conn[i]).collect();
            let found = self.find_or_create_side_entity(store, &facet_verts, target_dim, source, create_if_missing)?;
            any_ambiguous |= found.ambiguous;
            results.extend(found.handles);
        }
        Ok(AdjacencyResult { handles: results, ambiguous: any_ambiguous })
    }

    /// Find the entity among the common up-adjacents of `facet_verts` that
    /// has exactly that vertex set (order-independent), creating one if
    /// `create_if_missing` and none exists. Implements the tie-break order
    /// from the component design: explicit adjacency to `source` first, then
    /// a common intermediate-dimension entity, then first-match + ambiguous.
    fn find_or_create_side_entity(
        &self,
        store: &mut SequenceStore,
        facet_verts: &[Handle],
        target_dim: u8,
        source: Handle,
        create_if_missing: bool,
    ) -> MeshResult<AdjacencyResult> {
        let mut common: HashSet<Handle> = store.adjacency_list(facet_verts[0])?.iter().copied().collect();
        for &v in &facet_verts[1..] {
            let set: HashSet<Handle> = store.adjacency_list(v)?.iter().copied().collect();
            common.retain(|h| set.contains(h));
        }
        let wanted: HashSet<Handle> = facet_verts.iter().copied().collect();
        let mut candidates: Vec<Handle> = Vec::new();
        for h in common {
            if store.dimension_of(h).ok() != Some(target_dim) {
                continue;
            }
            let verts: HashSet<Handle> = store.down_adjacent_vertices(h)?.into_iter().collect();
            if verts == wanted {
                candidates.push(h);
            }
        }

        if candidates.is_empty() {
            if !create_if_missing {
                return Ok(AdjacencyResult { handles: Vec::new(), ambiguous: false });
            }
            let new_handle = self.create_side_entity(store, facet_verts, target_dim)?;
            return Ok(AdjacencyResult { handles: vec![new_handle], ambiguous: false });
        }
        if candidates.len() == 1 {
            return Ok(AdjacencyResult { handles: candidates, ambiguous: false });
        }

        // Ambiguous: prefer one already explicitly adjacent to `source`.
        if let Some(&h) = candidates.iter().find(|&&c| store.adjacency_list(source).map(|a| a.contains(&c)).unwrap_or(false)) {
            return Ok(AdjacencyResult { handles: vec![h], ambiguous: false });
        }
        trace!(target: "meshcore::adjacency", candidates = candidates.len(), "multiple entities found for side lookup");
        Ok(AdjacencyResult { handles: vec![candidates[0]], ambiguous: true })
    }

    fn create_side_entity(&self, store: &mut SequenceStore, verts: &[Handle], target_dim: u8) -> MeshResult<Handle> {
        let t = side_entity_type(verts.len(), target_dim)?;
        let h = store.allocate_block(t, 1, None, SequenceShape::Element { nodes_per_element: verts.len() })?;
        store.locate_data_mut(h)?.set_connectivity(h, verts)?;
        self.notify_create_entity(store, h, verts);
        Ok(h)
    }

    /// `add_adjacency(a, b, both_ways)`: insert `b` into `a`'s adjacency list
    /// (sorted, unique); if `both_ways`, recurse with `a` and `b` swapped.
    pub fn add_adjacency(&self, store: &mut SequenceStore, a: Handle, b: Handle, both_ways: bool) -> MeshResult<()> {
        let list = store.adjacency_list_mut(a)?;
        if let Err(pos) = list.binary_search(&b) {
            list.insert(pos, b);
        }
        if both_ways {
            self.add_adjacency(store, b, a, false)?;
        }
        Ok(())
    }

    /// `remove_adjacency(a, b)` is idempotent.
    pub fn remove_adjacency(&self, store: &mut SequenceStore, a: Handle, b: Handle) -> MeshResult<()> {
        let list = store.adjacency_list_mut(a)?;
        if let Ok(pos) = list.binary_search(&b) {
            list.remove(pos);
        }
        Ok(())
    }

    /// `notify_create_entity(e, conn, n)`: register `e` on each vertex's
    /// adjacency list when vertex-element adjacencies are enabled.
    pub fn notify_create_entity(&self, store: &mut SequenceStore, e: Handle, conn: &[Handle]) {
        if !self.config.vertex_adjacencies_enabled {
            return;
        }
        for &v in conn {
            if let Ok(list) = store.adjacency_list_mut(v) {
                if let Err(pos) = list.binary_search(&e) {
                    list.insert(pos, e);
                }
            }
        }
    }

    /// `notify_change_connectivity(e, old, new, n)`: symmetric-difference update.
    pub fn notify_change_connectivity(&self, store: &mut SequenceStore, e: Handle, old: &[Handle], new: &[Handle]) {
        if !self.config.vertex_adjacencies_enabled {
            return;
        }
        let old_set: HashSet<Handle> = old.iter().copied().collect();
        let new_set: HashSet<Handle> = new.iter().copied().collect();
        for &v in old_set.difference(&new_set) {
            if let Ok(list) = store.adjacency_list_mut(v) {
                if let Ok(pos) = list.binary_search(&e) {
                    list.remove(pos);
                }
            }
        }
        for &v in new_set.difference(&old_set) {
            if let Ok(list) = store.adjacency_list_mut(v) {
                if let Err(pos) = list.binary_search(&e) {
                    list.insert(pos, e);
                }
            }
        }
    }

    /// `notify_delete_entity(e)`: drop `e` from each of its vertices' lists,
    /// then drop `e`'s own adjacency list. Set back-reference cleanup for
    /// `track_owners` sets is orchestrated by `Interface::delete_entities`,
    /// which owns the set registry that `AEntityFactory` does not.
    pub fn notify_delete_entity(&self, store: &mut SequenceStore, e: Handle) -> MeshResult<()> {
        if self.config.vertex_adjacencies_enabled {
            if let Ok(conn) = store.down_adjacent_vertices(e) {
                for v in conn {
                    if let Ok(list) = store.adjacency_list_mut(v) {
                        if let Ok(pos) = list.binary_search(&e) {
                            list.remove(pos);
                        }
                    }
                }
            }
        }
        store.locate_data_mut(e)?.clear_adjacency(e);
        Ok(())
    }

    /// Scan one vertex's adjacency list for other entities with the same
    /// type and vertex set as `e` — the "equivalent entities" guard run
    /// after a merge that might have collapsed two distinct elements onto
    /// the same vertex set.
    pub fn find_equivalents(&self, store: &SequenceStore, e: Handle) -> MeshResult<Vec<Handle>> {
        let t = store.entity_type_of(e)?;
        let conn = store.down_adjacent_vertices(e)?;
        let Some(&anchor) = conn.first() else { return Ok(Vec::new()) };
        let wanted: HashSet<Handle> = conn.iter().copied().collect();
        let mut equivalents = Vec::new();
        for &candidate in store.adjacency_list(anchor)?.to_vec().iter() {
            if candidate == e || store.entity_type_of(candidate).ok() != Some(t) {
                continue;
            }
            let cand_conn: HashSet<Handle> = store.down_adjacent_vertices(candidate)?.into_iter().collect();
            if cand_conn == wanted {
                equivalents.push(candidate);
            }
        }
        Ok(equivalents)
    }
}

#[cfg(test)]
#[path = "adjacency_tests.rs"]
mod adjacency_tests;
