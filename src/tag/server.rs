use std::collections::HashMap;

use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::handle::Handle;
use crate::store::SequenceStore;

pub type TagId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStorage {
    Dense,
    Sparse,
    Bit,
    Mesh,
    VariableDense,
    VariableSparse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSize {
    Fixed(usize),
    Variable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagDescriptor {
    pub name: String,
    pub storage: TagStorage,
    pub size: TagSize,
    /// For dense tags this is always `Some` (zero-filled if the caller gave
    /// none), since the backing array must be initialized to something.
    pub default: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct TagServer {
    by_name: HashMap<String, TagId>,
    descriptors: Vec<Option<TagDescriptor>>,
    sparse: HashMap<TagId, HashMap<Handle, Vec<u8>>>,
    bit: HashMap<TagId, HashMap<Handle, u8>>,
    mesh_values: HashMap<TagId, Vec<u8>>,
    /// Both variable-length storage classes collapse to one indirection map;
    /// the distinction between dense/sparse variable-length backing only
    /// affects layout, not the read/write semantics this models. See DESIGN.md.
    variable: HashMap<TagId, HashMap<Handle, Vec<u8>>>,
}

impl TagServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_tag(
        &mut self,
        name: &str,
        storage: TagStorage,
        size: TagSize,
        default: Option<Vec<u8>>,
        allow_existing: bool,
    ) -> MeshResult<TagId> {
        if let TagStorage::Bit = storage {
            if let TagSize::Fixed(w) = size {
                if w == 0 || w > 8 {
                    return Err(MeshError::InvalidSize);
                }
            } else {
                return Err(MeshError::InvalidSize);
            }
        }

        let resolved_default = match (storage, size, &default) {
            (TagStorage::Dense, TagSize::Fixed(n), None) => Some(vec![0u8; n]),
            (_, _, d) => d.clone(),
        };

        let desc = TagDescriptor { name: name.to_string(), storage, size, default: resolved_default };

        if let Some(&existing_id) = self.by_name.get(name) {
            let existing = self.descriptors[existing_id as usize].as_ref().unwrap();
            if existing.storage == desc.storage && existing.size == desc.size {
                if allow_existing {
                    return Ok(existing_id);
                }
                return Err(MeshError::AlreadyAllocated);
            }
            return Err(MeshError::AlreadyAllocated);
        }

        let id = self.descriptors.len() as TagId;
        debug!(target: "meshcore::tag", name, id, ?storage, "create_tag");
        self.descriptors.push(Some(desc));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn tag_id(&self, name: &str) -> MeshResult<TagId> {
        self.by_name.get(name).copied().ok_or(MeshError::TagNotFound)
    }

    pub fn descriptor(&self, id: TagId) -> MeshResult<&TagDescriptor> {
        self.descriptors.get(id as usize).and_then(|d| d.as_ref()).ok_or(MeshError::TagNotFound)
    }

    /// `handle = None` addresses the mesh-wide value.
    pub fn write(&mut self, store: &mut SequenceStore, id: TagId, handle: Option<Handle>, value: &[u8]) -> MeshResult<()> {
        let desc = self.descriptor(id)?.clone();
        if let TagSize::Fixed(n) = desc.size {
            if desc.storage != TagStorage::Bit && value.len() != n {
                return Err(MeshError::InvalidSize);
            }
        }

        let Some(h) = handle else {
            self.mesh_values.insert(id, value.to_vec());
            return Ok(());
        };

        match desc.storage {
            TagStorage::Dense => {
                let TagSize::Fixed(n) = desc.size else { return Err(MeshError::InvalidSize) };
                let default = desc.default.clone().unwrap_or_else(|| vec![0u8; n]);
                let data = store.locate_data_mut(h)?;
                data.ensure_dense_tag(id, n, &default);
                data.set_dense_tag_value(id, h, value)?;
            }
            TagStorage::Sparse => {
                self.sparse.entry(id).or_default().insert(h, value.to_vec());
            }
            TagStorage::Bit => {
                let TagSize::Fixed(w) = desc.size else { return Err(MeshError::InvalidSize) };
                let max_value = if w >= 8 { u8::MAX } else { ((1u16 << w) - 1) as u8 };
                if value.len() != 1 || value[0] > max_value {
                    return Err(MeshError::InvalidSize);
                }
                self.bit.entry(id).or_default().insert(h, value[0]);
            }
            TagStorage::Mesh => return Err(MeshError::UnsupportedOperation),
            TagStorage::VariableDense | TagStorage::VariableSparse => {
                self.variable.entry(id).or_default().insert(h, value.to_vec());
            }
        }
        Ok(())
    }

    pub fn read(&self, store: &SequenceStore, id: TagId, handle: Option<Handle>) -> MeshResult<Vec<u8>> {
        let desc = self.descriptor(id)?;

        let Some(h) = handle else {
            return self
                .mesh_values
                .get(&id)
                .cloned()
                .or_else(|| desc.default.clone())
                .ok_or(MeshError::TagNotFound);
        };

        match desc.storage {
            TagStorage::Dense => {
                let data = store.locate_data(h)?;
                if let Some(v) = data.dense_tag_value(id, h) {
                    Ok(v.to_vec())
                } else {
                    desc.default.clone().ok_or(MeshError::TagNotFound)
                }
            }
            TagStorage::Sparse => self
                .sparse
                .get(&id)
                .and_then(|m| m.get(&h))
                .cloned()
                .or_else(|| desc.default.clone())
                .ok_or(MeshError::TagNotFound),
            TagStorage::Bit => self
                .bit
                .get(&id)
                .and_then(|m| m.get(&h))
                .map(|b| vec![*b])
                .or_else(|| desc.default.clone())
                .ok_or(MeshError::TagNotFound),
            TagStorage::Mesh => Err(MeshError::UnsupportedOperation),
            TagStorage::VariableDense | TagStorage::VariableSparse => self
                .variable
                .get(&id)
                .and_then(|m| m.get(&h))
                .cloned()
                .or_else(|| desc.default.clone())
                .ok_or(MeshError::TagNotFound),
        }
    }

    pub fn has_value(&self, id: TagId, handle: Handle) -> bool {
        let Ok(desc) = self.descriptor(id) else { return false };
        match desc.storage {
            TagStorage::Sparse => self.sparse.get(&id).map(|m| m.contains_key(&handle)).unwrap_or(false),
            TagStorage::Bit => self.bit.get(&id).map(|m| m.contains_key(&handle)).unwrap_or(false),
            TagStorage::VariableDense | TagStorage::VariableSparse => {
                self.variable.get(&id).map(|m| m.contains_key(&handle)).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Drop every tag's value for `h`, across every storage class. Called
    /// when `h` itself is being deleted; dense arrays live in the
    /// `SequenceData` being freed so need no per-entity cleanup here.
    pub fn drop_entity_everywhere(&mut self, h: Handle) {
        for m in self.sparse.values_mut() {
            m.remove(&h);
        }
        for m in self.bit.values_mut() {
            m.remove(&h);
        }
        for m in self.variable.values_mut() {
            m.remove(&h);
        }
    }

    /// Remove a tag entirely: frees dense arrays across every sequence and
    /// clears the sparse/bit/variable maps.
    pub fn delete_tag(&mut self, store: &mut SequenceStore, id: TagId) -> MeshResult<()> {
        let desc = self.descriptors.get(id as usize).and_then(|d| d.as_ref()).ok_or(MeshError::TagNotFound)?;
        self.by_name.remove(&desc.name);
        self.descriptors[id as usize] = None;
        self.sparse.remove(&id);
        self.bit.remove(&id);
        self.variable.remove(&id);
        self.mesh_values.remove(&id);
        store.drop_tag_everywhere(id);
        Ok(())
    }
}
