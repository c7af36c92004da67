//! L4: `MeshSet` — a set-valued entity with two storage policies (ordered
//! list vs. sorted range-compressed) plus parent/child links.
//!
//! Grounded on `original_source/src/MeshSetSequence.hpp`: the C++ source
//! uses runtime polymorphism (`MeshSet` base class, `RangeSeqIntervalsMeshSet`
//! subclass) for the two storage shapes; per the design notes this becomes a
//! single tagged-variant type here instead of a trait object hierarchy.

use std::collections::HashSet;

use crate::error::MeshResult;
use crate::handle::{type_of, EntityType, Handle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsMode {
    Union,
    Intersect,
}

#[derive(Debug, Clone, Copy)]
pub enum EntitySelector {
    ByType(EntityType),
    ByDimension(u8),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeshSetOptions {
    pub ordered: bool,
    pub track_owners: bool,
}

#[derive(Debug, Clone)]
enum Storage {
    /// Append-order list, duplicates allowed, order preserved.
    Ordered(Vec<Handle>),
    /// Sorted list of inclusive `[begin,end]` ranges, merged on insert, no duplicates.
    Compressed(Vec<(Handle, Handle)>),
}

#[derive(Debug, Clone)]
pub struct MeshSet {
    pub options: MeshSetOptions,
    storage: Storage,
    parents: Vec<Handle>,
    children: Vec<Handle>,
}

impl MeshSet {
    pub fn new(options: MeshSetOptions) -> Self {
        let storage = if options.ordered { Storage::Ordered(Vec::new()) } else { Storage::Compressed(Vec::new()) };
        Self { options, storage, parents: Vec::new(), children: Vec::new() }
    }

    /// Placeholder used only to fill a `SequenceData` slot before the real
    /// set is installed by `install_set`; never exposed through the public API.
    pub fn empty_placeholder() -> Self {
        Self::new(MeshSetOptions::default())
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self.storage, Storage::Ordered(_))
    }

    // ---- membership ----

    pub fn add_entities(&mut self, handles: &[Handle]) {
        match &mut self.storage {
            Storage::Ordered(v) => v.extend_from_slice(handles),
            Storage::Compressed(ranges) => {
                for &h in handles {
                    insert_into_ranges(ranges, h, h);
                }
            }
        }
    }

    pub fn add_range(&mut self, first: Handle, last: Handle) {
        match &mut self.storage {
            Storage::Ordered(v) => v.extend(first..=last),
            Storage::Compressed(ranges) => insert_into_ranges(ranges, first, last),
        }
    }

    pub fn remove_entities(&mut self, handles: &[Handle]) {
        let remove: HashSet<Handle> = handles.iter().copied().collect();
        match &mut self.storage {
            Storage::Ordered(v) => v.retain(|h| !remove.contains(h)),
            Storage::Compressed(ranges) => {
                for &h in handles {
                    remove_from_ranges(ranges, h);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        match &mut self.storage {
            Storage::Ordered(v) => v.clear(),
            Storage::Compressed(r) => r.clear(),
        }
    }

    pub fn contains_entities(&self, handles: &[Handle], mode: ContainsMode) -> bool {
        match mode {
            ContainsMode::Union => handles.iter().any(|h| self.contains_one(*h)),
            ContainsMode::Intersect => !handles.is_empty() && handles.iter().all(|h| self.contains_one(*h)),
        }
    }

    fn contains_one(&self, h: Handle) -> bool {
        match &self.storage {
            Storage::Ordered(v) => v.contains(&h),
            Storage::Compressed(ranges) => ranges.binary_search_by(|&(s, e)| {
                if h < s { std::cmp::Ordering::Greater } else if h > e { std::cmp::Ordering::Less } else { std::cmp::Ordering::Equal }
            }).is_ok(),
        }
    }

    /// All member handles, in the set's own order (ordered sets preserve
    /// insertion order and duplicates; compressed sets expand their ranges
    /// in ascending order with no duplicates).
    pub fn get_entities_by_handle(&self) -> Vec<Handle> {
        match &self.storage {
            Storage::Ordered(v) => v.clone(),
            Storage::Compressed(ranges) => ranges.iter().flat_map(|&(s, e)| s..=e).collect(),
        }
    }

    pub fn get_entities_filtered(&self, selector: EntitySelector) -> Vec<Handle> {
        self.get_entities_by_handle()
            .into_iter()
            .filter(|h| matches_selector(*h, selector))
            .collect()
    }

    pub fn num_entities_by_handle(&self) -> u64 {
        match &self.storage {
            Storage::Ordered(v) => v.len() as u64,
            Storage::Compressed(ranges) => ranges.iter().map(|&(s, e)| e - s + 1).sum(),
        }
    }

    pub fn num_entities_filtered(&self, selector: EntitySelector) -> u64 {
        self.get_entities_filtered(selector).len() as u64
    }

    // ---- boolean set operations, result in `self`'s shape ----

    pub fn unite(&self, other: &MeshSet) -> MeshSet {
        let mut result = MeshSet::new(self.options);
        let mut seen: HashSet<Handle> = HashSet::new();
        for h in self.get_entities_by_handle().into_iter().chain(other.get_entities_by_handle()) {
            if self.is_ordered() || seen.insert(h) {
                result.add_entities(&[h]);
            }
        }
        result
    }

    pub fn intersect(&self, other: &MeshSet) -> MeshSet {
        let mut result = MeshSet::new(self.options);
        let other_members: HashSet<Handle> = other.get_entities_by_handle().into_iter().collect();
        for h in self.get_entities_by_handle() {
            if other_members.contains(&h) {
                result.add_entities(&[h]);
            }
        }
        result
    }

    pub fn subtract(&self, other: &MeshSet) -> MeshSet {
        let mut result = MeshSet::new(self.options);
        let other_members: HashSet<Handle> = other.get_entities_by_handle().into_iter().collect();
        for h in self.get_entities_by_handle() {
            if !other_members.contains(&h) {
                result.add_entities(&[h]);
            }
        }
        result
    }

    // ---- parent/child ----

    pub fn add_child(&mut self, c: Handle) {
        if !self.children.contains(&c) {
            self.children.push(c);
        }
    }

    pub fn add_parent(&mut self, p: Handle) {
        if !self.parents.contains(&p) {
            self.parents.push(p);
        }
    }

    pub fn remove_child(&mut self, c: Handle) {
        self.children.retain(|h| *h != c);
    }

    pub fn remove_parent(&mut self, p: Handle) {
        self.parents.retain(|h| *h != p);
    }

    pub fn direct_children(&self) -> &[Handle] {
        &self.children
    }

    pub fn direct_parents(&self) -> &[Handle] {
        &self.parents
    }
}

fn matches_selector(h: Handle, selector: EntitySelector) -> bool {
    let Ok(t) = type_of(h) else { return false };
    match selector {
        EntitySelector::ByType(want) => t == want,
        EntitySelector::ByDimension(d) => t.dimension() == Some(d),
    }
}

/// Insert `[first,last]` into a sorted, non-overlapping, non-adjacent range
/// list, merging with any overlapping or touching neighbors.
fn insert_into_ranges(ranges: &mut Vec<(Handle, Handle)>, first: Handle, last: Handle) {
    let mut new_first = first;
    let mut new_last = last;
    let mut merged: Vec<(Handle, Handle)> = Vec::with_capacity(ranges.len() + 1);
    let mut inserted = false;
    for &(s, e) in ranges.iter() {
        let touches = s <= new_last.saturating_add(1) && new_first <= e.saturating_add(1);
        if touches {
            new_first = new_first.min(s);
            new_last = new_last.max(e);
        } else if e < new_first {
            merged.push((s, e));
        } else {
            if !inserted {
                merged.push((new_first, new_last));
                inserted = true;
            }
            merged.push((s, e));
        }
    }
    if !inserted {
        merged.push((new_first, new_last));
    }
    *ranges = merged;
}

fn remove_from_ranges(ranges: &mut Vec<(Handle, Handle)>, h: Handle) {
    let mut out = Vec::with_capacity(ranges.len() + 1);
    for &(s, e) in ranges.iter() {
        if h < s || h > e {
            out.push((s, e));
            continue;
        }
        if s == e {
            continue;
        }
        if h == s {
            out.push((s + 1, e));
        } else if h == e {
            out.push((s, e - 1));
        } else {
            out.push((s, h - 1));
            out.push((h + 1, e));
        }
    }
    *ranges = out;
}

/// Resolves set handles to `MeshSet` data, used for recursive descent and
/// transitive parent/child closures that must reach across sets.
pub trait SetResolver {
    fn resolve(&self, h: Handle) -> MeshResult<&MeshSet>;
}

/// Recursive membership descent with cycle protection via a visited set
/// keyed by set handle, per the design notes on cyclic containment.
pub fn get_entities_recursive(
    resolver: &dyn SetResolver,
    root: Handle,
    selector: Option<EntitySelector>,
) -> MeshResult<Vec<Handle>> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    descend(resolver, root, selector, &mut visited, &mut out)?;
    Ok(out)
}

fn descend(
    resolver: &dyn SetResolver,
    set_handle: Handle,
    selector: Option<EntitySelector>,
    visited: &mut HashSet<Handle>,
    out: &mut Vec<Handle>,
) -> MeshResult<()> {
    if !visited.insert(set_handle) {
        return Ok(());
    }
    let set = resolver.resolve(set_handle)?;
    for h in set.get_entities_by_handle() {
        if type_of(h).ok() == Some(EntityType::EntitySet) {
            descend(resolver, h, selector, visited, out)?;
        } else if selector.map(|s| matches_selector(h, s)).unwrap_or(true) {
            out.push(h);
        }
    }
    Ok(())
}

/// Transitive parents/children up to `depth` hops (`depth == 0` means
/// unbounded), with cycle protection.
pub fn transitive_relations(
    resolver: &dyn SetResolver,
    root: Handle,
    depth: u32,
    children: bool,
) -> MeshResult<Vec<Handle>> {
    let mut visited = HashSet::new();
    visited.insert(root);
    let mut frontier = vec![root];
    let mut out = Vec::new();
    let mut hops = 0u32;
    while !frontier.is_empty() && (depth == 0 || hops < depth) {
        let mut next = Vec::new();
        for h in frontier {
            let set = resolver.resolve(h)?;
            let rel = if children { set.direct_children() } else { set.direct_parents() };
            for &r in rel {
                if visited.insert(r) {
                    out.push(r);
                    next.push(r);
                }
            }
        }
        frontier = next;
        hops += 1;
    }
    Ok(out)
}

#[cfg(test)]
#[path = "meshset_tests.rs"]
mod meshset_tests;
