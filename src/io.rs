//! L5/L6 boundary: the `ReaderIface`/`WriterIface` callback traits a
//! file-format plugin implements against, plus the `key=value;...`
//! option-string parser for parallel load options. Grounded on
//! `euanmacinnes-clarium`'s `StoreSettings`-style typed config struct built
//! once from a raw string and passed around rather than re-parsed.

use std::str::FromStr;

use crate::error::{MeshError, MeshResult};
use crate::handle::{EntityType, Handle};
use crate::interface::Interface;
use crate::tag::TagId;

/// A reader receives the root set it must add every created entity to, plus
/// callback access to the allocator through these methods.
pub trait ReaderIface {
    /// Read into three freshly allocated contiguous coordinate buffers,
    /// returning the first handle of the block.
    fn get_node_arrays(&mut self, iface: &mut Interface, count: u64, start_id_hint: Option<u64>) -> MeshResult<Handle>;

    /// Read into a freshly allocated connectivity buffer, returning the
    /// first handle of the block.
    fn get_element_array(
        &mut self,
        iface: &mut Interface,
        count: u64,
        nodes_per_element: usize,
        entity_type: EntityType,
        start_id_hint: Option<u64>,
    ) -> MeshResult<Handle>;

    /// Force L2 to derive vertex adjacency for `count` elements starting at
    /// `first`, written directly through `get_element_array` rather than
    /// `Interface::create_element` (which derives it as it goes).
    fn update_adjacencies(&mut self, iface: &mut Interface, first: Handle, count: u64, _nodes_per_element: usize) -> MeshResult<()> {
        for i in 0..count {
            iface.get_adjacencies(first + i, 0, true)?;
        }
        Ok(())
    }

    /// Populate a global-id or file-id tag on `[first, first+count)`.
    fn assign_ids(&mut self, iface: &mut Interface, tag: TagId, first: Handle, count: u64, start_id: u64) -> MeshResult<()> {
        for i in 0..count {
            iface.tag_set_data(tag, Some(first + i), &(start_id + i).to_le_bytes())?;
        }
        Ok(())
    }
}

/// Dual to `ReaderIface`: iterate a filtered set, retrieve connectivity and
/// tag data, and produce a byte stream a companion reader can re-ingest.
pub trait WriterIface {
    fn write_entities(&mut self, iface: &Interface, root_set: Handle) -> MeshResult<Vec<u8>>;
}

/// Records the pre-read handle range and tag set so a failed read can be
/// rolled back without tearing down the whole `Interface`.
pub struct ReadRollback {
    entities_before: Vec<Handle>,
    tags_before: Vec<TagId>,
}

impl ReadRollback {
    pub fn capture(iface: &Interface, watched_dims: &[u8]) -> Self {
        let mut entities_before = Vec::new();
        for &d in watched_dims {
            entities_before.extend(iface.entities_of_dimension(d));
        }
        ReadRollback { entities_before, tags_before: Vec::new() }
    }

    pub fn record_tag(&mut self, tag: TagId) {
        self.tags_before.push(tag);
    }

    /// Deletes every entity created since `capture` and every tag created
    /// since `capture`, restoring the pre-read state on reader failure.
    pub fn rollback(self, iface: &mut Interface, watched_dims: &[u8]) -> MeshResult<()> {
        let before: std::collections::HashSet<Handle> = self.entities_before.into_iter().collect();
        let mut created = Vec::new();
        for &d in watched_dims {
            for h in iface.entities_of_dimension(d) {
                if !before.contains(&h) {
                    created.push(h);
                }
            }
        }
        iface.delete_entities(&created)?;
        for tag in self.tags_before {
            let _ = iface.tag_delete(tag);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelDistribution {
    ReadDelete,
    ReadPart,
    BcastDelete,
    Bcast,
}

/// `key=value;key=value;...` options recognized by a parallel read.
#[derive(Debug, Clone, Default)]
pub struct ParallelLoadOptions {
    pub parallel: Option<ParallelDistribution>,
    pub partition_tag: Option<String>,
    pub partition_val: Option<i64>,
    pub partition_distribute: bool,
    pub partition_by_rank: bool,
    pub resolve_shared_ents: bool,
    /// `(ghost_dim, bridge_dim, num_layers)` from `parallel_ghosts=D.B.L`.
    pub ghosts: Option<(u8, u8, u32)>,
}

impl FromStr for ParallelLoadOptions {
    type Err = MeshError;

    fn from_str(s: &str) -> MeshResult<Self> {
        let mut opts = ParallelLoadOptions::default();
        for pair in s.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "parallel" => {
                    opts.parallel = Some(match value {
                        "read_delete" => ParallelDistribution::ReadDelete,
                        "read_part" => ParallelDistribution::ReadPart,
                        "bcast_delete" => ParallelDistribution::BcastDelete,
                        "bcast" => ParallelDistribution::Bcast,
                        other => return Err(MeshError::Failure(format!("unknown parallel distribution '{other}'"))),
                    });
                }
                "partition" => opts.partition_tag = Some(value.to_string()),
                "partition_val" => {
                    opts.partition_val = Some(value.parse().map_err(|_| MeshError::Failure(format!("invalid partition_val '{value}'")))?)
                }
                "partition_distribute" => opts.partition_distribute = true,
                "partition_by_rank" => opts.partition_by_rank = true,
                "parallel_resolve_shared_ents" => opts.resolve_shared_ents = true,
                "parallel_ghosts" => {
                    let parts: Vec<&str> = value.split('.').collect();
                    let [d, b, l] = parts[..] else {
                        return Err(MeshError::Failure(format!("malformed parallel_ghosts '{value}', expected D.B.L")));
                    };
                    let parse_u8 = |v: &str| v.parse::<u8>().map_err(|_| MeshError::Failure(format!("invalid parallel_ghosts field '{v}'")));
                    let ghost_dim = parse_u8(d)?;
                    let bridge_dim = parse_u8(b)?;
                    let layers: u32 = l.parse().map_err(|_| MeshError::Failure(format!("invalid layer count '{l}'")))?;
                    opts.ghosts = Some((ghost_dim, bridge_dim, layers));
                }
                other => return Err(MeshError::Failure(format!("unrecognized option key '{other}'"))),
            }
        }
        Ok(opts)
    }
}

/// Sharing-tag names from the persistent wire format, centralized here so a
/// reader/writer and `ParallelComm` (L6) agree on them without importing
/// each other.
pub mod sharing_tag_names {
    pub const SHARED_PROC: &str = "shared-proc";
    pub const SHARED_PROCS: &str = "shared-procs";
    pub const SHARED_HANDLE: &str = "shared-handle";
    pub const SHARED_HANDLES: &str = "shared-handles";
    pub const STATUS: &str = "status";
    pub const GLOBAL_ID: &str = "GLOBAL_ID";
}

#[cfg(test)]
#[path = "io_tests.rs"]
mod io_tests;
