use tempfile::NamedTempFile;

use super::*;
use crate::adjacency::AEntityFactoryConfig;
use crate::handle::EntityType;
use crate::interface::Interface;
use crate::tag::{TagSize, TagStorage};

fn fresh_iface() -> Interface {
    Interface::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true }).unwrap()
}

/// An in-memory reader/writer pair standing in for a real file-format plugin;
/// round-trips a flat `(xyz...) ; (conn...)` buffer through `bincode`.
#[derive(serde::Serialize, serde::Deserialize)]
struct InMemoryMesh {
    vertices: Vec<(f64, f64, f64)>,
    edges: Vec<(u32, u32)>,
}

struct InMemoryReader {
    mesh: InMemoryMesh,
}

impl ReaderIface for InMemoryReader {
    fn get_node_arrays(&mut self, iface: &mut Interface, count: u64, _start_id_hint: Option<u64>) -> MeshResult<Handle> {
        let first = iface.create_vertex_block(count)?;
        for (i, &(x, y, z)) in self.mesh.vertices.iter().enumerate() {
            iface.store_mut().locate_data_mut(first + i as u64)?.set_vertex_coords(first + i as u64, (x, y, z))?;
        }
        Ok(first)
    }

    fn get_element_array(
        &mut self,
        iface: &mut Interface,
        _count: u64,
        _nodes_per_element: usize,
        entity_type: EntityType,
        _start_id_hint: Option<u64>,
    ) -> MeshResult<Handle> {
        let verts: Vec<Handle> = iface.entities_of_dimension(0);
        let mut first = None;
        for &(a, b) in &self.mesh.edges {
            let h = iface.create_element(entity_type, &[verts[a as usize], verts[b as usize]])?;
            first.get_or_insert(h);
        }
        first.ok_or(MeshError::EntityNotFound)
    }
}

struct InMemoryWriter;

impl WriterIface for InMemoryWriter {
    fn write_entities(&mut self, iface: &Interface, root_set: Handle) -> MeshResult<Vec<u8>> {
        let mut vertices = Vec::new();
        for h in iface.entities_of_dimension(0) {
            vertices.push(iface.vertex_coords(h)?);
        }
        let _ = root_set;
        bincode::serialize(&InMemoryMesh { vertices, edges: Vec::new() }).map_err(|e| MeshError::Failure(e.to_string()))
    }
}

#[test]
fn reader_creates_vertices_and_edges_and_assigns_ids() {
    let mut iface = fresh_iface();
    let tag = iface.create_tag("GLOBAL_ID", TagStorage::Dense, TagSize::Fixed(8), Some(0u64.to_le_bytes().to_vec()), false).unwrap();
    let mut reader = InMemoryReader { mesh: InMemoryMesh { vertices: vec![(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)], edges: vec![(0, 1)] } };

    let first_v = reader.get_node_arrays(&mut iface, 2, None).unwrap();
    reader.assign_ids(&mut iface, tag, first_v, 2, 1).unwrap();
    let first_e = reader.get_element_array(&mut iface, 1, 2, EntityType::Edge, None).unwrap();
    reader.update_adjacencies(&mut iface, first_e, 1, 2).unwrap();

    assert_eq!(iface.entities_of_dimension(0).len(), 2);
    assert_eq!(iface.entities_of_dimension(1).len(), 1);
    let id_bytes = iface.tag_get_data(tag, Some(first_v)).unwrap();
    assert_eq!(u64::from_le_bytes(id_bytes.try_into().unwrap()), 1);
}

#[test]
fn writer_round_trips_vertex_positions() {
    let mut iface = fresh_iface();
    iface.create_vertex((1.0, 2.0, 3.0)).unwrap();
    iface.create_vertex((4.0, 5.0, 6.0)).unwrap();

    let mut writer = InMemoryWriter;
    let bytes = writer.write_entities(&iface, iface.root_set()).unwrap();
    let decoded: InMemoryMesh = bincode::deserialize(&bytes).unwrap();
    assert_eq!(decoded.vertices.len(), 2);
    assert!(decoded.vertices.contains(&(1.0, 2.0, 3.0)));
}

#[test]
fn rollback_deletes_entities_created_since_capture() {
    let mut iface = fresh_iface();
    iface.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let rb = ReadRollback::capture(&iface, &[0]);

    iface.create_vertex((1.0, 1.0, 1.0)).unwrap();
    iface.create_vertex((2.0, 2.0, 2.0)).unwrap();
    assert_eq!(iface.entities_of_dimension(0).len(), 3);

    rb.rollback(&mut iface, &[0]).unwrap();
    assert_eq!(iface.entities_of_dimension(0).len(), 1);
}

#[test]
fn parse_full_option_string() {
    let opts: ParallelLoadOptions = "parallel=read_part;partition=MATERIAL_SET;partition_val=2;partition_distribute;parallel_resolve_shared_ents;parallel_ghosts=1.0.2".parse().unwrap();
    assert_eq!(opts.parallel, Some(ParallelDistribution::ReadPart));
    assert_eq!(opts.partition_tag.as_deref(), Some("MATERIAL_SET"));
    assert_eq!(opts.partition_val, Some(2));
    assert!(opts.partition_distribute);
    assert!(!opts.partition_by_rank);
    assert!(opts.resolve_shared_ents);
    assert_eq!(opts.ghosts, Some((1, 0, 2)));
}

#[test]
fn parse_rejects_unknown_key() {
    let err: MeshResult<ParallelLoadOptions> = "bogus_option=1".parse();
    assert!(matches!(err, Err(MeshError::Failure(_))));
}

#[test]
fn parse_rejects_malformed_ghosts() {
    let err: MeshResult<ParallelLoadOptions> = "parallel_ghosts=1.2".parse();
    assert!(matches!(err, Err(MeshError::Failure(_))));
}

#[test]
fn parse_empty_string_is_all_defaults() {
    let opts: ParallelLoadOptions = "".parse().unwrap();
    assert_eq!(opts.parallel, None);
    assert_eq!(opts.ghosts, None);
}

#[test]
fn tempfile_placeholder_for_real_file_backed_plugins() {
    // No real file-format reader/writer ships here; this only confirms the
    // dev-dependency used by a future on-disk plugin is wired up correctly.
    let f = NamedTempFile::new().unwrap();
    assert!(f.path().exists());
}
