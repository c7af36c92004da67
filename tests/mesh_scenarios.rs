use meshcore::adjacency::AEntityFactoryConfig;
use meshcore::handle::EntityType;
use meshcore::interface::Interface;
use meshcore::meshset::{ContainsMode, MeshSetOptions};
use meshcore::tag::{TagSize, TagStorage};

fn iface() -> Interface {
    Interface::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true }).unwrap()
}

/// Scenario 1: a single triangle's down-adjacency to vertices preserves
/// creation order.
#[test]
fn triangle_adjacency_preserves_vertex_order() {
    let mut db = iface();
    let v0 = db.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v1 = db.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let v2 = db.create_vertex((0.0, 1.0, 0.0)).unwrap();
    let tri = db.create_element(EntityType::Triangle, &[v0, v1, v2]).unwrap();

    let verts = db.get_adjacencies(tri, 0, false).unwrap();
    assert_eq!(verts, vec![v0, v1, v2]);
}

/// Scenario 2: a vertex's up-adjacency to dimension-2 entities finds the
/// triangle it participates in.
#[test]
fn vertex_up_adjacency_finds_owning_triangle() {
    let mut db = iface();
    let v0 = db.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v1 = db.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let v2 = db.create_vertex((0.0, 1.0, 0.0)).unwrap();
    let tri = db.create_element(EntityType::Triangle, &[v0, v1, v2]).unwrap();

    let tris = db.get_adjacencies(v0, 2, false).unwrap();
    assert_eq!(tris, vec![tri]);
}

/// Scenario 3: two triangles sharing an edge both show up from the shared
/// vertex's up-adjacency.
#[test]
fn shared_edge_vertex_sees_both_triangles() {
    let mut db = iface();
    let v0 = db.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v1 = db.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let v2 = db.create_vertex((0.0, 1.0, 0.0)).unwrap();
    let v3 = db.create_vertex((1.0, 1.0, 0.0)).unwrap();
    let tri1 = db.create_element(EntityType::Triangle, &[v0, v1, v2]).unwrap();
    let tri2 = db.create_element(EntityType::Triangle, &[v1, v3, v2]).unwrap();

    let mut tris = db.get_adjacencies(v1, 2, false).unwrap();
    tris.sort();
    let mut expected = vec![tri1, tri2];
    expected.sort();
    assert_eq!(tris, expected);
}

fn hex_mesh_vertices(db: &mut Interface) -> Vec<u64> {
    let first = db.create_vertex_block(1331).unwrap();
    (0..1331).map(|i| first + i).collect()
}

/// Scenario 4: an ordered set built from three disjoint ranges of a
/// 10x10x10 hex-mesh vertex block answers `contains_entities` with
/// `Intersect` semantics correctly.
#[test]
fn ordered_set_intersect_over_hex_mesh_ranges() {
    let mut db = iface();
    let verts = hex_mesh_vertices(&mut db);

    let set = db.create_meshset(MeshSetOptions { ordered: true, track_owners: false }).unwrap();
    let mut members = Vec::new();
    for &(lo, hi) in &[(11, 20), (31, 40), (51, 60)] {
        members.extend((lo..=hi).map(|i| verts[i - 1]));
    }
    db.set_add_entities(set, &members).unwrap();

    let probe = [verts[14], verts[34], verts[54]];
    assert!(db.set_ref(set).unwrap().contains_entities(&probe, ContainsMode::Intersect));
}

/// Scenario 5: the same three ranges stored in a compressed set come back
/// from `get_entities_by_handle` as the full union, range order preserved.
#[test]
fn compressed_set_yields_expected_union_of_ranges() {
    let mut db = iface();
    let verts = hex_mesh_vertices(&mut db);

    let set = db.create_meshset(MeshSetOptions { ordered: false, track_owners: false }).unwrap();
    let mut members = Vec::new();
    for &(lo, hi) in &[(11, 20), (31, 40), (51, 60)] {
        members.extend((lo..=hi).map(|i| verts[i - 1]));
    }
    db.set_add_entities(set, &members).unwrap();

    let mut expected = members.clone();
    expected.sort();
    let mut got = db.set_ref(set).unwrap().get_entities_by_handle();
    got.sort();
    assert_eq!(got, expected);
}

/// Scenario 8: a dense double tag with default 0.0, written on three
/// vertices out of many, reads back correctly everywhere.
#[test]
fn dense_double_tag_default_and_scoped_write() {
    let mut db = iface();
    let tag = db.create_tag("temperature", TagStorage::Dense, TagSize::Fixed(8), Some(0f64.to_le_bytes().to_vec()), false).unwrap();

    let verts: Vec<u64> = (0..6).map(|_| db.create_vertex((0.0, 0.0, 0.0)).unwrap()).collect();
    for &v in &verts[0..3] {
        db.tag_set_data(tag, Some(v), &1.0f64.to_le_bytes()).unwrap();
    }

    for (i, &v) in verts.iter().enumerate() {
        let bytes = db.tag_get_data(tag, Some(v)).unwrap();
        let value = f64::from_le_bytes(bytes.try_into().unwrap());
        if i < 3 {
            assert_eq!(value, 1.0);
        } else {
            assert_eq!(value, 0.0);
        }
    }
}

/// Scenario 9: a variable-length integer tag round-trips differing lengths
/// per vertex exactly, including the stored length itself.
#[test]
fn variable_length_tag_round_trips_varying_lengths() {
    let mut db = iface();
    let tag = db.create_tag("history", TagStorage::VariableSparse, TagSize::Variable, None, false).unwrap();

    let v_a = db.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v_b = db.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let v_c = db.create_vertex((2.0, 0.0, 0.0)).unwrap();

    let payloads: [(&u64, Vec<i32>); 3] =
        [(&v_a, vec![0]), (&v_b, vec![3, 10, 20, 30]), (&v_c, vec![1, -5])];

    for (h, ints) in &payloads {
        let mut bytes = Vec::with_capacity(ints.len() * 4);
        for v in ints {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        db.tag_set_data(tag, Some(**h), &bytes).unwrap();
    }

    for (h, ints) in &payloads {
        let raw = db.tag_get_data(tag, Some(**h)).unwrap();
        let decoded: Vec<i32> = raw.chunks_exact(4).map(|c| i32::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(&decoded, ints);
    }
}
