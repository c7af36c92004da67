use super::*;
use crate::handle::EntityType;
use crate::sequence::SequenceShape;

fn make_vertex(store: &mut SequenceStore, xyz: (f64, f64, f64)) -> Handle {
    let h = store.allocate_block(EntityType::Vertex, 1, None, SequenceShape::Vertex).unwrap();
    store.locate_data_mut(h).unwrap().set_vertex_coords(h, xyz).unwrap();
    h
}

fn make_triangle(store: &mut SequenceStore, factory: &AEntityFactory, verts: [Handle; 3]) -> Handle {
    let h = store
        .allocate_block(EntityType::Triangle, 1, None, SequenceShape::Element { nodes_per_element: 3 })
        .unwrap();
    store.locate_data_mut(h).unwrap().set_connectivity(h, &verts).unwrap();
    factory.notify_create_entity(store, h, &verts);
    h
}

#[test]
fn scenario_1_triangle_vertex_adjacency_in_creation_order() {
    let mut store = SequenceStore::new();
    let factory = AEntityFactory::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true });
    let v0 = make_vertex(&mut store, (0.0, 0.0, 0.0));
    let v1 = make_vertex(&mut store, (1.0, 0.0, 0.0));
    let v2 = make_vertex(&mut store, (0.0, 1.0, 0.0));
    let tri = make_triangle(&mut store, &factory, [v0, v1, v2]);

    let adj = factory.get_adjacencies(&mut store, tri, 0, false).unwrap();
    assert_eq!(adj.handles, vec![v0, v1, v2]);
}

#[test]
fn scenario_2_vertex_to_triangle_adjacency() {
    let mut store = SequenceStore::new();
    let factory = AEntityFactory::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true });
    let v0 = make_vertex(&mut store, (0.0, 0.0, 0.0));
    let v1 = make_vertex(&mut store, (1.0, 0.0, 0.0));
    let v2 = make_vertex(&mut store, (0.0, 1.0, 0.0));
    let tri = make_triangle(&mut store, &factory, [v0, v1, v2]);

    let adj = factory.get_adjacencies(&mut store, v0, 2, false).unwrap();
    assert_eq!(adj.handles, vec![tri]);
}

#[test]
fn scenario_3_shared_edge_vertex_sees_both_triangles() {
    let mut store = SequenceStore::new();
    let factory = AEntityFactory::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true });
    let v0 = make_vertex(&mut store, (0.0, 0.0, 0.0));
    let v1 = make_vertex(&mut store, (1.0, 0.0, 0.0));
    let v2 = make_vertex(&mut store, (0.0, 1.0, 0.0));
    let v3 = make_vertex(&mut store, (1.0, 1.0, 0.0));
    let tri1 = make_triangle(&mut store, &factory, [v0, v1, v2]);
    let tri2 = make_triangle(&mut store, &factory, [v1, v2, v3]);

    let mut adj = factory.get_adjacencies(&mut store, v1, 2, false).unwrap().handles;
    adj.sort();
    let mut expected = vec![tri1, tri2];
    expected.sort();
    assert_eq!(adj, expected);
}

#[test]
fn invariant_create_then_delete_round_trips_vertex_adjacency() {
    let mut store = SequenceStore::new();
    let factory = AEntityFactory::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true });
    let v0 = make_vertex(&mut store, (0.0, 0.0, 0.0));
    let v1 = make_vertex(&mut store, (1.0, 0.0, 0.0));
    let v2 = make_vertex(&mut store, (0.0, 1.0, 0.0));
    let tri = make_triangle(&mut store, &factory, [v0, v1, v2]);
    assert!(store.adjacency_list(v0).unwrap().contains(&tri));

    factory.notify_delete_entity(&mut store, tri).unwrap();
    assert!(!store.adjacency_list(v0).unwrap().contains(&tri));
}

#[test]
fn derives_edges_of_a_triangle_creating_them_on_demand() {
    let mut store = SequenceStore::new();
    let factory = AEntityFactory::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true });
    let v0 = make_vertex(&mut store, (0.0, 0.0, 0.0));
    let v1 = make_vertex(&mut store, (1.0, 0.0, 0.0));
    let v2 = make_vertex(&mut store, (0.0, 1.0, 0.0));
    let tri = make_triangle(&mut store, &factory, [v0, v1, v2]);

    let edges = factory.get_adjacencies(&mut store, tri, 1, true).unwrap();
    assert_eq!(edges.handles.len(), 3);
    for e in &edges.handles {
        assert_eq!(store.entity_type_of(*e).unwrap(), EntityType::Edge);
    }

    // Asking again without creating returns the same, already-created edges.
    let again = factory.get_adjacencies(&mut store, tri, 1, false).unwrap();
    let mut a = edges.handles.clone();
    let mut b = again.handles.clone();
    a.sort();
    b.sort();
    assert_eq!(a, b);
}
