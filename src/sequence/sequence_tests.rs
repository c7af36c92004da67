use super::*;
use crate::error::MeshError;
use crate::handle::EntityType;

#[test]
fn vertex_allocation_and_coordinate_round_trip() {
    let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
    let first = mgr.allocate_block(3, None, SequenceShape::Vertex).unwrap();
    for i in 0..3u64 {
        let h = first + i;
        let data = mgr.locate_data_mut(h).unwrap();
        data.set_vertex_coords(h, (i as f64, 0.0, 0.0)).unwrap();
    }
    for i in 0..3u64 {
        let h = first + i;
        let data = mgr.locate_data(h).unwrap();
        assert_eq!(data.vertex_coords(h).unwrap(), (i as f64, 0.0, 0.0));
    }
}

#[test]
fn element_connectivity_round_trip() {
    let mut mgr = TypeSequenceManager::new(EntityType::Triangle);
    let first = mgr.allocate_block(2, None, SequenceShape::Element { nodes_per_element: 3 }).unwrap();
    let conn0 = [1, 2, 3];
    let conn1 = [4, 5, 6];
    mgr.locate_data_mut(first).unwrap().set_connectivity(first, &conn0).unwrap();
    mgr.locate_data_mut(first + 1).unwrap().set_connectivity(first + 1, &conn1).unwrap();
    assert_eq!(mgr.locate_data(first).unwrap().connectivity(first).unwrap(), &conn0);
    assert_eq!(mgr.locate_data(first + 1).unwrap().connectivity(first + 1).unwrap(), &conn1);
}

#[test]
fn wrong_connectivity_length_fails_cleanly() {
    let mut mgr = TypeSequenceManager::new(EntityType::Triangle);
    let first = mgr.allocate_block(1, None, SequenceShape::Element { nodes_per_element: 3 }).unwrap();
    let bad = [1, 2];
    let data = mgr.locate_data_mut(first).unwrap();
    assert!(matches!(data.set_connectivity(first, &bad), Err(MeshError::InvalidSize)));
}

#[test]
fn polygon_handles_round_trip_in_allocation_order() {
    let mut mgr = TypeSequenceManager::new(EntityType::Polygon);
    let first = mgr.allocate_block(2, None, SequenceShape::Poly).unwrap();
    mgr.locate_data_mut(first).unwrap().set_poly_handles(first, &[1, 2, 3]).unwrap();
    mgr.locate_data_mut(first + 1).unwrap().set_poly_handles(first + 1, &[4, 5]).unwrap();
    assert_eq!(mgr.locate_data(first).unwrap().poly_handles(first).unwrap(), &[1, 2, 3]);
    assert_eq!(mgr.locate_data(first + 1).unwrap().poly_handles(first + 1).unwrap(), &[4, 5]);
}

#[test]
fn every_live_handle_has_exactly_one_owning_sequence() {
    let mut mgr = TypeSequenceManager::new(EntityType::Vertex);
    let first = mgr.allocate_block(4, None, SequenceShape::Vertex).unwrap();
    mgr.split_at(first + 2).unwrap();
    let mut owners = 0;
    for h in [first, first + 1, first + 2, first + 3] {
        owners += mgr.sequences().filter(|s| s.contains(h)).count();
    }
    assert_eq!(owners, 4);
}
