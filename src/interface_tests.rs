use super::*;
use crate::meshset::EntitySelector;

fn new_iface() -> Interface {
    Interface::new(AEntityFactoryConfig { vertex_adjacencies_enabled: true }).unwrap()
}

#[test]
fn create_vertex_then_element_builds_adjacency() {
    let mut iface = new_iface();
    let v0 = iface.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v1 = iface.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let edge = iface.create_element(EntityType::Edge, &[v0, v1]).unwrap();

    let incident = iface.get_adjacencies(v0, 1, false).unwrap();
    assert_eq!(incident, vec![edge]);
}

#[test]
fn delete_entities_clears_adjacency_and_tags() {
    let mut iface = new_iface();
    let v0 = iface.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v1 = iface.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let edge = iface.create_element(EntityType::Edge, &[v0, v1]).unwrap();

    let tag = iface.create_tag("weight", TagStorage::Sparse, TagSize::Fixed(4), None, false).unwrap();
    iface.tag_set_data(tag, Some(edge), &[1, 2, 3, 4]).unwrap();

    iface.delete_entities(&[edge]).unwrap();

    assert!(iface.get_adjacencies(v0, 1, false).unwrap().is_empty());
    assert!(matches!(iface.tag_get_data(tag, Some(edge)), Err(MeshError::TagNotFound)));
}

#[test]
fn track_owners_set_removes_entity_on_delete() {
    let mut iface = new_iface();
    let v0 = iface.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let set = iface.create_meshset(MeshSetOptions { ordered: true, track_owners: true }).unwrap();
    iface.set_add_entities(set, &[v0]).unwrap();
    assert!(iface.set_ref(set).unwrap().contains_entities(&[v0], crate::meshset::ContainsMode::Union));

    iface.delete_entities(&[v0]).unwrap();
    assert!(!iface.set_ref(set).unwrap().contains_entities(&[v0], crate::meshset::ContainsMode::Union));
}

#[test]
fn nested_sets_resolve_recursively() {
    let mut iface = new_iface();
    let v0 = iface.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v1 = iface.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let inner = iface.create_meshset(MeshSetOptions::default()).unwrap();
    iface.set_add_entities(inner, &[v0]).unwrap();
    let outer = iface.create_meshset(MeshSetOptions::default()).unwrap();
    iface.set_add_entities(outer, &[inner, v1]).unwrap();

    let mut members = iface.get_entities_recursive(outer, Some(EntitySelector::ByType(EntityType::Vertex))).unwrap();
    members.sort();
    let mut expected = vec![v0, v1];
    expected.sort();
    assert_eq!(members, expected);
}

#[test]
fn parent_child_transitive_closure() {
    let mut iface = new_iface();
    let a = iface.create_meshset(MeshSetOptions::default()).unwrap();
    let b = iface.create_meshset(MeshSetOptions::default()).unwrap();
    let c = iface.create_meshset(MeshSetOptions::default()).unwrap();
    iface.add_parent_child(a, b).unwrap();
    iface.add_parent_child(b, c).unwrap();

    let descendants = iface.transitive_children(a, 0).unwrap();
    assert!(descendants.contains(&b));
    assert!(descendants.contains(&c));
}

#[test]
fn merge_entities_redirects_adjacency_and_deletes_victim() {
    let mut iface = new_iface();
    let v0 = iface.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let v1 = iface.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let victim = iface.create_vertex((1.0, 0.0, 0.0)).unwrap();
    let e1 = iface.create_element(EntityType::Edge, &[v0, v1]).unwrap();
    let e2 = iface.create_element(EntityType::Edge, &[v0, victim]).unwrap();
    let _ = (e1, e2);

    merge_entities(&mut iface, v1, victim).unwrap();
    assert!(!iface.store().exists(victim));
    let survivors = iface.get_adjacencies(v1, 1, false).unwrap();
    assert!(survivors.len() >= 2);
}

#[test]
fn wrong_connectivity_length_rejected() {
    let mut iface = new_iface();
    let v0 = iface.create_vertex((0.0, 0.0, 0.0)).unwrap();
    let err = iface.create_element(EntityType::Triangle, &[v0]);
    assert!(matches!(err, Err(MeshError::InvalidSize)));
    assert!(iface.last_error().unwrap().contains("INVALID_SIZE"));
}
