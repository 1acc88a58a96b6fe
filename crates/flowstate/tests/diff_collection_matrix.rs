mod common;

use common::{insert, set, Pair};
use flowstate::{Change, FeatureKind, FeatureSet, MirrorTree, StructuredValue};

fn attach_element(node: flowstate::NodeId, parent: flowstate::NodeId) -> Change {
    Change::Attach {
        node,
        parent,
        features: vec![FeatureKind::PropertyMap, FeatureKind::ChildList],
    }
}

#[test]
fn scenario_set_collect_and_net_zero_attach() {
    let mut pair = Pair::new();
    let root = pair.root();

    pair.tree.properties(root).unwrap().set("x", 1).unwrap();
    assert_eq!(pair.sync().changes, vec![set(root, "x", 1)]);

    assert!(pair.sync().is_empty(), "no mutation, no records");

    let changed = pair.tree.properties(root).unwrap().set("x", 1).unwrap();
    assert!(!changed);
    assert!(pair.sync().is_empty(), "equal write is a no-op");

    let c = pair
        .tree
        .children(root)
        .unwrap()
        .attach_child(0, FeatureSet::ELEMENT)
        .unwrap();
    pair.tree.children(root).unwrap().detach_child(c).unwrap();
    let batch = pair.sync();
    assert!(
        batch.is_empty(),
        "a child attached and detached within one cycle leaves no trace, got {batch:?}"
    );
    assert!(!pair.tree.contains(c));
}

#[test]
fn detach_is_reported_once_for_previously_seen_child() {
    let mut pair = Pair::new();
    let root = pair.root();
    let c = pair
        .tree
        .children(root)
        .unwrap()
        .attach_child(0, FeatureSet::ELEMENT)
        .unwrap();
    let g = pair
        .tree
        .children(c)
        .unwrap()
        .attach_child(0, FeatureSet::ELEMENT)
        .unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            attach_element(c, root),
            attach_element(g, c),
            insert(root, 0, c),
            insert(c, 0, g),
        ]
    );

    pair.tree.children(root).unwrap().detach_child(c).unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            Change::ChildRemove {
                parent: root,
                feature: FeatureKind::ChildList,
                child: c,
            },
            Change::Detach { node: c },
            Change::Detach { node: g },
        ]
    );
    assert!(pair.sync().is_empty());
    assert!(!pair.mirror.contains(c));
    assert!(!pair.mirror.contains(g));
}

#[test]
fn insert_order_is_mutation_order() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut children = pair.tree.children(root).unwrap();
    let a = children.attach_child(0, FeatureSet::ELEMENT).unwrap();
    let b = children.attach_child(0, FeatureSet::ELEMENT).unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            attach_element(a, root),
            attach_element(b, root),
            insert(root, 0, a),
            insert(root, 0, b),
        ]
    );
    assert_eq!(pair.mirror.list_items(root, FeatureKind::ChildList), &[b, a]);
}

#[test]
fn moves_are_reported_and_noop_moves_are_not() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut children = pair.tree.children(root).unwrap();
    let a = children.push_child(FeatureSet::ELEMENT).unwrap();
    let b = children.push_child(FeatureSet::ELEMENT).unwrap();
    pair.sync();

    assert!(!pair.tree.children(root).unwrap().move_child(a, 0).unwrap());
    assert!(pair.sync().is_empty());

    assert!(pair.tree.children(root).unwrap().move_child(b, 0).unwrap());
    assert_eq!(
        pair.sync().changes,
        vec![Change::ChildMove {
            parent: root,
            feature: FeatureKind::ChildList,
            child: b,
            index: 0,
        }]
    );
}

#[test]
fn hidden_children_do_not_shift_reported_indices() {
    let mut pair = Pair::new();
    let root = pair.root();
    let a = pair
        .tree
        .children(root)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    pair.sync();

    let mut children = pair.tree.children(root).unwrap();
    let x = children.attach_child(0, FeatureSet::ELEMENT).unwrap();
    let y = children.attach_child(1, FeatureSet::ELEMENT).unwrap();
    children.detach_child(x).unwrap();
    assert_eq!(children.items(), &[y, a]);

    assert_eq!(
        pair.sync().changes,
        vec![attach_element(y, root), insert(root, 0, y)]
    );
}

#[test]
fn adopt_moves_subtree_without_detach() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut children = pair.tree.children(root).unwrap();
    let a = children.push_child(FeatureSet::ELEMENT).unwrap();
    let b = children.push_child(FeatureSet::ELEMENT).unwrap();
    let c = pair
        .tree
        .children(a)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    pair.tree.properties(c).unwrap().set("label", "moved").unwrap();
    pair.sync();

    pair.tree.children(b).unwrap().adopt(0, c).unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            Change::ChildRemove {
                parent: a,
                feature: FeatureKind::ChildList,
                child: c,
            },
            insert(b, 0, c),
        ]
    );
    assert_eq!(pair.tree.parent(c), Some(b));
    assert_eq!(pair.mirror.parent(c), Some(b));
    assert_eq!(pair.mirror.property(c, "label"), Some(&"moved".into()));
}

#[test]
fn adopt_into_a_lower_id_parent_removes_before_inserting() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut children = pair.tree.children(root).unwrap();
    let a = children.push_child(FeatureSet::ELEMENT).unwrap();
    let b = children.push_child(FeatureSet::ELEMENT).unwrap();
    let c = pair
        .tree
        .children(b)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    pair.sync();

    pair.tree.children(a).unwrap().adopt(0, c).unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            Change::ChildRemove {
                parent: b,
                feature: FeatureKind::ChildList,
                child: c,
            },
            insert(a, 0, c),
        ]
    );
    assert_eq!(pair.mirror.parent(c), Some(a));
}

#[test]
fn adopt_out_of_a_parent_retired_in_the_same_cycle() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut children = pair.tree.children(root).unwrap();
    let a = children.push_child(FeatureSet::ELEMENT).unwrap();
    let b = children.push_child(FeatureSet::ELEMENT).unwrap();
    let c = pair
        .tree
        .children(a)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    pair.sync();

    pair.tree.children(b).unwrap().adopt(0, c).unwrap();
    pair.tree.children(root).unwrap().detach_child(a).unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            Change::ChildRemove {
                parent: a,
                feature: FeatureKind::ChildList,
                child: c,
            },
            Change::ChildRemove {
                parent: root,
                feature: FeatureKind::ChildList,
                child: a,
            },
            insert(b, 0, c),
            Change::Detach { node: a },
        ]
    );
    assert!(pair.mirror.contains(c));
    assert!(!pair.mirror.contains(a));
}

#[test]
fn attach_announces_parents_before_children() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut children = pair.tree.children(root).unwrap();
    let x = children.push_child(FeatureSet::ELEMENT).unwrap();
    let y = children.push_child(FeatureSet::ELEMENT).unwrap();
    pair.tree.children(y).unwrap().adopt(0, x).unwrap();
    assert!(x < y);

    assert_eq!(
        pair.sync().changes,
        vec![
            attach_element(y, root),
            attach_element(x, y),
            insert(root, 0, y),
            insert(y, 0, x),
        ]
    );
}

#[test]
fn replacing_a_node_valued_property_detaches_the_old_node() {
    let mut pair = Pair::new();
    let root = pair.root();
    let m = pair
        .tree
        .properties(root)
        .unwrap()
        .resolve_model_map("m")
        .unwrap()
        .id();
    assert_eq!(
        pair.sync().changes,
        vec![
            Change::Attach {
                node: m,
                parent: root,
                features: vec![FeatureKind::PropertyMap],
            },
            set(root, "m", StructuredValue::NodeRef(m)),
        ]
    );

    pair.tree.properties(root).unwrap().set("m", 5).unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![set(root, "m", 5), Change::Detach { node: m }]
    );
    assert!(!pair.tree.contains(m));
}

#[test]
fn property_written_back_to_collected_value_is_not_reported() {
    let mut pair = Pair::new();
    let root = pair.root();
    pair.tree.properties(root).unwrap().set("x", 1).unwrap();
    pair.sync();

    let mut props = pair.tree.properties(root).unwrap();
    props.set("x", 2).unwrap();
    props.set("y", true).unwrap();
    props.remove("y").unwrap();
    props.set("x", 1).unwrap();
    assert!(pair.sync().is_empty());

    pair.tree.properties(root).unwrap().remove("x").unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![Change::PropertyRemove {
            node: root,
            key: "x".into(),
        }]
    );
}

#[test]
fn property_records_are_sorted_by_key_then_lists_follow() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut props = pair.tree.properties(root).unwrap();
    props.set("b", 2).unwrap();
    props.set("a", 1).unwrap();
    let child = pair
        .tree
        .children(root)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            attach_element(child, root),
            set(root, "a", 1),
            set(root, "b", 2),
            insert(root, 0, child),
        ]
    );
}

#[test]
fn model_list_records_carry_their_feature() {
    let mut pair = Pair::new();
    let root = pair.root();
    let mut props = pair.tree.properties(root).unwrap();
    let mut rows = props.resolve_model_list("rows").unwrap();
    let list = rows.id();
    let item = rows
        .add_with(0, [("name", StructuredValue::from("first"))])
        .unwrap();
    assert_eq!(
        pair.sync().changes,
        vec![
            Change::Attach {
                node: list,
                parent: root,
                features: vec![FeatureKind::ModelList],
            },
            Change::Attach {
                node: item,
                parent: list,
                features: vec![FeatureKind::PropertyMap],
            },
            set(root, "rows", StructuredValue::NodeRef(list)),
            Change::ChildInsert {
                parent: list,
                feature: FeatureKind::ModelList,
                index: 0,
                child: item,
            },
            set(item, "name", "first"),
        ]
    );
}

#[test]
fn storing_a_node_reference_stores_a_copy() {
    let mut pair = Pair::new();
    let root = pair.root();
    let item = {
        let mut props = pair.tree.properties(root).unwrap();
        let mut rows = props.resolve_model_list("rows").unwrap();
        rows.add_with(0, [("name", StructuredValue::from("a"))]).unwrap()
    };
    pair.sync();

    pair.tree
        .properties(root)
        .unwrap()
        .set("selected", StructuredValue::NodeRef(item))
        .unwrap();
    let copy = pair
        .tree
        .property(root, "selected")
        .and_then(StructuredValue::as_node_ref)
        .expect("selected must hold a node reference");
    assert_ne!(copy, item);
    let batch = pair.sync();
    assert_eq!(batch.attached(), vec![copy]);
    assert_eq!(pair.mirror.property(copy, "name"), Some(&"a".into()));

    // Editing the copy leaves the original alone.
    pair.tree.properties(copy).unwrap().set("name", "b").unwrap();
    pair.sync();
    assert_eq!(pair.tree.property(item, "name"), Some(&"a".into()));
}

#[test]
fn resync_replays_the_whole_tree_into_a_fresh_mirror() {
    let mut pair = Pair::new();
    let root = pair.root();
    pair.tree.properties(root).unwrap().set("title", "t").unwrap();
    let a = pair
        .tree
        .children(root)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    pair.tree
        .children(a)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    {
        let mut props = pair.tree.properties(root).unwrap();
        let mut rows = props.resolve_model_list("rows").unwrap();
        rows.add_new(0).unwrap();
    }
    pair.sync();
    let retired = pair
        .tree
        .children(root)
        .unwrap()
        .push_child(FeatureSet::ELEMENT)
        .unwrap();
    pair.sync();
    pair.tree.children(root).unwrap().detach_child(retired).unwrap();

    pair.tree.prepare_for_resync();
    pair.mirror = MirrorTree::new();
    let batch = pair.sync();
    assert!(batch.detached().is_empty());
    assert_eq!(batch.attached().len(), pair.tree.len() - 1);
    assert!(pair.sync().is_empty());
}

#[test]
fn marking_a_clean_node_dirty_yields_nothing() {
    let mut pair = Pair::new();
    let root = pair.root();
    pair.tree.mark_dirty(root).unwrap();
    assert!(pair.tree.has_dirty_nodes());
    assert!(pair.sync().is_empty());
    assert!(!pair.tree.has_dirty_nodes());
}

#[test]
fn sync_ids_count_collections() {
    let mut pair = Pair::new();
    let ids: Vec<u64> = (0..3).map(|_| pair.sync().sync_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}
