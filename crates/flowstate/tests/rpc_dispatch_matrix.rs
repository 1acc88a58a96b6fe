use std::collections::BTreeMap;

use flowstate::{
    Change, ClientUpdateMode, FeatureKind, FeatureSet, NodeId, RpcDispatcher, RpcInvocation,
    RpcRejection, StateTree, StructuredValue,
};

struct Fixture {
    tree: StateTree,
    root: NodeId,
    child: NodeId,
    list: NodeId,
    item: NodeId,
}

/// Root with one element child (`label = "c"`), a model list under `rows`
/// holding one item (`name = "a"`) and a client-locked key, all collected.
fn fixture() -> Fixture {
    let mut tree = StateTree::default();
    let root = tree.root();
    let child = tree
        .children(root)
        .expect("root has children")
        .push_child(FeatureSet::ELEMENT)
        .expect("attach must succeed");
    tree.properties(child)
        .expect("element has properties")
        .set("label", "c")
        .expect("set must succeed");
    let (list, item) = {
        let mut props = tree.properties(root).expect("root has properties");
        let mut rows = props.resolve_model_list("rows").expect("resolve must succeed");
        let item = rows
            .add_with(0, [("name", StructuredValue::from("a"))])
            .expect("add must succeed");
        (rows.id(), item)
    };
    tree.properties(root)
        .expect("root has properties")
        .set_update_mode("locked", ClientUpdateMode::Deny)
        .expect("update mode must be settable");
    tree.collect_changes().expect("collection must succeed");
    Fixture {
        tree,
        root,
        child,
        list,
        item,
    }
}

fn object(entries: &[(&str, StructuredValue)]) -> StructuredValue {
    StructuredValue::Object(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

#[test]
fn rejection_matrix_leaves_tree_untouched() {
    let f = fixture();
    let (root, child, list, item) = (f.root, f.child, f.list, f.item);
    let unknown = NodeId::new(999);

    let cases: Vec<(&str, RpcInvocation, RpcRejection)> = vec![
        (
            "unknown node",
            RpcInvocation::new(unknown, FeatureKind::PropertyMap, "set", vec!["x".into(), 1.into()]),
            RpcRejection::UnknownNode(unknown),
        ),
        (
            "unknown feature id",
            RpcInvocation {
                node: root,
                feature: 9,
                operation: "set".into(),
                args: vec!["x".into(), 1.into()],
            },
            RpcRejection::UnsupportedFeature { node: root, feature: 9 },
        ),
        (
            "feature the node does not declare",
            RpcInvocation::new(root, FeatureKind::ModelList, "add", vec![0.into(), object(&[])]),
            RpcRejection::UnsupportedFeature { node: root, feature: 3 },
        ),
        (
            "unknown operation",
            RpcInvocation::new(root, FeatureKind::PropertyMap, "frobnicate", vec![]),
            RpcRejection::InvalidArguments("unknown operation `frobnicate` for property map".into()),
        ),
        (
            "missing argument",
            RpcInvocation::new(root, FeatureKind::PropertyMap, "set", vec!["x".into()]),
            RpcRejection::InvalidArguments("`set` takes 2 argument(s), got 1".into()),
        ),
        (
            "move past the end",
            RpcInvocation::new(root, FeatureKind::ChildList, "move", vec![child.into(), 5.into()]),
            RpcRejection::InvalidArguments("index 5 out of bounds for list of length 1".into()),
        ),
        (
            "remove of a node held elsewhere",
            RpcInvocation::new(root, FeatureKind::ChildList, "remove", vec![item.into()]),
            RpcRejection::InvalidArguments(format!("node {item} is not in the child list of node {root}")),
        ),
        (
            "denied key",
            RpcInvocation::new(root, FeatureKind::PropertyMap, "set", vec!["locked".into(), 1.into()]),
            RpcRejection::UpdateDenied {
                node: root,
                key: "locked".into(),
            },
        ),
        (
            "value referencing an unknown node",
            RpcInvocation::new(
                root,
                FeatureKind::PropertyMap,
                "set",
                vec!["x".into(), StructuredValue::NodeRef(unknown)],
            ),
            RpcRejection::UnknownNode(unknown),
        ),
        (
            "add past the end",
            RpcInvocation::new(list, FeatureKind::ModelList, "add", vec![5.into(), object(&[])]),
            RpcRejection::InvalidArguments("index 5 out of bounds for list of length 1".into()),
        ),
        (
            "add with a property referencing an unknown node",
            RpcInvocation::new(
                list,
                FeatureKind::ModelList,
                "add",
                vec![0.into(), object(&[("ref", StructuredValue::NodeRef(unknown))])],
            ),
            RpcRejection::UnknownNode(unknown),
        ),
    ];

    let dispatcher = RpcDispatcher::default();
    for (label, invocation, expected) in cases {
        let mut tree = f.tree.clone();
        let before = tree.view(root);
        let len = tree.len();
        let result = dispatcher.dispatch(&mut tree, &invocation);
        assert_eq!(result, Err(expected), "case: {label}");
        assert_eq!(tree.view(root), before, "case {label} mutated the tree");
        assert_eq!(tree.len(), len, "case {label} allocated nodes");
        assert!(
            tree.pending_changes().expect("collection must succeed").is_empty(),
            "case {label} left pending changes"
        );
    }
}

#[test]
fn call_to_node_detached_before_dispatch_is_unknown() {
    let mut f = fixture();
    let stale = f.child;
    let invocation = RpcInvocation::new(stale, FeatureKind::PropertyMap, "set", vec!["label".into(), "late".into()]);
    f.tree
        .children(f.root)
        .expect("root has children")
        .detach_child(stale)
        .expect("detach must succeed");

    let result = RpcDispatcher::default().dispatch(&mut f.tree, &invocation);
    assert_eq!(result, Err(RpcRejection::UnknownNode(stale)));
    assert!(result.unwrap_err().is_benign());
    assert_eq!(
        f.tree.collect_changes().expect("collection must succeed").changes,
        vec![
            Change::ChildRemove {
                parent: f.root,
                feature: FeatureKind::ChildList,
                child: stale,
            },
            Change::Detach { node: stale },
        ]
    );
}

#[test]
fn list_call_naming_a_child_detached_before_dispatch_is_unknown() {
    let mut f = fixture();
    let (root, stale) = (f.root, f.child);
    f.tree
        .children(root)
        .expect("root has children")
        .detach_child(stale)
        .expect("detach must succeed");
    f.tree.collect_changes().expect("collection must succeed");

    let dispatcher = RpcDispatcher::default();
    for invocation in [
        RpcInvocation::new(root, FeatureKind::ChildList, "remove", vec![stale.into()]),
        RpcInvocation::new(root, FeatureKind::ChildList, "move", vec![stale.into(), 0.into()]),
    ] {
        let result = dispatcher.dispatch(&mut f.tree, &invocation);
        assert_eq!(result, Err(RpcRejection::UnknownNode(stale)), "{}", invocation.operation);
        assert!(result.unwrap_err().is_benign());
    }
    assert!(f.tree.collect_changes().expect("collection must succeed").is_empty());
}

#[test]
fn echo_of_remote_property_writes_is_suppressed() {
    let mut f = fixture();
    let root = f.root;
    let dispatcher = RpcDispatcher::default();
    dispatcher
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(root, FeatureKind::PropertyMap, "set", vec!["x".into(), 5.into()]),
        )
        .expect("set must apply");
    assert_eq!(f.tree.property(root, "x"), Some(&5.into()));
    assert!(f.tree.collect_changes().expect("collection must succeed").is_empty());

    dispatcher
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(root, FeatureKind::PropertyMap, "remove", vec!["x".into()]),
        )
        .expect("remove must apply");
    assert!(f.tree.property(root, "x").is_none());
    assert!(f.tree.collect_changes().expect("collection must succeed").is_empty());
}

#[test]
fn local_write_after_remote_write_is_reported() {
    let mut f = fixture();
    let root = f.root;
    RpcDispatcher::default()
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(root, FeatureKind::PropertyMap, "set", vec!["x".into(), 5.into()]),
        )
        .expect("set must apply");
    f.tree
        .properties(root)
        .expect("root has properties")
        .set("x", 6)
        .expect("set must succeed");
    assert_eq!(
        f.tree.collect_changes().expect("collection must succeed").changes,
        vec![Change::PropertySet {
            node: root,
            key: "x".into(),
            value: 6.into(),
        }]
    );
}

#[test]
fn echo_is_reported_when_suppression_is_off() {
    let mut f = fixture();
    let root = f.root;
    RpcDispatcher::new(false)
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(root, FeatureKind::PropertyMap, "set", vec!["x".into(), 5.into()]),
        )
        .expect("set must apply");
    assert_eq!(
        f.tree.collect_changes().expect("collection must succeed").changes,
        vec![Change::PropertySet {
            node: root,
            key: "x".into(),
            value: 5.into(),
        }]
    );
}

#[test]
fn remote_reference_to_model_item_stores_a_copy() {
    let mut f = fixture();
    let root = f.root;
    RpcDispatcher::default()
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(
                root,
                FeatureKind::PropertyMap,
                "set",
                vec!["selected".into(), StructuredValue::NodeRef(f.item)],
            ),
        )
        .expect("set must apply");
    let copy = f
        .tree
        .property(root, "selected")
        .and_then(StructuredValue::as_node_ref)
        .expect("selected must hold a node reference");
    assert_ne!(copy, f.item);
    assert_eq!(f.tree.property(copy, "name"), Some(&"a".into()));

    let batch = f.tree.collect_changes().expect("collection must succeed");
    assert_eq!(batch.attached(), vec![copy]);
    assert!(batch.changes.contains(&Change::PropertySet {
        node: root,
        key: "selected".into(),
        value: StructuredValue::NodeRef(copy),
    }));
}

#[test]
fn remote_reference_to_plain_node_stores_a_snapshot() {
    let mut f = fixture();
    let root = f.root;
    RpcDispatcher::default()
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(
                root,
                FeatureKind::PropertyMap,
                "set",
                vec!["picked".into(), StructuredValue::NodeRef(f.child)],
            ),
        )
        .expect("set must apply");
    let snapshot = object(&[("label", "c".into())]);
    assert_eq!(f.tree.property(root, "picked"), Some(&snapshot));
    assert_eq!(
        f.tree.collect_changes().expect("collection must succeed").changes,
        vec![Change::PropertySet {
            node: root,
            key: "picked".into(),
            value: snapshot,
        }]
    );
}

#[test]
fn model_list_operations_over_rpc() {
    let mut f = fixture();
    let list = f.list;
    let dispatcher = RpcDispatcher::default();

    dispatcher
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(
                list,
                FeatureKind::ModelList,
                "add",
                vec![1.into(), object(&[("name", "z".into())])],
            ),
        )
        .expect("add must apply");
    let items = f.tree.list_items(list, FeatureKind::ModelList).to_vec();
    assert_eq!(items.len(), 2);
    let added = items[1];
    assert_eq!(f.tree.property(added, "name"), Some(&"z".into()));
    assert_eq!(
        f.tree.collect_changes().expect("collection must succeed").changes,
        vec![
            Change::Attach {
                node: added,
                parent: list,
                features: vec![FeatureKind::PropertyMap],
            },
            Change::ChildInsert {
                parent: list,
                feature: FeatureKind::ModelList,
                index: 1,
                child: added,
            },
            Change::PropertySet {
                node: added,
                key: "name".into(),
                value: "z".into(),
            },
        ]
    );

    // Items may be named by plain number as well as by reference.
    dispatcher
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(list, FeatureKind::ModelList, "move", vec![added.raw().into(), 0.into()]),
        )
        .expect("move must apply");
    dispatcher
        .dispatch(
            &mut f.tree,
            &RpcInvocation::new(list, FeatureKind::ModelList, "remove", vec![f.item.into()]),
        )
        .expect("remove must apply");
    assert_eq!(f.tree.list_items(list, FeatureKind::ModelList), &[added]);
    assert_eq!(
        f.tree.collect_changes().expect("collection must succeed").changes,
        vec![
            Change::ChildMove {
                parent: list,
                feature: FeatureKind::ModelList,
                child: added,
                index: 0,
            },
            Change::ChildRemove {
                parent: list,
                feature: FeatureKind::ModelList,
                child: f.item,
            },
            Change::Detach { node: f.item },
        ]
    );
}

#[test]
fn rpc_invocation_decodes_from_json() {
    let invocation: RpcInvocation = serde_json::from_str(
        r#"{"node": 1, "feature": 1, "operation": "set", "args": ["x", {"nodeId": 4}]}"#,
    )
    .expect("invocation must decode");
    assert_eq!(
        invocation,
        RpcInvocation::new(
            NodeId::new(1),
            FeatureKind::PropertyMap,
            "set",
            vec!["x".into(), StructuredValue::NodeRef(NodeId::new(4))],
        )
    );
}
