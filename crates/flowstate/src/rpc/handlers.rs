use std::collections::BTreeMap;

use flowstate_value::{deep_equal, StructuredValue};

use super::RpcRejection;
use crate::feature::{ClientUpdateMode, FeatureKind, FeatureSet};
use crate::tree::StateTree;
use crate::NodeId;

/// A parsed invocation whose argument shapes have been checked.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Command {
    SetProperty {
        key: String,
        value: StructuredValue,
    },
    RemoveProperty {
        key: String,
    },
    MoveChild {
        kind: FeatureKind,
        child: NodeId,
        index: usize,
    },
    RemoveChild {
        kind: FeatureKind,
        child: NodeId,
    },
    AddItem {
        index: usize,
        properties: BTreeMap<String, StructuredValue>,
    },
}

impl Command {
    pub(super) fn parse(
        kind: FeatureKind,
        operation: &str,
        args: &[StructuredValue],
    ) -> Result<Self, RpcRejection> {
        match (kind, operation) {
            (FeatureKind::PropertyMap, "set") => {
                arity(operation, args, 2)?;
                Ok(Command::SetProperty {
                    key: key_arg(args, 0)?,
                    value: args[1].clone(),
                })
            }
            (FeatureKind::PropertyMap, "remove") => {
                arity(operation, args, 1)?;
                Ok(Command::RemoveProperty {
                    key: key_arg(args, 0)?,
                })
            }
            (FeatureKind::ChildList | FeatureKind::ModelList, "move") => {
                arity(operation, args, 2)?;
                Ok(Command::MoveChild {
                    kind,
                    child: node_arg(args, 0)?,
                    index: index_arg(args, 1)?,
                })
            }
            (FeatureKind::ChildList | FeatureKind::ModelList, "remove") => {
                arity(operation, args, 1)?;
                Ok(Command::RemoveChild {
                    kind,
                    child: node_arg(args, 0)?,
                })
            }
            (FeatureKind::ModelList, "add") => {
                arity(operation, args, 2)?;
                let properties = args[1].as_object().cloned().ok_or_else(|| {
                    RpcRejection::InvalidArguments(format!(
                        "argument 1 of `add` must be an object, got {}",
                        args[1].kind()
                    ))
                })?;
                Ok(Command::AddItem {
                    index: index_arg(args, 0)?,
                    properties,
                })
            }
            _ => Err(RpcRejection::InvalidArguments(format!(
                "unknown operation `{operation}` for {kind}"
            ))),
        }
    }

    pub(super) fn apply(
        self,
        tree: &mut StateTree,
        node: NodeId,
        suppress_echo: bool,
    ) -> Result<(), RpcRejection> {
        match self {
            Command::SetProperty { key, value } => {
                check_update_allowed(tree, node, &key)?;
                let resolved = resolve_remote_value(tree, &value)?;
                tree.set_property(node, &key, resolved)?;
                let stored_as_sent = tree
                    .property(node, &key)
                    .is_some_and(|stored| deep_equal(stored, &value));
                if suppress_echo && stored_as_sent {
                    tree.acknowledge_property(node, &key)?;
                }
                Ok(())
            }
            Command::RemoveProperty { key } => {
                check_update_allowed(tree, node, &key)?;
                tree.remove_property(node, &key)?;
                if suppress_echo {
                    tree.acknowledge_property(node, &key)?;
                }
                Ok(())
            }
            Command::MoveChild { kind, child, index } => {
                require_live(tree, child)?;
                tree.move_child(node, kind, child, index)?;
                Ok(())
            }
            Command::RemoveChild { kind, child } => {
                require_live(tree, child)?;
                tree.remove_child(node, kind, child)?;
                Ok(())
            }
            Command::AddItem { index, properties } => {
                let len = tree.list_items(node, FeatureKind::ModelList).len();
                if index > len {
                    return Err(RpcRejection::InvalidArguments(format!(
                        "index {index} out of bounds for list of length {len}"
                    )));
                }
                let mut resolved = Vec::with_capacity(properties.len());
                for (key, value) in &properties {
                    resolved.push((key.as_str(), resolve_remote_value(tree, value)?));
                }
                let item = tree.insert_new_child(node, FeatureKind::ModelList, index, FeatureSet::MODEL_MAP)?;
                for (key, value) in resolved {
                    tree.set_property(item, key, value)?;
                }
                Ok(())
            }
        }
    }
}

/// The remote side may still name a child that was detached before its call
/// arrived.
fn require_live(tree: &StateTree, child: NodeId) -> Result<(), RpcRejection> {
    if tree.contains(child) {
        Ok(())
    } else {
        Err(RpcRejection::UnknownNode(child))
    }
}

fn check_update_allowed(tree: &StateTree, node: NodeId, key: &str) -> Result<(), RpcRejection> {
    match tree.update_mode(node, key) {
        ClientUpdateMode::Allow => Ok(()),
        ClientUpdateMode::Deny => Err(RpcRejection::UpdateDenied {
            node,
            key: key.to_owned(),
        }),
    }
}

/// Prepares a value sent by the remote side for storage.
///
/// A reference to a model list item stays a reference, so storing it makes
/// a fresh copy of the item. Any other referenced node is replaced by a
/// plain snapshot of its properties.
fn resolve_remote_value(
    tree: &StateTree,
    value: &StructuredValue,
) -> Result<StructuredValue, RpcRejection> {
    if !value.contains_node_ref() {
        return Ok(value.clone());
    }
    value.try_map_node_refs(&mut |r| {
        if !tree.contains(r) {
            Err(RpcRejection::UnknownNode(r))
        } else if tree.is_model_list_item(r) {
            Ok(StructuredValue::NodeRef(r))
        } else {
            tree.snapshot(r).map_err(RpcRejection::from)
        }
    })
}

fn arity(operation: &str, args: &[StructuredValue], expected: usize) -> Result<(), RpcRejection> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RpcRejection::InvalidArguments(format!(
            "`{operation}` takes {expected} argument(s), got {}",
            args.len()
        )))
    }
}

fn key_arg(args: &[StructuredValue], at: usize) -> Result<String, RpcRejection> {
    args[at].as_str().map(str::to_owned).ok_or_else(|| {
        RpcRejection::InvalidArguments(format!(
            "argument {at} must be a property name, got {}",
            args[at].kind()
        ))
    })
}

fn node_arg(args: &[StructuredValue], at: usize) -> Result<NodeId, RpcRejection> {
    args[at].as_node_id().ok_or_else(|| {
        RpcRejection::InvalidArguments(format!(
            "argument {at} must be a node reference, got {}",
            args[at].kind()
        ))
    })
}

fn index_arg(args: &[StructuredValue], at: usize) -> Result<usize, RpcRejection> {
    args[at].as_index().ok_or_else(|| {
        RpcRejection::InvalidArguments(format!(
            "argument {at} must be a non-negative integer, got {:?}",
            args[at]
        ))
    })
}
