//! Inbound remote calls.
//!
//! An invocation names a node, a feature by wire id, an operation and its
//! arguments. Dispatch resolves the node and the feature, parses the
//! operation into a fully validated command and only then applies it, so a
//! rejected invocation never leaves a partial mutation behind.
//!
//! | Feature        | Operation | Arguments                  |
//! |----------------|-----------|----------------------------|
//! | property map   | `set`     | `[key, value]`             |
//! | property map   | `remove`  | `[key]`                    |
//! | child list     | `move`    | `[child, index]`           |
//! | child list     | `remove`  | `[child]`                  |
//! | model list     | `add`     | `[index, properties]`      |
//! | model list     | `move`    | `[item, index]`            |
//! | model list     | `remove`  | `[item]`                   |

mod handlers;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use flowstate_value::StructuredValue;

use crate::error::TreeError;
use crate::feature::FeatureKind;
use crate::tree::StateTree;
use crate::NodeId;

use handlers::Command;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcInvocation {
    pub node: NodeId,
    /// Wire id of the target feature.
    pub feature: u8,
    pub operation: String,
    #[serde(default)]
    pub args: Vec<StructuredValue>,
}

impl RpcInvocation {
    pub fn new(
        node: NodeId,
        feature: FeatureKind,
        operation: impl Into<String>,
        args: Vec<StructuredValue>,
    ) -> Self {
        Self {
            node,
            feature: feature.id(),
            operation: operation.into(),
            args,
        }
    }
}

/// Why an invocation was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcRejection {
    #[error("node {0} is not part of the tree")]
    UnknownNode(NodeId),
    #[error("node {node} has no feature with id {feature}")]
    UnsupportedFeature { node: NodeId, feature: u8 },
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("property {key:?} of node {node} does not accept client updates")]
    UpdateDenied { node: NodeId, key: String },
}

impl RpcRejection {
    /// Rejections caused by the remote side acting on a stale view.
    pub fn is_benign(&self) -> bool {
        matches!(self, RpcRejection::UnknownNode(_) | RpcRejection::UpdateDenied { .. })
    }
}

impl From<TreeError> for RpcRejection {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::UnknownNode(id) => RpcRejection::UnknownNode(id),
            TreeError::UnsupportedFeature { node, feature } => RpcRejection::UnsupportedFeature {
                node,
                feature: feature.id(),
            },
            other => RpcRejection::InvalidArguments(other.to_string()),
        }
    }
}

/// Applies invocations to a tree.
#[derive(Debug, Clone, Copy)]
pub struct RpcDispatcher {
    suppress_echo: bool,
}

impl Default for RpcDispatcher {
    fn default() -> Self {
        Self { suppress_echo: true }
    }
}

impl RpcDispatcher {
    pub fn new(suppress_echo: bool) -> Self {
        Self { suppress_echo }
    }

    pub fn suppresses_echo(&self) -> bool {
        self.suppress_echo
    }

    pub fn dispatch(&self, tree: &mut StateTree, invocation: &RpcInvocation) -> Result<(), RpcRejection> {
        let result = self.try_dispatch(tree, invocation);
        match &result {
            Ok(()) => trace!(
                node = %invocation.node,
                feature = invocation.feature,
                operation = %invocation.operation,
                "rpc applied"
            ),
            Err(err @ RpcRejection::InvalidArguments(_)) => warn!(
                node = %invocation.node,
                feature = invocation.feature,
                operation = %invocation.operation,
                %err,
                "rpc rejected"
            ),
            Err(err) => debug!(
                node = %invocation.node,
                feature = invocation.feature,
                operation = %invocation.operation,
                %err,
                "rpc rejected"
            ),
        }
        result
    }

    fn try_dispatch(&self, tree: &mut StateTree, invocation: &RpcInvocation) -> Result<(), RpcRejection> {
        let node = tree
            .node(invocation.node)
            .ok_or(RpcRejection::UnknownNode(invocation.node))?;
        let kind = FeatureKind::from_id(invocation.feature)
            .filter(|k| node.supports(*k))
            .ok_or(RpcRejection::UnsupportedFeature {
                node: invocation.node,
                feature: invocation.feature,
            })?;
        let command = Command::parse(kind, &invocation.operation, &invocation.args)?;
        command.apply(tree, invocation.node, self.suppress_echo)
    }
}
