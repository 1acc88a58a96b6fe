//! Server-side UI state tree and its client synchronization protocol.
//!
//! The tree lives in one session, is mutated by application code and by
//! inbound RPC calls, and reports its changes to the remote client as ordered
//! [`DiffBatch`]es.

pub mod change;
pub mod collect;
pub mod config;
pub mod error;
pub mod feature;
pub mod mirror;
pub mod node;
pub mod rpc;
pub mod session;
pub mod tree;

pub use change::{Change, DiffBatch};
pub use config::{ConfigError, SessionConfig};
pub use error::{CollectError, TreeError};
pub use feature::{
    ClientUpdateMode, Feature, FeatureKind, FeatureSet, ListOp, NodeList, PropertyChange,
    PropertyFilter, PropertyMap,
};
pub use flowstate_value::{deep_equal, NodeId, StructuredValue};
pub use mirror::{MirrorError, MirrorTree};
pub use node::StateNode;
pub use rpc::{RpcDispatcher, RpcInvocation, RpcRejection};
pub use session::{
    BatchReport, RpcBatch, Session, SessionCloser, SessionError, MAX_SESSION_ID, MIN_SESSION_ID,
};
pub use tree::{ModelListHandle, NodeHandle, NodeListHandle, PropertyMapHandle, StateTree};
