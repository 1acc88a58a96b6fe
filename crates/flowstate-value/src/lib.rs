//! flowstate-value - payload model for the flowstate state tree.
//!
//! Every property value and every RPC argument exchanged between the server
//! tree and its remote client is a [`StructuredValue`]. Node references are
//! plain [`NodeId`]s that only resolve inside the tree that issued them.

pub mod equal;
pub mod json;
pub mod node_id;
pub mod value;

// Re-exports for convenience
pub use equal::{deep_equal, deep_equal_json};
pub use json::{from_json, to_json, NODE_ID_KEY};
pub use node_id::NodeId;
pub use value::StructuredValue;
