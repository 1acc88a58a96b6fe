//! Structural equality for structured values.
//!
//! The property map relies on these checks to skip redundant writes.

mod deep_equal;

pub use deep_equal::{deep_equal, deep_equal_json};
