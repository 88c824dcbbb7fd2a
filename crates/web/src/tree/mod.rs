//! The dispatch tree: one node per path segment, handlers attached to the node of their
//! last segment.
//!
//! Nodes live in an arena owned by [`HandlerTree`] and are addressed by [`NodeId`]. Siblings
//! are kept sorted by [`SegmentKind`] so lookups try literals before parameters before the
//! wildcard.

mod handler_tree;
mod path_node;

pub use handler_tree::{HandlerTree, NodeId, PathMatch};
pub use path_node::{PathNode, SegmentKind};
