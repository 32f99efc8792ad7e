use crate::dom::{NodeKey, NodeType};
use thiserror::Error;

pub type DomResult<T> = Result<T, DomError>;

/// Failures raised by the tree mutation contract.
///
/// Every variant is raised before the tree is touched, so a failed call
/// leaves the document exactly as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomError {
    #[error("'{operation}' is not supported on a {node_type} node")]
    Unsupported {
        operation: &'static str,
        node_type: NodeType,
    },

    #[error("document already has a {node_type} child")]
    DuplicateRoot { node_type: NodeType },

    #[error("reference node is not a child of this node")]
    ReferenceNotFound,

    #[error("hierarchy request rejected: {reason}")]
    HierarchyRequest { reason: &'static str },

    #[error("'{operation}' is not implemented")]
    NotImplemented { operation: &'static str },

    #[error("node {0:?} does not belong to this document")]
    UnknownNode(NodeKey),
}

/// Failures raised by a synchronization walk.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("live node {id} was visited before its parent was mapped")]
    UnmappedParent { id: i32 },

    #[error(transparent)]
    Dom(#[from] DomError),
}
