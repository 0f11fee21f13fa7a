//! Host-level error types.

use thiserror::Error;

/// Errors produced while registering nodes or dispatching a request.
///
/// Node failures never show up here; they are encoded in the payload.
#[derive(Debug, Error)]
pub enum HostError {
    /// No runner is registered under the requested node type.
    #[error("no implementation registered for node_type '{0}'")]
    UnknownNodeType(String),

    /// Two runners share a node type.
    #[error("duplicate node_type: '{0}'")]
    DuplicateNodeType(String),

    /// A node's descriptor is not routable.
    #[error("invalid node descriptor: {0}")]
    Contract(#[from] nodes::ContractError),

    /// A request document could not be decoded.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}
