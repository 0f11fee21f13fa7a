//! `host` crate — request models, the node registry and payload routing.

pub mod error;
pub mod host;
pub mod models;

pub use error::HostError;
pub use host::{routing, NodeHost, NodeRegistry};
pub use models::{Invocation, InvocationRequest, Routing, ToolCallRequest};

#[cfg(test)]
mod host_tests;
