//! Request and response models exchanged with the engine.
//!
//! These mirror the engine → node call: ordered `{name, value}` lists for
//! dynamic inputs and static config, plus an explicit environment.

use nodes::{Environment, NamedValue, ResultPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::HostError;

// ---------------------------------------------------------------------------
// InvocationRequest
// ---------------------------------------------------------------------------

/// One graph-driven node invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Maps to a registered node runner.
    pub node_type: String,
    /// Values supplied by upstream nodes.
    #[serde(default)]
    pub inputs: Vec<NamedValue>,
    /// Values configured on the node itself.
    #[serde(default)]
    pub config: Vec<NamedValue>,
    #[serde(default)]
    pub environment: Environment,
}

impl InvocationRequest {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            inputs: Vec::new(),
            config: Vec::new(),
            environment: Environment::default(),
        }
    }

    pub fn from_json(document: &str) -> Result<Self, HostError> {
        Ok(serde_json::from_str(document)?)
    }
}

// ---------------------------------------------------------------------------
// ToolCallRequest
// ---------------------------------------------------------------------------

/// One agent-driven call of a node's tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub node_type: String,
    /// Static config the tool falls back on for omitted arguments.
    #[serde(default)]
    pub config: Vec<NamedValue>,
    #[serde(default)]
    pub environment: Environment,
    /// Structured arguments, validated against the tool's input schema.
    #[serde(default)]
    pub args: Value,
}

impl ToolCallRequest {
    pub fn from_json(document: &str) -> Result<Self, HostError> {
        Ok(serde_json::from_str(document)?)
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// How the engine should continue past a node, read off its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Routing {
    /// Stop traversing past this node.
    pub halt: bool,
    /// Nodes wired to the default output fire.
    pub default_output: bool,
    /// Name of the branch flag that is `true`, if any.
    pub branch: Option<String>,
}

/// Result of one invocation as reported back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub payload: ResultPayload,
    pub routing: Routing,
}
