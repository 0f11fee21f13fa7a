//! Engine-facing harness around node runners.
//!
//! `NodeHost` does exactly one thing per call:
//! 1. Looks the requested `node_type` up in its registry.
//! 2. Invokes the runner (or its tool) with the request's bindings.
//! 3. Reads the reserved payload keys into a [`Routing`] decision.
//!
//! Graph traversal, retries across nodes and persistence are the engine's
//! business, not the host's.

use std::collections::BTreeMap;

use nodes::{Disposition, NodeRunner, PollPolicy, ResultPayload, ToolReply, ToolSchema};
use tracing::{info, instrument};

use crate::models::{Invocation, InvocationRequest, Routing, ToolCallRequest};
use crate::HostError;

// ---------------------------------------------------------------------------
// Node registry
// ---------------------------------------------------------------------------

/// Maps `node_type` strings to node runners.
pub type NodeRegistry = BTreeMap<String, NodeRunner>;

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Interpret the reserved keys of a payload.
///
/// `terminate` overrides everything else; otherwise the default output fires
/// iff `Flow` is set and the branch is whichever flag of the pair is `true`.
pub fn routing(payload: &ResultPayload) -> Routing {
    if payload.terminate() {
        return Routing {
            halt: true,
            default_output: false,
            branch: None,
        };
    }

    let branch = payload.branch_pair().and_then(|pair| {
        [&pair.on_true, &pair.on_false]
            .into_iter()
            .find(|name| payload.branch_flag(name) == Some(true))
            .cloned()
    });

    Routing {
        halt: false,
        default_output: payload.flow(),
        branch,
    }
}

// ---------------------------------------------------------------------------
// NodeHost
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct NodeHost {
    registry: NodeRegistry,
}

impl NodeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host with every built-in node registered.
    pub fn with_builtins(policy: PollPolicy) -> Result<Self, HostError> {
        let mut host = Self::new();
        for runner in nodes::builtin::runners(policy)? {
            host.register(runner)?;
        }
        Ok(host)
    }

    /// Register a runner under its descriptor name.
    pub fn register(&mut self, runner: NodeRunner) -> Result<(), HostError> {
        let node_type = runner.descriptor().name.clone();
        if self.registry.contains_key(&node_type) {
            return Err(HostError::DuplicateNodeType(node_type));
        }
        self.registry.insert(node_type, runner);
        Ok(())
    }

    /// Registered node types, sorted.
    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }

    pub fn runner(&self, node_type: &str) -> Result<&NodeRunner, HostError> {
        self.registry
            .get(node_type)
            .ok_or_else(|| HostError::UnknownNodeType(node_type.to_owned()))
    }

    /// Tool schema of a node, as an agent would see it.
    pub fn describe(&self, node_type: &str) -> Result<ToolSchema, HostError> {
        let runner = self.runner(node_type)?;
        Ok(runner
            .tool(Vec::new(), Default::default())
            .describe()
            .clone())
    }

    /// Run one graph-driven invocation.
    ///
    /// # Errors
    /// Only [`HostError::UnknownNodeType`]; node failures are in the payload.
    #[instrument(skip(self, request), fields(node_type = %request.node_type))]
    pub async fn invoke(&self, request: &InvocationRequest) -> Result<Invocation, HostError> {
        let runner = self.runner(&request.node_type)?;
        let payload = runner
            .invoke(&request.inputs, &request.config, request.environment.clone())
            .await;
        let routing = routing(&payload);

        match payload.disposition() {
            Disposition::Failed { kind, message } => {
                info!(%kind, %message, ?routing, "node '{}' failed", request.node_type);
            }
            other => info!(disposition = ?other, ?routing, "node '{}' finished", request.node_type),
        }

        Ok(Invocation { payload, routing })
    }

    /// Run one agent-driven tool call against a fresh meter.
    #[instrument(skip(self, request), fields(node_type = %request.node_type))]
    pub async fn call_tool(&self, request: &ToolCallRequest) -> Result<ToolReply, HostError> {
        let runner = self.runner(&request.node_type)?;
        let tool = runner.tool(request.config.clone(), request.environment.clone());
        Ok(tool.invoke(request.args.clone()).await)
    }
}
