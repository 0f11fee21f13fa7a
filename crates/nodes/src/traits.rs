//! The `ExecutableNode` trait — the contract every node must fulfil.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Span;
use uuid::Uuid;

use crate::credits::CreditScope;
use crate::descriptor::NodeDescriptor;
use crate::resolver::ResolvedParameters;
use crate::signal::NodeOutput;
use crate::NodeError;

/// Secrets and configuration handed in explicitly by the engine.
///
/// Nodes never read process-wide environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Environment {
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    pub fn secret(&self, name: &str) -> Result<&str, NodeError> {
        self.secrets
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| NodeError::MissingSecret(name.to_owned()))
    }
}

/// Which entry point produced the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    /// Graph-driven, parameters resolved from engine inputs.
    Direct,
    /// Agent-driven through a [`ToolCapability`](crate::ToolCapability).
    Delegated,
}

#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
    pub invocation_id: Uuid,
    pub node: String,
    pub mode: InvocationMode,
    pub started_at: DateTime<Utc>,
}

impl RuntimeMetadata {
    pub fn new(node: impl Into<String>, mode: InvocationMode) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            node: node.into(),
            mode,
            started_at: Utc::now(),
        }
    }
}

/// Everything one run of an action may read.
///
/// Built fresh per run and never shared between runs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub parameters: ResolvedParameters,
    pub environment: Arc<Environment>,
    pub metadata: RuntimeMetadata,
    span: Span,
}

impl ExecutionContext {
    pub fn new(
        parameters: ResolvedParameters,
        environment: Arc<Environment>,
        metadata: RuntimeMetadata,
    ) -> Self {
        let span = tracing::info_span!(
            "node_run",
            node = %metadata.node,
            invocation_id = %metadata.invocation_id,
            mode = ?metadata.mode,
        );
        Self {
            parameters,
            environment,
            metadata,
            span,
        }
    }

    /// Span every event of this run is recorded under.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// The core node trait.
///
/// One implementation serves both the graph-driven and the agent-driven
/// entry point; only where the parameters came from differs.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    fn descriptor(&self) -> &NodeDescriptor;

    /// Run the action. Variable cost is charged on `credits`; whether it
    /// sticks is decided by the caller once the outcome is known.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        credits: &CreditScope,
    ) -> Result<NodeOutput, NodeError>;
}
