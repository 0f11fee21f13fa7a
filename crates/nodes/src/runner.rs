//! Per-invocation composition: resolve → {tool-only, direct} → payload.
//!
//! ```text
//! Resolving ──missing required──▶ ToolOnly   (meter reset, Tool returned)
//!     │
//!     └──────sufficient─────────▶ Direct ──ok──▶ Succeeded
//!                                   └──err──▶ Failed (meter reset, error branch)
//! ```
//!
//! `invoke` never fails: every path ends in a well-formed [`ResultPayload`].

use std::sync::Arc;

use serde_json::Map;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn, Instrument};

use crate::credits::{CreditMeter, CreditScope};
use crate::descriptor::{BillingPolicy, NodeDescriptor};
use crate::resolver::{NamedValue, ResolvedParameters};
use crate::signal::{Disposition, NodeOutput, ResultPayload};
use crate::tool::ToolCapability;
use crate::traits::{Environment, ExecutableNode, ExecutionContext, InvocationMode, RuntimeMetadata};
use crate::{ContractError, NodeError};

/// Aborts the wrapped task if the caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run an action on its own task so a panic surfaces as `Fatal` instead of
/// unwinding through the caller.
pub(crate) async fn run_action(
    node: Arc<dyn ExecutableNode>,
    ctx: ExecutionContext,
    credits: Arc<CreditScope>,
) -> Result<NodeOutput, NodeError> {
    let span = ctx.span().clone();
    let mut task = AbortOnDrop(tokio::spawn(
        async move { node.execute(&ctx, &credits).await }.instrument(span),
    ));

    match (&mut task.0).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(NodeError::Fatal("action panicked".into())),
        Err(e) => Err(NodeError::Fatal(format!("action task did not complete: {e}"))),
    }
}

/// Settle the scope of a failed run according to the node's billing policy.
pub(crate) fn settle_failure(billing: BillingPolicy, credits: &CreditScope) {
    match billing {
        BillingPolicy::AllOrNothing => credits.discard(),
        BillingPolicy::Partial => {
            credits.commit();
        }
    }
}

/// Wraps one node implementation and drives its invocations.
#[derive(Clone)]
pub struct NodeRunner {
    node: Arc<dyn ExecutableNode>,
}

impl std::fmt::Debug for NodeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRunner")
            .field("node", &self.descriptor().name)
            .finish()
    }
}

impl NodeRunner {
    /// Wrap a node after checking its descriptor.
    pub fn new<N: ExecutableNode + 'static>(node: N) -> Result<Self, ContractError> {
        Self::from_arc(Arc::new(node))
    }

    pub fn from_arc(node: Arc<dyn ExecutableNode>) -> Result<Self, ContractError> {
        node.descriptor().validate()?;
        Ok(Self { node })
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        self.node.descriptor()
    }

    /// A standalone tool with its own meter starting at 0.
    pub fn tool(&self, static_config: Vec<NamedValue>, environment: Environment) -> ToolCapability {
        ToolCapability::new(
            self.node.clone(),
            static_config,
            Arc::new(environment),
            CreditMeter::new(0),
        )
    }

    /// Run one graph-driven invocation.
    #[instrument(skip_all, fields(node = %self.descriptor().name))]
    pub async fn invoke(
        &self,
        dynamic: &[NamedValue],
        static_config: &[NamedValue],
        environment: Environment,
    ) -> ResultPayload {
        let descriptor = self.node.descriptor();
        let environment = Arc::new(environment);
        let meter = CreditMeter::new(descriptor.base_cost);
        let tool = ToolCapability::new(
            self.node.clone(),
            static_config.to_vec(),
            environment.clone(),
            meter.clone(),
        );

        let parameters =
            ResolvedParameters::resolve_all(&descriptor.parameters, dynamic, static_config);
        if !parameters.is_sufficient() {
            meter.reset();
            info!(missing = ?parameters.missing(), "insufficient input, returning tool only");
            return self.payload(
                Map::new(),
                Disposition::ToolOnly {
                    missing: parameters.missing().to_vec(),
                },
                &meter,
                tool,
            );
        }

        let ctx = ExecutionContext::new(
            parameters,
            environment,
            RuntimeMetadata::new(&descriptor.name, InvocationMode::Direct),
        );
        let credits = Arc::new(meter.scope());

        match run_action(self.node.clone(), ctx, credits.clone()).await {
            Ok(output) => {
                credits.commit();
                let (ports, disposition) = output.into_parts();
                info!(?disposition, credits = ?meter.read(), "node succeeded");
                self.payload(ports, disposition, &meter, tool)
            }
            Err(NodeError::MissingParameter(missing)) => {
                credits.discard();
                meter.reset();
                info!(%missing, "action reported missing input, returning tool only");
                self.payload(
                    Map::new(),
                    Disposition::ToolOnly {
                        missing: vec![missing],
                    },
                    &meter,
                    tool,
                )
            }
            Err(e) => {
                meter.reset();
                settle_failure(descriptor.billing, &credits);
                warn!(kind = e.kind(), error = %e, credits = ?meter.read(), "node failed");
                self.payload(
                    Map::new(),
                    Disposition::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                    &meter,
                    tool,
                )
            }
        }
    }

    fn payload(
        &self,
        ports: Map<String, serde_json::Value>,
        disposition: Disposition,
        meter: &CreditMeter,
        tool: ToolCapability,
    ) -> ResultPayload {
        let descriptor = self.node.descriptor();
        ResultPayload::assemble(
            &descriptor.outputs,
            ports,
            descriptor.branch.clone(),
            disposition,
            meter.read(),
            Some(tool),
        )
    }
}
