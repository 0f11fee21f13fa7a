//! Agent-facing wrapper around a node's action.
//!
//! A [`ToolCapability`] runs the very same [`ExecutableNode::execute`] as the
//! graph-driven path; only the parameter source differs. Structured
//! arguments are validated against the schema, then resolved as dynamic
//! candidates over the node's static config. Every call opens its own
//! [`CreditScope`](crate::CreditScope) on the enclosing meter.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::credits::CreditMeter;
use crate::resolver::{NamedValue, ParameterSpec, ResolvedParameters};
use crate::runner::{run_action, settle_failure};
use crate::traits::{Environment, ExecutableNode, ExecutionContext, InvocationMode, RuntimeMetadata};
use crate::NodeError;

/// What an agent sees before calling the tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Result of one delegated call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolReply {
    pub text: String,
    /// Meter reading right after this call settled.
    pub credits: Option<u64>,
}

struct Inner {
    node: Arc<dyn ExecutableNode>,
    schema: ToolSchema,
    static_config: Vec<NamedValue>,
    environment: Arc<Environment>,
    meter: CreditMeter,
}

/// Callable, schema-described handle on a node's action.
#[derive(Clone)]
pub struct ToolCapability {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ToolCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCapability")
            .field("name", &self.inner.schema.name)
            .field("credits", &self.inner.meter.read())
            .finish()
    }
}

impl ToolCapability {
    pub(crate) fn new(
        node: Arc<dyn ExecutableNode>,
        static_config: Vec<NamedValue>,
        environment: Arc<Environment>,
        meter: CreditMeter,
    ) -> Self {
        let descriptor = node.descriptor();
        let schema = ToolSchema {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            input_schema: descriptor.input_schema(),
        };
        Self {
            inner: Arc::new(Inner {
                node,
                schema,
                static_config,
                environment,
                meter,
            }),
        }
    }

    /// Name, description and input schema. Computed once; no side effects.
    pub fn describe(&self) -> &ToolSchema {
        &self.inner.schema
    }

    /// Meter this tool charges.
    pub fn meter(&self) -> &CreditMeter {
        &self.inner.meter
    }

    /// Run the action with agent-supplied arguments.
    ///
    /// Never fails: errors come back as `"Error: …"` text.
    #[instrument(skip_all, fields(tool = %self.inner.schema.name))]
    pub async fn invoke(&self, args: Value) -> ToolReply {
        let inner = &self.inner;
        let descriptor = inner.node.descriptor();

        let parameters = match self.prepare(args) {
            Ok(parameters) => parameters,
            Err(e) => {
                warn!(error = %e, "rejected tool call");
                return self.reply(format!("Error: {e}"));
            }
        };

        let ctx = ExecutionContext::new(
            parameters,
            inner.environment.clone(),
            RuntimeMetadata::new(&descriptor.name, InvocationMode::Delegated),
        );
        let credits = Arc::new(inner.meter.scope());

        match run_action(inner.node.clone(), ctx, credits.clone()).await {
            Ok(output) => {
                credits.charge(descriptor.base_cost);
                credits.commit();
                info!(credits = ?inner.meter.read(), "tool call succeeded");
                self.reply(output.tool_text())
            }
            Err(e) => {
                settle_failure(descriptor.billing, &credits);
                warn!(kind = e.kind(), error = %e, "tool call failed");
                self.reply(format!("Error: {e}"))
            }
        }
    }

    fn reply(&self, text: String) -> ToolReply {
        ToolReply {
            text,
            credits: self.inner.meter.read(),
        }
    }

    fn prepare(&self, args: Value) -> Result<ResolvedParameters, NodeError> {
        let specs = &self.inner.node.descriptor().parameters;
        let dynamic = validate_args(specs, args)?;
        let parameters = ResolvedParameters::resolve_all(specs, &dynamic, &self.inner.static_config);
        if !parameters.is_sufficient() {
            return Err(NodeError::MissingParameter(parameters.missing().join(", ")));
        }
        Ok(parameters)
    }
}

/// Check `args` against the parameter specs and turn it into bindings.
fn validate_args(specs: &[ParameterSpec], args: Value) -> Result<Vec<NamedValue>, NodeError> {
    let object = match args {
        Value::Object(object) => object,
        Value::Null => Default::default(),
        other => {
            return Err(NodeError::InvalidArguments(format!(
                "expected an object, got {other}"
            )))
        }
    };

    let mut bindings = Vec::with_capacity(object.len());
    for (name, value) in object {
        let spec = specs
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| NodeError::InvalidArguments(format!("unknown argument '{name}'")))?;
        if !value.is_null() && !spec.kind.accepts(&value) {
            return Err(NodeError::InvalidArguments(format!(
                "argument '{name}' must be of type {}",
                spec.kind.schema_type().unwrap_or("any")
            )));
        }
        bindings.push(NamedValue { name, value });
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BillingPolicy;
    use crate::mock::MockNode;
    use crate::runner::NodeRunner;
    use serde_json::json;
    use std::time::Duration;

    fn tool_for(node: MockNode) -> ToolCapability {
        NodeRunner::new(node)
            .unwrap()
            .tool(Vec::new(), Environment::default())
    }

    #[test]
    fn describe_is_stable() {
        let tool = tool_for(MockNode::returning("writer", json!({})));
        let first = tool.describe().clone();
        assert_eq!(tool.describe(), &first);
        assert_eq!(first.name, "writer");
        assert_eq!(first.input_schema["required"], json!(["Prompt"]));
        assert_eq!(tool.meter().read(), Some(0));
    }

    #[tokio::test]
    async fn successful_call_charges_base_and_variable_cost() {
        let tool = tool_for(MockNode::charging("writer", 4, json!({ "Answer": "ok" })).with_cost(1));

        let reply = tool.invoke(json!({ "Prompt": "hi" })).await;

        assert_eq!(reply.text, r#"{"Answer":"ok"}"#);
        assert_eq!(reply.credits, Some(5));
    }

    #[tokio::test]
    async fn failed_call_leaves_no_charge() {
        let tool = tool_for(
            MockNode::charging_then_failing("writer", 8, NodeError::VendorFailed("nope".into()))
                .with_cost(1),
        );

        let first = tool.invoke(json!({ "Prompt": "hi" })).await;
        let second = tool.invoke(json!({ "Prompt": "hi" })).await;

        assert!(first.text.starts_with("Error: "));
        assert_eq!(first.credits, Some(0));
        assert_eq!(second.credits, Some(0));
    }

    #[tokio::test]
    async fn partial_billing_commits_charges_on_failure() {
        let tool = tool_for(
            MockNode::charging_then_failing("writer", 8, NodeError::VendorFailed("nope".into()))
                .with_cost(1)
                .with_billing(BillingPolicy::Partial),
        );

        let reply = tool.invoke(json!({ "Prompt": "hi" })).await;

        assert_eq!(reply.credits, Some(8));
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_as_text() {
        let node = MockNode::returning("writer", json!({}));
        let calls = node.calls.clone();
        let tool = tool_for(node);

        let wrong_type = tool.invoke(json!({ "Prompt": 3 })).await;
        let unknown = tool.invoke(json!({ "Prompt": "x", "Bogus": 1 })).await;
        let missing = tool.invoke(json!({})).await;
        let not_object = tool.invoke(json!(["Prompt"])).await;

        for reply in [wrong_type, unknown, missing, not_object] {
            assert!(reply.text.starts_with("Error: "), "{}", reply.text);
            assert_eq!(reply.credits, Some(0));
        }
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_config_fills_omitted_arguments() {
        let node = MockNode::returning("writer", json!({}));
        let calls = node.calls.clone();
        let tool = NodeRunner::new(node)
            .unwrap()
            .tool(vec![NamedValue::new("Prompt", "configured")], Environment::default());

        tool.invoke(json!({})).await;
        tool.invoke(json!({ "Prompt": "from agent" })).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0]["Prompt"], "configured");
        assert_eq!(calls[1]["Prompt"], "from agent");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_each_charge_once() {
        let tool = tool_for(
            MockNode::charging("writer", 10, json!({ "Answer": "ok" }))
                .with_delay(Duration::from_millis(20)),
        );

        let (a, b) = tokio::join!(
            tool.invoke(json!({ "Prompt": "a" })),
            tool.invoke(json!({ "Prompt": "b" })),
        );

        assert!(!a.text.starts_with("Error"));
        assert!(!b.text.starts_with("Error"));
        assert_eq!(tool.meter().read(), Some(20));
    }
}
