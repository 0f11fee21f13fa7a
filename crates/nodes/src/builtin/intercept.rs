//! Stop the graph on bot handshake messages such as `/start`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::credits::CreditScope;
use crate::descriptor::NodeDescriptor;
use crate::resolver::{ParamKind, ParameterSpec};
use crate::signal::NodeOutput;
use crate::traits::{ExecutableNode, ExecutionContext};
use crate::NodeError;

pub struct InterceptNode {
    descriptor: NodeDescriptor,
}

impl Default for InterceptNode {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptNode {
    pub fn new() -> Self {
        let descriptor = NodeDescriptor::new(
            "intercept",
            "Pass a message on unless it is a handshake command",
        )
        .parameter(ParameterSpec::required("Message", ParamKind::String))
        .parameter(
            ParameterSpec::optional("Prefixes", ParamKind::Array)
                .with_default(json!(["/start"]))
                .with_description("Messages starting with any of these stop the graph"),
        )
        .output("Message")
        .branch(None);
        Self { descriptor }
    }
}

#[async_trait]
impl ExecutableNode for InterceptNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        _credits: &CreditScope,
    ) -> Result<NodeOutput, NodeError> {
        let message = ctx.parameters.require_str("Message")?;
        let intercepted = ctx
            .parameters
            .get("Prefixes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .any(|prefix| message.trim_start().starts_with(prefix));

        let output = NodeOutput::new().with_port("Message", message);
        if intercepted {
            tracing::info!("handshake intercepted, terminating");
            return Ok(output.with_text("intercepted").terminate());
        }
        Ok(output)
    }
}
