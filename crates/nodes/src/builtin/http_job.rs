//! Drive any submit/poll HTTP API to completion.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::credits::CreditScope;
use crate::descriptor::NodeDescriptor;
use crate::http::{HttpJobClient, HttpJobConfig};
use crate::job::{AsyncJobOrchestrator, PollPolicy};
use crate::resolver::{ParamKind, ParameterSpec};
use crate::signal::NodeOutput;
use crate::traits::{ExecutableNode, ExecutionContext};
use crate::NodeError;

/// Secret used as a bearer token when present.
pub const API_KEY_SECRET: &str = "api_key";

/// Holds no connection state: each invocation builds its own client and
/// drops it before returning.
pub struct HttpJobNode {
    descriptor: NodeDescriptor,
    policy: PollPolicy,
}

impl HttpJobNode {
    pub fn new(policy: PollPolicy) -> Self {
        let descriptor = NodeDescriptor::new(
            "http_job",
            "Submit a job to an HTTP API and wait for its result",
        )
        .parameter(
            ParameterSpec::required("SubmitUrl", ParamKind::String)
                .with_description("Endpoint that accepts the job (POST)"),
        )
        .parameter(
            ParameterSpec::required("StatusUrl", ParamKind::String)
                .with_description("Status endpoint; {id} is replaced with the job id"),
        )
        .parameter(
            ParameterSpec::optional("Body", ParamKind::Object)
                .with_default(json!({}))
                .with_description("JSON request body"),
        )
        .output("Result")
        .base_cost(10);

        Self { descriptor, policy }
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.descriptor.base_cost = cost;
        self
    }
}

#[async_trait]
impl ExecutableNode for HttpJobNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        _credits: &CreditScope,
    ) -> Result<NodeOutput, NodeError> {
        let params = &ctx.parameters;
        let mut config = HttpJobConfig::new(
            params.require_str("SubmitUrl")?,
            params.require_str("StatusUrl")?,
        );
        if let Ok(token) = ctx.environment.secret(API_KEY_SECRET) {
            config = config.with_bearer_token(token);
        }
        let body = params.get("Body").cloned().unwrap_or_else(|| json!({}));

        let client = HttpJobClient::with_timeout(config, self.policy.request_timeout)
            .map_err(|e| NodeError::Fatal(format!("cannot build HTTP client: {e}")))?;
        let orchestrator = AsyncJobOrchestrator::new(client, self.policy);
        let result: Value = orchestrator.run(&body).await?;
        info!("http job completed");

        Ok(NodeOutput::new()
            .with_text(match &result {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .with_port("Result", result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NamedValue;
    use crate::runner::NodeRunner;
    use crate::traits::Environment;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn inputs(server: &MockServer) -> Vec<NamedValue> {
        vec![
            NamedValue::new("SubmitUrl", format!("{}/v1/jobs", server.uri())),
            NamedValue::new("StatusUrl", format!("{}/v1/jobs/{{id}}", server.uri())),
            NamedValue::new("Body", json!({ "prompt": "a lighthouse" })),
        ]
    }

    fn runner() -> NodeRunner {
        NodeRunner::new(HttpJobNode::new(PollPolicy::attempts(Duration::from_millis(5), 3)))
            .unwrap()
    }

    #[tokio::test]
    async fn completed_job_fills_result_and_charges() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/jobs"))
            .and(header("authorization", "Bearer k-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "j1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/jobs/j1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "completed", "result": "https://cdn/x.png" })),
            )
            .mount(&server)
            .await;

        let env = Environment::default().with_secret(API_KEY_SECRET, "k-123");
        let payload = runner().invoke(&inputs(&server), &[], env).await;

        assert_eq!(payload.port("Result"), Some(&json!("https://cdn/x.png")));
        assert_eq!(payload.credits(), Some(10));
        assert_eq!(payload.branch_flag("Success"), Some(true));
    }

    #[tokio::test]
    async fn timed_out_job_resets_credits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "j2" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/jobs/j2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "running" })))
            .mount(&server)
            .await;

        let payload = runner()
            .invoke(&inputs(&server), &[], Environment::default())
            .await;

        assert_eq!(payload.credits(), Some(0));
        assert_eq!(payload.branch_flag("Error"), Some(true));
        assert_eq!(payload.port("Result"), Some(&Value::Null));
        assert!(matches!(
            payload.disposition(),
            crate::Disposition::Failed { kind: "timeout", .. }
        ));
    }

    #[tokio::test]
    async fn unresponsive_backend_fails_within_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/jobs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "j3" }))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        let policy = PollPolicy::attempts(Duration::from_millis(5), 3)
            .with_request_timeout(Duration::from_millis(100));
        let runner = NodeRunner::new(HttpJobNode::new(policy)).unwrap();

        let payload = tokio::time::timeout(
            Duration::from_secs(5),
            runner.invoke(&inputs(&server), &[], Environment::default()),
        )
        .await
        .expect("request timeout bounds the invocation");

        assert_eq!(payload.credits(), Some(0));
        assert!(matches!(
            payload.disposition(),
            crate::Disposition::Failed { kind: "submission_error", .. }
        ));
    }

    #[tokio::test]
    async fn missing_urls_degrade_to_tool() {
        let payload = runner().invoke(&[], &[], Environment::default()).await;

        assert_eq!(payload.credits(), Some(0));
        let tool = payload.tool().unwrap();
        assert_eq!(tool.describe().name, "http_job");
        assert_eq!(
            tool.describe().input_schema["required"],
            json!(["SubmitUrl", "StatusUrl"])
        );
    }
}
