//! Test doubles: `MockNode` for the action contract and `ScriptedJobClient`
//! for the job orchestrator.
//!
//! Useful in unit and integration tests where a real node or backend is
//! either unavailable or irrelevant.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::credits::CreditScope;
use crate::descriptor::{BillingPolicy, NodeDescriptor};
use crate::job::{JobClient, JobError, JobHandle, PollOutcome};
use crate::resolver::{ParamKind, ParameterSpec};
use crate::signal::NodeOutput;
use crate::traits::{ExecutableNode, ExecutionContext};
use crate::NodeError;

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Charge `charge` credits, then return the given ports.
    Return { charge: u64, ports: Value },
    /// Charge `charge` credits, then fail.
    Fail { charge: u64, error: NodeError },
    /// Ask the engine to stop traversal.
    Terminate,
    Panic,
}

/// A mock node with one required `Prompt` parameter and an `Answer` port.
///
/// Records the resolved parameters of every call it receives.
pub struct MockNode {
    descriptor: NodeDescriptor,
    behaviour: MockBehaviour,
    delay: Option<Duration>,
    /// Resolved parameters seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        let descriptor = NodeDescriptor::new(name, "Mock node for tests")
            .parameter(ParameterSpec::required("Prompt", ParamKind::String))
            .output("Answer");
        Self {
            descriptor,
            behaviour,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given ports.
    pub fn returning(name: impl Into<String>, ports: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::Return { charge: 0, ports })
    }

    /// Create a mock that charges `amount` and then succeeds.
    pub fn charging(name: impl Into<String>, amount: u64, ports: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::Return { charge: amount, ports })
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, error: NodeError) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail { charge: 0, error })
    }

    /// Create a mock that charges `amount` and then fails.
    pub fn charging_then_failing(name: impl Into<String>, amount: u64, error: NodeError) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail { charge: amount, error })
    }

    pub fn terminating(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Terminate)
    }

    pub fn panicking(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Panic)
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.descriptor.base_cost = cost;
        self
    }

    pub fn with_billing(mut self, billing: BillingPolicy) -> Self {
        self.descriptor.billing = billing;
        self
    }

    pub fn with_output(mut self, port: impl Into<String>) -> Self {
        self.descriptor.outputs.push(port.into());
        self
    }

    /// Sleep this long inside `execute`, after charging.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        credits: &CreditScope,
    ) -> Result<NodeOutput, NodeError> {
        self.calls
            .lock()
            .unwrap()
            .push(Value::Object(ctx.parameters.as_map().clone()));

        match &self.behaviour {
            MockBehaviour::Return { charge, .. } | MockBehaviour::Fail { charge, .. } => {
                credits.charge(*charge);
            }
            MockBehaviour::Terminate | MockBehaviour::Panic => {}
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behaviour {
            MockBehaviour::Return { ports, .. } => {
                let mut output = NodeOutput::new();
                if let Some(ports) = ports.as_object() {
                    for (name, value) in ports {
                        output = output.with_port(name.clone(), value.clone());
                    }
                }
                Ok(output)
            }
            MockBehaviour::Fail { error, .. } => Err(error.clone()),
            MockBehaviour::Terminate => Ok(NodeOutput::new().terminate()),
            MockBehaviour::Panic => panic!("mock node asked to panic"),
        }
    }
}

/// A `JobClient` that replays a fixed script of poll results.
///
/// Once the script runs out every further poll is `Pending`.
pub struct ScriptedJobClient {
    submit: Result<JobHandle, JobError>,
    script: Mutex<VecDeque<Result<PollOutcome, JobError>>>,
    submits: Mutex<u32>,
    polls: Mutex<u32>,
}

impl ScriptedJobClient {
    pub fn new(script: Vec<Result<PollOutcome, JobError>>) -> Self {
        Self {
            submit: Ok(JobHandle::new("job-1", json!({ "id": "job-1" }))),
            script: Mutex::new(script.into()),
            submits: Mutex::new(0),
            polls: Mutex::new(0),
        }
    }

    pub fn always_pending() -> Self {
        Self::new(Vec::new())
    }

    pub fn rejecting_submit(reason: impl Into<String>) -> Self {
        Self {
            submit: Err(JobError::Transport(reason.into())),
            ..Self::always_pending()
        }
    }

    pub fn submit_count(&self) -> u32 {
        *self.submits.lock().unwrap()
    }

    pub fn poll_count(&self) -> u32 {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl JobClient for ScriptedJobClient {
    async fn submit(&self, _request: &Value) -> Result<JobHandle, JobError> {
        *self.submits.lock().unwrap() += 1;
        self.submit.clone()
    }

    async fn poll(&self, _handle: &JobHandle) -> Result<PollOutcome, JobError> {
        *self.polls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PollOutcome::Pending))
    }
}
