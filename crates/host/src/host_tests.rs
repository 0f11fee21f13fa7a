//! Tests for the node host.
//!
//! These use `MockNode` and the built-in nodes, so no external service is
//! required. HTTP-backed behaviour is covered in the `nodes` crate with
//! wiremock.

use serde_json::{json, Value};

use nodes::mock::MockNode;
use nodes::{NamedValue, NodeError, NodeRunner, PollPolicy};

use crate::{routing, HostError, InvocationRequest, NodeHost, ToolCallRequest};

fn host_with(runners: Vec<NodeRunner>) -> NodeHost {
    let mut host = NodeHost::new();
    for runner in runners {
        host.register(runner).expect("unique node types");
    }
    host
}

fn request(node_type: &str, inputs: Vec<NamedValue>) -> InvocationRequest {
    InvocationRequest {
        inputs,
        ..InvocationRequest::new(node_type)
    }
}

// ============================================================
// Registry
// ============================================================

#[test]
fn builtins_are_registered_once() {
    let host = NodeHost::with_builtins(PollPolicy::default()).expect("valid builtins");
    let types: Vec<&str> = host.node_types().collect();
    assert_eq!(types, vec!["condition", "http_job", "intercept"]);
}

#[test]
fn duplicate_node_type_is_rejected() {
    let mut host = NodeHost::new();
    host.register(NodeRunner::new(MockNode::returning("echo", json!({}))).unwrap())
        .unwrap();
    let err = host
        .register(NodeRunner::new(MockNode::returning("echo", json!({}))).unwrap())
        .unwrap_err();
    assert!(matches!(err, HostError::DuplicateNodeType(name) if name == "echo"));
}

#[tokio::test]
async fn unknown_node_type_is_an_error() {
    let host = NodeHost::new();
    let err = host.invoke(&request("nope", Vec::new())).await.unwrap_err();
    assert!(matches!(err, HostError::UnknownNodeType(_)));
}

// ============================================================
// Invocation and routing
// ============================================================

#[tokio::test]
async fn successful_invocation_routes_to_default_and_success() {
    let host = host_with(vec![NodeRunner::new(
        MockNode::returning("writer", json!({ "Answer": "42" })).with_cost(3),
    )
    .unwrap()]);

    let invocation = host
        .invoke(&request("writer", vec![NamedValue::new("Prompt", "q")]))
        .await
        .expect("registered");

    assert!(invocation.routing.default_output);
    assert!(!invocation.routing.halt);
    assert_eq!(invocation.routing.branch.as_deref(), Some("Success"));
    assert_eq!(invocation.payload.to_value()["Credits"], 3);
}

#[tokio::test]
async fn failed_invocation_routes_to_error_branch_only() {
    let host = host_with(vec![NodeRunner::new(
        MockNode::charging_then_failing("writer", 10, NodeError::Fatal("boom".into())),
    )
    .unwrap()]);

    let invocation = host
        .invoke(&request("writer", vec![NamedValue::new("Prompt", "q")]))
        .await
        .unwrap();

    assert!(!invocation.routing.default_output);
    assert_eq!(invocation.routing.branch.as_deref(), Some("Error"));
    assert_eq!(invocation.payload.credits(), Some(0));
}

#[tokio::test]
async fn tool_only_payload_blocks_everything() {
    let host = host_with(vec![NodeRunner::new(
        MockNode::returning("writer", json!({})).with_cost(5),
    )
    .unwrap()]);

    let invocation = host.invoke(&request("writer", Vec::new())).await.unwrap();
    let value = invocation.payload.to_value();

    assert_eq!(
        invocation.routing,
        crate::Routing {
            halt: false,
            default_output: false,
            branch: None,
        }
    );
    assert_eq!(value["Credits"], 0);
    assert_eq!(value["Answer"], Value::Null);
    assert_eq!(value["Tool"]["name"], "writer");
    assert_eq!(value["Tool"]["inputSchema"]["required"], json!(["Prompt"]));
}

#[tokio::test]
async fn intercepted_handshake_halts() {
    let host = NodeHost::with_builtins(PollPolicy::default()).unwrap();

    let invocation = host
        .invoke(&request("intercept", vec![NamedValue::new("Message", "/start")]))
        .await
        .unwrap();

    assert!(invocation.routing.halt);
    assert!(routing(&invocation.payload).halt);
    assert_eq!(invocation.payload.to_value()["terminate"], true);
}

#[tokio::test]
async fn condition_routes_by_branch() {
    let host = NodeHost::with_builtins(PollPolicy::default()).unwrap();
    let document = r#"{
        "node_type": "condition",
        "inputs": [{ "name": "Value", "value": "hello world" }],
        "config": [
            { "name": "Expected", "value": "world" },
            { "name": "Operation", "value": "contains" }
        ]
    }"#;

    let invocation = host
        .invoke(&InvocationRequest::from_json(document).unwrap())
        .await
        .unwrap();

    assert_eq!(invocation.routing.branch.as_deref(), Some("True"));
    assert!(invocation.routing.default_output);
}

// ============================================================
// Delegated calls
// ============================================================

#[tokio::test]
async fn tool_call_uses_args_over_config() {
    let host = NodeHost::with_builtins(PollPolicy::default()).unwrap();
    let call = ToolCallRequest::from_json(
        r#"{
            "node_type": "condition",
            "config": [{ "name": "Expected", "value": 5 }],
            "args": { "Value": 7, "Operation": "greater_than" }
        }"#,
    )
    .unwrap();

    let reply = host.call_tool(&call).await.unwrap();

    assert_eq!(reply.text, "true");
    assert_eq!(reply.credits, Some(0));
}

#[test]
fn describe_matches_tool_schema() {
    let host = NodeHost::with_builtins(PollPolicy::default()).unwrap();
    let schema = host.describe("intercept").unwrap();
    assert_eq!(schema.name, "intercept");
    assert_eq!(schema, host.describe("intercept").unwrap());
    assert!(host.describe("nope").is_err());
}

#[test]
fn malformed_request_is_rejected() {
    assert!(matches!(
        InvocationRequest::from_json(r#"{ "inputs": [] }"#),
        Err(HostError::InvalidRequest(_))
    ));
}
