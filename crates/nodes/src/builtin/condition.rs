//! Two-way branch on a comparison.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;

use crate::credits::CreditScope;
use crate::descriptor::NodeDescriptor;
use crate::resolver::{ParamKind, ParameterSpec};
use crate::signal::{BranchPair, NodeOutput};
use crate::traits::{ExecutableNode, ExecutionContext};
use crate::NodeError;

pub struct ConditionNode {
    descriptor: NodeDescriptor,
}

impl Default for ConditionNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionNode {
    pub fn new() -> Self {
        let descriptor = NodeDescriptor::new("condition", "Route to True or False by comparing two values")
            .parameter(ParameterSpec::required("Value", ParamKind::Any))
            .parameter(ParameterSpec::optional("Expected", ParamKind::Any))
            .parameter(
                ParameterSpec::optional("Operation", ParamKind::String)
                    .with_default("equals")
                    .with_description(
                        "equals | not_equals | contains | greater_than | less_than | is_empty",
                    ),
            )
            .output("Value")
            .branch(Some(BranchPair::true_false()));
        Self { descriptor }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (left, right) {
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            _ => None,
        },
    }
}

/// Evaluate `operation` on the two operands.
pub fn evaluate(operation: &str, value: &Value, expected: &Value) -> Result<bool, NodeError> {
    let result = match operation {
        "equals" => value == expected || compare(value, expected) == Some(Ordering::Equal),
        "not_equals" => !evaluate("equals", value, expected)?,
        "contains" => match (value, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            (Value::Object(map), Value::String(key)) => map.contains_key(key),
            _ => false,
        },
        "greater_than" => compare(value, expected) == Some(Ordering::Greater),
        "less_than" => compare(value, expected) == Some(Ordering::Less),
        "is_empty" => match value {
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            other => other.is_null(),
        },
        other => {
            return Err(NodeError::InvalidArguments(format!(
                "unknown operation '{other}'"
            )))
        }
    };
    Ok(result)
}

#[async_trait]
impl ExecutableNode for ConditionNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        _credits: &CreditScope,
    ) -> Result<NodeOutput, NodeError> {
        let params = &ctx.parameters;
        let value = params.require("Value")?;
        let expected = params.get("Expected").unwrap_or(&Value::Null);
        let operation = params.get_str("Operation").unwrap_or("equals");

        let holds = evaluate(operation, value, expected)?;
        Ok(NodeOutput::new()
            .with_port("Value", value.clone())
            .with_text(holds.to_string())
            .with_branch(holds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NamedValue;
    use crate::runner::NodeRunner;
    use crate::traits::Environment;
    use serde_json::json;

    #[test]
    fn operations() {
        assert!(evaluate("equals", &json!("5"), &json!(5)).unwrap());
        assert!(evaluate("not_equals", &json!("a"), &json!("b")).unwrap());
        assert!(evaluate("contains", &json!("hello world"), &json!("world")).unwrap());
        assert!(evaluate("contains", &json!([1, 2]), &json!(2)).unwrap());
        assert!(evaluate("greater_than", &json!(10), &json!("9.5")).unwrap());
        assert!(evaluate("less_than", &json!("apple"), &json!("banana")).unwrap());
        assert!(evaluate("is_empty", &json!([]), &Value::Null).unwrap());
        assert!(!evaluate("greater_than", &json!({}), &json!(1)).unwrap());
        assert!(evaluate("matches", &json!(1), &json!(1)).is_err());
    }

    #[tokio::test]
    async fn false_comparison_takes_false_branch() {
        let runner = NodeRunner::new(ConditionNode::new()).unwrap();
        let inputs = vec![NamedValue::new("Value", 3), NamedValue::new("Expected", 4)];

        let payload = runner.invoke(&inputs, &[], Environment::default()).await;

        assert_eq!(payload.branch_flag("True"), Some(false));
        assert_eq!(payload.branch_flag("False"), Some(true));
        assert_eq!(payload.port("Value"), Some(&json!(3)));
        assert_eq!(payload.credits(), Some(0));
    }

    #[tokio::test]
    async fn unknown_operation_fails_without_branching_true() {
        let runner = NodeRunner::new(ConditionNode::new()).unwrap();
        let config = vec![
            NamedValue::new("Value", 1),
            NamedValue::new("Operation", "matches"),
        ];

        let payload = runner.invoke(&[], &config, Environment::default()).await;

        assert_eq!(payload.branch_flag("True"), Some(false));
        assert!(!payload.flow());
    }
}
