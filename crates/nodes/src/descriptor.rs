//! Static declaration of a node: parameters, ports, cost and billing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::resolver::ParameterSpec;
use crate::signal::{is_reserved, BranchPair};
use crate::ContractError;

/// What happens to charges when a call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPolicy {
    /// A failed call leaves nothing charged.
    #[default]
    AllOrNothing,
    /// Charges the action explicitly made before failing stand; the
    /// declared base cost never does.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    pub outputs: Vec<String>,
    /// Charged for every billable result.
    pub base_cost: u64,
    pub branch: Option<BranchPair>,
    pub billing: BillingPolicy,
}

impl NodeDescriptor {
    /// A descriptor with the `Success`/`Error` branch pair and no cost.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            outputs: Vec::new(),
            base_cost: 0,
            branch: Some(BranchPair::success_error()),
            billing: BillingPolicy::default(),
        }
    }

    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn output(mut self, port: impl Into<String>) -> Self {
        self.outputs.push(port.into());
        self
    }

    pub fn base_cost(mut self, cost: u64) -> Self {
        self.base_cost = cost;
        self
    }

    pub fn branch(mut self, pair: Option<BranchPair>) -> Self {
        self.branch = pair;
        self
    }

    pub fn billing(mut self, policy: BillingPolicy) -> Self {
        self.billing = policy;
        self
    }

    /// Reject declarations the engine could not route unambiguously.
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut params = HashSet::new();
        for spec in &self.parameters {
            if !params.insert(spec.name.as_str()) {
                return Err(ContractError::DuplicateParameter(spec.name.clone()));
            }
        }

        if let Some(pair) = &self.branch {
            for name in [&pair.on_true, &pair.on_false] {
                if is_reserved(name) {
                    return Err(ContractError::ReservedPort(name.clone()));
                }
            }
            if pair.on_true == pair.on_false {
                return Err(ContractError::DuplicatePort(pair.on_true.clone()));
            }
        }

        let mut ports = HashSet::new();
        for port in &self.outputs {
            let is_branch_flag = self
                .branch
                .as_ref()
                .is_some_and(|pair| *port == pair.on_true || *port == pair.on_false);
            if is_reserved(port) || is_branch_flag {
                return Err(ContractError::ReservedPort(port.clone()));
            }
            if !ports.insert(port.as_str()) {
                return Err(ContractError::DuplicatePort(port.clone()));
            }
        }
        Ok(())
    }

    /// JSON-Schema object describing the tool's structured arguments.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.parameters {
            let mut property = Map::new();
            if let Some(ty) = spec.kind.schema_type() {
                property.insert("type".into(), json!(ty));
            }
            if !spec.description.is_empty() {
                property.insert("description".into(), json!(spec.description));
            }
            if !spec.default.is_null() {
                property.insert("default".into(), spec.default.clone());
            }
            properties.insert(spec.name.clone(), Value::Object(property));
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}
