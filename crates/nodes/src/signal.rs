//! Result payloads and the reserved keys the engine routes on.
//!
//! A node never calls back into the engine. It hands back a flat mapping of
//! output ports plus a few reserved keys:
//!
//! | key                  | meaning                                              |
//! |----------------------|------------------------------------------------------|
//! | `Flow`               | whether nodes wired to the default output fire       |
//! | branch pair          | e.g. `Success`/`Error`; exactly one is `true`        |
//! | `terminate`          | stop traversing past this node, whatever else is set |
//! | `Credits`            | final meter reading                                  |
//! | `Tool`               | schema of the node's tool capability                 |
//!
//! The single [`Disposition`] per payload keeps "completed" and "terminate"
//! from ever being asserted together.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::tool::ToolCapability;

pub const FLOW: &str = "Flow";
pub const CREDITS: &str = "Credits";
pub const TERMINATE: &str = "terminate";
pub const TOOL: &str = "Tool";

/// `true` for keys no node may declare as an output port.
pub fn is_reserved(key: &str) -> bool {
    matches!(key, FLOW | CREDITS | TERMINATE | TOOL)
}

// ---------------------------------------------------------------------------
// BranchPair
// ---------------------------------------------------------------------------

/// Names of two mutually exclusive branch flags.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct BranchPair {
    /// Set on success, or when a condition holds.
    pub on_true: String,
    /// Set on failure, or when a condition does not hold.
    pub on_false: String,
}

impl BranchPair {
    pub fn new(on_true: impl Into<String>, on_false: impl Into<String>) -> Self {
        Self {
            on_true: on_true.into(),
            on_false: on_false.into(),
        }
    }

    pub fn success_error() -> Self {
        Self::new("Success", "Error")
    }

    pub fn true_false() -> Self {
        Self::new("True", "False")
    }
}

// ---------------------------------------------------------------------------
// NodeOutput
// ---------------------------------------------------------------------------

/// What an action returns on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    ports: Map<String, Value>,
    text: Option<String>,
    flow: Option<bool>,
    branch: Option<bool>,
    terminate: bool,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ports.insert(name.into(), value.into());
        self
    }

    /// Text handed to an agent when the node runs as a tool.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Close the default-output gate without failing.
    pub fn with_flow(mut self, flow: bool) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Pick a side of the node's branch pair (defaults to the `true` side).
    pub fn with_branch(mut self, taken: bool) -> Self {
        self.branch = Some(taken);
        self
    }

    /// Ask the engine to stop traversing past this node.
    pub fn terminate(mut self) -> Self {
        self.terminate = true;
        self
    }

    pub fn ports(&self) -> &Map<String, Value> {
        &self.ports
    }

    /// Agent-facing text: the explicit text, else the ports as JSON.
    pub fn tool_text(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => Value::Object(self.ports.clone()).to_string(),
        }
    }

    pub(crate) fn into_parts(self) -> (Map<String, Value>, Disposition) {
        let disposition = if self.terminate {
            Disposition::Terminated
        } else {
            Disposition::Completed {
                flow: self.flow.unwrap_or(true),
                branch: self.branch.unwrap_or(true),
            }
        };
        (self.ports, disposition)
    }
}

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// The one terminal disposition of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Completed { flow: bool, branch: bool },
    Failed { kind: &'static str, message: String },
    Terminated,
    /// Required input was missing; only the tool is usable.
    ToolOnly { missing: Vec<String> },
}

// ---------------------------------------------------------------------------
// ResultPayload
// ---------------------------------------------------------------------------

/// The flat mapping handed back to the engine.
#[derive(Debug, Clone)]
pub struct ResultPayload {
    ports: Map<String, Value>,
    branch: Option<BranchPair>,
    disposition: Disposition,
    credits: Option<u64>,
    tool: Option<ToolCapability>,
}

impl ResultPayload {
    /// Build a payload where every declared port is present (possibly `null`).
    pub(crate) fn assemble(
        declared: &[String],
        mut ports: Map<String, Value>,
        branch: Option<BranchPair>,
        disposition: Disposition,
        credits: Option<u64>,
        tool: Option<ToolCapability>,
    ) -> Self {
        ports.retain(|name, _| {
            let keep = declared.contains(name);
            if !keep {
                tracing::warn!(port = %name, "dropping undeclared output port");
            }
            keep
        });
        for name in declared {
            ports.entry(name.clone()).or_insert(Value::Null);
        }
        Self {
            ports,
            branch,
            disposition,
            credits,
            tool,
        }
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    /// Value of a declared output port.
    pub fn port(&self, name: &str) -> Option<&Value> {
        self.ports.get(name)
    }

    pub fn ports(&self) -> &Map<String, Value> {
        &self.ports
    }

    pub fn flow(&self) -> bool {
        matches!(self.disposition, Disposition::Completed { flow: true, .. })
    }

    pub fn terminate(&self) -> bool {
        self.disposition == Disposition::Terminated
    }

    pub fn credits(&self) -> Option<u64> {
        self.credits
    }

    pub fn tool(&self) -> Option<&ToolCapability> {
        self.tool.as_ref()
    }

    pub fn branch_pair(&self) -> Option<&BranchPair> {
        self.branch.as_ref()
    }

    /// Value of the named branch flag; `None` when the flag is not asserted
    /// either way (tool-only and terminated payloads) or unknown.
    pub fn branch_flag(&self, name: &str) -> Option<bool> {
        let pair = self.branch.as_ref()?;
        let taken = match &self.disposition {
            Disposition::Completed { branch, .. } => *branch,
            Disposition::Failed { .. } => false,
            Disposition::Terminated | Disposition::ToolOnly { .. } => return None,
        };
        if name == pair.on_true {
            Some(taken)
        } else if name == pair.on_false {
            Some(!taken)
        } else {
            None
        }
    }

    /// The payload as the engine sees it.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for ResultPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in &self.ports {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(FLOW, &self.flow())?;
        if let Some(pair) = &self.branch {
            map.serialize_entry(&pair.on_true, &self.branch_flag(&pair.on_true))?;
            map.serialize_entry(&pair.on_false, &self.branch_flag(&pair.on_false))?;
        }
        map.serialize_entry(TERMINATE, &self.terminate())?;
        map.serialize_entry(CREDITS, &self.credits)?;
        map.serialize_entry(TOOL, &self.tool.as_ref().map(ToolCapability::describe))?;
        map.end()
    }
}
