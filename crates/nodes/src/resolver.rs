//! Parameter resolution: one effective value per declared parameter.
//!
//! Two candidate sources compete for every parameter:
//! 1. *dynamic* bindings supplied by upstream nodes at graph-execution time;
//! 2. *static* values configured on the node itself.
//!
//! A defined dynamic value always wins. Otherwise a defined static value is
//! used, otherwise the caller's fallback. "Defined" means neither `null` nor
//! the empty string. Resolution never fails; deciding whether an absent value
//! is fatal is left to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// NamedValue
// ---------------------------------------------------------------------------

/// One `{name, value}` binding as the engine hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// `true` unless the value is `null` or an empty string.
pub fn is_defined(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// First binding with the given name, in declaration order.
fn first_match<'a>(candidates: &'a [NamedValue], name: &str) -> Option<&'a Value> {
    candidates.iter().find(|c| c.name == name).map(|c| &c.value)
}

/// Resolve a single parameter.
///
/// Only the first binding per name in each list is considered; a later
/// duplicate never shadows an earlier undefined one.
pub fn resolve(
    name: &str,
    dynamic: &[NamedValue],
    static_config: &[NamedValue],
    fallback: Value,
) -> Value {
    first_match(dynamic, name)
        .filter(|v| is_defined(v))
        .or_else(|| first_match(static_config, name).filter(|v| is_defined(v)))
        .cloned()
        .unwrap_or(fallback)
}

// ---------------------------------------------------------------------------
// ParameterSpec
// ---------------------------------------------------------------------------

/// JSON type a parameter is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamKind {
    /// JSON-Schema `type` keyword, `None` for [`ParamKind::Any`].
    pub fn schema_type(self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Number => Some("number"),
            Self::Integer => Some("integer"),
            Self::Boolean => Some("boolean"),
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::Any => None,
        }
    }

    /// Whether `value` is acceptable for this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

/// Declaration of one named node parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    /// Direct execution is impossible without a value for this parameter.
    pub required: bool,
    /// Used when neither source yields a defined value.
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub description: String,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: Value::Null,
            description: String::new(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ---------------------------------------------------------------------------
// ResolvedParameters
// ---------------------------------------------------------------------------

/// Effective values of every declared parameter for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters {
    values: Map<String, Value>,
    missing: Vec<String>,
}

impl ResolvedParameters {
    /// Resolve every spec against the two sources.
    pub fn resolve_all(
        specs: &[ParameterSpec],
        dynamic: &[NamedValue],
        static_config: &[NamedValue],
    ) -> Self {
        let mut values = Map::new();
        let mut missing = Vec::new();

        for spec in specs {
            let value = resolve(&spec.name, dynamic, static_config, spec.default.clone());
            if spec.required && !is_defined(&value) {
                missing.push(spec.name.clone());
            }
            values.insert(spec.name.clone(), value);
        }

        Self { values, missing }
    }

    /// Names of required parameters that resolved to nothing.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// `true` when every required parameter is present.
    pub fn is_sufficient(&self) -> bool {
        self.missing.is_empty()
    }

    /// Raw resolved value; `None` when absent or undefined.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| is_defined(v))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Like [`get`](Self::get) but a missing value is a `MissingParameter` error.
    pub fn require(&self, name: &str) -> Result<&Value, crate::NodeError> {
        self.get(name)
            .ok_or_else(|| crate::NodeError::MissingParameter(name.to_owned()))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, crate::NodeError> {
        self.require(name)?.as_str().ok_or_else(|| {
            crate::NodeError::InvalidArguments(format!("parameter '{name}' must be a string"))
        })
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dynamic_value_outranks_static() {
        let dynamic = vec![NamedValue::new("Query", "hello")];
        let config = vec![NamedValue::new("Query", "default")];
        assert_eq!(resolve("Query", &dynamic, &config, Value::Null), json!("hello"));
    }

    #[test]
    fn undefined_dynamic_falls_through_to_static() {
        let config = vec![NamedValue::new("Query", "default")];
        for empty in [Value::Null, json!("")] {
            let dynamic = vec![NamedValue::new("Query", empty)];
            assert_eq!(resolve("Query", &dynamic, &config, Value::Null), json!("default"));
        }
    }

    #[test]
    fn absent_everywhere_yields_fallback() {
        assert_eq!(resolve("Missing", &[], &[], json!(42)), json!(42));
        assert_eq!(resolve("Missing", &[], &[], Value::Null), Value::Null);
    }

    #[test]
    fn first_declared_binding_wins() {
        let dynamic = vec![
            NamedValue::new("Query", "first"),
            NamedValue::new("Query", "second"),
        ];
        assert_eq!(resolve("Query", &dynamic, &[], Value::Null), json!("first"));
    }

    #[test]
    fn falsy_but_defined_values_are_kept() {
        let dynamic = vec![NamedValue::new("Flag", false), NamedValue::new("Count", 0)];
        let config = vec![NamedValue::new("Flag", true), NamedValue::new("Count", 7)];
        assert_eq!(resolve("Flag", &dynamic, &config, Value::Null), json!(false));
        assert_eq!(resolve("Count", &dynamic, &config, Value::Null), json!(0));
    }

    #[test]
    fn resolve_all_reports_missing_required() {
        let specs = vec![
            ParameterSpec::required("Prompt", ParamKind::String),
            ParameterSpec::optional("Temperature", ParamKind::Number).with_default(0.7),
        ];
        let resolved = ResolvedParameters::resolve_all(&specs, &[], &[]);

        assert!(!resolved.is_sufficient());
        assert_eq!(resolved.missing(), ["Prompt".to_string()]);
        assert_eq!(resolved.get("Temperature"), Some(&json!(0.7)));
        assert!(matches!(
            resolved.require("Prompt"),
            Err(crate::NodeError::MissingParameter(_))
        ));
    }

    #[test]
    fn kind_checks() {
        assert!(ParamKind::Integer.accepts(&json!(3)));
        assert!(!ParamKind::Integer.accepts(&json!(3.5)));
        assert!(ParamKind::Number.accepts(&json!(3.5)));
        assert!(ParamKind::Any.accepts(&Value::Null));
        assert!(!ParamKind::String.accepts(&json!(1)));
    }
}
