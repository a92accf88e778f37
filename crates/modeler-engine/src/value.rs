//! Parameter bindings and run-time value resolution
//!
//! A node parameter is bound either to a literal, to a model input, to an
//! output of another node, or to an ordered sequence of those. References
//! are by name and are only resolved when the model runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelerError, Result};

/// Separator used to join the members of a multi-valued binding
pub const SEQUENCE_SEPARATOR: &str = ";";

/// Reference to a model input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueFromInput {
    pub name: String,
}

impl ValueFromInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ValueFromInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Reference to an output of another node in the same model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueFromOutput {
    pub node: String,
    pub output: String,
}

impl ValueFromOutput {
    pub fn new(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for ValueFromOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.node, self.output)
    }
}

/// Where a node parameter takes its value from
#[derive(Debug, Clone, PartialEq)]
pub enum ParamBinding {
    /// A fixed value
    Literal(Value),
    /// The run-time value of a model input
    FromInput(ValueFromInput),
    /// A value produced by another node during the same run
    FromOutput(ValueFromOutput),
    /// Several bindings joined into one value
    Sequence(Vec<ParamBinding>),
}

impl ParamBinding {
    /// Bind to a literal value
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Bind to a model input
    pub fn from_input(name: impl Into<String>) -> Self {
        Self::FromInput(ValueFromInput::new(name))
    }

    /// Bind to an output of another node
    pub fn from_output(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FromOutput(ValueFromOutput::new(node, output))
    }

    /// Bind to an ordered sequence of bindings
    pub fn sequence(items: impl IntoIterator<Item = ParamBinding>) -> Self {
        Self::Sequence(items.into_iter().collect())
    }

    /// Output references anywhere in this binding
    pub fn output_references(&self) -> Vec<&ValueFromOutput> {
        let mut refs = Vec::new();
        self.collect_output_references(&mut refs);
        refs
    }

    fn collect_output_references<'a>(&'a self, refs: &mut Vec<&'a ValueFromOutput>) {
        match self {
            Self::FromOutput(r) => refs.push(r),
            Self::Sequence(items) => {
                for item in items {
                    item.collect_output_references(refs);
                }
            }
            Self::Literal(_) | Self::FromInput(_) => {}
        }
    }

    /// Input references anywhere in this binding
    pub fn input_references(&self) -> Vec<&ValueFromInput> {
        match self {
            Self::FromInput(r) => vec![r],
            Self::Sequence(items) => items.iter().flat_map(|i| i.input_references()).collect(),
            Self::Literal(_) | Self::FromOutput(_) => Vec::new(),
        }
    }

    /// Whether this binding reads the given model input
    pub fn references_input(&self, name: &str) -> bool {
        self.input_references().iter().any(|r| r.name == name)
    }

    /// Whether this binding reads any output of the given node
    pub fn references_node(&self, name: &str) -> bool {
        self.output_references().iter().any(|r| r.node == name)
    }

    /// Resolve this binding against the values available to a run
    pub fn resolve(&self, source: &dyn ValueSource) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::FromInput(r) => source
                .input_value(&r.name)
                .ok_or_else(|| ModelerError::UnknownInput(r.name.clone())),
            Self::FromOutput(r) => source
                .output_value(&r.node, &r.output)
                .ok_or_else(|| ModelerError::UnknownNode(r.node.clone())),
            Self::Sequence(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let value = item.resolve(source)?;
                    if let Some(text) = value_as_text(&value) {
                        parts.push(text);
                    }
                }
                Ok(Value::String(parts.join(SEQUENCE_SEPARATOR)))
            }
        }
    }
}

impl From<ValueFromInput> for ParamBinding {
    fn from(r: ValueFromInput) -> Self {
        Self::FromInput(r)
    }
}

impl From<ValueFromOutput> for ParamBinding {
    fn from(r: ValueFromOutput) -> Self {
        Self::FromOutput(r)
    }
}

/// Values visible to binding resolution during a run
pub trait ValueSource {
    /// Current value of a model input, `None` if the input does not exist
    fn input_value(&self, name: &str) -> Option<Value>;

    /// Value produced by a finished node, `None` if the node has not produced results
    ///
    /// An output the node did not emit resolves to `Value::Null`.
    fn output_value(&self, node: &str, output: &str) -> Option<Value>;
}

/// Textual form of a value when joined into a sequence; nulls are dropped
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
