//! Algorithm registry for resolving the algorithms a model invokes
//!
//! A model node refers to its algorithm by id only. The registry maps each
//! id to the algorithm's metadata and to a factory that produces a fresh,
//! independent instance for every execution.
//!
//! # Usage
//!
//! ```ignore
//! use modeler_engine::{AlgorithmRegistry, AlgorithmMetadata};
//!
//! let mut registry = AlgorithmRegistry::new();
//! registry.register_fn(buffer_metadata(), |invocation, _progress| {
//!     let mut outputs = HashMap::new();
//!     let destination = invocation.destination_or("result", "/tmp/buffer.shp");
//!     outputs.insert("result".to_string(), destination);
//!     Ok(outputs)
//! });
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{ModelerError, Result};
use crate::events::Progress;
use crate::parameters::{OutputDescriptor, ParameterDescriptor};

/// Failure reported by an algorithm while running
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AlgorithmError {
    pub message: String,
}

impl AlgorithmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outputs produced by one algorithm run, keyed by output name
pub type AlgorithmOutputs = HashMap<String, Value>;

/// One executable instance of an algorithm
///
/// Instances are stateful: parameter values and output destinations are
/// set on the instance before `run` is called.
pub trait Algorithm {
    /// Declared parameters
    fn parameters(&self) -> &[ParameterDescriptor];

    /// Declared outputs
    fn outputs(&self) -> &[OutputDescriptor];

    /// Set a parameter value; `false` if the value is invalid for the parameter
    fn set_value(&mut self, name: &str, value: &Value) -> bool;

    /// Set where an output should be written, `None` for a temporary location
    fn set_output_destination(&mut self, name: &str, destination: Option<Value>);

    /// Run to completion, blocking the caller
    fn run(
        &mut self,
        progress: &Progress<'_>,
    ) -> std::result::Result<AlgorithmOutputs, AlgorithmError>;
}

/// Factory producing fresh algorithm instances
pub trait AlgorithmFactory: Send + Sync {
    fn create_algorithm(&self) -> Box<dyn Algorithm>;
}

/// Static description of an algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmMetadata {
    /// Unique id used by model nodes (e.g. "qgis:fixeddistancebuffer")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Group for listing
    pub group: String,
    /// Declared parameters
    pub parameters: Vec<ParameterDescriptor>,
    /// Declared outputs
    pub outputs: Vec<OutputDescriptor>,
}

impl AlgorithmMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group: String::new(),
            parameters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Set the group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Add a parameter declaration
    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Add an output declaration
    pub fn with_output(mut self, output: OutputDescriptor) -> Self {
        self.outputs.push(output);
        self
    }

    /// Find a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Find an output by name
    pub fn output(&self, name: &str) -> Option<&OutputDescriptor> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// A registration entry combining metadata with an optional factory
struct RegistryEntry {
    metadata: AlgorithmMetadata,
    factory: Option<Arc<dyn AlgorithmFactory>>,
}

/// Registry of algorithms keyed by id
pub struct AlgorithmRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl AlgorithmRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an algorithm with metadata and a factory
    pub fn register(&mut self, metadata: AlgorithmMetadata, factory: Arc<dyn AlgorithmFactory>) {
        self.entries.insert(
            metadata.id.clone(),
            RegistryEntry {
                metadata,
                factory: Some(factory),
            },
        );
    }

    /// Register an algorithm backed by a closure
    ///
    /// Each created instance validates and stores its own parameter values,
    /// then hands them to the callback when run.
    pub fn register_fn<F>(&mut self, metadata: AlgorithmMetadata, callback: F)
    where
        F: Fn(&Invocation, &Progress<'_>) -> std::result::Result<AlgorithmOutputs, AlgorithmError>
            + Send
            + Sync
            + 'static,
    {
        let factory = Arc::new(FnAlgorithmFactory {
            metadata: Arc::new(metadata.clone()),
            callback: Arc::new(callback),
        });
        self.register(metadata, factory);
    }

    /// Register an algorithm with metadata only (no factory)
    ///
    /// Enough for editing and validating models, not for running them.
    pub fn register_metadata(&mut self, metadata: AlgorithmMetadata) {
        self.entries.insert(
            metadata.id.clone(),
            RegistryEntry {
                metadata,
                factory: None,
            },
        );
    }

    /// Get metadata for an algorithm
    pub fn get_metadata(&self, id: &str) -> Option<&AlgorithmMetadata> {
        self.entries.get(id).map(|e| &e.metadata)
    }

    /// Get all registered metadata
    pub fn all_metadata(&self) -> Vec<&AlgorithmMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }

    /// Get metadata grouped by algorithm group
    pub fn metadata_by_group(&self) -> HashMap<&str, Vec<&AlgorithmMetadata>> {
        let mut grouped: HashMap<&str, Vec<&AlgorithmMetadata>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.metadata.group.as_str())
                .or_default()
                .push(&entry.metadata);
        }
        grouped
    }

    /// Create a fresh instance of an algorithm
    pub fn create(&self, id: &str) -> Result<Box<dyn Algorithm>> {
        self.entries
            .get(id)
            .and_then(|e| e.factory.as_ref())
            .map(|f| f.create_algorithm())
            .ok_or_else(|| ModelerError::UnknownAlgorithm(id.to_string()))
    }

    /// Check if an algorithm is registered
    pub fn has_algorithm(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// List all registered algorithm ids
    pub fn algorithm_ids(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same id.
    pub fn merge(&mut self, other: AlgorithmRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameter values and output destinations handed to a closure-backed algorithm
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub values: HashMap<String, Value>,
    pub destinations: HashMap<String, Option<Value>>,
}

impl Invocation {
    /// Value set for a parameter, `Value::Null` if unset
    pub fn value(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Destination requested for an output, or `fallback` for temporary outputs
    pub fn destination_or(&self, name: &str, fallback: impl Into<Value>) -> Value {
        self.destinations
            .get(name)
            .cloned()
            .flatten()
            .unwrap_or_else(|| fallback.into())
    }
}

type AlgorithmCallback = dyn Fn(
        &Invocation,
        &Progress<'_>,
    ) -> std::result::Result<AlgorithmOutputs, AlgorithmError>
    + Send
    + Sync;

/// Closure-backed algorithm instance
pub struct FnAlgorithm {
    metadata: Arc<AlgorithmMetadata>,
    invocation: Invocation,
    callback: Arc<AlgorithmCallback>,
}

impl Algorithm for FnAlgorithm {
    fn parameters(&self) -> &[ParameterDescriptor] {
        &self.metadata.parameters
    }

    fn outputs(&self) -> &[OutputDescriptor] {
        &self.metadata.outputs
    }

    fn set_value(&mut self, name: &str, value: &Value) -> bool {
        let Some(param) = self.metadata.parameter(name) else {
            return false;
        };
        match param.validate(value) {
            Some(coerced) => {
                self.invocation.values.insert(name.to_string(), coerced);
                true
            }
            None => {
                self.invocation.values.insert(name.to_string(), value.clone());
                false
            }
        }
    }

    fn set_output_destination(&mut self, name: &str, destination: Option<Value>) {
        self.invocation.destinations.insert(name.to_string(), destination);
    }

    fn run(
        &mut self,
        progress: &Progress<'_>,
    ) -> std::result::Result<AlgorithmOutputs, AlgorithmError> {
        (self.callback)(&self.invocation, progress)
    }
}

/// Factory that builds a new FnAlgorithm per request
struct FnAlgorithmFactory {
    metadata: Arc<AlgorithmMetadata>,
    callback: Arc<AlgorithmCallback>,
}

impl AlgorithmFactory for FnAlgorithmFactory {
    fn create_algorithm(&self) -> Box<dyn Algorithm> {
        Box::new(FnAlgorithm {
            metadata: self.metadata.clone(),
            invocation: Invocation::default(),
            callback: self.callback.clone(),
        })
    }
}
