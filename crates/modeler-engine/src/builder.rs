//! Fluent builder for workflow models
//!
//! Provides a fluent API for constructing models programmatically.

use crate::error::Result;
use crate::model::{ModelInput, ModelNode, WorkflowModel};
use crate::parameters::ParameterDescriptor;
use crate::types::Point;
use crate::value::ParamBinding;

/// Fluent builder for constructing workflow models
///
/// # Example
///
/// ```ignore
/// let model = ModelBuilder::new("Roads", "Transport")
///     .add_input(distance_param, (0.0, 0.0))
///     .add_node("BUFFER_1", "qgis:fixeddistancebuffer", (200.0, 0.0))
///     .bind("DISTANCE", ParamBinding::from_input("DISTANCE"))
///     .promote("OUTPUT", "Buffered roads")
///     .build()?;
/// ```
pub struct ModelBuilder {
    name: String,
    group: String,
    inputs: Vec<ModelInput>,
    nodes: Vec<ModelNode>,
}

impl ModelBuilder {
    /// Create a new model builder
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            inputs: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Add a model input
    pub fn add_input(mut self, param: ParameterDescriptor, position: impl Into<Point>) -> Self {
        self.inputs.push(ModelInput::new(param, position));
        self
    }

    /// Add a node; an empty name is generated when the model is built
    pub fn add_node(
        mut self,
        name: impl Into<String>,
        algorithm_id: impl Into<String>,
        position: impl Into<Point>,
    ) -> Self {
        self.nodes
            .push(ModelNode::new(algorithm_id).with_name(name).at(position));
        self
    }

    /// Apply a change to the most recently added node
    fn last_node(mut self, f: impl FnOnce(ModelNode) -> ModelNode) -> Self {
        if let Some(node) = self.nodes.pop() {
            self.nodes.push(f(node));
        }
        self
    }

    /// Set the description of the most recently added node
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.last_node(|n| n.with_description(description))
    }

    /// Bind a parameter of the most recently added node
    pub fn bind(self, parameter: impl Into<String>, binding: ParamBinding) -> Self {
        self.last_node(|n| n.with_param(parameter, binding))
    }

    /// Bind a parameter of the most recently added node to null
    pub fn bind_null(self, parameter: impl Into<String>) -> Self {
        self.last_node(|n| n.with_null_param(parameter))
    }

    /// Promote an output of the most recently added node
    pub fn promote(self, output: impl Into<String>, description: impl Into<String>) -> Self {
        self.last_node(|n| n.promote_output(output, description))
    }

    /// Add an extra dependency to the most recently added node
    pub fn after(self, node: impl Into<String>) -> Self {
        self.last_node(|n| n.with_dependency(node))
    }

    /// Mark the most recently added node inactive
    pub fn inactive(self) -> Self {
        self.last_node(|mut n| {
            n.active = false;
            n
        })
    }

    /// Build the model through its mutators
    ///
    /// Fails on duplicate input or node names. References are not checked;
    /// use `validate_model` for that.
    pub fn build(self) -> Result<WorkflowModel> {
        let mut model = WorkflowModel::new(self.name, self.group);
        for input in self.inputs {
            model.add_input(input)?;
        }
        for node in self.nodes {
            model.add_node(node)?;
        }
        Ok(model)
    }
}
