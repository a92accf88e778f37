//! Model validation
//!
//! Execution resolves references lazily and fails on the first problem.
//! Validation reports every structural problem up front, for an editor
//! or before saving.

use std::collections::{BTreeMap, VecDeque};

use crate::model::WorkflowModel;
use crate::registry::AlgorithmRegistry;

/// A problem found in a model
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Nodes that depend on each other in a cycle
    CycleDetected { nodes: Vec<String> },
    /// A binding reads a model input that does not exist
    UnknownInput {
        node: String,
        parameter: String,
        input: String,
    },
    /// A binding or extra dependency names a node that does not exist
    UnknownNode { node: String, target: String },
    /// A binding reads an output the algorithm does not declare
    UnknownOutput {
        node: String,
        target: String,
        output: String,
    },
    /// The node's algorithm is not registered
    UnknownAlgorithm { node: String, algorithm: String },
    /// A binding targets a parameter the algorithm does not declare
    UnknownParameter { node: String, parameter: String },
    /// A required parameter has neither a binding nor a default
    MissingRequiredParameter { node: String, parameter: String },
    /// An active node depends on an inactive one
    InactiveDependency { node: String, dependency: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected { nodes } => {
                write!(f, "Cycle detected between nodes: {}", nodes.join(", "))
            }
            Self::UnknownInput {
                node,
                parameter,
                input,
            } => write!(
                f,
                "Parameter '{}' of node '{}' reads unknown input '{}'",
                parameter, node, input
            ),
            Self::UnknownNode { node, target } => {
                write!(f, "Node '{}' references unknown node '{}'", node, target)
            }
            Self::UnknownOutput { node, target, output } => write!(
                f,
                "Node '{}' reads output '{}' which node '{}' does not produce",
                node, output, target
            ),
            Self::UnknownAlgorithm { node, algorithm } => {
                write!(f, "Unknown algorithm '{}' for node '{}'", algorithm, node)
            }
            Self::UnknownParameter { node, parameter } => {
                write!(f, "Node '{}' binds unknown parameter '{}'", node, parameter)
            }
            Self::MissingRequiredParameter { node, parameter } => {
                write!(f, "Required parameter '{}' on node '{}' has no value", parameter, node)
            }
            Self::InactiveDependency { node, dependency } => {
                write!(f, "Active node '{}' depends on inactive node '{}'", node, dependency)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a workflow model
///
/// Returns all validation errors found (not just the first).
/// Pass a registry to also check algorithms, parameters and outputs.
pub fn validate_model(
    model: &WorkflowModel,
    registry: Option<&AlgorithmRegistry>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_references(model, &mut errors);
    detect_cycles(model, &mut errors);
    validate_activation(model, &mut errors);

    if let Some(reg) = registry {
        validate_algorithms(model, reg, &mut errors);
    }

    errors
}

/// Check that every referenced input and node exists
fn validate_references(model: &WorkflowModel, errors: &mut Vec<ValidationError>) {
    for node in model.nodes().values() {
        for (parameter, binding) in node.bindings() {
            for input in binding.input_references() {
                if model.input(&input.name).is_none() {
                    errors.push(ValidationError::UnknownInput {
                        node: node.name.clone(),
                        parameter: parameter.clone(),
                        input: input.name.clone(),
                    });
                }
            }
        }
        for target in node.direct_dependencies() {
            if model.node(target).is_none() {
                errors.push(ValidationError::UnknownNode {
                    node: node.name.clone(),
                    target: target.to_string(),
                });
            }
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles(model: &WorkflowModel, errors: &mut Vec<ValidationError>) {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    for node in model.nodes().values() {
        let known = node
            .direct_dependencies()
            .into_iter()
            .filter(|d| model.node(d).is_some())
            .count();
        in_degree.insert(&node.name, known);
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();

    while let Some(name) = queue.pop_front() {
        for node in model.nodes().values() {
            if node.direct_dependencies().contains(name) {
                if let Some(deg) = in_degree.get_mut(node.name.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(&node.name);
                    }
                }
            }
        }
    }

    let remaining: Vec<String> = in_degree
        .into_iter()
        .filter(|(_, deg)| *deg > 0)
        .map(|(name, _)| name.to_string())
        .collect();
    if !remaining.is_empty() {
        errors.push(ValidationError::CycleDetected { nodes: remaining });
    }
}

/// Check that active nodes only depend on active nodes
fn validate_activation(model: &WorkflowModel, errors: &mut Vec<ValidationError>) {
    for node in model.nodes().values().filter(|n| n.active) {
        for dependency in node.direct_dependencies() {
            if model.node(dependency).is_some_and(|d| !d.active) {
                errors.push(ValidationError::InactiveDependency {
                    node: node.name.clone(),
                    dependency: dependency.to_string(),
                });
            }
        }
    }
}

/// Check algorithms, parameter names, required parameters and read outputs
fn validate_algorithms(
    model: &WorkflowModel,
    registry: &AlgorithmRegistry,
    errors: &mut Vec<ValidationError>,
) {
    for node in model.nodes().values() {
        let Some(metadata) = registry.get_metadata(&node.algorithm_id) else {
            errors.push(ValidationError::UnknownAlgorithm {
                node: node.name.clone(),
                algorithm: node.algorithm_id.clone(),
            });
            continue;
        };

        for parameter in node.params.keys() {
            if metadata.parameter(parameter).is_none() {
                errors.push(ValidationError::UnknownParameter {
                    node: node.name.clone(),
                    parameter: parameter.clone(),
                });
            }
        }

        for param in &metadata.parameters {
            if param.hidden || param.optional || !param.default.is_null() {
                continue;
            }
            let bound = node.params.get(&param.name).is_some_and(Option::is_some);
            if !bound {
                errors.push(ValidationError::MissingRequiredParameter {
                    node: node.name.clone(),
                    parameter: param.name.clone(),
                });
            }
        }

        for (_, binding) in node.bindings() {
            for reference in binding.output_references() {
                let produces = model
                    .node(&reference.node)
                    .and_then(|target| registry.get_metadata(&target.algorithm_id))
                    .map(|m| m.output(&reference.output).is_some());
                // Unknown targets are reported by the reference check
                if produces == Some(false) {
                    errors.push(ValidationError::UnknownOutput {
                        node: node.name.clone(),
                        target: reference.node.clone(),
                        output: reference.output.clone(),
                    });
                }
            }
        }
    }
}
