//! Workflow model: a DAG of algorithm invocations
//!
//! A model owns two separate namespaces: model inputs, referenced by
//! `ValueFromInput`, and nodes, referenced by `ValueFromOutput` and by the
//! explicit extra-dependency lists. Edges are implicit in parameter
//! bindings, so every structural query walks the bindings.
//!
//! Structure only changes through the mutators below. Each mutator keeps
//! references intact: a node or input that something still depends on
//! cannot be removed.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{ModelerError, Result};
use crate::parameters::{OutputKind, ParameterDescriptor};
use crate::registry::AlgorithmRegistry;
use crate::types::{default_output_position, InputName, NodeName, Point};
use crate::value::{value_as_text, ParamBinding};

/// Default name of a new model
pub const DEFAULT_MODEL_NAME: &str = "Model";

/// Prefix of the command-line name of models loaded from a file
pub const COMMAND_PREFIX: &str = "modeler:";

/// A model input: a parameter descriptor and its canvas position
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub param: ParameterDescriptor,
    pub position: Point,
}

impl ModelInput {
    pub fn new(param: ParameterDescriptor, position: impl Into<Point>) -> Self {
        Self {
            param,
            position: position.into(),
        }
    }

    /// Input name (the parameter name)
    pub fn name(&self) -> &str {
        &self.param.name
    }
}

/// A node output promoted to an output of the whole model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Description shown for the model-level output
    pub description: String,
    /// Canvas position, assigned when the node is updated if absent
    pub position: Option<Point>,
}

impl ModelOutput {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            position: None,
        }
    }
}

/// One invocation of an algorithm inside a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    /// Unique name within the model; empty until the node is added
    pub name: NodeName,
    /// Id of the algorithm in the registry
    pub algorithm_id: String,
    /// Human-readable description
    pub description: String,
    /// Parameter bindings; `None` is an explicit null
    pub params: BTreeMap<String, Option<ParamBinding>>,
    /// Promoted outputs keyed by algorithm output name
    pub outputs: BTreeMap<String, ModelOutput>,
    /// Nodes that must run first even without a data reference
    pub dependencies: BTreeSet<NodeName>,
    /// Canvas position
    pub position: Option<Point>,
    pub params_folded: bool,
    pub outputs_folded: bool,
    /// Whether this node takes part in execution
    pub active: bool,
}

impl ModelNode {
    /// Create an unnamed node invoking the given algorithm
    pub fn new(algorithm_id: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            algorithm_id: algorithm_id.into(),
            description: String::new(),
            params: BTreeMap::new(),
            outputs: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            position: None,
            params_folded: true,
            outputs_folded: true,
            active: true,
        }
    }

    /// Set an explicit name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Bind a parameter
    pub fn with_param(mut self, name: impl Into<String>, binding: ParamBinding) -> Self {
        self.params.insert(name.into(), Some(binding));
        self
    }

    /// Bind a parameter to an explicit null
    pub fn with_null_param(mut self, name: impl Into<String>) -> Self {
        self.params.insert(name.into(), None);
        self
    }

    /// Promote an output to a model output
    pub fn promote_output(
        mut self,
        output: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.outputs.insert(output.into(), ModelOutput::new(description));
        self
    }

    /// Add an extra dependency
    pub fn with_dependency(mut self, node: impl Into<String>) -> Self {
        self.dependencies.insert(node.into());
        self
    }

    /// Set the canvas position
    pub fn at(mut self, position: impl Into<Point>) -> Self {
        self.position = Some(position.into());
        self
    }

    /// Bindings that are not explicit nulls
    pub fn bindings(&self) -> impl Iterator<Item = (&String, &ParamBinding)> {
        self.params
            .iter()
            .filter_map(|(name, binding)| binding.as_ref().map(|b| (name, b)))
    }

    /// Nodes this node depends on directly, through bindings or extra dependencies
    pub fn direct_dependencies(&self) -> BTreeSet<&str> {
        let mut deps: BTreeSet<&str> = self.dependencies.iter().map(String::as_str).collect();
        for (_, binding) in self.bindings() {
            deps.extend(binding.output_references().into_iter().map(|r| r.node.as_str()));
        }
        deps
    }

    /// Whether this node reads any output of `node` or lists it as a dependency
    pub fn depends_directly_on(&self, node: &str) -> bool {
        self.dependencies.contains(node) || self.bindings().any(|(_, b)| b.references_node(node))
    }

    /// Whether this node reads the model input `input`
    pub fn reads_input(&self, input: &str) -> bool {
        self.bindings().any(|(_, b)| b.references_input(input))
    }
}

/// A promoted output as seen from outside the model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutputInfo {
    /// Model-level output name (`<output>_ALG<node>`)
    pub name: String,
    pub node: NodeName,
    pub output: String,
    pub description: String,
}

/// Model-level name of a promoted node output
pub fn safe_output_name(node: &str, output: &str) -> String {
    format!("{}_ALG{}", output, node)
}

/// A workflow model
#[derive(Debug, Clone)]
pub struct WorkflowModel {
    /// Model name
    pub name: String,
    /// Group used when listing models
    pub group: String,
    pub(crate) nodes: BTreeMap<NodeName, ModelNode>,
    pub(crate) inputs: BTreeMap<InputName, ModelInput>,
    source_path: Option<PathBuf>,
    modified: bool,
}

impl Default for WorkflowModel {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_NAME, "")
    }
}

impl WorkflowModel {
    /// Create an empty model
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            nodes: BTreeMap::new(),
            inputs: BTreeMap::new(),
            source_path: None,
            modified: false,
        }
    }

    /// All nodes keyed by name
    pub fn nodes(&self) -> &BTreeMap<NodeName, ModelNode> {
        &self.nodes
    }

    /// Find a node by name
    pub fn node(&self, name: &str) -> Option<&ModelNode> {
        self.nodes.get(name)
    }

    /// All inputs keyed by name
    pub fn inputs(&self) -> &BTreeMap<InputName, ModelInput> {
        &self.inputs
    }

    /// Find an input by name
    pub fn input(&self, name: &str) -> Option<&ModelInput> {
        self.inputs.get(name)
    }

    /// Parameters the model accepts when run
    pub fn parameters(&self) -> Vec<&ParameterDescriptor> {
        self.inputs.values().map(|i| &i.param).collect()
    }

    /// Promoted outputs of active nodes
    pub fn model_outputs(&self) -> Vec<ModelOutputInfo> {
        self.nodes
            .values()
            .filter(|n| n.active)
            .flat_map(|n| {
                n.outputs.iter().map(move |(output, promoted)| ModelOutputInfo {
                    name: safe_output_name(&n.name, output),
                    node: n.name.clone(),
                    output: output.clone(),
                    description: promoted.description.clone(),
                })
            })
            .collect()
    }

    /// File the model was loaded from or saved to
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn set_source_path(&mut self, path: Option<PathBuf>) {
        self.source_path = path;
    }

    /// Command-line name, available only for models backed by a file
    pub fn command_line_name(&self) -> Option<String> {
        let stem = self.source_path.as_deref()?.file_stem()?.to_str()?;
        Some(format!("{}{}", COMMAND_PREFIX, stem.to_lowercase()))
    }

    /// Whether the structure changed since the last save or load
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Clear the modified flag
    pub fn mark_saved(&mut self) {
        self.modified = false;
    }

    // -----------------------------------------------------------------------
    // Dependency queries
    // -----------------------------------------------------------------------

    /// Transitive set of nodes `name` depends on
    ///
    /// Follows output references and extra dependencies. References to
    /// nodes missing from the model are reported but not expanded. A cycle
    /// is reported as `DependencyDeadlock` naming the nodes on the cycle.
    pub fn depends_on(&self, name: &str) -> Result<BTreeSet<NodeName>> {
        if !self.nodes.contains_key(name) {
            return Err(ModelerError::UnknownNode(name.to_string()));
        }
        let mut found = BTreeSet::new();
        let mut path = Vec::new();
        self.collect_dependencies(name, &mut found, &mut path)?;
        Ok(found)
    }

    fn collect_dependencies<'a>(
        &'a self,
        name: &'a str,
        found: &mut BTreeSet<NodeName>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        let Some(node) = self.nodes.get(name) else {
            return Ok(());
        };
        path.push(name);
        for dep in node.direct_dependencies() {
            if let Some(start) = path.iter().position(|p| *p == dep) {
                return Err(ModelerError::deadlock(path[start..].iter().copied()));
            }
            if found.insert(dep.to_string()) {
                self.collect_dependencies(dep, found, path)?;
            }
        }
        path.pop();
        Ok(())
    }

    /// Transitive set of nodes depending on `name`, including `name` itself
    pub fn dependents(&self, name: &str) -> BTreeSet<NodeName> {
        let mut found = BTreeSet::from([name.to_string()]);
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            for (other, node) in &self.nodes {
                if node.depends_directly_on(&current) && found.insert(other.clone()) {
                    queue.push_back(other.clone());
                }
            }
        }
        found
    }

    /// Whether any node references `name`, as an input or as a node
    pub fn has_dependents(&self, name: &str) -> bool {
        self.input_has_dependents(name) || self.node_has_dependents(name)
    }

    /// Whether any node reads the model input `name`
    pub fn input_has_dependents(&self, name: &str) -> bool {
        self.nodes.values().any(|n| n.reads_input(name))
    }

    /// Whether any node reads an output of, or explicitly depends on, node `name`
    pub fn node_has_dependents(&self, name: &str) -> bool {
        self.nodes.values().any(|n| n.depends_directly_on(name))
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Add a model input
    pub fn add_input(&mut self, input: ModelInput) -> Result<()> {
        if self.inputs.contains_key(input.name()) {
            return Err(ModelerError::DuplicateName(input.name().to_string()));
        }
        self.inputs.insert(input.name().to_string(), input);
        self.modified = true;
        Ok(())
    }

    /// Replace the descriptor of an existing input, keeping its position
    pub fn update_input(&mut self, param: ParameterDescriptor) -> Result<()> {
        let input = self
            .inputs
            .get_mut(&param.name)
            .ok_or_else(|| ModelerError::UnknownInput(param.name.clone()))?;
        input.param = param;
        self.modified = true;
        Ok(())
    }

    /// Remove an input; `false` if it is still referenced or does not exist
    pub fn remove_input(&mut self, name: &str) -> bool {
        if self.input_has_dependents(name) {
            log::debug!("Refusing to remove input '{}': still referenced", name);
            return false;
        }
        let removed = self.inputs.remove(name).is_some();
        self.modified |= removed;
        removed
    }

    /// Name a new node of the given algorithm would receive
    pub fn node_name_for(&self, algorithm_id: &str) -> NodeName {
        let base = algorithm_id.to_uppercase().replace(':', "");
        let mut i = 1;
        loop {
            let name = format!("{}_{}", base, i);
            if !self.nodes.contains_key(&name) {
                return name;
            }
            i += 1;
        }
    }

    /// Add a node, naming it if it has no name yet; returns the final name
    pub fn add_node(&mut self, mut node: ModelNode) -> Result<NodeName> {
        if node.name.is_empty() {
            node.name = self.node_name_for(&node.algorithm_id);
        } else if self.nodes.contains_key(&node.name) {
            return Err(ModelerError::DuplicateName(node.name));
        }
        let name = node.name.clone();
        self.nodes.insert(name.clone(), node);
        self.modified = true;
        Ok(name)
    }

    /// Replace an existing node's definition
    ///
    /// The stored position is kept. Promoted outputs without a position are
    /// stacked to the right of the node.
    pub fn update_node(&mut self, mut node: ModelNode) -> Result<()> {
        let existing = self
            .nodes
            .get(&node.name)
            .ok_or_else(|| ModelerError::UnknownNode(node.name.clone()))?;
        node.position = existing.position;
        let origin = node.position.unwrap_or_default();
        for (i, output) in node.outputs.values_mut().enumerate() {
            if output.position.is_none() {
                output.position = Some(default_output_position(origin, i));
            }
        }
        self.nodes.insert(node.name.clone(), node);
        self.modified = true;
        Ok(())
    }

    /// Remove a node; `false` if others depend on it or it does not exist
    pub fn remove_node(&mut self, name: &str) -> bool {
        if self.node_has_dependents(name) {
            log::debug!("Refusing to remove node '{}': other nodes depend on it", name);
            return false;
        }
        let removed = self.nodes.remove(name).is_some();
        self.modified |= removed;
        removed
    }

    /// Activate a node if everything it depends on is active
    pub fn activate_node(&mut self, name: &str) -> bool {
        let Ok(parents) = self.depends_on(name) else {
            return false;
        };
        let all_active = parents
            .iter()
            .all(|p| self.nodes.get(p).is_some_and(|n| n.active));
        if !all_active {
            return false;
        }
        match self.nodes.get_mut(name) {
            Some(node) => {
                node.active = true;
                self.modified = true;
                true
            }
            None => false,
        }
    }

    /// Deactivate a node and everything that depends on it
    pub fn deactivate_node(&mut self, name: &str) {
        for dependent in self.dependents(name) {
            if let Some(node) = self.nodes.get_mut(&dependent) {
                node.active = false;
                self.modified = true;
            }
        }
    }

    /// Update canvas positions of inputs, nodes and promoted outputs
    ///
    /// Names that are not in the model are ignored.
    pub fn set_positions(
        &mut self,
        inputs: &HashMap<String, Point>,
        nodes: &HashMap<String, Point>,
        outputs: &HashMap<String, HashMap<String, Point>>,
    ) {
        for (name, pos) in inputs {
            if let Some(input) = self.inputs.get_mut(name) {
                input.position = *pos;
            }
        }
        for (name, pos) in nodes {
            if let Some(node) = self.nodes.get_mut(name) {
                node.position = Some(*pos);
            }
        }
        for (name, positions) in outputs {
            let Some(node) = self.nodes.get_mut(name) else {
                continue;
            };
            for (output, pos) in positions {
                if let Some(promoted) = node.outputs.get_mut(output) {
                    promoted.position = Some(*pos);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Editing helpers
    // -----------------------------------------------------------------------

    /// Nodes that `node` may list as extra dependencies
    ///
    /// Every node except `node` and the nodes depending on it; all nodes
    /// when `node` is `None` (a node not yet added).
    pub fn available_dependencies(&self, node: Option<&str>) -> Vec<&str> {
        let excluded = node.map(|n| self.dependents(n)).unwrap_or_default();
        self.nodes
            .keys()
            .filter(|n| !excluded.contains(*n))
            .map(String::as_str)
            .collect()
    }

    /// Bindings that could feed a parameter of `node`
    ///
    /// Inputs whose parameter type is in `input_types`, then, when output
    /// kinds are given, outputs of non-dependent nodes of a matching kind.
    /// Output kinds come from registry metadata.
    pub fn available_values(
        &self,
        input_types: &[&str],
        output_kinds: &[OutputKind],
        node: Option<&str>,
        registry: &AlgorithmRegistry,
    ) -> Vec<ParamBinding> {
        let mut values: Vec<ParamBinding> = self
            .inputs
            .values()
            .filter(|i| input_types.contains(&i.param.kind.type_name()))
            .map(|i| ParamBinding::from_input(i.name()))
            .collect();
        if output_kinds.is_empty() {
            return values;
        }
        for name in self.available_dependencies(node) {
            let Some(metadata) = self
                .nodes
                .get(name)
                .and_then(|n| registry.get_metadata(&n.algorithm_id))
            else {
                continue;
            };
            values.extend(
                metadata
                    .outputs
                    .iter()
                    .filter(|o| !o.hidden && output_kinds.contains(&o.kind))
                    .map(|o| ParamBinding::from_output(name, &o.name)),
            );
        }
        values
    }

    /// Human-readable description of a binding
    pub fn describe_value(&self, binding: &ParamBinding, registry: &AlgorithmRegistry) -> String {
        match binding {
            ParamBinding::Literal(value) => value_as_text(value).unwrap_or_default(),
            ParamBinding::FromInput(r) => self
                .inputs
                .get(&r.name)
                .map(|i| i.param.description.clone())
                .unwrap_or_else(|| r.name.clone()),
            ParamBinding::FromOutput(r) => {
                let node = self.nodes.get(&r.node);
                let output = node
                    .and_then(|n| registry.get_metadata(&n.algorithm_id))
                    .and_then(|m| m.output(&r.output))
                    .map(|o| o.description.as_str())
                    .unwrap_or(&r.output);
                let node_description = node
                    .map(|n| n.description.as_str())
                    .filter(|d| !d.is_empty())
                    .unwrap_or(&r.node);
                format!("'{}' from algorithm '{}'", output, node_description)
            }
            ParamBinding::Sequence(items) => items
                .iter()
                .map(|i| self.describe_value(i, registry))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Default value of an input, used when a run does not supply one
    pub fn input_default(&self, name: &str) -> Option<Value> {
        self.inputs.get(name).map(|i| i.param.default.clone())
    }
}
