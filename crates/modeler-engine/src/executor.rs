//! Model execution
//!
//! Runs the active nodes of a model in dependency order. The executor
//! repeatedly scans the pending nodes and runs every node whose
//! dependencies have all finished. A pass that runs nothing while nodes
//! are still pending is a deadlock: a cycle, or a reference to a node that
//! is inactive or absent.
//!
//! The model is only borrowed. Algorithm instances and per-node results
//! live in an execution context that is dropped when the run ends, so a
//! failed run leaves nothing behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::error::{ModelerError, Result};
use crate::events::{EventSink, ExecutionEvent, NullEventSink, Progress};
use crate::model::{safe_output_name, ModelNode, WorkflowModel};
use crate::registry::{Algorithm, AlgorithmOutputs, AlgorithmRegistry};
use crate::types::NodeName;
use crate::value::ValueSource;

/// Execution state of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Done,
    Failed,
}

/// Values supplied to one run of a model
#[derive(Debug, Clone, Default)]
pub struct RunParameters {
    /// Model input values keyed by input name
    pub inputs: HashMap<String, Value>,
    /// Destinations keyed by model output name (`<output>_ALG<node>`)
    pub destinations: HashMap<String, Value>,
}

impl RunParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a model input
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Set the destination of a model output
    pub fn with_destination(
        mut self,
        output: impl Into<String>,
        destination: impl Into<Value>,
    ) -> Self {
        self.destinations.insert(output.into(), destination.into());
        self
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ModelRunResult {
    pub execution_id: String,
    /// Nodes in the order they ran
    pub order: Vec<NodeName>,
    /// Outputs produced by each node
    pub node_outputs: BTreeMap<NodeName, AlgorithmOutputs>,
    /// Promoted outputs keyed by model output name
    pub outputs: BTreeMap<String, Value>,
}

impl ModelRunResult {
    /// Output value of a node, `None` if the node did not run or emit it
    pub fn node_output(&self, node: &str, output: &str) -> Option<&Value> {
        self.node_outputs.get(node)?.get(output)
    }
}

/// Transient state of one run
///
/// Algorithm instances are cached by node name. An instance is created on
/// first use and stays in the cache for the rest of the run: parameter
/// resolution, value binding and execution all go through the cached
/// instance. The cache is dropped with the context, so nothing carries
/// over to the next run or onto the model.
pub(crate) struct ExecutionContext<'m> {
    model: &'m WorkflowModel,
    run: &'m RunParameters,
    states: BTreeMap<NodeName, NodeState>,
    instances: HashMap<NodeName, Box<dyn Algorithm>>,
    results: BTreeMap<NodeName, AlgorithmOutputs>,
    order: Vec<NodeName>,
}

impl<'m> ExecutionContext<'m> {
    fn new(model: &'m WorkflowModel, run: &'m RunParameters) -> Self {
        let states = model
            .nodes()
            .values()
            .filter(|n| n.active)
            .map(|n| (n.name.clone(), NodeState::Pending))
            .collect();
        Self {
            model,
            run,
            states,
            instances: HashMap::new(),
            results: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// State of a node; inactive and absent nodes have none
    pub fn state(&self, node: &str) -> Option<NodeState> {
        self.states.get(node).copied()
    }

    fn set_state(&mut self, node: &str, state: NodeState) {
        self.states.insert(node.to_string(), state);
    }

    fn is_done(&self, node: &str) -> bool {
        self.state(node) == Some(NodeState::Done)
    }

    fn pending(&self) -> Vec<NodeName> {
        self.states
            .iter()
            .filter(|(_, s)| **s == NodeState::Pending)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Cached algorithm instance for a node, created from the registry on
    /// first use
    fn instance(
        &mut self,
        node: &ModelNode,
        registry: &AlgorithmRegistry,
    ) -> Result<&mut Box<dyn Algorithm>> {
        if !self.instances.contains_key(&node.name) {
            log::debug!("Creating instance of {} for {}", node.algorithm_id, node.name);
            let instance = registry.create(&node.algorithm_id)?;
            self.instances.insert(node.name.clone(), instance);
        }
        self.instances
            .get_mut(&node.name)
            .ok_or_else(|| ModelerError::UnknownNode(node.name.clone()))
    }
}

impl ValueSource for ExecutionContext<'_> {
    fn input_value(&self, name: &str) -> Option<Value> {
        // Run values for names the model does not declare are ignored
        self.model.input(name)?;
        let default = self.model.input_default(name);
        match self.run.inputs.get(name) {
            Some(value) if !value.is_null() => Some(value.clone()),
            Some(_) => Some(default.unwrap_or(Value::Null)),
            None => default,
        }
    }

    fn output_value(&self, node: &str, output: &str) -> Option<Value> {
        self.results
            .get(node)
            .map(|outputs| outputs.get(output).cloned().unwrap_or(Value::Null))
    }
}

/// Runs workflow models against an algorithm registry
///
/// # Example
///
/// ```ignore
/// let result = ModelExecutor::new(&registry)
///     .with_event_sink(Arc::new(sink))
///     .run(&model, &RunParameters::new().with_input("A", 10))?;
/// ```
pub struct ModelExecutor<'r> {
    registry: &'r AlgorithmRegistry,
    event_sink: Arc<dyn EventSink>,
    execution_id: Option<String>,
    max_passes: usize,
}

impl<'r> ModelExecutor<'r> {
    pub fn new(registry: &'r AlgorithmRegistry) -> Self {
        Self {
            registry,
            event_sink: Arc::new(NullEventSink),
            execution_id: None,
            max_passes: usize::MAX,
        }
    }

    /// Send execution events to the given sink
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Use a fixed execution id instead of a random one
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Abort with a deadlock after this many scheduling passes
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Run every active node of the model
    pub fn run(&self, model: &WorkflowModel, params: &RunParameters) -> Result<ModelRunResult> {
        let execution_id = self
            .execution_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let start = Instant::now();
        let mut ctx = ExecutionContext::new(model, params);
        let total = ctx.states.len();

        log::info!(
            "Running model '{}' ({} active nodes, execution {})",
            model.name,
            total,
            execution_id
        );
        self.emit(ExecutionEvent::ModelStarted {
            model: model.name.clone(),
            execution_id: execution_id.clone(),
            node_count: total,
        });

        if let Err(e) = self.execute(&mut ctx, &execution_id) {
            log::warn!("Model '{}' failed: {}", model.name, e);
            self.emit(ExecutionEvent::ModelFailed {
                model: model.name.clone(),
                execution_id,
                error: e.to_string(),
            });
            return Err(e);
        }

        let outputs = model
            .model_outputs()
            .into_iter()
            .map(|info| {
                let value = ctx.output_value(&info.node, &info.output).unwrap_or(Value::Null);
                (info.name, value)
            })
            .collect();

        let elapsed = start.elapsed().as_millis() as u64;
        log::info!("Model '{}' processed OK in {} ms", model.name, elapsed);
        self.emit(ExecutionEvent::ModelCompleted {
            model: model.name.clone(),
            execution_id: execution_id.clone(),
            executed: ctx.order.len(),
            execution_time_ms: elapsed,
        });

        Ok(ModelRunResult {
            execution_id,
            order: ctx.order,
            node_outputs: ctx.results,
            outputs,
        })
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>, execution_id: &str) -> Result<()> {
        let model = ctx.model;
        let total = ctx.states.len();
        let mut passes = 0;

        loop {
            let pending = ctx.pending();
            if pending.is_empty() {
                return Ok(());
            }
            if passes >= self.max_passes {
                log::warn!("Giving up after {} scheduling passes", passes);
                return Err(ModelerError::deadlock(pending));
            }
            passes += 1;

            let mut progressed = false;
            for name in &pending {
                // A cycle makes the node permanently unready
                let ready = model
                    .depends_on(name)
                    .map(|deps| deps.iter().all(|d| ctx.is_done(d)))
                    .unwrap_or(false);
                if !ready {
                    continue;
                }
                let Some(node) = model.node(name) else {
                    continue;
                };

                let index = ctx.order.len() + 1;
                if let Err(e) = self.run_node(ctx, node, index, total, execution_id) {
                    ctx.set_state(name, NodeState::Failed);
                    self.emit(ExecutionEvent::NodeFailed {
                        node: name.clone(),
                        execution_id: execution_id.to_string(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
                progressed = true;
            }

            if !progressed {
                let pending = ctx.pending();
                log::warn!("No runnable node among {}", pending.join(", "));
                return Err(ModelerError::deadlock(pending));
            }
        }
    }

    fn run_node(
        &self,
        ctx: &mut ExecutionContext<'_>,
        node: &ModelNode,
        index: usize,
        total: usize,
        execution_id: &str,
    ) -> Result<()> {
        ctx.set_state(&node.name, NodeState::Running);
        let description = self.node_description(node);
        log::info!("Prepare algorithm: {}", node.name);
        self.emit(ExecutionEvent::NodeStarted {
            node: node.name.clone(),
            execution_id: execution_id.to_string(),
            description: description.clone(),
            index,
            total,
        });

        self.prepare(ctx, node)?;

        log::info!("Running {} [{}/{}]", description, index, total);
        let start = Instant::now();
        let progress = Progress::new(self.event_sink.as_ref(), &node.name, execution_id);
        let outputs = ctx
            .instance(node, self.registry)?
            .run(&progress)
            .map_err(|e| ModelerError::DelegateExecutionFailure {
                node: node.name.clone(),
                description: description.clone(),
                message: e.message,
            })?;
        let elapsed = start.elapsed().as_millis() as u64;
        log::info!("OK. Execution took {} ms ({} outputs)", elapsed, outputs.len());

        self.emit(ExecutionEvent::NodeCompleted {
            node: node.name.clone(),
            execution_id: execution_id.to_string(),
            elapsed_ms: elapsed,
            output_count: outputs.len(),
        });
        ctx.results.insert(node.name.clone(), outputs);
        ctx.order.push(node.name.clone());
        ctx.set_state(&node.name, NodeState::Done);
        Ok(())
    }

    /// Resolve parameter values and bind output destinations on the node's
    /// cached instance
    fn prepare(&self, ctx: &mut ExecutionContext<'_>, node: &ModelNode) -> Result<()> {
        let instance = ctx.instance(node, self.registry)?;
        let parameters = instance.parameters().to_vec();
        let outputs = instance.outputs().to_vec();

        let mut values = Vec::new();
        for param in parameters.into_iter().filter(|p| !p.hidden) {
            let value = match node.params.get(&param.name).and_then(Option::as_ref) {
                Some(binding) => binding.resolve(&*ctx)?,
                None => Value::Null,
            };
            log::debug!("Parameter {} = {}", param.name, value);
            values.push((param, value));
        }

        let destinations: Vec<_> = outputs
            .iter()
            .filter(|o| !o.hidden)
            .map(|output| {
                let destination = if node.outputs.contains_key(&output.name) {
                    ctx.run
                        .destinations
                        .get(&safe_output_name(&node.name, &output.name))
                        .cloned()
                } else {
                    None
                };
                (output.name.clone(), destination)
            })
            .collect();

        let instance = ctx.instance(node, self.registry)?;
        for (param, value) in values {
            if !instance.set_value(&param.name, &value) && !param.kind.is_data_object() {
                return Err(ModelerError::InvalidParameterValue {
                    node: node.name.clone(),
                    parameter: param.name,
                    value: value.to_string(),
                });
            }
        }
        for (output, destination) in destinations {
            instance.set_output_destination(&output, destination);
        }
        Ok(())
    }

    fn node_description(&self, node: &ModelNode) -> String {
        if !node.description.is_empty() {
            return node.description.clone();
        }
        self.registry
            .get_metadata(&node.algorithm_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| node.algorithm_id.clone())
    }

    fn emit(&self, event: ExecutionEvent) {
        let _ = self.event_sink.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use crate::events::VecEventSink;
    use crate::model::{ModelInput, ModelNode};
    use crate::parameters::{OutputDescriptor, OutputKind, ParameterDescriptor, ParameterKind};
    use crate::registry::{AlgorithmError, AlgorithmFactory, AlgorithmMetadata};
    use crate::value::ParamBinding;

    fn number() -> ParameterKind {
        ParameterKind::Number {
            min: Some(0.0),
            max: None,
            integer: false,
        }
    }

    fn registry() -> AlgorithmRegistry {
        let mut registry = AlgorithmRegistry::new();
        registry.register_fn(
            AlgorithmMetadata::new("test:buffer", "Buffer")
                .with_parameter(ParameterDescriptor::new("distance", "Distance", number()))
                .with_parameter(
                    ParameterDescriptor::new("input", "Input layer", ParameterKind::Vector)
                        .optional(),
                )
                .with_output(OutputDescriptor::new("result", "Buffered", OutputKind::Vector)),
            |invocation, progress| {
                progress.set_percentage(0.5);
                let mut outputs = AlgorithmOutputs::new();
                outputs.insert(
                    "result".to_string(),
                    invocation.destination_or("result", "/tmp/buffer.shp"),
                );
                outputs.insert("distance".to_string(), invocation.value("distance"));
                Ok(outputs)
            },
        );
        registry.register_fn(
            AlgorithmMetadata::new("test:stats", "Statistics")
                .with_parameter(ParameterDescriptor::new("layer", "Layer", ParameterKind::Vector))
                .with_output(OutputDescriptor::new("table", "Table", OutputKind::Table)),
            |invocation, _| {
                let mut outputs = AlgorithmOutputs::new();
                outputs.insert("table".to_string(), invocation.value("layer"));
                Ok(outputs)
            },
        );
        registry.register_fn(AlgorithmMetadata::new("test:fail", "Always fails"), |_, _| {
            Err(AlgorithmError::new("disk full"))
        });
        registry
    }

    type CallLog = Arc<Mutex<Vec<(usize, &'static str)>>>;

    /// Algorithm that logs which instance each call reaches
    struct Tracked {
        id: usize,
        log: CallLog,
        parameters: Vec<ParameterDescriptor>,
    }

    impl Algorithm for Tracked {
        fn parameters(&self) -> &[ParameterDescriptor] {
            &self.parameters
        }

        fn outputs(&self) -> &[OutputDescriptor] {
            &[]
        }

        fn set_value(&mut self, _name: &str, _value: &Value) -> bool {
            self.log.lock().unwrap().push((self.id, "set"));
            true
        }

        fn set_output_destination(&mut self, _name: &str, _destination: Option<Value>) {}

        fn run(
            &mut self,
            _progress: &Progress<'_>,
        ) -> std::result::Result<AlgorithmOutputs, AlgorithmError> {
            self.log.lock().unwrap().push((self.id, "run"));
            Ok(AlgorithmOutputs::new())
        }
    }

    struct TrackedFactory {
        created: Arc<AtomicUsize>,
        log: CallLog,
    }

    impl AlgorithmFactory for TrackedFactory {
        fn create_algorithm(&self) -> Box<dyn Algorithm> {
            Box::new(Tracked {
                id: self.created.fetch_add(1, Ordering::SeqCst),
                log: self.log.clone(),
                parameters: vec![ParameterDescriptor::new("value", "Value", number())],
            })
        }
    }

    fn model() -> WorkflowModel {
        let mut model = WorkflowModel::default();
        model
            .add_input(ModelInput::new(
                ParameterDescriptor::new("A", "Distance", number()),
                (0.0, 0.0),
            ))
            .unwrap();
        model
            .add_node(
                ModelNode::new("test:buffer")
                    .with_name("BUFFER_1")
                    .with_param("distance", ParamBinding::from_input("A")),
            )
            .unwrap();
        model
            .add_node(
                ModelNode::new("test:stats")
                    .with_name("STATS_1")
                    .with_param("layer", ParamBinding::from_output("BUFFER_1", "result"))
                    .promote_output("table", "Statistics"),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_runs_in_dependency_order() {
        let registry = registry();
        let params = RunParameters::new()
            .with_input("A", 10)
            .with_destination("table_ALGSTATS_1", "/out/stats.csv");
        let result = ModelExecutor::new(&registry).run(&model(), &params).unwrap();

        assert_eq!(result.order, vec!["BUFFER_1", "STATS_1"]);
        assert_eq!(result.node_output("BUFFER_1", "distance"), Some(&json!(10.0)));
        assert_eq!(result.node_output("STATS_1", "table"), Some(&json!("/tmp/buffer.shp")));
        assert_eq!(result.outputs["table_ALGSTATS_1"], json!("/tmp/buffer.shp"));
    }

    #[test]
    fn test_input_default_used_when_not_supplied() {
        let registry = registry();
        let mut model = model();
        model
            .update_input(ParameterDescriptor::new("A", "Distance", number()).with_default(3))
            .unwrap();
        let result = ModelExecutor::new(&registry)
            .run(&model, &RunParameters::new())
            .unwrap();
        assert_eq!(result.node_output("BUFFER_1", "distance"), Some(&json!(3.0)));
    }

    #[test]
    fn test_run_value_for_undeclared_input_is_rejected() {
        let registry = registry();
        let mut model = WorkflowModel::default();
        model
            .add_node(
                ModelNode::new("test:buffer")
                    .with_name("BUF_1")
                    .with_param("distance", ParamBinding::from_input("NOT_AN_INPUT")),
            )
            .unwrap();

        let err = ModelExecutor::new(&registry)
            .run(&model, &RunParameters::new().with_input("NOT_AN_INPUT", 7))
            .unwrap_err();
        assert!(matches!(err, ModelerError::UnknownInput(ref name) if name == "NOT_AN_INPUT"));
    }

    #[test]
    fn test_invalid_parameter_value() {
        let registry = registry();
        let err = ModelExecutor::new(&registry)
            .run(&model(), &RunParameters::new().with_input("A", -5))
            .unwrap_err();
        match err {
            ModelerError::InvalidParameterValue { node, parameter, value } => {
                assert_eq!(node, "BUFFER_1");
                assert_eq!(parameter, "distance");
                assert_eq!(value, "-5");
            }
            other => panic!("Expected InvalidParameterValue, got {:?}", other),
        }
    }

    #[test]
    fn test_data_object_rejection_does_not_abort() {
        let registry = registry();
        let mut model = WorkflowModel::default();
        // An empty path is rejected by the vector kind but tolerated
        model
            .add_node(
                ModelNode::new("test:stats")
                    .with_name("STATS_1")
                    .with_param("layer", ParamBinding::literal("")),
            )
            .unwrap();
        let result = ModelExecutor::new(&registry)
            .run(&model, &RunParameters::new())
            .unwrap();
        assert_eq!(result.order, vec!["STATS_1"]);
    }

    #[test]
    fn test_delegate_failure_aborts_run() {
        let registry = registry();
        let mut model = model();
        model
            .add_node(
                ModelNode::new("test:fail")
                    .with_name("FAIL_1")
                    .with_description("Broken step")
                    .with_dependency("BUFFER_1"),
            )
            .unwrap();

        let sink = Arc::new(VecEventSink::new());
        let err = ModelExecutor::new(&registry)
            .with_event_sink(sink.clone())
            .with_execution_id("exec-1")
            .run(&model, &RunParameters::new().with_input("A", 1))
            .unwrap_err();
        assert_eq!(err.to_string(), "Error executing algorithm Broken step\ndisk full");

        let events = sink.events();
        assert!(events.contains(&ExecutionEvent::NodeFailed {
            node: "FAIL_1".to_string(),
            execution_id: "exec-1".to_string(),
            error: err.to_string(),
        }));
        assert!(matches!(events.last(), Some(ExecutionEvent::ModelFailed { .. })));
    }

    #[test]
    fn test_inactive_nodes_are_skipped() {
        let registry = registry();
        let mut model = model();
        model.deactivate_node("BUFFER_1");

        let result = ModelExecutor::new(&registry)
            .run(&model, &RunParameters::new().with_input("A", 1))
            .unwrap();
        assert!(result.order.is_empty());
        assert!(result.outputs.is_empty());
    }

    #[test]
    fn test_active_node_reading_inactive_node_deadlocks() {
        let registry = registry();
        let mut model = model();
        let mut stats = model.node("STATS_1").unwrap().clone();
        model.deactivate_node("BUFFER_1");
        stats.active = true;
        model.update_node(stats).unwrap();

        let err = ModelExecutor::new(&registry)
            .run(&model, &RunParameters::new().with_input("A", 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelerError::DependencyDeadlock { ref pending } if pending == &["STATS_1".to_string()]
        ));
    }

    #[test]
    fn test_missing_reference_deadlocks() {
        let registry = registry();
        let mut model = WorkflowModel::default();
        model
            .add_node(
                ModelNode::new("test:stats")
                    .with_name("STATS_1")
                    .with_param("layer", ParamBinding::from_output("GONE_1", "result")),
            )
            .unwrap();
        let err = ModelExecutor::new(&registry)
            .run(&model, &RunParameters::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ModelerError::DependencyDeadlock { ref pending } if pending == &["STATS_1".to_string()]
        ));
    }

    #[test]
    fn test_unknown_algorithm() {
        let registry = registry();
        let mut model = WorkflowModel::default();
        model.add_node(ModelNode::new("test:missing")).unwrap();
        assert!(matches!(
            ModelExecutor::new(&registry).run(&model, &RunParameters::new()),
            Err(ModelerError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_max_passes() {
        let registry = registry();
        // BUFFER_1 sorts before STATS_1, so one pass runs both
        let result = ModelExecutor::new(&registry)
            .with_max_passes(1)
            .run(&model(), &RunParameters::new().with_input("A", 1));
        assert!(result.is_ok());

        let mut model = model();
        model
            .add_node(
                ModelNode::new("test:buffer")
                    .with_name("AFTER_1")
                    .with_param("distance", ParamBinding::literal(1))
                    .with_param("input", ParamBinding::from_output("STATS_1", "table")),
            )
            .unwrap();
        let err = ModelExecutor::new(&registry)
            .with_max_passes(1)
            .run(&model, &RunParameters::new().with_input("A", 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelerError::DependencyDeadlock { ref pending } if pending == &["AFTER_1".to_string()]
        ));

        let result = ModelExecutor::new(&registry)
            .run(&model, &RunParameters::new().with_input("A", 1))
            .unwrap();
        assert_eq!(result.order, vec!["BUFFER_1", "STATS_1", "AFTER_1"]);
    }

    #[test]
    fn test_progress_events_carry_node() {
        let registry = registry();
        let sink = Arc::new(VecEventSink::new());
        ModelExecutor::new(&registry)
            .with_event_sink(sink.clone())
            .with_execution_id("exec-2")
            .run(&model(), &RunParameters::new().with_input("A", 2))
            .unwrap();

        let events = sink.events();
        assert!(events.contains(&ExecutionEvent::node_progress("BUFFER_1", "exec-2", 0.5, None)));
        let started = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::NodeStarted { .. }))
            .count();
        assert_eq!(started, 2);
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::ModelCompleted { executed: 2, .. })
        ));
    }

    #[test]
    fn test_executor_is_reusable() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let mut registry = AlgorithmRegistry::new();
        registry.register_fn(AlgorithmMetadata::new("test:count", "Count"), move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(AlgorithmOutputs::new())
        });
        let mut model = WorkflowModel::default();
        model.add_node(ModelNode::new("test:count")).unwrap();

        let executor = ModelExecutor::new(&registry);
        executor.run(&model, &RunParameters::new()).unwrap();
        executor.run(&model, &RunParameters::new()).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_instances_cached_per_node_for_the_run() {
        let created = Arc::new(AtomicUsize::new(0));
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut registry = AlgorithmRegistry::new();
        registry.register(
            AlgorithmMetadata::new("test:tracked", "Tracked"),
            Arc::new(TrackedFactory {
                created: created.clone(),
                log: log.clone(),
            }),
        );
        let mut model = WorkflowModel::default();
        model
            .add_node(
                ModelNode::new("test:tracked")
                    .with_name("FIRST_1")
                    .with_param("value", ParamBinding::literal(1)),
            )
            .unwrap();
        model
            .add_node(
                ModelNode::new("test:tracked")
                    .with_name("SECOND_1")
                    .with_param("value", ParamBinding::literal(2))
                    .with_dependency("FIRST_1"),
            )
            .unwrap();

        let params = RunParameters::new();
        let executor = ModelExecutor::new(&registry);
        let mut ctx = ExecutionContext::new(&model, &params);
        executor.execute(&mut ctx, "exec-3").unwrap();

        // One instance per node, used for binding and for running
        assert_eq!(created.load(Ordering::SeqCst), 2);
        let mut cached: Vec<_> = ctx.instances.keys().cloned().collect();
        cached.sort();
        assert_eq!(cached, vec!["FIRST_1", "SECOND_1"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![(0, "set"), (0, "run"), (1, "set"), (1, "run")]
        );

        // A new run starts with an empty cache
        drop(ctx);
        executor.run(&model, &params).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 4);
    }
}
