//! Modeler Engine - workflow models of geoprocessing algorithms
//!
//! A model chains algorithm invocations into a DAG. Each node binds the
//! parameters of one algorithm to literals, to model inputs, or to outputs
//! of other nodes. This crate provides:
//!
//! - The model itself, with dependency queries and integrity-checked edits
//! - A synchronous executor that runs active nodes in dependency order
//! - A tagged `{class, values}` document format for saving models
//! - Validation, compressed undo/redo snapshots and a model store
//!
//! # Architecture
//!
//! - `WorkflowModel`: nodes and inputs; references are resolved lazily
//! - `AlgorithmRegistry`: algorithm metadata plus instance factories
//! - `ModelExecutor`: runs a model against a registry, reporting through an `EventSink`
//!
//! # Example
//!
//! ```ignore
//! use modeler_engine::{document, ModelExecutor, RunParameters};
//!
//! let model = document::load_file("models/flood.model")?;
//! let result = ModelExecutor::new(&registry)
//!     .run(&model, &RunParameters::new().with_input("DISTANCE", 10))?;
//! println!("ran {:?}", result.order);
//! ```

pub mod builder;
pub mod document;
pub mod error;
pub mod events;
pub mod executor;
pub mod model;
pub mod parameters;
pub mod registry;
pub mod store;
pub mod types;
pub mod undo;
pub mod validation;
pub mod value;

// Re-export key types
pub use builder::ModelBuilder;
pub use error::{ModelerError, Result};
pub use events::{EventSink, ExecutionEvent, NullEventSink, Progress, VecEventSink};
pub use executor::{ModelExecutor, ModelRunResult, NodeState, RunParameters};
pub use model::{
    safe_output_name, ModelInput, ModelNode, ModelOutput, ModelOutputInfo, WorkflowModel,
};
pub use parameters::{OutputDescriptor, OutputKind, ParameterDescriptor, ParameterKind};
pub use registry::{
    Algorithm, AlgorithmError, AlgorithmFactory, AlgorithmMetadata, AlgorithmOutputs,
    AlgorithmRegistry, Invocation,
};
pub use store::{ModelMetadata, ModelStore};
pub use types::{NodeName, Point};
pub use undo::UndoStack;
pub use validation::{validate_model, ValidationError};
pub use value::{ParamBinding, ValueFromInput, ValueFromOutput, ValueSource};
