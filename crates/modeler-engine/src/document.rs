//! Persistent document format for workflow models
//!
//! Every object is written as `{"class": <id>, "values": {...}}`. The set of
//! class ids is closed; loading checks each object against the class its
//! slot expects, so an unknown id or an object of the wrong class fails the
//! load instead of producing a half-built model.
//!
//! Class ids are fully-qualified type paths such as
//! `modeler_engine::model::ModelNode`; canvas positions use the short id
//! `point`.
//!
//! Parameter bindings are stored inline: `null` for an unset binding, a
//! tagged object for input/output references and sequences, and any other
//! JSON value as a literal. A literal that would read back as something
//! else (`null`, or an object with a `class` key) is wrapped in a tagged
//! literal object.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelerError, Result};
use crate::model::{ModelInput, ModelNode, ModelOutput, WorkflowModel};
use crate::parameters::ParameterDescriptor;
use crate::types::Point;
use crate::value::{ParamBinding, ValueFromInput, ValueFromOutput};

/// Current document version
pub const SCHEMA_VERSION: u32 = 1;

/// File extension of persisted models
pub const MODEL_EXTENSION: &str = "model";

const CLASS_KEY: &str = "class";
const VALUES_KEY: &str = "values";

/// Class ids a document may contain
pub const KNOWN_CLASSES: &[&str] = &[
    ModelRecord::CLASS,
    InputRecord::CLASS,
    ParameterDescriptor::CLASS,
    NodeRecord::CLASS,
    OutputRecord::CLASS,
    Point::CLASS,
    ValueFromInput::CLASS,
    ValueFromOutput::CLASS,
    SEQUENCE_CLASS,
    LITERAL_CLASS,
];

const SEQUENCE_CLASS: &str = "modeler_engine::value::ParamBinding::Sequence";
const LITERAL_CLASS: &str = "modeler_engine::value::ParamBinding::Literal";

/// A type with a fixed class id in the document format
trait DocumentClass {
    const CLASS: &'static str;
}

impl DocumentClass for Point {
    const CLASS: &'static str = "point";
}

impl DocumentClass for ParameterDescriptor {
    const CLASS: &'static str = "modeler_engine::parameters::ParameterDescriptor";
}

impl DocumentClass for ValueFromInput {
    const CLASS: &'static str = "modeler_engine::value::ValueFromInput";
}

impl DocumentClass for ValueFromOutput {
    const CLASS: &'static str = "modeler_engine::value::ValueFromOutput";
}

/// `{class, values}` wrapper for a value of a known class
struct Tagged<T>(T);

impl<T: DocumentClass + Serialize> Serialize for Tagged<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Tagged", 2)?;
        state.serialize_field(CLASS_KEY, T::CLASS)?;
        state.serialize_field(VALUES_KEY, &self.0)?;
        state.end()
    }
}

impl<'de, T: DocumentClass + DeserializeOwned> Deserialize<'de> for Tagged<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            class: String,
            values: Value,
        }

        let raw = Raw::deserialize(deserializer)?;
        check_class(&raw.class, T::CLASS).map_err(D::Error::custom)?;
        serde_json::from_value(raw.values)
            .map(Tagged)
            .map_err(|e| D::Error::custom(format!("in '{}': {}", T::CLASS, e)))
    }
}

fn check_class(found: &str, expected: &str) -> std::result::Result<(), String> {
    if found == expected {
        Ok(())
    } else if KNOWN_CLASSES.contains(&found) {
        Err(format!("expected class '{}', found '{}'", expected, found))
    } else {
        Err(format!("unknown class '{}'", found))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct ModelDocument {
    class: String,
    #[serde(default = "default_version")]
    version: u32,
    values: ModelRecord,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct ModelRecord {
    name: String,
    group: String,
    inputs: BTreeMap<String, Tagged<InputRecord>>,
    algs: BTreeMap<String, Tagged<NodeRecord>>,
}

impl DocumentClass for ModelRecord {
    const CLASS: &'static str = "modeler_engine::model::WorkflowModel";
}

#[derive(Serialize, Deserialize)]
struct InputRecord {
    param: Tagged<ParameterDescriptor>,
    pos: Tagged<Point>,
}

impl DocumentClass for InputRecord {
    const CLASS: &'static str = "modeler_engine::model::ModelInput";
}

#[derive(Serialize, Deserialize)]
struct OutputRecord {
    description: String,
    #[serde(default)]
    pos: Option<Tagged<Point>>,
}

impl DocumentClass for OutputRecord {
    const CLASS: &'static str = "modeler_engine::model::ModelOutput";
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    name: String,
    console_name: String,
    #[serde(default)]
    description: String,
    params: BTreeMap<String, Value>,
    #[serde(default)]
    outputs: BTreeMap<String, Tagged<OutputRecord>>,
    #[serde(default)]
    dependencies: BTreeSet<String>,
    #[serde(default)]
    pos: Option<Tagged<Point>>,
    #[serde(default = "default_true")]
    params_folded: bool,
    #[serde(default = "default_true")]
    outputs_folded: bool,
    #[serde(default = "default_true")]
    active: bool,
}

impl DocumentClass for NodeRecord {
    const CLASS: &'static str = "modeler_engine::model::ModelNode";
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

fn tagged_value<T: DocumentClass + Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::json!({ "class": T::CLASS, "values": serde_json::to_value(value)? }))
}

/// Whether a literal must be wrapped to read back as a literal
fn needs_literal_tag(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.contains_key(CLASS_KEY),
        _ => false,
    }
}

fn binding_to_value(binding: &ParamBinding) -> Result<Value> {
    match binding {
        ParamBinding::Literal(value) if needs_literal_tag(value) => {
            Ok(serde_json::json!({ "class": LITERAL_CLASS, "values": value }))
        }
        ParamBinding::Literal(value) => Ok(value.clone()),
        ParamBinding::FromInput(r) => tagged_value(r),
        ParamBinding::FromOutput(r) => tagged_value(r),
        ParamBinding::Sequence(items) => {
            let members = items.iter().map(binding_to_value).collect::<Result<Vec<_>>>()?;
            Ok(serde_json::json!({ "class": SEQUENCE_CLASS, "values": members }))
        }
    }
}

fn binding_from_value(value: Value) -> Result<ParamBinding> {
    let Value::Object(mut map) = value else {
        return Ok(ParamBinding::Literal(value));
    };
    let Some(class) = map.get(CLASS_KEY).cloned() else {
        return Ok(ParamBinding::Literal(Value::Object(map)));
    };
    let class = class
        .as_str()
        .ok_or_else(|| ModelerError::invalid_document("class id must be a string"))?;
    let values = map
        .remove(VALUES_KEY)
        .ok_or_else(|| ModelerError::invalid_document(format!("'{}' has no values", class)))?;

    match class {
        c if c == ValueFromInput::CLASS => Ok(ParamBinding::FromInput(payload(class, values)?)),
        c if c == ValueFromOutput::CLASS => Ok(ParamBinding::FromOutput(payload(class, values)?)),
        LITERAL_CLASS => Ok(ParamBinding::Literal(values)),
        SEQUENCE_CLASS => {
            let Value::Array(members) = values else {
                return Err(ModelerError::invalid_document("sequence values must be a list"));
            };
            let items = members
                .into_iter()
                .map(binding_from_value)
                .collect::<Result<Vec<_>>>()?;
            Ok(ParamBinding::Sequence(items))
        }
        other if KNOWN_CLASSES.contains(&other) => Err(ModelerError::invalid_document(format!(
            "'{}' is not a parameter binding",
            other
        ))),
        other => Err(ModelerError::invalid_document(format!("unknown class '{}'", other))),
    }
}

fn payload<T: DeserializeOwned>(class: &str, values: Value) -> Result<T> {
    serde_json::from_value(values)
        .map_err(|e| ModelerError::invalid_document(format!("in '{}': {}", class, e)))
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn node_record(node: &ModelNode) -> Result<NodeRecord> {
    let mut params = BTreeMap::new();
    for (name, binding) in &node.params {
        let value = match binding {
            Some(b) => binding_to_value(b)?,
            None => Value::Null,
        };
        params.insert(name.clone(), value);
    }
    let outputs = node
        .outputs
        .iter()
        .map(|(name, output)| {
            let record = OutputRecord {
                description: output.description.clone(),
                pos: output.position.map(Tagged),
            };
            (name.clone(), Tagged(record))
        })
        .collect();

    Ok(NodeRecord {
        name: node.name.clone(),
        console_name: node.algorithm_id.clone(),
        description: node.description.clone(),
        params,
        outputs,
        dependencies: node.dependencies.clone(),
        pos: node.position.map(Tagged),
        params_folded: node.params_folded,
        outputs_folded: node.outputs_folded,
        active: node.active,
    })
}

fn node_from_record(record: NodeRecord) -> Result<ModelNode> {
    let mut params = BTreeMap::new();
    for (name, value) in record.params {
        let binding = match value {
            Value::Null => None,
            other => Some(binding_from_value(other)?),
        };
        params.insert(name, binding);
    }
    let outputs = record
        .outputs
        .into_iter()
        .map(|(name, Tagged(output))| {
            let promoted = ModelOutput {
                description: output.description,
                position: output.pos.map(|Tagged(p)| p),
            };
            (name, promoted)
        })
        .collect();

    Ok(ModelNode {
        name: record.name,
        algorithm_id: record.console_name,
        description: record.description,
        params,
        outputs,
        dependencies: record.dependencies,
        position: record.pos.map(|Tagged(p)| p),
        params_folded: record.params_folded,
        outputs_folded: record.outputs_folded,
        active: record.active,
    })
}

/// Serialize a model to a document value
pub fn to_document(model: &WorkflowModel) -> Result<Value> {
    let inputs = model
        .inputs()
        .iter()
        .map(|(name, input)| {
            let record = InputRecord {
                param: Tagged(input.param.clone()),
                pos: Tagged(input.position),
            };
            (name.clone(), Tagged(record))
        })
        .collect();
    let mut algs = BTreeMap::new();
    for (name, node) in model.nodes() {
        algs.insert(name.clone(), Tagged(node_record(node)?));
    }

    let document = ModelDocument {
        class: ModelRecord::CLASS.to_string(),
        version: SCHEMA_VERSION,
        values: ModelRecord {
            name: model.name.clone(),
            group: model.group.clone(),
            inputs,
            algs,
        },
    };
    Ok(serde_json::to_value(document)?)
}

/// Rebuild a model from a document value
///
/// Any problem fails the whole load with `InvalidDocument`.
pub fn from_document(document: Value) -> Result<WorkflowModel> {
    let document: ModelDocument = serde_json::from_value(document)
        .map_err(|e| ModelerError::invalid_document(e.to_string()))?;
    check_class(&document.class, ModelRecord::CLASS).map_err(ModelerError::InvalidDocument)?;
    if document.version > SCHEMA_VERSION {
        return Err(ModelerError::invalid_document(format!(
            "unsupported version {} (newest supported is {})",
            document.version, SCHEMA_VERSION
        )));
    }

    let record = document.values;
    let mut model = WorkflowModel::new(record.name, record.group);
    for (key, Tagged(input)) in record.inputs {
        let Tagged(param) = input.param;
        if param.name != key {
            return Err(ModelerError::invalid_document(format!(
                "input '{}' is stored under '{}'",
                param.name, key
            )));
        }
        let Tagged(position) = input.pos;
        model.inputs.insert(key, ModelInput { param, position });
    }
    for (key, Tagged(node)) in record.algs {
        if node.name != key {
            return Err(ModelerError::invalid_document(format!(
                "node '{}' is stored under '{}'",
                node.name, key
            )));
        }
        model.nodes.insert(key, node_from_record(node)?);
    }
    Ok(model)
}

/// Serialize a model to pretty-printed JSON
pub fn to_json(model: &WorkflowModel) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_document(model)?)?)
}

/// Parse a model from JSON text
pub fn from_json(text: &str) -> Result<WorkflowModel> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ModelerError::invalid_document(e.to_string()))?;
    from_document(value)
}

/// Load a model file and record where it came from
pub fn load_file(path: impl AsRef<Path>) -> Result<WorkflowModel> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut model = from_json(&text)?;
    model.set_source_path(Some(path.to_path_buf()));
    log::debug!("Loaded model '{}' from {:?}", model.name, path);
    Ok(model)
}

/// Save a model to a file, making it the model's source path
pub fn save_file(model: &mut WorkflowModel, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, to_json(model)?)?;
    model.set_source_path(Some(path.to_path_buf()));
    model.mark_saved();
    log::debug!("Saved model '{}' to {:?}", model.name, path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::parameters::ParameterKind;

    fn sample_model() -> WorkflowModel {
        let mut model = WorkflowModel::new("Watershed", "Hydrology");
        model
            .add_input(ModelInput::new(
                ParameterDescriptor::new(
                    "A",
                    "Buffer distance",
                    ParameterKind::Number {
                        min: Some(0.0),
                        max: None,
                        integer: false,
                    },
                )
                .with_default(10.0),
                (20.0, 40.0),
            ))
            .unwrap();
        model
            .add_node(
                ModelNode::new("qgis:buffer")
                    .with_name("BUFFER_1")
                    .with_description("Buffer")
                    .with_param("distance", ParamBinding::from_input("A"))
                    .with_param("dissolve", ParamBinding::literal(true))
                    .with_null_param("field")
                    .at((100.0, 50.0)),
            )
            .unwrap();
        model
            .add_node(
                ModelNode::new("qgis:stats")
                    .with_name("STATS_1")
                    .with_param(
                        "layers",
                        ParamBinding::sequence([
                            ParamBinding::from_output("BUFFER_1", "result"),
                            ParamBinding::literal("/data/roads.shp"),
                        ]),
                    )
                    .with_param("options", ParamBinding::literal(json!({ "mode": "fast" })))
                    .with_dependency("BUFFER_1")
                    .promote_output("table", "Statistics"),
            )
            .unwrap();
        let mut stats = model.node("STATS_1").unwrap().clone();
        stats.active = false;
        model.update_node(stats).unwrap();
        model
    }

    #[test]
    fn test_round_trip() {
        let model = sample_model();
        let restored = from_json(&to_json(&model).unwrap()).unwrap();

        assert_eq!(restored.name, "Watershed");
        assert_eq!(restored.group, "Hydrology");
        assert_eq!(restored.inputs(), model.inputs());
        assert_eq!(restored.nodes(), model.nodes());
        assert!(!restored.is_modified());
    }

    #[test]
    fn test_document_shape() {
        let doc = to_document(&sample_model()).unwrap();
        assert_eq!(doc["class"], "modeler_engine::model::WorkflowModel");
        assert_eq!(doc["version"], 1);

        let buffer = &doc["values"]["algs"]["BUFFER_1"];
        assert_eq!(buffer["class"], "modeler_engine::model::ModelNode");
        assert_eq!(buffer["values"]["consoleName"], "qgis:buffer");
        assert!(buffer["values"].get("algorithm").is_none());
        assert_eq!(
            buffer["values"]["pos"],
            json!({"class": "point", "values": {"x": 100.0, "y": 50.0}})
        );
        assert_eq!(
            buffer["values"]["params"]["distance"],
            json!({"class": "modeler_engine::value::ValueFromInput", "values": {"name": "A"}})
        );
        assert_eq!(buffer["values"]["params"]["dissolve"], json!(true));
        assert_eq!(buffer["values"]["params"]["field"], Value::Null);

        let input = &doc["values"]["inputs"]["A"];
        assert_eq!(input["class"], "modeler_engine::model::ModelInput");
        assert_eq!(
            input["values"]["param"]["class"],
            "modeler_engine::parameters::ParameterDescriptor"
        );
    }

    #[test]
    fn test_null_and_class_keyed_literals_round_trip() {
        let mut model = WorkflowModel::default();
        model
            .add_node(
                ModelNode::new("qgis:buffer")
                    .with_name("BUFFER_1")
                    .with_param("field", ParamBinding::literal(Value::Null))
                    .with_null_param("unset")
                    .with_param(
                        "style",
                        ParamBinding::literal(json!({"class": "red", "values": 1})),
                    )
                    .with_param(
                        "layers",
                        ParamBinding::sequence([
                            ParamBinding::literal(Value::Null),
                            ParamBinding::literal("/data/roads.shp"),
                        ]),
                    ),
            )
            .unwrap();

        let doc = to_document(&model).unwrap();
        let params = &doc["values"]["algs"]["BUFFER_1"]["values"]["params"];
        assert_eq!(params["field"]["class"], "modeler_engine::value::ParamBinding::Literal");
        assert_eq!(params["unset"], Value::Null);

        let restored = from_document(doc).unwrap();
        let node = restored.node("BUFFER_1").unwrap();
        assert_eq!(node.params["field"], Some(ParamBinding::Literal(Value::Null)));
        assert_eq!(node.params["unset"], None);
        assert_eq!(restored.nodes(), model.nodes());
    }

    #[test]
    fn test_unknown_class_rejected() {
        let mut doc = to_document(&sample_model()).unwrap();
        doc["values"]["algs"]["BUFFER_1"]["values"]["pos"]["class"] = json!("qpointf");
        match from_document(doc) {
            Err(ModelerError::InvalidDocument(msg)) => {
                assert!(msg.contains("unknown class 'qpointf'"))
            }
            other => panic!("Expected InvalidDocument, got {:?}", other.map(|m| m.name)),
        }
    }

    #[test]
    fn test_wrong_class_in_slot_rejected() {
        let mut doc = to_document(&sample_model()).unwrap();
        doc["values"]["inputs"]["A"]["values"]["pos"]["class"] =
            json!("modeler_engine::model::ModelNode");
        match from_document(doc) {
            Err(ModelerError::InvalidDocument(msg)) => assert!(
                msg.contains("expected class 'point', found 'modeler_engine::model::ModelNode'")
            ),
            other => panic!("Expected InvalidDocument, got {:?}", other.map(|m| m.name)),
        }
    }

    #[test]
    fn test_unknown_binding_class_rejected() {
        let mut doc = to_document(&sample_model()).unwrap();
        doc["values"]["algs"]["BUFFER_1"]["values"]["params"]["distance"] =
            json!({"class": "modeler_engine::value::ValueFromScript", "values": {}});
        assert!(matches!(from_document(doc), Err(ModelerError::InvalidDocument(_))));
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut doc = to_document(&sample_model()).unwrap();
        doc["values"]["algs"]["BUFFER_1"]["values"]
            .as_object_mut()
            .unwrap()
            .remove("consoleName");
        assert!(matches!(from_document(doc), Err(ModelerError::InvalidDocument(_))));
    }

    #[test]
    fn test_version_handling() {
        let mut doc = to_document(&sample_model()).unwrap();
        doc.as_object_mut().unwrap().remove("version");
        assert!(from_document(doc.clone()).is_ok());

        doc["version"] = json!(SCHEMA_VERSION + 1);
        assert!(matches!(from_document(doc), Err(ModelerError::InvalidDocument(_))));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let mut doc = to_document(&sample_model()).unwrap();
        doc["values"]["algs"]["BUFFER_1"]["values"]["name"] = json!("BUFFER_9");
        assert!(matches!(from_document(doc), Err(ModelerError::InvalidDocument(_))));
    }

    #[test]
    fn test_malformed_json_is_invalid_document() {
        assert!(matches!(from_json("{ not json"), Err(ModelerError::InvalidDocument(_))));
    }

    #[test]
    fn test_file_round_trip_sets_source_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Flood Risk.model");
        let mut model = sample_model();
        assert!(model.is_modified());

        save_file(&mut model, &path).unwrap();
        assert!(!model.is_modified());
        assert_eq!(model.command_line_name().as_deref(), Some("modeler:flood risk"));

        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.source_path(), Some(path.as_path()));
        assert_eq!(loaded.nodes(), model.nodes());
    }
}
