//! Parameter and output descriptors
//!
//! Descriptors declare what an algorithm (or a model) accepts and produces.
//! Each parameter kind carries its own validation and coercion so a resolved
//! value can be checked before it is handed to an algorithm.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a parameter, with kind-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Numeric value, optionally bounded
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default)]
        integer: bool,
    },
    /// Free text
    String {
        #[serde(default)]
        multiline: bool,
    },
    /// True/false flag
    Boolean,
    /// One of a fixed list of options, stored as the option index
    Selection { options: Vec<String> },
    /// Bounding box written as `xmin,xmax,ymin,ymax`
    Extent,
    /// Coordinate reference system identifier
    Crs,
    /// File or folder path
    File {
        #[serde(default)]
        folder: bool,
    },
    /// Raster layer
    Raster,
    /// Vector layer
    Vector,
    /// Attribute table
    Table,
    /// Field of the table given by another parameter
    TableField { parent: String },
    /// Several layers joined with `;`
    MultipleInput,
}

impl ParameterKind {
    /// Short type name, used to match bindings against parameter types
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number { .. } => "number",
            Self::String { .. } => "string",
            Self::Boolean => "boolean",
            Self::Selection { .. } => "selection",
            Self::Extent => "extent",
            Self::Crs => "crs",
            Self::File { .. } => "file",
            Self::Raster => "raster",
            Self::Vector => "vector",
            Self::Table => "table",
            Self::TableField { .. } => "table_field",
            Self::MultipleInput => "multiple_input",
        }
    }

    /// Kinds whose value is a path to a data source
    ///
    /// Such values may point to files that do not exist yet, so a rejected
    /// value does not abort node preparation.
    pub fn is_data_object(&self) -> bool {
        matches!(
            self,
            Self::File { .. } | Self::Raster | Self::Vector | Self::Table | Self::MultipleInput
        )
    }

    /// Validate and coerce a non-null value, `None` if the value is invalid
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            Self::Number { min, max, integer } => {
                let n = match value {
                    Value::Number(n) => n.as_f64()?,
                    Value::String(s) => s.trim().parse::<f64>().ok()?,
                    _ => return None,
                };
                if *integer && n.fract() != 0.0 {
                    return None;
                }
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return None;
                }
                if *integer {
                    Some(Value::from(n as i64))
                } else {
                    serde_json::Number::from_f64(n).map(Value::Number)
                }
            }
            Self::String { .. } => match value {
                Value::String(s) => Some(Value::String(s.clone())),
                other => Some(Value::String(other.to_string())),
            },
            Self::Boolean => match value {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
                _ => None,
            },
            Self::Selection { options } => match value {
                Value::Number(n) => {
                    let idx = n.as_u64()?;
                    ((idx as usize) < options.len()).then(|| Value::from(idx))
                }
                Value::String(s) => options
                    .iter()
                    .position(|o| o == s)
                    .or_else(|| s.trim().parse::<usize>().ok().filter(|i| *i < options.len()))
                    .map(Value::from),
                _ => None,
            },
            Self::Extent => {
                let coords: Vec<f64> = match value {
                    Value::String(s) => s
                        .split(',')
                        .map(|t| t.trim().parse::<f64>())
                        .collect::<std::result::Result<_, _>>()
                        .ok()?,
                    Value::Array(items) => items.iter().map(Value::as_f64).collect::<Option<_>>()?,
                    _ => return None,
                };
                if coords.len() != 4 {
                    return None;
                }
                let text: Vec<String> = coords.iter().map(f64::to_string).collect();
                Some(Value::String(text.join(",")))
            }
            Self::MultipleInput => match value {
                Value::String(s) if !s.trim().is_empty() => Some(Value::String(s.clone())),
                Value::Array(items) => {
                    let layers: Vec<&str> = items.iter().map(Value::as_str).collect::<Option<_>>()?;
                    (!layers.is_empty()).then(|| Value::String(layers.join(";")))
                }
                _ => None,
            },
            Self::Crs
            | Self::File { .. }
            | Self::Raster
            | Self::Vector
            | Self::Table
            | Self::TableField { .. } => match value {
                Value::String(s) if !s.trim().is_empty() => Some(Value::String(s.clone())),
                _ => None,
            },
        }
    }
}

/// Declaration of a parameter accepted by an algorithm or a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    /// Parameter name, unique within its owner
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Kind and kind-specific settings
    pub kind: ParameterKind,
    /// Whether a null value is acceptable
    #[serde(default)]
    pub optional: bool,
    /// Hidden parameters carry a hard-coded value and are never bound in a model
    #[serde(default)]
    pub hidden: bool,
    /// Shown only when advanced parameters are requested
    #[serde(default)]
    pub advanced: bool,
    /// Default value
    #[serde(default)]
    pub default: Value,
}

impl ParameterDescriptor {
    /// Create a required parameter
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: ParameterKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            optional: false,
            hidden: false,
            advanced: false,
            default: Value::Null,
        }
    }

    /// Mark this parameter optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark this parameter hidden
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Mark this parameter advanced
    pub fn advanced(mut self) -> Self {
        self.advanced = true;
        self
    }

    /// Set a default value for this parameter
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Validate a value for this parameter
    ///
    /// Null falls back to the default; a null with no default is accepted
    /// only for optional parameters. Returns the coerced value, or `None`
    /// when the value is rejected.
    pub fn validate(&self, value: &Value) -> Option<Value> {
        let value = if value.is_null() { &self.default } else { value };
        if value.is_null() {
            return self.optional.then_some(Value::Null);
        }
        self.kind.coerce(value)
    }
}

/// The kind of an algorithm output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Raster,
    Vector,
    Table,
    File,
    Directory,
    Html,
    Number,
    String,
    Extent,
}

/// Declaration of an output produced by an algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    /// Output name, unique within the algorithm
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Kind of value produced
    pub kind: OutputKind,
    /// Hidden outputs are never promoted nor bound to a destination
    #[serde(default)]
    pub hidden: bool,
}

impl OutputDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OutputKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            hidden: false,
        }
    }

    /// Mark this output hidden
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn number(min: Option<f64>, max: Option<f64>, integer: bool) -> ParameterKind {
        ParameterKind::Number { min, max, integer }
    }

    #[test]
    fn test_number_coercion() {
        let kind = number(Some(0.0), Some(100.0), false);
        assert_eq!(kind.coerce(&json!(10)), Some(json!(10.0)));
        assert_eq!(kind.coerce(&json!(" 2.5 ")), Some(json!(2.5)));
        assert_eq!(kind.coerce(&json!(-1)), None);
        assert_eq!(kind.coerce(&json!("abc")), None);
        assert_eq!(kind.coerce(&json!(true)), None);

        let integer = number(None, None, true);
        assert_eq!(integer.coerce(&json!(3.0)), Some(json!(3)));
        assert_eq!(integer.coerce(&json!(3.5)), None);
    }

    #[test]
    fn test_selection_coercion() {
        let kind = ParameterKind::Selection {
            options: vec!["touches".to_string(), "overlaps".to_string()],
        };
        assert_eq!(kind.coerce(&json!(1)), Some(json!(1)));
        assert_eq!(kind.coerce(&json!("overlaps")), Some(json!(1)));
        assert_eq!(kind.coerce(&json!("0")), Some(json!(0)));
        assert_eq!(kind.coerce(&json!(2)), None);
    }

    #[test]
    fn test_extent_coercion() {
        let kind = ParameterKind::Extent;
        assert_eq!(
            kind.coerce(&json!("0,10, 5,15")),
            Some(json!("0,10,5,15"))
        );
        assert_eq!(kind.coerce(&json!([0.5, 1, 2, 3])), Some(json!("0.5,1,2,3")));
        assert_eq!(kind.coerce(&json!("0,10,5")), None);
    }

    #[test]
    fn test_multiple_input_joins_layers() {
        let kind = ParameterKind::MultipleInput;
        assert_eq!(
            kind.coerce(&json!(["a.shp", "b.shp"])),
            Some(json!("a.shp;b.shp"))
        );
        assert_eq!(kind.coerce(&json!([])), None);
    }

    #[test]
    fn test_validate_null_uses_default_or_optional() {
        let with_default = ParameterDescriptor::new("dist", "Distance", number(None, None, false))
            .with_default(5.0);
        assert_eq!(with_default.validate(&Value::Null), Some(json!(5.0)));

        let required = ParameterDescriptor::new("layer", "Layer", ParameterKind::Vector);
        assert_eq!(required.validate(&Value::Null), None);

        let optional = ParameterDescriptor::new("layer", "Layer", ParameterKind::Vector).optional();
        assert_eq!(optional.validate(&Value::Null), Some(Value::Null));
    }

    #[test]
    fn test_data_object_kinds() {
        assert!(ParameterKind::Raster.is_data_object());
        assert!(ParameterKind::File { folder: false }.is_data_object());
        assert!(!ParameterKind::Extent.is_data_object());
        assert!(!number(None, None, false).is_data_object());
    }

    #[test]
    fn test_descriptor_serde_shape() {
        let param = ParameterDescriptor::new(
            "CELLSIZE",
            "Cell size",
            number(Some(0.0), None, false),
        )
        .advanced()
        .with_default(1.0);
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["kind"]["type"], "number");
        assert_eq!(json["kind"]["min"], 0.0);
        assert!(json["kind"].get("max").is_none());

        let restored: ParameterDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(restored, param);
    }
}
