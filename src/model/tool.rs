//! Callable tool (function) descriptions attached to a chat.
//!
//! A `Tool` stores its parameters as a flat ordered list; the grouped
//! JSON-Schema-like wire form (`properties` + `required`) is derived on
//! serialization and never stored redundantly.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::ModelError;

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub r#type: String,
    pub description: String,
    pub required: bool,
    /// Allowed values; empty means unconstrained.
    pub enum_values: Vec<String>,
}

impl Parameter {
    pub fn new(name: &str, r#type: &str) -> Self {
        Self {
            name: name.to_string(),
            r#type: r#type.to_string(),
            description: String::new(),
            required: false,
            enum_values: Vec::new(),
        }
    }

    /// Builds a parameter from an untyped record, requiring all five
    /// fields to be present and well-typed.
    pub fn from_value(value: &Value) -> Result<Self, ModelError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ModelError::SchemaValidation("parameter: not an object".into()))?;

        let field = |key: &str| -> Result<&Value, ModelError> {
            obj.get(key).ok_or_else(|| {
                ModelError::SchemaValidation(format!("parameter: missing field `{}`", key))
            })
        };

        let name = field("name")?
            .as_str()
            .ok_or_else(|| ModelError::SchemaValidation("parameter: `name` must be a string".into()))?
            .to_string();
        let r#type = field("type")?
            .as_str()
            .ok_or_else(|| ModelError::SchemaValidation("parameter: `type` must be a string".into()))?
            .to_string();
        let description = field("description")?
            .as_str()
            .ok_or_else(|| {
                ModelError::SchemaValidation("parameter: `description` must be a string".into())
            })?
            .to_string();
        let required = field("required")?.as_bool().ok_or_else(|| {
            ModelError::SchemaValidation("parameter: `required` must be a boolean".into())
        })?;
        let enum_values = field("enum")?
            .as_array()
            .ok_or_else(|| ModelError::SchemaValidation("parameter: `enum` must be an array".into()))?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    ModelError::SchemaValidation("parameter: `enum` entries must be strings".into())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            r#type,
            description,
            required,
            enum_values,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    params: Vec<Parameter>,
}

impl Tool {
    pub fn create_empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            params: Vec::new(),
        }
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn add_param(&mut self, param: Parameter) -> Result<(), ModelError> {
        if self.params.iter().any(|p| p.name == param.name) {
            return Err(ModelError::DuplicateParameter { name: param.name });
        }
        self.params.push(param);
        Ok(())
    }

    /// Replaces the parameter at `index`, keeping its position. A name
    /// change is allowed as long as it doesn't collide with another
    /// parameter; the required flag is carried by the new parameter so
    /// the derived `required` list stays consistent.
    pub fn edit_param(&mut self, index: usize, param: Parameter) -> Result<(), ModelError> {
        if index >= self.params.len() {
            return Err(ModelError::IndexOutOfRange {
                kind: "parameters",
                index,
                len: self.params.len(),
            });
        }
        if self
            .params
            .iter()
            .enumerate()
            .any(|(i, p)| i != index && p.name == param.name)
        {
            return Err(ModelError::DuplicateParameter { name: param.name });
        }
        self.params[index] = param;
        Ok(())
    }

    pub fn remove_param(&mut self, index: usize) -> Result<Parameter, ModelError> {
        if index >= self.params.len() {
            return Err(ModelError::IndexOutOfRange {
                kind: "parameters",
                index,
                len: self.params.len(),
            });
        }
        Ok(self.params.remove(index))
    }

    pub fn remove_param_named(&mut self, name: &str) -> Result<Parameter, ModelError> {
        let index = self
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ModelError::NotFound {
                kind: "parameter",
                name: name.to_string(),
            })?;
        Ok(self.params.remove(index))
    }

    /// Produces the OpenAI tool schema. Property order follows parameter
    /// insertion order and the `required` list is derived from each
    /// parameter's flag.
    pub fn to_wire(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.r#type));
            prop.insert("description".into(), json!(param.description));
            if !param.enum_values.is_empty() {
                prop.insert("enum".into(), json!(param.enum_values));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(param.name.clone());
            }
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            },
        })
    }

    /// Parses a persisted tool schema. Accepts the current
    /// `{"type":"function","function":{...}}` shape as well as the
    /// deprecated bare function object from the legacy `functions` wire
    /// format, normalizing the latter on ingest.
    pub fn from_wire(value: &Value) -> Result<Self, ModelError> {
        let function = match value.get("function") {
            Some(f) => f,
            None => value,
        };
        let obj = function
            .as_object()
            .ok_or_else(|| ModelError::SchemaValidation("tool: not an object".into()))?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::SchemaValidation("tool: missing `name`".into()))?
            .to_string();
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let parameters = obj.get("parameters").cloned().unwrap_or_else(|| json!({}));
        let required: Vec<String> = parameters
            .get("required")
            .or_else(|| obj.get("required"))
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut tool = Tool {
            name,
            description,
            params: Vec::new(),
        };

        if let Some(properties) = parameters.get("properties").and_then(Value::as_object) {
            for (param_name, prop) in properties {
                let record = json!({
                    "name": param_name,
                    "type": prop.get("type").cloned().unwrap_or(json!("string")),
                    "description": prop.get("description").cloned().unwrap_or(json!("")),
                    "required": required.contains(param_name),
                    "enum": prop.get("enum").cloned().unwrap_or(json!([])),
                });
                let param = Parameter::from_value(&record)?;
                if tool.add_param(param).is_err() {
                    return Err(ModelError::SchemaValidation(format!(
                        "tool `{}`: duplicate parameter `{}`",
                        tool.name, param_name
                    )));
                }
            }
        }

        Ok(tool)
    }
}

impl Serialize for Tool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Tool::from_wire(&value).map_err(D::Error::custom)
    }
}
