use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Schema advertised for a tool, both to the model service and to direct callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    #[serde(skip)]
    pub required_parameters: Vec<String>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
    ) -> Self {
        let required_parameters = parameter_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            required_parameters,
        }
    }

    /// Declared properties, in declaration order.
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.parameter_schema
            .get("properties")
            .and_then(Value::as_object)
    }

    /// Structural checks applied before a tool is admitted to the registry.
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("tool name cannot be empty".to_string());
        }

        let schema = self
            .parameter_schema
            .as_object()
            .ok_or_else(|| "parameter schema must be an object".to_string())?;

        if let Some(ty) = schema.get("type")
            && ty.as_str() != Some("object")
        {
            return Err(format!("parameter schema type must be \"object\", got {ty}"));
        }

        if let Some(properties) = schema.get("properties")
            && !properties.is_object()
        {
            return Err("parameter schema properties must be an object".to_string());
        }

        if let Some(required) = schema.get("required") {
            let well_formed = required
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string));
            if !well_formed {
                return Err("required must be an array of parameter names".to_string());
            }
        }

        Ok(())
    }
}

/// Arguments for one invocation, validated against the tool's schema and held
/// in declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Vec<(String, Value)>,
}

impl ToolArgs {
    /// Accepts an object, a JSON string holding an object, or `null`.
    pub fn resolve(spec: &ToolSpec, raw: Value) -> Result<Self> {
        let mut supplied = match raw {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(Value::Null) => Map::new(),
                Ok(_) => {
                    return Err(Error::Validation(format!(
                        "parameters for '{}' must be a JSON object",
                        spec.name
                    )));
                }
                Err(e) => {
                    return Err(Error::Validation(format!(
                        "parameters for '{}' are not valid JSON: {}",
                        spec.name, e
                    )));
                }
            },
            _ => {
                return Err(Error::Validation(format!(
                    "parameters for '{}' must be a JSON object",
                    spec.name
                )));
            }
        };

        supplied.retain(|_, value| !value.is_null());

        for required in &spec.required_parameters {
            if !supplied.contains_key(required) {
                return Err(Error::MissingParameter {
                    tool: spec.name.clone(),
                    parameter: required.clone(),
                });
            }
        }

        let mut values = Vec::with_capacity(supplied.len());

        if let Some(properties) = spec.properties() {
            for (name, property) in properties {
                let Some(value) = supplied.shift_remove(name) else {
                    continue;
                };

                if let Some(expected) = property.get("type").and_then(Value::as_str)
                    && !matches_type(expected, &value)
                {
                    return Err(Error::InvalidParameter {
                        tool: spec.name.clone(),
                        parameter: name.clone(),
                        reason: format!("expected {expected}, got {}", type_name(&value)),
                    });
                }

                values.push((name.clone(), value));
            }
        }

        values.extend(supplied);

        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn require_str(&self, name: &str) -> anyhow::Result<&str> {
        self.str(name)
            .ok_or_else(|| anyhow::anyhow!("Missing '{}' parameter", name))
    }

    /// Value at `index` in declared order.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.values.get(index).map(|(_, value)| value)
    }

    /// The bare string when exactly one string argument is bound.
    pub fn direct(&self) -> Option<&str> {
        match self.values.as_slice() {
            [(_, Value::String(value))] => Some(value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.iter().cloned().collect())
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Runs the tool. `args` has already passed the required-parameter and
    /// type checks for this tool's schema.
    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<Value>;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), self.parameters_schema())
    }
}
