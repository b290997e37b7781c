//! Tool trait and parameter handling.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, ToolError};

/// Core trait for tools exposed to generation steps.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's unique name
    fn name(&self) -> &str;

    /// Get the tool's description
    fn description(&self) -> &str;

    /// Get parameter schema for the tool
    fn parameter_schema(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, parameters: ToolParameters) -> Result<ToolOutput>;

    /// Validate parameters before execution (optional override)
    async fn validate_parameters(&self, parameters: &ToolParameters) -> Result<()> {
        self.validate_against_schema(parameters)
    }

    // Helper method for schema validation
    fn validate_against_schema(&self, parameters: &ToolParameters) -> Result<()> {
        let schema = self.parameter_schema();
        let instance = serde_json::to_value(parameters.inner())?;

        let compiled = jsonschema::Validator::new(&schema)
            .map_err(|e| ToolError::validation(format!("Invalid schema: {e}")))?;

        match compiled.validate(&instance) {
            Ok(()) => Ok(()),
            Err(error) => Err(ToolError::validation(format!(
                "Parameter validation failed: {error}"
            ))),
        }
    }
}

/// Advertised description of a tool, handed to the completion port so the
/// model knows what it may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool parameters wrapper with typed accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameters {
    inner: Value,
}

impl ToolParameters {
    pub fn new(value: Value) -> Self {
        Self { inner: value }
    }

    pub fn empty() -> Self {
        Self {
            inner: Value::Object(serde_json::Map::new()),
        }
    }

    /// Start an object schema for [`Tool::parameter_schema`].
    pub fn new_schema() -> Self {
        Self {
            inner: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn inner(&self) -> &Value {
        &self.inner
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self
            .inner
            .get(key)
            .ok_or_else(|| ToolError::invalid_field(key, "Parameter not found"))?;
        serde_json::from_value(value.clone())
            .map_err(|_| ToolError::invalid_field(key, "Invalid parameter type"))
    }

    pub fn get_optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.inner.get(key) {
            Some(value) if value.is_null() => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone()).map_err(
                |_| ToolError::invalid_field(key, "Invalid parameter type"),
            )?)),
            None => Ok(None),
        }
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_string_optional(&self, key: &str) -> Result<Option<String>> {
        self.get_optional(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.get(key).is_some()
    }

    // Schema building methods
    pub fn add_required(mut self, name: &str, param_type: &str, description: &str) -> Self {
        let mut obj = match self.inner {
            Value::Object(o) => o,
            _ => serde_json::Map::new(),
        };

        if let Some(Value::Object(props)) = obj.get_mut("properties") {
            props.insert(
                name.to_string(),
                json!({"type": param_type, "description": description}),
            );
        }
        if let Some(Value::Array(required)) = obj.get_mut("required") {
            required.push(Value::String(name.to_string()));
        }

        self.inner = Value::Object(obj);
        self
    }

    pub fn add_optional(
        mut self,
        name: &str,
        param_type: &str,
        description: &str,
        default: Option<Value>,
    ) -> Self {
        let mut obj = match self.inner {
            Value::Object(o) => o,
            _ => serde_json::Map::new(),
        };

        if let Some(Value::Object(props)) = obj.get_mut("properties") {
            let mut prop = json!({"type": param_type, "description": description});
            if let (Value::Object(prop_obj), Some(default)) = (&mut prop, default) {
                prop_obj.insert("default".to_string(), default);
            }
            props.insert(name.to_string(), prop);
        }

        self.inner = Value::Object(obj);
        self
    }
}

impl From<ToolParameters> for Value {
    fn from(params: ToolParameters) -> Self {
        params.inner
    }
}

/// Result of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
