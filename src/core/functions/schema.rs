//! Argument schemas for registered functions.
//!
//! A small subset of JSON Schema: named properties with a primitive type,
//! optional `enum` restriction, a `required` list and an
//! `additionalProperties` switch. The same shape is accepted from YAML
//! configuration and sent to the agent as the function's parameter
//! definition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON type of a single property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One named property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

/// Argument schema for one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(rename = "additionalProperties", default = "default_true")]
    pub additional_properties: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }
}

/// Why a set of arguments does not fit its schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required argument '{0}'")]
    MissingRequired(String),

    #[error("argument '{name}' must be {expected}, got {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("argument '{0}' is not one of the allowed values")]
    NotAllowed(String),

    #[error("unexpected argument '{0}'")]
    Unexpected(String),
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property.
    pub fn property(mut self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.properties.insert(
            name.into(),
            PropertySchema {
                param_type,
                description: None,
                allowed: None,
            },
        );
        self
    }

    /// Add a property with a description.
    pub fn described(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.properties.insert(
            name.into(),
            PropertySchema {
                param_type,
                description: Some(description.into()),
                allowed: None,
            },
        );
        self
    }

    /// Restrict an existing property to a fixed set of values.
    pub fn one_of(mut self, name: &str, allowed: Vec<Value>) -> Self {
        if let Some(property) = self.properties.get_mut(name) {
            property.allowed = Some(allowed);
        }
        self
    }

    /// Mark a property as required.
    pub fn required(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    /// Reject arguments not listed in `properties`.
    pub fn deny_additional(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    /// Check arguments against the schema.
    ///
    /// Required arguments are checked first, in declaration order.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), SchemaError> {
        for name in &self.required {
            if !arguments.contains_key(name) {
                return Err(SchemaError::MissingRequired(name.clone()));
            }
        }

        for (name, value) in arguments {
            let Some(property) = self.properties.get(name) else {
                if self.additional_properties {
                    continue;
                }
                return Err(SchemaError::Unexpected(name.clone()));
            };

            if !property.param_type.matches(value) {
                return Err(SchemaError::WrongType {
                    name: name.clone(),
                    expected: property.param_type.as_str(),
                    found: json_type_name(value),
                });
            }

            if let Some(allowed) = &property.allowed
                && !allowed.contains(value)
            {
                return Err(SchemaError::NotAllowed(name.clone()));
            }
        }

        Ok(())
    }

    /// JSON Schema form sent to the agent.
    pub fn to_json(&self) -> Value {
        let mut schema = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Value::Object(map) = &mut schema {
            map.insert("type".to_string(), Value::String("object".to_string()));
        }
        schema
    }
}
