use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::HandlerError;

/// What a caller hands to a tool: a plain string, or a structured JSON value.
///
/// After validation a handler sees `Text` for tools without a schema and
/// `Structured(Value::Object(..))` for tools with one.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Text(String),
    Structured(Value),
}

impl ToolInput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            Self::Structured(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Structured(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Field lookup on structured input.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Deserialize structured input into a handler-defined type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        match self {
            Self::Structured(v) => Ok(T::deserialize(v)?),
            Self::Text(s) => Ok(T::deserialize(Value::String(s.clone()))?),
        }
    }
}

impl From<String> for ToolInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Value> for ToolInput {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }
}

impl From<Map<String, Value>> for ToolInput {
    fn from(map: Map<String, Value>) -> Self {
        Self::Structured(Value::Object(map))
    }
}
