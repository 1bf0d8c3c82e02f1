use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::handler::{AsyncFnHandler, FnHandler, ToolHandler};
use super::input::ToolInput;
use super::schema::InputSchema;
use crate::error::{HandlerError, ToolError, ValidationError};

/// A named, described, invocable unit of functionality for an agent.
///
/// Immutable once built. Cloning is cheap; clones share the handler.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    schema: InputSchema,
    return_direct: bool,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    /// Whether an agent loop should hand this tool's output straight back
    /// to the user instead of feeding it to the model.
    pub fn return_direct(&self) -> bool {
        self.return_direct
    }

    /// Complete JSON tool definition (name, description, input_schema)
    /// for an LLM API request.
    pub fn definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.schema.to_json_schema(),
        })
    }

    /// Check `input` against the declared schema and normalize it into the
    /// form the handler receives.
    pub fn prepare(&self, input: ToolInput) -> Result<ToolInput, ValidationError> {
        match (&self.schema, input) {
            (InputSchema::Text, ToolInput::Text(s)) => Ok(ToolInput::Text(s)),
            (InputSchema::Text, ToolInput::Structured(v)) => match v.get("input") {
                Some(Value::String(s)) => Ok(ToolInput::Text(s.clone())),
                _ => Err(ValidationError::single(
                    "input",
                    "expected string, received structured input",
                )),
            },
            (InputSchema::Object(schema), ToolInput::Text(s)) => {
                // Agents often send structured arguments as a JSON string.
                let parsed: Value = serde_json::from_str(&s).map_err(|_| {
                    ValidationError::single("", "expected object, received string")
                })?;
                let map = schema.validate(&parsed)?;
                Ok(ToolInput::Structured(Value::Object(map)))
            }
            (InputSchema::Object(schema), ToolInput::Structured(v)) => {
                let map = schema.validate(&v)?;
                Ok(ToolInput::Structured(Value::Object(map)))
            }
        }
    }

    /// Validate the input, run the handler, and return its output unchanged.
    ///
    /// The handler is never called when validation fails. Handler failures
    /// are returned as-is; nothing is retried.
    pub async fn invoke(&self, input: impl Into<ToolInput>) -> Result<String, ToolError> {
        let input = self.prepare(input.into()).map_err(|source| {
            warn!(tool = %self.name, error = %source, "rejected tool input");
            ToolError::Validation {
                tool: self.name.clone(),
                source,
            }
        })?;

        debug!(tool = %self.name, "invoking tool");
        self.handler.call(input).await.map_err(|source| {
            warn!(tool = %self.name, error = %source, "tool handler failed");
            ToolError::Handler {
                tool: self.name.clone(),
                source,
            }
        })
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .field("return_direct", &self.return_direct)
            .finish_non_exhaustive()
    }
}

/// Named construction options for a [`Tool`].
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: InputSchema,
    return_direct: bool,
    handler: Option<Arc<dyn ToolHandler>>,
}

impl ToolBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            schema: InputSchema::Text,
            return_direct: false,
            handler: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a structured input shape. Without one the tool takes a
    /// single string.
    pub fn schema(mut self, schema: impl Into<InputSchema>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn return_direct(mut self, return_direct: bool) -> Self {
        self.return_direct = return_direct;
        self
    }

    pub fn handler(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Use a synchronous closure as the handler.
    pub fn func<F, E>(self, f: F) -> Self
    where
        F: Fn(ToolInput) -> Result<String, E> + Send + Sync + 'static,
        E: Into<HandlerError> + 'static,
    {
        self.handler(FnHandler::new(f))
    }

    /// Use an async closure as the handler.
    pub fn async_func<F, Fut, E>(self, f: F) -> Self
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        self.handler(AsyncFnHandler::new(f))
    }

    pub fn build(self) -> Result<Tool, ToolError> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(ToolError::InvalidDefinition(format!(
                "tool name must be non-empty and contain no whitespace: {:?}",
                self.name
            )));
        }
        if let InputSchema::Object(ref schema) = self.schema {
            if let Some(dup) = schema.duplicate_field() {
                return Err(ToolError::InvalidDefinition(format!(
                    "tool `{}` declares field `{dup}` more than once",
                    self.name
                )));
            }
        }
        let handler = self.handler.ok_or_else(|| {
            ToolError::InvalidDefinition(format!("tool `{}` has no handler", self.name))
        })?;

        Ok(Tool {
            name: self.name,
            description: self.description,
            schema: self.schema,
            return_direct: self.return_direct,
            handler,
        })
    }
}
