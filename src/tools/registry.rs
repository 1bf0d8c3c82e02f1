use serde_json::{json, Value};
use tracing::debug;

use super::input::ToolInput;
use super::tool::Tool;
use crate::error::ToolError;

/// Catalog of tools keyed by name. Provides schemas for the LLM request,
/// dispatches calls by name, and offers keyword search for tool discovery.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Names are lookup keys, so a second tool with the
    /// same name is rejected.
    pub fn add(mut self, tool: Tool) -> Result<Self, ToolError> {
        if self.get(tool.name()).is_some() {
            return Err(ToolError::DuplicateTool(tool.name().to_string()));
        }
        debug!(tool = tool.name(), "registered tool");
        self.tools.push(tool);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// All tool definitions for the LLM API request.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().map(Tool::definition).collect()
    }

    /// Definition for a specific tool by name.
    pub fn schema(&self, name: &str) -> Option<Value> {
        self.get(name).map(Tool::definition)
    }

    /// Invoke a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        input: impl Into<ToolInput>,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(input).await
    }

    /// Search tools by query. Matches any whitespace-separated term against
    /// name and description, case-insensitively. Returns compact summaries
    /// (name + description only).
    pub fn search(&self, query: &str) -> Vec<Value> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();

        self.tools
            .iter()
            .filter(|t| {
                let haystack = format!("{} {}", t.name(), t.description()).to_lowercase();
                terms.iter().any(|term| haystack.contains(term))
            })
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                })
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
