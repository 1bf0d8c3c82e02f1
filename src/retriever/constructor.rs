use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::parser::parse_filter;
use super::query::{AttributeInfo, Comparator, Operator, StructuredQuery};
use crate::error::RetrieverError;
use crate::provider::InferenceProvider;
use crate::types::InferenceRequest;

/// Turns a natural-language question into a [`StructuredQuery`].
#[async_trait]
pub trait QueryConstructor: Send + Sync {
    async fn construct(&self, query: &str) -> Result<StructuredQuery, RetrieverError>;
}

/// Model settings for [`LlmQueryConstructor`].
#[derive(Debug, Clone)]
pub struct QueryConstructorConfig {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for QueryConstructorConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 1024,
        }
    }
}

/// Asks a language model to split a question into search text, a metadata
/// filter and an optional result limit.
pub struct LlmQueryConstructor {
    provider: Arc<dyn InferenceProvider>,
    config: QueryConstructorConfig,
    document_contents: String,
    attributes: Vec<AttributeInfo>,
    comparators: Vec<Comparator>,
    operators: Vec<Operator>,
}

impl LlmQueryConstructor {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        document_contents: impl Into<String>,
        attributes: Vec<AttributeInfo>,
    ) -> Self {
        Self {
            provider,
            config: QueryConstructorConfig::default(),
            document_contents: document_contents.into(),
            attributes,
            comparators: Comparator::ALL.to_vec(),
            operators: Operator::ALL.to_vec(),
        }
    }

    pub fn with_config(mut self, config: QueryConstructorConfig) -> Self {
        self.config = config;
        self
    }

    /// Limit the comparators and operators the model is told about.
    pub fn with_allowed(
        mut self,
        comparators: impl IntoIterator<Item = Comparator>,
        operators: impl IntoIterator<Item = Operator>,
    ) -> Self {
        self.comparators = comparators.into_iter().collect();
        self.operators = operators.into_iter().collect();
        self
    }

    /// Instructions describing the data source and the output format.
    pub fn system_prompt(&self) -> String {
        let comparators = self
            .comparators
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        let operators = self
            .operators
            .iter()
            .map(|o| o.as_str())
            .collect::<Vec<_>>()
            .join(" | ");

        let mut attributes = Map::new();
        for attr in &self.attributes {
            attributes.insert(
                attr.name.clone(),
                json!({ "description": attr.description, "type": attr.kind }),
            );
        }
        let data_source = serde_json::to_string_pretty(&json!({
            "content": self.document_contents,
            "attributes": attributes,
        }))
        .unwrap_or_default();

        format!(
            "Rewrite the user's question as a structured request against the data source below.\n\
             \n\
             Reply with a markdown ```json block holding one object:\n\
             - \"query\": text to match against document contents; leave out anything the filter already covers, or use \"\" if nothing remains\n\
             - \"filter\": a filter expression, or \"NO_FILTER\" if none applies\n\
             - \"limit\": how many documents the user asked for, omitted if they did not say\n\
             \n\
             A filter expression is either a comparison or a logical operation:\n\
             - comparison: comp(\"attribute\", value) where comp is one of {comparators}\n\
             - operation: op(expr, expr, ...) where op is one of {operators}\n\
             Values are quoted strings, numbers, true/false, or [lists]. Only use the attributes \
             listed in the data source and only compare them with values of the stated type.\n\
             \n\
             Data source:\n\
             ```json\n{data_source}\n```"
        )
    }

    /// Extract the structured request from the model's reply. Comparisons on
    /// attributes outside the declared list are dropped.
    pub fn parse_output(&self, text: &str) -> Result<StructuredQuery, RetrieverError> {
        let raw = extract_json(text).ok_or_else(|| {
            RetrieverError::QueryConstruction(format!("no JSON object in model output: {text:?}"))
        })?;
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|e| RetrieverError::QueryConstruction(format!("invalid JSON: {e}")))?;

        let query = match parsed.get("query") {
            Some(Value::String(s)) => s.clone(),
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                return Err(RetrieverError::QueryConstruction(format!(
                    "`query` must be a string, got {other}"
                )))
            }
        };

        let filter = match parsed.get("filter") {
            Some(Value::String(s)) => parse_filter(s)?,
            None | Some(Value::Null) => None,
            Some(other) => {
                return Err(RetrieverError::QueryConstruction(format!(
                    "`filter` must be a string, got {other}"
                )))
            }
        };
        let filter = filter.and_then(|f| {
            let before = f.clone();
            let pruned = f.prune(&|name: &str| self.attributes.iter().any(|a| a.name == name));
            if pruned.as_ref() != Some(&before) {
                warn!(filter = ?before, "dropped comparisons on undeclared attributes");
            }
            pruned
        });

        let limit = match parsed.get("limit") {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(0) | None => None,
                Some(n) => Some(n as usize),
            },
            _ => None,
        };

        Ok(StructuredQuery {
            query,
            filter,
            limit,
        })
    }
}

/// The object inside a ```json fence, or the outermost `{...}` span.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[async_trait]
impl QueryConstructor for LlmQueryConstructor {
    async fn construct(&self, query: &str) -> Result<StructuredQuery, RetrieverError> {
        let request = InferenceRequest::user(
            &self.config.model,
            self.config.max_tokens,
            format!("User query: {query}"),
        )
        .with_system(self.system_prompt());

        let response = self.provider.infer(request).await?;
        let structured = self.parse_output(&response.text())?;
        debug!(query = %structured.query, filter = ?structured.filter, limit = ?structured.limit, "constructed structured query");
        Ok(structured)
    }
}
