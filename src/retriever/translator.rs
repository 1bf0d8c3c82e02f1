use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::query::{Comparator, FilterExpr, Operator, StructuredQuery};
use crate::error::RetrieverError;

/// How a retriever's default filter combines with the one the model wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeFilters {
    /// Both must match.
    #[default]
    And,
    /// Either may match.
    Or,
    /// The generated filter wins when there is one.
    Replace,
}

/// Turns a [`FilterExpr`] into the filter format a particular vector store
/// understands.
pub trait QueryTranslator: Send + Sync {
    fn allowed_comparators(&self) -> &[Comparator];

    fn allowed_operators(&self) -> &[Operator];

    fn visit(&self, expr: &FilterExpr) -> Result<Value, RetrieverError>;

    /// Translate the query's filter, if it has one.
    fn translate(&self, query: &StructuredQuery) -> Result<Option<Value>, RetrieverError> {
        query.filter.as_ref().map(|f| self.visit(f)).transpose()
    }

    /// Combine a default filter with a generated one. An empty object
    /// counts as no filter.
    fn merge_filters(
        &self,
        default: Option<&Value>,
        generated: Option<Value>,
        merge: MergeFilters,
    ) -> Option<Value> {
        let default = default.filter(|d| !is_empty_filter(d)).cloned();
        let generated = generated.filter(|g| !is_empty_filter(g));
        match (default, generated) {
            (None, g) => g,
            (d, None) => d,
            (Some(d), Some(g)) => match merge {
                MergeFilters::Replace => Some(g),
                MergeFilters::And => Some(json!({ "$and": [d, g] })),
                MergeFilters::Or => Some(json!({ "$or": [d, g] })),
            },
        }
    }
}

fn is_empty_filter(filter: &Value) -> bool {
    filter.as_object().is_some_and(Map::is_empty)
}

/// Emits `$`-prefixed JSON filters:
///
/// ```text
/// {"$and": [{"genre": {"$eq": "animated"}}, {"year": {"$gt": 1990}}]}
/// ```
///
/// This is the format [`InMemoryVectorStore`](super::store::InMemoryVectorStore) evaluates.
#[derive(Debug, Clone)]
pub struct BasicTranslator {
    comparators: Vec<Comparator>,
    operators: Vec<Operator>,
}

impl Default for BasicTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicTranslator {
    pub fn new() -> Self {
        Self {
            comparators: Comparator::ALL.to_vec(),
            operators: Operator::ALL.to_vec(),
        }
    }

    /// Restrict which comparators the model may use.
    pub fn with_comparators(mut self, comparators: impl IntoIterator<Item = Comparator>) -> Self {
        self.comparators = comparators.into_iter().collect();
        self
    }

    pub fn with_operators(mut self, operators: impl IntoIterator<Item = Operator>) -> Self {
        self.operators = operators.into_iter().collect();
        self
    }
}

impl QueryTranslator for BasicTranslator {
    fn allowed_comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    fn allowed_operators(&self) -> &[Operator] {
        &self.operators
    }

    fn visit(&self, expr: &FilterExpr) -> Result<Value, RetrieverError> {
        match expr {
            FilterExpr::Comparison {
                comparator,
                attribute,
                value,
            } => {
                if !self.comparators.contains(comparator) {
                    return Err(RetrieverError::Translation(format!(
                        "comparator `{}` is not allowed",
                        comparator.as_str()
                    )));
                }
                let mut cond = Map::new();
                cond.insert(format!("${}", comparator.as_str()), value.clone());
                let mut out = Map::new();
                out.insert(attribute.clone(), Value::Object(cond));
                Ok(Value::Object(out))
            }
            FilterExpr::Operation {
                operator,
                arguments,
            } => {
                if !self.operators.contains(operator) {
                    return Err(RetrieverError::Translation(format!(
                        "operator `{}` is not allowed",
                        operator.as_str()
                    )));
                }
                let args = arguments
                    .iter()
                    .map(|a| self.visit(a))
                    .collect::<Result<Vec<_>, _>>()?;
                let key = format!("${}", operator.as_str());
                let body = match (operator, <[Value; 1]>::try_from(args)) {
                    (Operator::Not, Ok([single])) => single,
                    (_, Ok([single])) => Value::Array(vec![single]),
                    (_, Err(args)) => Value::Array(args),
                };
                let mut out = Map::new();
                out.insert(key, body);
                Ok(Value::Object(out))
            }
        }
    }
}
