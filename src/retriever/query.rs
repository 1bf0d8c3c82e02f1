use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied to a single metadata attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contain,
    Like,
    In,
    Nin,
}

impl Comparator {
    pub const ALL: [Comparator; 10] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Contain,
        Self::Like,
        Self::In,
        Self::Nin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contain => "contain",
            Self::Like => "like",
            Self::In => "in",
            Self::Nin => "nin",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// Logical combination of filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    pub const ALL: [Operator; 3] = [Self::And, Self::Or, Self::Not];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == name)
    }
}

/// Store-independent filter over document metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Comparison {
        comparator: Comparator,
        attribute: String,
        value: Value,
    },
    Operation {
        operator: Operator,
        arguments: Vec<FilterExpr>,
    },
}

impl FilterExpr {
    pub fn comparison(
        comparator: Comparator,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::Comparison {
            comparator,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn and(arguments: Vec<FilterExpr>) -> Self {
        Self::Operation {
            operator: Operator::And,
            arguments,
        }
    }

    pub fn or(arguments: Vec<FilterExpr>) -> Self {
        Self::Operation {
            operator: Operator::Or,
            arguments,
        }
    }

    pub fn not(argument: FilterExpr) -> Self {
        Self::Operation {
            operator: Operator::Not,
            arguments: vec![argument],
        }
    }

    /// Drop comparisons on attributes `keep` rejects. Operations left with
    /// no arguments disappear; `and`/`or` with a single argument collapse
    /// into it.
    pub fn prune(self, keep: &dyn Fn(&str) -> bool) -> Option<FilterExpr> {
        match self {
            Self::Comparison {
                comparator,
                attribute,
                value,
            } => keep(&attribute).then(|| Self::Comparison {
                comparator,
                attribute,
                value,
            }),
            Self::Operation {
                operator,
                arguments,
            } => {
                let mut kept: Vec<FilterExpr> =
                    arguments.into_iter().filter_map(|a| a.prune(keep)).collect();
                match (operator, kept.len()) {
                    (_, 0) => None,
                    (Operator::And | Operator::Or, 1) => kept.pop(),
                    _ => Some(Self::Operation {
                        operator,
                        arguments: kept,
                    }),
                }
            }
        }
    }
}

/// What the query constructor extracts from a natural-language question.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredQuery {
    /// Text to compare against document contents.
    pub query: String,
    pub filter: Option<FilterExpr>,
    pub limit: Option<usize>,
}

/// Describes one metadata attribute the model may filter on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub description: String,
    /// Type hint shown to the model, e.g. `"integer"`, `"string or list[string]"`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl AttributeInfo {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for c in Comparator::ALL {
            assert_eq!(Comparator::from_name(c.as_str()), Some(c));
        }
        assert_eq!(Operator::from_name("or"), Some(Operator::Or));
        assert_eq!(Comparator::from_name("between"), None);
    }

    #[test]
    fn prune_drops_unknown_attributes() {
        let expr = FilterExpr::and(vec![
            FilterExpr::comparison(Comparator::Gt, "year", 2000),
            FilterExpr::comparison(Comparator::Eq, "studio", "A24"),
        ]);
        let keep = |a: &str| a == "year";
        assert_eq!(
            expr.prune(&keep),
            Some(FilterExpr::comparison(Comparator::Gt, "year", 2000))
        );
    }

    #[test]
    fn prune_removes_empty_operations() {
        let expr = FilterExpr::not(FilterExpr::comparison(Comparator::Eq, "studio", "A24"));
        assert_eq!(expr.prune(&|a: &str| a == "year"), None);
    }

    #[test]
    fn prune_keeps_not_with_single_argument() {
        let expr = FilterExpr::not(FilterExpr::comparison(Comparator::Eq, "year", 1999));
        assert_eq!(expr.clone().prune(&|_: &str| true), Some(expr));
    }
}
