use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RetrieverError;

/// A unit of retrievable text plus the metadata filters run against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrieverError>;

    /// Defaults to one `embed` call per text. Override for backends with
    /// native batching.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrieverError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimensions(&self) -> usize;
}

/// Backend storage trait. The retriever hands it the rewritten query, a
/// result count, and a filter already translated into the store's format.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store documents. Returns how many were added.
    async fn add_documents(&self, docs: Vec<Document>) -> Result<usize, RetrieverError>;

    /// Top `k` documents by similarity to `query`, restricted to those
    /// whose metadata matches `filter`.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<Document>, RetrieverError>;
}

/// Vector store held entirely in memory. Scores by cosine similarity and
/// understands the filters [`BasicTranslator`](super::translator::BasicTranslator) emits.
pub struct InMemoryVectorStore {
    embedder: Box<dyn EmbeddingProvider>,
    entries: RwLock<Vec<(Vec<f32>, Document)>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: impl EmbeddingProvider + 'static) -> Self {
        Self {
            embedder: Box::new(embedder),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_documents(&self, docs: Vec<Document>) -> Result<usize, RetrieverError> {
        let texts: Vec<String> = docs.iter().map(|d| d.page_content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != docs.len() {
            return Err(RetrieverError::Embedding(format!(
                "expected {} embeddings, got {}",
                docs.len(),
                embeddings.len()
            )));
        }
        let dims = self.embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dims) {
            return Err(RetrieverError::Embedding(format!(
                "expected {dims}-dimensional embedding, got {}",
                bad.len()
            )));
        }

        let added = docs.len();
        self.entries
            .write()
            .await
            .extend(embeddings.into_iter().zip(docs));
        debug!(added, "stored documents");
        Ok(added)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<Document>, RetrieverError> {
        let query_embedding = self.embedder.embed(query).await?;
        let entries = self.entries.read().await;

        let mut scored = Vec::new();
        for (embedding, doc) in entries.iter() {
            if let Some(filter) = filter {
                if !matches_filter(filter, &doc.metadata)? {
                    continue;
                }
            }
            scored.push((cosine_similarity(&query_embedding, embedding), doc));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

/// Compute cosine similarity between two vectors. Mismatched or zero
/// vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Evaluate a `$`-operator filter against document metadata.
///
/// Every key of a filter object must hold. `$and`, `$or` take a list of
/// filters, `$not` a filter or a list (negated conjunction). Any other key
/// names an attribute whose condition is either an object of
/// `$eq`/`$ne`/`$gt`/`$gte`/`$lt`/`$lte`/`$contain`/`$like`/`$in`/`$nin`
/// operands, or a bare value meaning `$eq`.
pub fn matches_filter(filter: &Value, metadata: &Map<String, Value>) -> Result<bool, RetrieverError> {
    let Value::Object(clauses) = filter else {
        return Err(RetrieverError::Store(format!(
            "filter must be an object, got {filter}"
        )));
    };

    for (key, cond) in clauses {
        let ok = match key.as_str() {
            "$and" => all(filter_list(key, cond)?, metadata)?,
            "$or" => {
                let mut any = false;
                for f in filter_list(key, cond)? {
                    if matches_filter(f, metadata)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$not" => match cond {
                Value::Array(list) => !all(list, metadata)?,
                other => !matches_filter(other, metadata)?,
            },
            attribute => matches_condition(metadata.get(attribute), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn filter_list<'a>(key: &str, cond: &'a Value) -> Result<&'a [Value], RetrieverError> {
    cond.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| RetrieverError::Store(format!("`{key}` expects a list of filters")))
}

fn all(filters: &[Value], metadata: &Map<String, Value>) -> Result<bool, RetrieverError> {
    for f in filters {
        if !matches_filter(f, metadata)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(field: Option<&Value>, cond: &Value) -> Result<bool, RetrieverError> {
    let ops = match cond {
        Value::Object(ops) if ops.is_empty() => {
            return Err(RetrieverError::Store(
                "empty condition object; use a value or a `$` operator".into(),
            ))
        }
        Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) => ops,
        bare => return Ok(field.is_some_and(|f| values_eq(f, bare))),
    };

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => field.is_some_and(|f| values_eq(f, operand)),
            "$ne" => !field.is_some_and(|f| values_eq(f, operand)),
            "$gt" => compare(field, operand).is_some_and(Ordering::is_gt),
            "$gte" => compare(field, operand).is_some_and(Ordering::is_ge),
            "$lt" => compare(field, operand).is_some_and(Ordering::is_lt),
            "$lte" => compare(field, operand).is_some_and(Ordering::is_le),
            "$contain" => match (field, operand) {
                (Some(Value::String(s)), Value::String(needle)) => s.contains(needle.as_str()),
                (Some(Value::Array(items)), needle) => items.iter().any(|i| values_eq(i, needle)),
                _ => false,
            },
            "$like" => match (field, operand) {
                (Some(Value::String(s)), Value::String(pattern)) => like(s, pattern),
                _ => false,
            },
            "$in" => in_list(field, operand, op)?,
            "$nin" => !in_list(field, operand, op)?,
            other => {
                return Err(RetrieverError::Store(format!(
                    "unsupported filter operator `{other}`"
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(field: Option<&Value>, operand: &Value, op: &str) -> Result<bool, RetrieverError> {
    let list = operand
        .as_array()
        .ok_or_else(|| RetrieverError::Store(format!("`{op}` expects a list")))?;
    Ok(field.is_some_and(|f| list.iter().any(|v| values_eq(f, v))))
}

fn values_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Numbers compare numerically, strings lexically (ISO dates sort correctly).
fn compare(field: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (field?, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

/// Case-insensitive SQL-style `LIKE` with `%` wildcards. A pattern without
/// wildcards matches as a substring.
/// SQL-style `LIKE`, case-insensitive: `%` matches any run, `_` one char.
/// A pattern without wildcards matches as a substring.
fn like(haystack: &str, pattern: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let pattern = pattern.to_lowercase();
    if !pattern.contains(['%', '_']) {
        return haystack.contains(&pattern);
    }

    let h: Vec<char> = haystack.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut i, mut j) = (0, 0);
    // Last `%` seen and the haystack position it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;
    while i < h.len() {
        if j < p.len() && (p[j] == '_' || p[j] == h[i]) {
            i += 1;
            j += 1;
        } else if j < p.len() && p[j] == '%' {
            backtrack = Some((j, i));
            j += 1;
        } else if let Some((pct, from)) = backtrack {
            backtrack = Some((pct, from + 1));
            j = pct + 1;
            i = from + 1;
        } else {
            return false;
        }
    }
    p[j..].iter().all(|&c| c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct KeywordEmbedder;

    const VOCAB: [&str; 4] = ["dinosaur", "dream", "toy", "zone"];

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrieverError> {
            let text = text.to_lowercase();
            Ok(VOCAB.iter().map(|w| text.matches(w).count() as f32).collect())
        }

        fn dimensions(&self) -> usize {
            VOCAB.len()
        }
    }

    struct WrongDims;

    #[async_trait]
    impl EmbeddingProvider for WrongDims {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrieverError> {
            Ok(vec![1.0])
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    fn meta(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn movie_store() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new(KeywordEmbedder);
        store
            .add_documents(vec![
                Document::new("Scientists bring back dinosaurs and mayhem breaks loose")
                    .with_metadata("year", 1993)
                    .with_metadata("genre", "science fiction"),
                Document::new("A dream within a dream within a dream")
                    .with_metadata("year", 2010)
                    .with_metadata("rating", 8.2),
                Document::new("Toys come alive and have a blast doing so")
                    .with_metadata("year", 1995)
                    .with_metadata("genre", "animated"),
                Document::new("Three men walk into the Zone, three men walk out of the Zone")
                    .with_metadata("year", 1979)
                    .with_metadata("genre", "science fiction"),
            ])
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &[1.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn ranks_by_similarity() {
        let store = movie_store().await;
        assert_eq!(store.len().await, 4);
        let docs = store.similarity_search("dream", 1, None).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["year"], 2010);
    }

    #[tokio::test]
    async fn filters_before_ranking() {
        let store = movie_store().await;
        let filter = json!({"genre": {"$eq": "science fiction"}, "year": {"$lt": 1990}});
        let docs = store.similarity_search("dinosaur", 4, Some(&filter)).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].page_content.contains("Zone"));
    }

    #[tokio::test]
    async fn rejects_wrong_dimensions() {
        let store = InMemoryVectorStore::new(WrongDims);
        let err = store.add_documents(vec![Document::new("x")]).await.unwrap_err();
        assert!(matches!(err, RetrieverError::Embedding(_)));
        assert!(store.is_empty().await);
    }

    #[test]
    fn logical_operators() {
        let m = meta(json!({"year": 1995, "genre": "animated"}));
        let yes = |f: Value| matches_filter(&f, &m).unwrap();

        assert!(yes(json!({"$and": [{"year": {"$gte": 1995}}, {"genre": "animated"}]})));
        assert!(yes(json!({"$or": [{"year": {"$gt": 2000}}, {"genre": {"$ne": "drama"}}]})));
        assert!(!yes(json!({"$or": [{"year": {"$gt": 2000}}, {"genre": "drama"}]})));
        assert!(yes(json!({"$not": {"year": {"$lt": 1990}}})));
        assert!(!yes(json!({"$not": [{"year": 1995}, {"genre": "animated"}]})));
    }

    #[test]
    fn comparison_operators() {
        let m = meta(json!({
            "year": 2010,
            "rating": 8.2,
            "director": "Christopher Nolan",
            "tags": ["heist", "dreams"],
            "released": "2010-07-16"
        }));
        let yes = |f: Value| matches_filter(&f, &m).unwrap();

        assert!(yes(json!({"year": {"$eq": 2010.0}})));
        assert!(yes(json!({"rating": {"$gt": 8, "$lte": 8.2}})));
        assert!(yes(json!({"director": {"$contain": "Nolan"}})));
        assert!(yes(json!({"tags": {"$contain": "heist"}})));
        assert!(yes(json!({"director": {"$like": "chris%nolan"}})));
        assert!(!yes(json!({"director": {"$like": "nolan%"}})));
        assert!(yes(json!({"year": {"$in": [2009, 2010]}})));
        assert!(yes(json!({"year": {"$nin": [1999]}})));
        assert!(yes(json!({"released": {"$gte": "2010-01-01"}})));
        // Missing attributes only satisfy negative conditions.
        assert!(!yes(json!({"studio": {"$eq": "WB"}})));
        assert!(yes(json!({"studio": {"$ne": "WB"}})));
        assert!(!yes(json!({"studio": {"$gt": 1}})));
    }

    #[test]
    fn malformed_filters_are_errors() {
        let m = meta(json!({"year": 2010}));
        assert!(matches_filter(&json!([1]), &m).is_err());
        assert!(matches_filter(&json!({"$and": {"year": 2010}}), &m).is_err());
        assert!(matches_filter(&json!({"year": {"$between": [1, 2]}}), &m).is_err());
        assert!(matches_filter(&json!({"year": {"$in": 2010}}), &m).is_err());
    }

    #[test]
    fn like_wildcards() {
        assert!(like("A Dream Within", "%dream%"));
        assert!(like("A Dream Within", "a %"));
        assert!(like("A Dream Within", "%within"));
        assert!(!like("A Dream Within", "%dream"));
        assert!(like("abc", "abc"));
        assert!(like("Cat", "c_t"));
        assert!(!like("coat", "c_t"));
        assert!(like("A Dream Within", "a_dream%"));
        assert!(like("aXbXc", "%x_"));
        assert!(!like("ab", "a_%b"));
    }

    #[test]
    fn empty_condition_object_is_rejected() {
        let metadata = meta(json!({"year": 1993}));
        assert!(matches!(
            matches_filter(&json!({"year": {}}), &metadata),
            Err(RetrieverError::Store(_))
        ));
        assert!(matches_filter(&json!({}), &metadata).unwrap());
    }
}
