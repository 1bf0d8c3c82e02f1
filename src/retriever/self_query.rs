use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::constructor::{LlmQueryConstructor, QueryConstructor, QueryConstructorConfig};
use super::query::AttributeInfo;
use super::store::{Document, VectorStore};
use super::translator::{MergeFilters, QueryTranslator};
use crate::error::{HandlerError, RetrieverError, ToolError};
use crate::provider::InferenceProvider;
use crate::tools::{Tool, ToolHandler, ToolInput};

/// Defaults applied to every search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Results per search unless the model asks for a specific number.
    pub k: usize,
    /// Filter in the store's format, always combined with the generated one.
    pub filter: Option<Value>,
    pub merge_filters: MergeFilters,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: 4,
            filter: None,
            merge_filters: MergeFilters::And,
        }
    }
}

/// Everything [`SelfQueryRetriever::from_llm`] needs.
pub struct SelfQueryConfig {
    pub llm: Arc<dyn InferenceProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    /// One-line description of what the documents contain.
    pub document_contents: String,
    pub attribute_info: Vec<AttributeInfo>,
    pub structured_query_translator: Box<dyn QueryTranslator>,
    pub search_params: SearchParams,
    /// Search with the user's question verbatim instead of the rewritten text.
    pub use_original_query: bool,
    pub constructor: QueryConstructorConfig,
}

impl SelfQueryConfig {
    pub fn new(
        llm: Arc<dyn InferenceProvider>,
        vector_store: Arc<dyn VectorStore>,
        document_contents: impl Into<String>,
        attribute_info: Vec<AttributeInfo>,
        translator: impl QueryTranslator + 'static,
    ) -> Self {
        Self {
            llm,
            vector_store,
            document_contents: document_contents.into(),
            attribute_info,
            structured_query_translator: Box::new(translator),
            search_params: SearchParams::default(),
            use_original_query: false,
            constructor: QueryConstructorConfig::default(),
        }
    }

    pub fn with_search_params(mut self, search_params: SearchParams) -> Self {
        self.search_params = search_params;
        self
    }

    pub fn with_original_query(mut self, use_original_query: bool) -> Self {
        self.use_original_query = use_original_query;
        self
    }
}

/// Retriever that lets a model write its own metadata filter.
///
/// Each call: question → structured query → store-specific filter, merged
/// with the default filter → similarity search.
pub struct SelfQueryRetriever {
    constructor: Box<dyn QueryConstructor>,
    vector_store: Arc<dyn VectorStore>,
    translator: Box<dyn QueryTranslator>,
    search_params: SearchParams,
    use_original_query: bool,
}

impl SelfQueryRetriever {
    pub fn new(
        constructor: impl QueryConstructor + 'static,
        vector_store: Arc<dyn VectorStore>,
        translator: impl QueryTranslator + 'static,
    ) -> Self {
        Self {
            constructor: Box::new(constructor),
            vector_store,
            translator: Box::new(translator),
            search_params: SearchParams::default(),
            use_original_query: false,
        }
    }

    /// Build a retriever whose query constructor is backed by `config.llm`.
    /// The model is only told about comparators and operators the
    /// translator accepts.
    pub fn from_llm(config: SelfQueryConfig) -> Self {
        let translator = config.structured_query_translator;
        let constructor =
            LlmQueryConstructor::new(config.llm, config.document_contents, config.attribute_info)
                .with_config(config.constructor)
                .with_allowed(
                    translator.allowed_comparators().to_vec(),
                    translator.allowed_operators().to_vec(),
                );

        Self {
            constructor: Box::new(constructor),
            vector_store: config.vector_store,
            translator,
            search_params: config.search_params,
            use_original_query: config.use_original_query,
        }
    }

    pub fn with_search_params(mut self, search_params: SearchParams) -> Self {
        self.search_params = search_params;
        self
    }

    pub fn with_original_query(mut self, use_original_query: bool) -> Self {
        self.use_original_query = use_original_query;
        self
    }

    pub fn search_params(&self) -> &SearchParams {
        &self.search_params
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RetrieverError> {
        let structured = self.constructor.construct(query).await?;
        let generated = self.translator.translate(&structured)?;
        let filter = self.translator.merge_filters(
            self.search_params.filter.as_ref(),
            generated,
            self.search_params.merge_filters,
        );
        let k = structured.limit.unwrap_or(self.search_params.k);
        let text = if self.use_original_query || structured.query.trim().is_empty() {
            query
        } else {
            structured.query.as_str()
        };

        debug!(text, k, filter = ?filter, "searching vector store");
        let docs = self
            .vector_store
            .similarity_search(text, k, filter.as_ref())
            .await?;
        info!(results = docs.len(), "self-query retrieval complete");
        Ok(docs)
    }

    /// Expose the retriever to an agent as a text-input tool. The output is
    /// each document's content, separated by blank lines.
    pub fn into_tool(
        self: Arc<Self>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Tool, ToolError> {
        Tool::builder(name)
            .description(description)
            .handler(RetrieverTool { retriever: self })
            .build()
    }
}

struct RetrieverTool {
    retriever: Arc<SelfQueryRetriever>,
}

#[async_trait]
impl ToolHandler for RetrieverTool {
    async fn call(&self, input: ToolInput) -> Result<String, HandlerError> {
        let query = input.as_text().unwrap_or_default();
        let docs = self.retriever.retrieve(query).await?;
        Ok(docs
            .iter()
            .map(|d| d.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::retriever::query::{Comparator, FilterExpr, StructuredQuery};
    use crate::retriever::store::{EmbeddingProvider, InMemoryVectorStore};
    use crate::retriever::translator::BasicTranslator;
    use crate::types::{ContentBlock, InferenceRequest, InferenceResponse, StopReason, Usage};
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    // --- Fakes ---

    struct KeywordEmbedder;

    const VOCAB: [&str; 5] = ["dinosaur", "dream", "toy", "zone", "women"];

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

    struct FixedConstructor(StructuredQuery);

    #[async_trait]
    impl QueryConstructor for FixedConstructor {
        async fn construct(&self, _query: &str) -> Result<StructuredQuery, RetrieverError> {
            Ok(self.0.clone())
        }
    }

    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn infer(
            &self,
            _request: InferenceRequest,
        ) -> Result<InferenceResponse, InferenceError> {
            let reply = self
                .replies
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| InferenceError::Request("no more scripted replies".into()))?;
            Ok(InferenceResponse {
                stop_reason: StopReason::EndTurn,
                content: vec![ContentBlock::Text(reply)],
                usage: Usage::default(),
            })
        }
    }

    // --- Helpers ---

    async fn movies() -> Arc<dyn VectorStore> {
        let store = InMemoryVectorStore::new(KeywordEmbedder);
        store
            .add_documents(vec![
                Document::new("A bunch of scientists bring back dinosaurs and mayhem breaks loose")
                    .with_metadata("year", 1993)
                    .with_metadata("rating", 7.7)
                    .with_metadata("genre", "science fiction"),
                Document::new("Leo DiCaprio gets lost in a dream within a dream within a dream")
                    .with_metadata("year", 2010)
                    .with_metadata("director", "Christopher Nolan")
                    .with_metadata("rating", 8.2),
                Document::new("A psychologist gets lost in a series of dreams within dreams")
                    .with_metadata("year", 2006)
                    .with_metadata("director", "Satoshi Kon")
                    .with_metadata("rating", 8.6),
                Document::new("A bunch of normal-sized women are supremely wholesome")
                    .with_metadata("year", 2019)
                    .with_metadata("director", "Greta Gerwig")
                    .with_metadata("rating", 8.3),
                Document::new("Toys come alive and have a blast doing so")
                    .with_metadata("year", 1995)
                    .with_metadata("genre", "animated"),
                Document::new("Three men walk into the Zone, three men walk out of the Zone")
                    .with_metadata("year", 1979)
                    .with_metadata("director", "Andrei Tarkovsky")
                    .with_metadata("genre", "science fiction")
                    .with_metadata("rating", 9.9),
            ])
            .await
            .unwrap();
        Arc::new(store)
    }

    fn attributes() -> Vec<AttributeInfo> {
        vec![
            AttributeInfo::new("genre", "The genre of the movie", "string or list[string]"),
            AttributeInfo::new("year", "The year the movie was released", "integer"),
            AttributeInfo::new("director", "The name of the movie director", "string"),
            AttributeInfo::new("rating", "A 1-10 rating for the movie", "float"),
        ]
    }

    fn fixed(query: &str, filter: Option<FilterExpr>, limit: Option<usize>) -> FixedConstructor {
        FixedConstructor(StructuredQuery {
            query: query.into(),
            filter,
            limit,
        })
    }

    // --- Tests ---

    #[tokio::test]
    async fn generated_filter_restricts_results() {
        let retriever = SelfQueryRetriever::new(
            fixed(
                "",
                Some(FilterExpr::comparison(Comparator::Gt, "rating", 8.5)),
                None,
            ),
            movies().await,
            BasicTranslator::new(),
        );
        let docs = retriever
            .retrieve("movies rated higher than 8.5")
            .await
            .unwrap();
        let years: Vec<&Value> = docs.iter().map(|d| &d.metadata["year"]).collect();
        assert_eq!(docs.len(), 2);
        assert!(years.contains(&&json!(2006)));
        assert!(years.contains(&&json!(1979)));
    }

    #[tokio::test]
    async fn limit_overrides_default_k() {
        let retriever = SelfQueryRetriever::new(
            fixed("dream", None, Some(1)),
            movies().await,
            BasicTranslator::new(),
        );
        let docs = retriever.retrieve("one movie about dreams").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].page_content.contains("dream"));
    }

    #[tokio::test]
    async fn default_k_applies_without_limit() {
        let retriever = SelfQueryRetriever::new(fixed("", None, None), movies().await, BasicTranslator::new())
            .with_search_params(SearchParams {
                k: 2,
                ..Default::default()
            });
        assert_eq!(retriever.retrieve("anything").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn default_filter_is_merged() {
        let generated = Some(FilterExpr::comparison(Comparator::Eq, "genre", "science fiction"));
        let default = SearchParams {
            k: 10,
            filter: Some(json!({"year": {"$gt": 1990}})),
            merge_filters: MergeFilters::And,
        };

        let and = SelfQueryRetriever::new(
            fixed("", generated.clone(), None),
            movies().await,
            BasicTranslator::new(),
        )
        .with_search_params(default.clone());
        let docs = and.retrieve("science fiction").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["year"], 1993);

        let or = SelfQueryRetriever::new(
            fixed("", generated.clone(), None),
            movies().await,
            BasicTranslator::new(),
        )
        .with_search_params(SearchParams {
            merge_filters: MergeFilters::Or,
            ..default.clone()
        });
        assert_eq!(or.retrieve("science fiction").await.unwrap().len(), 6);

        let replace = SelfQueryRetriever::new(fixed("", generated, None), movies().await, BasicTranslator::new())
            .with_search_params(SearchParams {
                merge_filters: MergeFilters::Replace,
                ..default
            });
        assert_eq!(replace.retrieve("science fiction").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_rewritten_query_falls_back_to_original() {
        for rewritten in ["", "   "] {
            let retriever = SelfQueryRetriever::new(
                fixed(rewritten, None, Some(1)),
                movies().await,
                BasicTranslator::new(),
            );
            assert_eq!(retriever.search_params().k, 4);
            let docs = retriever.retrieve("dinosaur").await.unwrap();
            assert_eq!(docs.len(), 1);
            assert!(docs[0].page_content.contains("dinosaurs"));
        }
    }

    #[tokio::test]
    async fn original_query_is_used_when_requested() {
        let retriever = SelfQueryRetriever::new(
            fixed("zone", None, Some(1)),
            movies().await,
            BasicTranslator::new(),
        );
        let rewritten = retriever.retrieve("dinosaur").await.unwrap();
        assert!(rewritten[0].page_content.contains("Zone"));

        let retriever = retriever.with_original_query(true);
        let original = retriever.retrieve("dinosaur").await.unwrap();
        assert!(original[0].page_content.contains("dinosaurs"));
    }

    #[tokio::test]
    async fn disallowed_comparator_fails_translation() {
        let retriever = SelfQueryRetriever::new(
            fixed(
                "",
                Some(FilterExpr::comparison(Comparator::Like, "director", "%Nolan%")),
                None,
            ),
            movies().await,
            BasicTranslator::new().with_comparators([Comparator::Eq]),
        );
        assert!(matches!(
            retriever.retrieve("Nolan films").await,
            Err(RetrieverError::Translation(_))
        ));
    }

    #[tokio::test]
    async fn from_llm_end_to_end() {
        let llm = Arc::new(ScriptedProvider::new(&[
            "```json\n{\"query\": \"women\", \"filter\": \"and(gt(\\\"year\\\", 2000), eq(\\\"director\\\", \\\"Greta Gerwig\\\"))\"}\n```",
        ]));
        let config = SelfQueryConfig::new(
            llm,
            movies().await,
            "Brief summary of a movie",
            attributes(),
            BasicTranslator::new(),
        );
        let retriever = SelfQueryRetriever::from_llm(config);
        let docs = retriever
            .retrieve("What's a movie after 2000 directed by Greta Gerwig about women?")
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["director"], "Greta Gerwig");
    }

    #[tokio::test]
    async fn inference_failure_propagates() {
        let llm = Arc::new(ScriptedProvider::new(&[]));
        let retriever = SelfQueryRetriever::from_llm(SelfQueryConfig::new(
            llm,
            movies().await,
            "Brief summary of a movie",
            attributes(),
            BasicTranslator::new(),
        ));
        assert!(matches!(
            retriever.retrieve("anything").await,
            Err(RetrieverError::Inference(_))
        ));
    }

    #[tokio::test]
    async fn retriever_as_tool() {
        let retriever = Arc::new(SelfQueryRetriever::new(
            fixed("toy", Some(FilterExpr::comparison(Comparator::Eq, "genre", "animated")), None),
            movies().await,
            BasicTranslator::new(),
        ));
        let tool = retriever.into_tool("movie_search", "Search movie summaries").unwrap();
        assert!(tool.schema().is_text());
        assert_eq!(
            tool.invoke("animated movies").await.unwrap(),
            "Toys come alive and have a blast doing so"
        );
    }

    #[tokio::test]
    async fn tool_surfaces_retrieval_errors() {
        let llm = Arc::new(ScriptedProvider::new(&["not json at all"]));
        let retriever = Arc::new(SelfQueryRetriever::from_llm(SelfQueryConfig::new(
            llm,
            movies().await,
            "Brief summary of a movie",
            attributes(),
            BasicTranslator::new(),
        )));
        let tool = retriever.into_tool("movie_search", "Search movie summaries").unwrap();
        assert!(matches!(
            tool.invoke("anything").await,
            Err(ToolError::Handler { .. })
        ));
    }
}
