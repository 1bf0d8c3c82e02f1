//! Tools for LLM agents: a named, described handler behind a validated
//! `invoke` call, plus a self-query retriever that can be exposed as one.

pub mod error;
pub mod provider;
pub mod retriever;
pub mod tools;
pub mod types;

pub use error::{
    HandlerError, InferenceError, RetrieverError, ToolError, ValidationError, ValidationIssue,
};
pub use provider::{AnthropicProvider, InferenceProvider};
pub use retriever::{
    AttributeInfo, BasicTranslator, Comparator, Document, EmbeddingProvider, FilterExpr,
    InMemoryVectorStore, MergeFilters, Operator, QueryTranslator, SearchParams, SelfQueryConfig,
    SelfQueryRetriever, StructuredQuery, VectorStore,
};
pub use tools::{
    Field, FieldType, InputSchema, ObjectSchema, Tool, ToolBuilder, ToolHandler, ToolInput,
    ToolRegistry,
};
pub use types::{ContentBlock, InferenceRequest, InferenceResponse, StopReason, Usage};
