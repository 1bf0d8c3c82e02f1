//! Self-query retrieval: a language model rewrites a question into search
//! text plus a metadata filter, which a translator turns into the vector
//! store's own filter format.

pub mod constructor;
pub mod parser;
pub mod query;
pub mod self_query;
pub mod store;
pub mod translator;

pub use constructor::{LlmQueryConstructor, QueryConstructor, QueryConstructorConfig};
pub use parser::parse_filter;
pub use query::{AttributeInfo, Comparator, FilterExpr, Operator, StructuredQuery};
pub use self_query::{SearchParams, SelfQueryConfig, SelfQueryRetriever};
pub use store::{
    cosine_similarity, matches_filter, Document, EmbeddingProvider, InMemoryVectorStore,
    VectorStore,
};
pub use translator::{BasicTranslator, MergeFilters, QueryTranslator};
