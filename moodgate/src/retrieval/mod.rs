use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod keyword;

pub use keyword::KeywordRetriever;

/// A passage of reference text and the source it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    pub source: String,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to read document {path}: {source}")]
    Document {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("retrieval backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Best matching chunks first. An empty result means no usable context.
    async fn retrieve(
        &self,
        query: &str,
        source_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<ContextChunk>, RetrievalError>;
}
