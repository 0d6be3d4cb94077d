use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod http;
pub mod readiness;
#[cfg(test)]
pub mod scripted;

pub use http::HttpGenerator;
pub use readiness::{Readiness, ReadinessGate};

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generator returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("generator returned no content")]
    EmptyResponse,

    #[error("invalid generator payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("generator timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator stream failed: {0}")]
    Stream(String),
}

/// What a generator is asked. The system part is optional; generators may
/// substitute their own configured system prompt when it is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
        }
    }
}

pub type FragmentStream = BoxStream<'static, Result<String, GeneratorError>>;

/// The three shapes a streaming answer can take. The frame normalizer
/// dispatches on the variant.
pub enum FrameProducer {
    WholeText(String),
    SyncFragments(Box<dyn Iterator<Item = Result<String, GeneratorError>> + Send>),
    AsyncFragments(FragmentStream),
}

impl fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameProducer::WholeText(text) => f.debug_tuple("WholeText").field(text).finish(),
            FrameProducer::SyncFragments(_) => f.write_str("SyncFragments(..)"),
            FrameProducer::AsyncFragments(_) => f.write_str("AsyncFragments(..)"),
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, GeneratorError>;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Incremental output. Generators without streaming support hand back the
    /// whole text.
    async fn generate_stream(&self, prompt: &Prompt) -> Result<FrameProducer, GeneratorError> {
        Ok(FrameProducer::WholeText(self.generate(prompt).await?))
    }

    /// One-time preparation run in the background at startup.
    async fn warm_up(&self) -> Result<(), GeneratorError> {
        Ok(())
    }
}
