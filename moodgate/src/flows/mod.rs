//! One handler per [`FlowLabel`].
//!
//! Handlers never fail: generator and storage errors become a fixed
//! apology for that flow. "No usable context" is reported as
//! [`HandlerOutput::NoAnswer`] so the orchestrator can fall back to HELP.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::generator::FrameProducer;
use crate::router::FlowLabel;

pub mod analytics;
pub mod animal;
pub mod context;
pub mod factual;
pub mod help;
pub mod mood;

pub use analytics::AnalyticsHandler;
pub use animal::AnimalHandler;
pub use factual::FactualHandler;
pub use help::HelpHandler;
pub use mood::MoodHandler;

/// The message being answered and who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    pub message: String,
    pub user_id: Option<String>,
    pub stream: bool,
}

impl TurnContext {
    pub fn new(message: impl Into<String>, user_id: Option<String>, stream: bool) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.filter(|id| !id.is_empty()),
            stream,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult {
    pub response: String,
    pub extra_fields: Map<String, Value>,
}

impl HandlerResult {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            extra_fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra_fields.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug)]
pub enum HandlerOutput {
    Complete(HandlerResult),
    /// Incremental answer; only produced for streaming turns.
    Stream {
        extra_fields: Map<String, Value>,
        producer: FrameProducer,
    },
    NoAnswer,
}

#[async_trait]
pub trait FlowHandler: Send + Sync {
    fn label(&self) -> FlowLabel;

    async fn handle(&self, turn: &TurnContext) -> HandlerOutput;

    /// Fixed reply used when this flow cannot produce an answer in time.
    fn apology(&self) -> &'static str;
}
