use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::context::{ContextAnswerer, SourceCatalog};
use super::{FlowHandler, HandlerOutput, TurnContext};
use crate::router::FlowLabel;

pub const FACTUAL_APOLOGY: &str =
    "Sorry, I couldn't look that up right now. Please try again in a moment.";

/// Answers care questions from the reference documents.
pub struct FactualHandler {
    answerer: ContextAnswerer,
    catalog: SourceCatalog,
}

impl FactualHandler {
    pub fn new(answerer: ContextAnswerer, catalog: SourceCatalog) -> Self {
        Self { answerer, catalog }
    }
}

#[async_trait]
impl FlowHandler for FactualHandler {
    fn label(&self) -> FlowLabel {
        FlowLabel::Factual
    }

    async fn handle(&self, turn: &TurnContext) -> HandlerOutput {
        let mentioned = self.catalog.mentioned_in(&turn.message);
        let filter = mentioned.map(|source| source.file.as_str());

        let Some(chunks) = self.answerer.retrieve(&turn.message, filter).await else {
            return HandlerOutput::NoAnswer;
        };

        let mut extra_fields = Map::new();
        extra_fields.insert("rag".to_string(), Value::Bool(true));
        if let Some(source) = mentioned.or_else(|| self.catalog.first_known(&chunks)) {
            extra_fields.insert("rag_source".to_string(), Value::from(source.id.clone()));
            extra_fields.insert("rag_emoji".to_string(), Value::from(source.emoji.clone()));
        }
        debug!(chunks = chunks.len(), source_filter = ?filter, "answering from context");

        self.answerer
            .answer(turn, &chunks, extra_fields, FACTUAL_APOLOGY)
            .await
    }

    fn apology(&self) -> &'static str {
        FACTUAL_APOLOGY
    }
}
