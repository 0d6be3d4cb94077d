use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::context::ContextAnswerer;
use super::{FlowHandler, HandlerOutput, TurnContext};
use crate::router::FlowLabel;
use common::configuration::AnimalConfig;

pub const ANIMAL_APOLOGY: &str =
    "The animal corner is unavailable right now. Please try again later.";

/// Finds the animal a message is about by name or alias.
#[derive(Debug, Clone, Default)]
pub struct AnimalCatalog {
    animals: Vec<AnimalConfig>,
}

impl AnimalCatalog {
    pub fn new(animals: Vec<AnimalConfig>) -> Self {
        Self { animals }
    }

    pub fn identify(&self, message: &str) -> Option<&AnimalConfig> {
        let lowered = message.to_lowercase();
        self.animals.iter().find(|animal| {
            std::iter::once(&animal.name)
                .chain(animal.aliases.iter())
                .any(|name| !name.is_empty() && lowered.contains(&name.to_lowercase()))
        })
    }
}

pub struct AnimalHandler {
    answerer: ContextAnswerer,
    catalog: AnimalCatalog,
}

impl AnimalHandler {
    pub fn new(answerer: ContextAnswerer, catalog: AnimalCatalog) -> Self {
        Self { answerer, catalog }
    }
}

#[async_trait]
impl FlowHandler for AnimalHandler {
    fn label(&self) -> FlowLabel {
        FlowLabel::Animal
    }

    async fn handle(&self, turn: &TurnContext) -> HandlerOutput {
        let Some(animal) = self.catalog.identify(&turn.message) else {
            debug!("no known animal in message");
            return HandlerOutput::NoAnswer;
        };

        let Some(chunks) = self
            .answerer
            .retrieve(&turn.message, animal.source.as_deref())
            .await
        else {
            return HandlerOutput::NoAnswer;
        };

        let mut extra_fields = Map::new();
        extra_fields.insert("animal".to_string(), Value::from(animal.name.clone()));
        extra_fields.insert("animal_emoji".to_string(), Value::from(animal.emoji.clone()));

        self.answerer
            .answer(turn, &chunks, extra_fields, ANIMAL_APOLOGY)
            .await
    }

    fn apology(&self) -> &'static str {
        ANIMAL_APOLOGY
    }
}
