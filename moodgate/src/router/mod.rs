use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod intent;

pub use intent::IntentClassifier;

/// Which flow handler answers a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowLabel {
    #[serde(rename = "ANIMAL")]
    Animal,
    #[serde(rename = "RAG")]
    Factual,
    #[serde(rename = "EMOTION")]
    Mood,
    #[serde(rename = "STATS")]
    Analytics,
    #[serde(rename = "HELP")]
    Help,
}

impl FlowLabel {
    /// Order in which classifier output is scanned for label tokens.
    pub const PRIORITY: [FlowLabel; 5] = [
        FlowLabel::Animal,
        FlowLabel::Factual,
        FlowLabel::Mood,
        FlowLabel::Analytics,
        FlowLabel::Help,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            FlowLabel::Animal => "ANIMAL",
            FlowLabel::Factual => "RAG",
            FlowLabel::Mood => "EMOTION",
            FlowLabel::Analytics => "STATS",
            FlowLabel::Help => "HELP",
        }
    }

    pub fn from_token(token: &str) -> Option<FlowLabel> {
        let token = token.trim();
        Self::PRIORITY
            .into_iter()
            .find(|label| label.token().eq_ignore_ascii_case(token))
    }
}

impl Display for FlowLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}
