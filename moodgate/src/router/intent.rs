use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::FlowLabel;
use crate::generator::{Generator, Prompt};

pub const INTENT_SYSTEM_PROMPT: &str = r#"Analyse the user's message and choose exactly one flow: ANIMAL, RAG, EMOTION, STATS, HELP.

Rules, in priority order:
1. The user asks for an animal photo or a short fact about a specific animal (cat, dog, fox, duck) -> ANIMAL
2. The user asks a detailed care question (feeding, housing, health, illness, training) about a pet, or refers to the reference documents -> RAG
3. The user asks for statistics or a summary of their moods ("how many times", "statistics", "summary", "today") -> STATS
4. The user wants to chat or talks about how they feel (hello, how are you, I'm sad, I'm happy) -> EMOTION
5. Anything else (general questions, "what can you do", help) -> HELP

Examples:
- "Bana bir köpek fotoğrafı ver" -> ANIMAL
- "give me a cat photo" -> ANIMAL
- "kedi bakımı nasıl yapılır" -> RAG
- "bugün kaç kez mutlu oldum" -> STATS
- "merhaba, bugün çok yorgunum" -> EMOTION

Answer with only one of: ANIMAL, RAG, EMOTION, STATS, HELP"#;

/// First label token found in `text`, scanning in [`FlowLabel::PRIORITY`]
/// order. Matching is case-insensitive.
pub fn parse_flow_label(text: &str) -> Option<FlowLabel> {
    let upper = text.trim().to_uppercase();
    FlowLabel::PRIORITY
        .into_iter()
        .find(|label| upper.contains(label.token()))
}

/// Maps a message to a flow label with the router generator. Never fails:
/// timeouts, generator errors and unrecognised output all resolve to HELP.
pub struct IntentClassifier {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn classify(&self, message: &str) -> FlowLabel {
        let prompt = Prompt::with_system(INTENT_SYSTEM_PROMPT, format!("User message: {}", message));

        let start_time = Instant::now();
        let text = match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(generator = %self.generator.name(), error = %err, "intent classification failed, using HELP");
                return FlowLabel::Help;
            }
            Err(_) => {
                warn!(
                    generator = %self.generator.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "intent classification timed out, using HELP"
                );
                return FlowLabel::Help;
            }
        };

        let label = match parse_flow_label(&text) {
            Some(label) => label,
            None => {
                debug!(raw = %text.replace('\n', "\\n"), "no flow token in classifier output");
                FlowLabel::Help
            }
        };

        info!(
            flow = %label,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "classified message"
        );
        label
    }
}
