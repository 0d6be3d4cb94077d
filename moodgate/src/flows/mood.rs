use async_trait::async_trait;
use common::mood::{normalize, normalize_loose, Mood};
use common::text::{extract_first_object, limit_emoji_runs};
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FlowHandler, HandlerOutput, HandlerResult, TurnContext};
use crate::generator::{Generator, Prompt, Readiness, ReadinessGate};
use crate::router::FlowLabel;
use crate::state::PersistenceGateway;

pub const MOOD_APOLOGY: &str = "I couldn't find the right words just now. Could you tell me again?";
pub const UNKNOWN_MOOD_EMOJI: &str = "❓";
pub const MOOD_KEY: &str = "ruh_hali";

const MAX_EMOJI_RUNS: usize = 1;

pub const MOOD_TAGGER_SYSTEM_PROMPT: &str = "You are a mood analysis assistant. \
You read a short exchange and answer with a single JSON object, nothing else.";

fn mood_prompt(message: &str, reply: &str) -> String {
    let labels = Mood::ALL
        .iter()
        .map(|mood| format!("- {}", mood))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Task: read the user's message and the assistant's reply and pick exactly one mood.\n\n\
         User message: \"{message}\"\n\
         Assistant reply: \"{reply}\"\n\n\
         Return only this JSON shape:\n\n\
         {{\"{key}\": \"Mutlu\"}}\n\n\
         Allowed moods (choose from this list only):\n{labels}\n\n\
         Moods the user states about themselves always take priority over the reply.",
        message = message,
        reply = reply,
        key = MOOD_KEY,
        labels = labels,
    )
}

/// Outcome of asking the tagger for a label.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tagged {
    Recognised(Mood),
    /// Extraction failed; a random default was chosen.
    Fallback(Mood),
    /// A label came back but it is not one of the canonical moods.
    Unrecognised(String),
}

impl Tagged {
    fn stored_mood(&self) -> Option<Mood> {
        match self {
            Tagged::Recognised(mood) | Tagged::Fallback(mood) => Some(*mood),
            Tagged::Unrecognised(_) => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Tagged::Recognised(mood) | Tagged::Fallback(mood) => mood.label().to_string(),
            Tagged::Unrecognised(raw) => normalize(raw),
        }
    }
}

fn fallback_mood() -> Mood {
    Mood::FALLBACK
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(Mood::Happy)
}

/// Display emoji for a raw label, using the loose normalizer.
fn pick_emoji(emojis: &HashMap<Mood, Vec<String>>, raw_label: &str) -> String {
    normalize_loose(raw_label)
        .and_then(|mood| emojis.get(&mood))
        .and_then(|options| options.choose(&mut rand::rng()))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_MOOD_EMOJI.to_string())
}

pub fn default_mood_emojis() -> HashMap<Mood, Vec<String>> {
    let table: [(Mood, &[&str]); 10] = [
        (Mood::Happy, &["😊", "😄", "🥳"]),
        (Mood::Sad, &["😢", "😔"]),
        (Mood::Angry, &["😠", "😤"]),
        (Mood::Surprised, &["😮", "😲"]),
        (Mood::Embarrassed, &["😳", "🙈"]),
        (Mood::Anxious, &["😟", "😰"]),
        (Mood::Smiling, &["🙂", "😁"]),
        (Mood::Flirty, &["😉", "😘"]),
        (Mood::Curious, &["🤔", "🧐"]),
        (Mood::Tired, &["😴", "🥱"]),
    ];
    table
        .into_iter()
        .map(|(mood, emojis)| (mood, emojis.iter().map(|e| e.to_string()).collect()))
        .collect()
}

/// Chats with the companion generator, then tags the exchange with a mood.
pub struct MoodHandler {
    companion: Arc<dyn Generator>,
    tagger: Arc<dyn Generator>,
    persistence: Arc<dyn PersistenceGateway>,
    readiness: ReadinessGate,
    readiness_wait: Duration,
    emojis: HashMap<Mood, Vec<String>>,
}

impl MoodHandler {
    pub fn new(
        companion: Arc<dyn Generator>,
        tagger: Arc<dyn Generator>,
        persistence: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            companion,
            tagger,
            persistence,
            readiness: ReadinessGate::ready(),
            readiness_wait: Duration::ZERO,
            emojis: default_mood_emojis(),
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessGate, wait: Duration) -> Self {
        self.readiness = readiness;
        self.readiness_wait = wait;
        self
    }

    pub fn with_emojis(mut self, emojis: HashMap<Mood, Vec<String>>) -> Self {
        self.emojis = emojis;
        self
    }

    async fn tag(&self, message: &str, reply: &str) -> Tagged {
        let prompt = Prompt::with_system(MOOD_TAGGER_SYSTEM_PROMPT, mood_prompt(message, reply));
        let raw = match self.tagger.generate(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                let mood = fallback_mood();
                warn!(error = %err, fallback = %mood, "mood tagging failed, using random default");
                return Tagged::Fallback(mood);
            }
        };

        let label = extract_first_object(&raw).and_then(|object| {
            object
                .get(MOOD_KEY)
                .and_then(|value| value.as_str())
                .map(str::to_string)
        });

        match label {
            Some(label) => match Mood::from_label(&label) {
                Some(mood) => Tagged::Recognised(mood),
                None => Tagged::Unrecognised(label),
            },
            None => {
                let mood = fallback_mood();
                warn!(raw = %raw.replace('\n', "\\n"), fallback = %mood, "no mood object in tagger output, using random default");
                Tagged::Fallback(mood)
            }
        }
    }
}

#[async_trait]
impl FlowHandler for MoodHandler {
    fn label(&self) -> FlowLabel {
        FlowLabel::Mood
    }

    async fn handle(&self, turn: &TurnContext) -> HandlerOutput {
        match self.readiness.wait(self.readiness_wait).await {
            Readiness::Ready => {}
            Readiness::Loading => {
                info!(generator = %self.companion.name(), "companion still warming up, proceeding")
            }
            Readiness::Failed(reason) => {
                warn!(generator = %self.companion.name(), reason = %reason, "companion warm-up failed, proceeding")
            }
        }

        // the companion only ever sees the current message
        let reply = match self.companion.generate(&Prompt::user(turn.message.clone())).await {
            Ok(reply) if !reply.trim().is_empty() => limit_emoji_runs(&reply, MAX_EMOJI_RUNS),
            Ok(_) => {
                warn!(generator = %self.companion.name(), "companion returned an empty reply");
                return HandlerOutput::Complete(HandlerResult::new(MOOD_APOLOGY));
            }
            Err(err) => {
                warn!(generator = %self.companion.name(), error = %err, "companion reply failed");
                return HandlerOutput::Complete(HandlerResult::new(MOOD_APOLOGY));
            }
        };

        let tagged = self.tag(&turn.message, &reply).await;
        let label = tagged.label();

        match (tagged.stored_mood(), turn.user_id.as_deref()) {
            (Some(mood), Some(user_id)) => {
                if let Err(err) = self.persistence.record_mood_event(user_id, mood).await {
                    warn!(user_id = %user_id, mood = %mood, error = %err, "failed to record mood event");
                }
            }
            (None, _) => debug!(label = %label, "unrecognised mood label, not recorded"),
            (Some(_), None) => debug!("anonymous turn, mood not recorded"),
        }

        let emoji = pick_emoji(&self.emojis, &label);
        HandlerOutput::Complete(
            HandlerResult::new(reply)
                .with_field("mood", label)
                .with_field("emoji", emoji),
        )
    }

    fn apology(&self) -> &'static str {
        MOOD_APOLOGY
    }
}
