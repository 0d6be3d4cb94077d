use async_trait::async_trait;
use common::mood::Mood;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{FlowHandler, HandlerOutput, HandlerResult, TurnContext};
use crate::analytics::{AnalyticsSnapshot, MoodAnalytics, Period};
use crate::router::FlowLabel;

pub const ANALYTICS_APOLOGY: &str = "I couldn't read your mood history right now. Please try again later.";
pub const ANONYMOUS_ANALYTICS: &str =
    "I can only keep mood statistics for identified users. Send your user id to see them.";

const TODAY_CUES: [&str; 4] = ["bugün", "bugun", "today", "günlük"];
const STATS_CALL: &str = "get_emotion_stats(";

/// What a statistics question asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsQuery {
    pub period: Period,
    pub mood: Option<Mood>,
}

/// Reads the period and optional mood filter out of a free-text question.
///
/// Also accepts the call form `get_emotion_stats(emotion="Mutlu", period="today")`.
/// Arguments given in the call win over cues found in the text; an emotion
/// argument that is not a known mood leaves the text's mood in place.
pub fn parse_query(message: &str) -> StatsQuery {
    let lowered = message.to_lowercase();
    let mut query = StatsQuery {
        period: if TODAY_CUES.iter().any(|cue| lowered.contains(cue)) {
            Period::Today
        } else {
            Period::All
        },
        mood: Mood::ALL
            .into_iter()
            .find(|mood| lowered.contains(&mood.label().to_lowercase())),
    };

    if let Some(call) = parse_call(message) {
        query.period = call.period.unwrap_or(query.period);
        query.mood = call.mood.or(query.mood);
    }
    query
}

#[derive(Debug, Default)]
struct CallArguments {
    period: Option<Period>,
    mood: Option<Mood>,
}

fn parse_call(message: &str) -> Option<CallArguments> {
    // ASCII lowering keeps byte offsets valid for `message`.
    let start = message.to_ascii_lowercase().find(STATS_CALL)? + STATS_CALL.len();
    let end = start + message[start..].find(')')?;

    let mut call = CallArguments::default();
    for argument in message[start..end].split(',') {
        let Some((key, value)) = argument.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim().to_ascii_lowercase().as_str() {
            "emotion" => call.mood = Mood::from_label(value),
            "period" => call.period = Some(Period::from_param(Some(value))),
            _ => {}
        }
    }
    Some(call)
}

fn snapshot_fields(snapshot: &AnalyticsSnapshot, result: HandlerResult) -> HandlerResult {
    match serde_json::to_value(snapshot) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .fold(result, |result, (key, value)| result.with_field(&key, value)),
        Ok(_) => result,
        Err(err) => {
            warn!(error = %err, "failed to serialize analytics snapshot");
            result
        }
    }
}

/// Answers questions about the user's own mood history.
pub struct AnalyticsHandler {
    analytics: Arc<MoodAnalytics>,
}

impl AnalyticsHandler {
    pub fn new(analytics: Arc<MoodAnalytics>) -> Self {
        Self { analytics }
    }
}

#[async_trait]
impl FlowHandler for AnalyticsHandler {
    fn label(&self) -> FlowLabel {
        FlowLabel::Analytics
    }

    async fn handle(&self, turn: &TurnContext) -> HandlerOutput {
        let query = parse_query(&turn.message);

        let Some(user_id) = turn.user_id.as_deref() else {
            debug!("analytics requested without a user id");
            let result = HandlerResult::new(ANONYMOUS_ANALYTICS).with_field("stats", true);
            return HandlerOutput::Complete(snapshot_fields(
                &AnalyticsSnapshot::empty(query.period),
                result,
            ));
        };

        let filter = query.mood.map(|mood| mood.label());
        match self.analytics.compute(user_id, query.period, filter).await {
            Ok(snapshot) => {
                debug!(user_id = %user_id, period = %query.period, total = snapshot.total, "analytics snapshot computed");
                let result = HandlerResult::new(snapshot.summary()).with_field("stats", true);
                HandlerOutput::Complete(snapshot_fields(&snapshot, result))
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "failed to compute analytics");
                HandlerOutput::Complete(HandlerResult::new(ANALYTICS_APOLOGY).with_field("stats", true))
            }
        }
    }

    fn apology(&self) -> &'static str {
        ANALYTICS_APOLOGY
    }
}
