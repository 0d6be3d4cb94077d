use async_trait::async_trait;

use super::{FlowHandler, HandlerOutput, HandlerResult, TurnContext};
use crate::router::FlowLabel;

pub const HELP_TEXT: &str = "Hi! Here is what I can do:\n\
- Chat with you and keep track of how you feel\n\
- Answer pet-care questions from my reference documents\n\
- Tell you about animals I know\n\
- Show your mood statistics, for all time or just today\n\
Just write your message and I'll pick the right one.";

/// Static capabilities overview. Also the fallback for every other flow.
#[derive(Debug, Default)]
pub struct HelpHandler;

#[async_trait]
impl FlowHandler for HelpHandler {
    fn label(&self) -> FlowLabel {
        FlowLabel::Help
    }

    async fn handle(&self, _turn: &TurnContext) -> HandlerOutput {
        HandlerOutput::Complete(HandlerResult::new(HELP_TEXT).with_field("help", true))
    }

    fn apology(&self) -> &'static str {
        HELP_TEXT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_help_is_static() {
        let HandlerOutput::Complete(result) = HelpHandler
            .handle(&TurnContext::new("?", None, true))
            .await
        else {
            panic!("expected complete result");
        };
        assert_eq!(result.response, HELP_TEXT);
        assert_eq!(result.extra_fields["help"], Value::Bool(true));
    }
}
