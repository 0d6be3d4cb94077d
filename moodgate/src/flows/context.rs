use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{HandlerOutput, HandlerResult, TurnContext};
use crate::generator::{Generator, Prompt};
use crate::retrieval::{ContextChunk, ContextRetriever};
use common::configuration::SourceConfig;

pub const CONTEXT_SYSTEM_PROMPT: &str = "You are a friendly pet-care assistant. \
Answer the QUESTION using only the CONTEXT below. \
If the context does not contain the answer, say so briefly. \
Reply in the language of the question.";

/// Known retrievable sources, looked up by file name or alias.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: Vec<SourceConfig>,
}

impl SourceCatalog {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self { sources }
    }

    /// First source with an alias contained in `message`.
    pub fn mentioned_in(&self, message: &str) -> Option<&SourceConfig> {
        let lowered = message.to_lowercase();
        self.sources.iter().find(|source| {
            source
                .aliases
                .iter()
                .any(|alias| !alias.is_empty() && lowered.contains(&alias.to_lowercase()))
        })
    }

    pub fn by_file(&self, file: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.file == file)
    }

    /// First chunk whose source is catalogued.
    pub fn first_known<'a>(&'a self, chunks: &[ContextChunk]) -> Option<&'a SourceConfig> {
        chunks.iter().find_map(|chunk| self.by_file(&chunk.source))
    }
}

/// Joins the non-empty chunk texts with a blank line.
pub fn build_context(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn context_prompt(context: &str, message: &str) -> String {
    format!("CONTEXT:\n{}\n\nQUESTION: {}", context, message)
}

/// Retrieval followed by a grounded generation. Shared by the animal and
/// factual flows.
pub struct ContextAnswerer {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn ContextRetriever>,
    top_k: usize,
}

impl ContextAnswerer {
    pub fn new(generator: Arc<dyn Generator>, retriever: Arc<dyn ContextRetriever>, top_k: usize) -> Self {
        Self {
            generator,
            retriever,
            top_k,
        }
    }

    /// `None` when nothing usable was found. Retrieval errors count as no
    /// context.
    pub async fn retrieve(&self, query: &str, source_filter: Option<&str>) -> Option<Vec<ContextChunk>> {
        match self.retriever.retrieve(query, source_filter, self.top_k).await {
            Ok(chunks) if !build_context(&chunks).is_empty() => Some(chunks),
            Ok(_) => {
                debug!(source_filter = ?source_filter, "no usable context");
                None
            }
            Err(err) => {
                warn!(error = %err, source_filter = ?source_filter, "context retrieval failed");
                None
            }
        }
    }

    pub async fn answer(
        &self,
        turn: &TurnContext,
        chunks: &[ContextChunk],
        extra_fields: Map<String, Value>,
        apology: &'static str,
    ) -> HandlerOutput {
        let prompt = Prompt::with_system(
            CONTEXT_SYSTEM_PROMPT,
            context_prompt(&build_context(chunks), &turn.message),
        );

        if turn.stream && self.generator.supports_streaming() {
            return match self.generator.generate_stream(&prompt).await {
                Ok(producer) => HandlerOutput::Stream {
                    extra_fields,
                    producer,
                },
                Err(err) => {
                    warn!(generator = %self.generator.name(), error = %err, "streaming generation failed");
                    apologize(apology, extra_fields)
                }
            };
        }

        match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => HandlerOutput::Complete(HandlerResult {
                response: text.trim().to_string(),
                extra_fields,
            }),
            Ok(_) => {
                warn!(generator = %self.generator.name(), "generator returned empty answer");
                apologize(apology, extra_fields)
            }
            Err(err) => {
                warn!(generator = %self.generator.name(), error = %err, "generation failed");
                apologize(apology, extra_fields)
            }
        }
    }
}

fn apologize(apology: &'static str, extra_fields: Map<String, Value>) -> HandlerOutput {
    HandlerOutput::Complete(HandlerResult {
        response: apology.to_string(),
        extra_fields,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::retrieval::RetrievalError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns the same chunks for every query and records the filters used.
    pub struct FixedRetriever {
        chunks: Vec<ContextChunk>,
        fail: bool,
        filters: Mutex<Vec<Option<String>>>,
    }

    impl FixedRetriever {
        pub fn new(chunks: &[(&str, &str)]) -> Self {
            Self {
                chunks: chunks
                    .iter()
                    .map(|(source, text)| ContextChunk {
                        text: text.to_string(),
                        source: source.to_string(),
                    })
                    .collect(),
                fail: false,
                filters: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            let mut retriever = Self::new(&[]);
            retriever.fail = true;
            retriever
        }

        pub fn filters(&self) -> Vec<Option<String>> {
            self.filters.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContextRetriever for FixedRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            source_filter: Option<&str>,
            top_k: usize,
        ) -> Result<Vec<ContextChunk>, RetrievalError> {
            self.filters
                .lock()
                .unwrap()
                .push(source_filter.map(str::to_string));
            if self.fail {
                return Err(RetrievalError::Backend("index offline".to_string()));
            }
            Ok(self
                .chunks
                .iter()
                .filter(|c| source_filter.map_or(true, |s| c.source == s))
                .take(top_k)
                .cloned()
                .collect())
        }
    }

    pub fn sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig {
                file: "cat_care.pdf".to_string(),
                id: "pdf-cat".to_string(),
                emoji: "🐱".to_string(),
                aliases: vec!["kedi".to_string(), "cat".to_string()],
            },
            SourceConfig {
                file: "rabbit_care.pdf".to_string(),
                id: "pdf-rabbit".to_string(),
                emoji: "🐰".to_string(),
                aliases: vec!["tavşan".to_string(), "rabbit".to_string()],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(source: &str, text: &str) -> ContextChunk {
        ContextChunk {
            text: text.to_string(),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_build_context_skips_blank_chunks() {
        let chunks = vec![chunk("a", " first "), chunk("a", "   "), chunk("b", "second")];
        assert_eq!(build_context(&chunks), "first\n\nsecond");
        assert_eq!(
            context_prompt("first", "why?"),
            "CONTEXT:\nfirst\n\nQUESTION: why?"
        );
    }

    #[test]
    fn test_source_catalog_lookups() {
        let catalog = SourceCatalog::new(sources());
        assert_eq!(
            catalog.mentioned_in("Tavşan tırnağı nasıl kesilir?").map(|s| s.id.as_str()),
            Some("pdf-rabbit")
        );
        assert!(catalog.mentioned_in("papağan kafesi").is_none());

        let chunks = vec![chunk("notes.txt", "x"), chunk("cat_care.pdf", "y")];
        assert_eq!(catalog.first_known(&chunks).map(|s| s.emoji.as_str()), Some("🐱"));
    }

    #[tokio::test]
    async fn test_retrieval_errors_count_as_no_context() {
        let answerer = ContextAnswerer::new(
            Arc::new(crate::generator::scripted::ScriptedGenerator::new("responder")),
            Arc::new(FixedRetriever::failing()),
            6,
        );
        assert!(answerer.retrieve("kedi", None).await.is_none());

        let blank = ContextAnswerer::new(
            Arc::new(crate::generator::scripted::ScriptedGenerator::new("responder")),
            Arc::new(FixedRetriever::new(&[("cat_care.pdf", "  ")])),
            6,
        );
        assert!(blank.retrieve("kedi", None).await.is_none());
    }
}
