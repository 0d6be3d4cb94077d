//! Keyword-overlap retrieval over plain-text documents held in memory.
//!
//! Documents are split into paragraph chunks. A query is scored against a
//! chunk by the number of distinct query tokens (lower-cased, at least three
//! characters) the chunk contains.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};

use super::{ContextChunk, ContextRetriever, RetrievalError};
use common::configuration::DocumentConfig;

const MIN_TOKEN_CHARS: usize = 3;

struct IndexedChunk {
    chunk: ContextChunk,
    tokens: HashSet<String>,
}

pub struct KeywordRetriever {
    chunks: Vec<IndexedChunk>,
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
        .map(|word| word.to_lowercase())
        .collect()
}

fn paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

impl KeywordRetriever {
    /// Builds an index from `(source, text)` pairs.
    pub fn from_texts<S, T>(documents: impl IntoIterator<Item = (S, T)>) -> Self
    where
        S: Into<String>,
        T: AsRef<str>,
    {
        let mut chunks = Vec::new();
        for (source, text) in documents {
            let source = source.into();
            for paragraph in paragraphs(text.as_ref()) {
                chunks.push(IndexedChunk {
                    tokens: tokenize(&paragraph),
                    chunk: ContextChunk {
                        text: paragraph,
                        source: source.clone(),
                    },
                });
            }
        }
        Self { chunks }
    }

    pub async fn from_documents(documents: &[DocumentConfig]) -> Result<Self, RetrievalError> {
        let mut loaded = Vec::with_capacity(documents.len());
        for doc in documents {
            let text = tokio::fs::read_to_string(&doc.path)
                .await
                .map_err(|source| RetrievalError::Document {
                    path: doc.path.clone(),
                    source,
                })?;
            loaded.push((doc.source.clone(), text));
        }
        let retriever = Self::from_texts(loaded);
        info!(
            documents = documents.len(),
            chunks = retriever.len(),
            "keyword retriever loaded"
        );
        Ok(retriever)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl ContextRetriever for KeywordRetriever {
    async fn retrieve(
        &self,
        query: &str,
        source_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<ContextChunk>, RetrievalError> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &IndexedChunk)> = self
            .chunks
            .iter()
            .filter(|c| source_filter.map_or(true, |source| c.chunk.source == source))
            .map(|c| (query_tokens.intersection(&c.tokens).count(), c))
            .filter(|(score, _)| *score > 0)
            .collect();

        // stable sort keeps document order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let results: Vec<ContextChunk> = scored
            .into_iter()
            .take(top_k)
            .map(|(_, c)| c.chunk.clone())
            .collect();

        debug!(
            query_tokens = query_tokens.len(),
            source_filter = ?source_filter,
            hits = results.len(),
            "keyword retrieval"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn retriever() -> KeywordRetriever {
        KeywordRetriever::from_texts([
            (
                "cat_care.pdf",
                "Cats need fresh water every day.\n\nFeed adult cats twice a day with quality food.\n\n\n",
            ),
            (
                "rabbit_care.pdf",
                "Rabbits need hay and fresh water.\r\n\r\nRabbit teeth grow continuously, so hay matters.",
            ),
        ])
    }

    #[test]
    fn test_tokenize_lowercases_and_drops_short_words() {
        let tokens = tokenize("Kedi ve KÖPEK, su içer!");
        assert!(tokens.contains("kedi"));
        assert!(tokens.contains("köpek"));
        assert!(tokens.contains("içer"));
        assert!(!tokens.contains("ve"));
        assert!(!tokens.contains("su"));
    }

    #[tokio::test]
    async fn test_best_match_first_with_document_order_ties() {
        let retriever = retriever();
        assert_eq!(retriever.len(), 4);

        let hits = retriever.retrieve("fresh water for cats", None, 6).await.unwrap();
        assert_eq!(hits[0].text, "Cats need fresh water every day.");
        assert_eq!(hits[0].source, "cat_care.pdf");
        assert_eq!(hits[1].text, "Rabbits need hay and fresh water.");
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_source_filter_and_top_k() {
        let retriever = retriever();
        let hits = retriever
            .retrieve("fresh water hay", Some("rabbit_care.pdf"), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "rabbit_care.pdf");
    }

    #[tokio::test]
    async fn test_no_overlap_means_no_context() {
        let retriever = retriever();
        assert!(retriever.retrieve("parrot songs", None, 6).await.unwrap().is_empty());
        assert!(retriever.retrieve("a b", None, 6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_documents_reads_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Parrots enjoy toys.\n\nParrots need calcium.").unwrap();
        let docs = vec![DocumentConfig {
            source: "parrot_care.pdf".to_string(),
            path: file.path().display().to_string(),
        }];

        let retriever = KeywordRetriever::from_documents(&docs).await.unwrap();
        assert_eq!(retriever.len(), 2);

        let missing = vec![DocumentConfig {
            source: "x".to_string(),
            path: "/nonexistent/moodgate/doc.txt".to_string(),
        }];
        assert!(matches!(
            KeywordRetriever::from_documents(&missing).await,
            Err(RetrievalError::Document { .. })
        ));
    }
}
