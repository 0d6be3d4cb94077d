use async_trait::async_trait;
use bytes::Bytes;
use common::configuration::GeneratorConfig;
use framewire::openai::{
    ChatCompletionsRequest, ChatCompletionsResponse, ChatCompletionsStreamResponse, Message,
};
use framewire::{SseEvent, SseLineDecoder, CHAT_COMPLETIONS_PATH};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{FrameProducer, Generator, GeneratorError, Prompt};

/// Generator backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpGenerator {
    name: String,
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    timeout: Option<Duration>,
    stream: bool,
    warm_up: bool,
}

impl HttpGenerator {
    pub fn new(name: &str, config: &GeneratorConfig) -> Self {
        Self {
            name: name.to_string(),
            client: reqwest::Client::new(),
            url: format!(
                "{}{}",
                config.endpoint.trim_end_matches('/'),
                CHAT_COMPLETIONS_PATH
            ),
            model: config.model.clone(),
            api_key: config.api_key(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            timeout: config.timeout(),
            stream: config.stream.unwrap_or(false),
            warm_up: config.warm_up.unwrap_or(false),
        }
    }

    fn build_request(&self, prompt: &Prompt, stream: bool) -> ChatCompletionsRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system.as_ref().or(self.system_prompt.as_ref()) {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(prompt.user.clone()));

        ChatCompletionsRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: stream.then_some(true),
        }
    }

    async fn send(&self, request: &ChatCompletionsRequest) -> Result<reqwest::Response, GeneratorError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let send = builder.send();
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| GeneratorError::Timeout(limit))??,
            None => send.await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(generator = %self.name, status = status.as_u16(), "generator returned error status");
            return Err(GeneratorError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn complete(&self, request: &ChatCompletionsRequest) -> Result<String, GeneratorError> {
        let response = self.send(request).await?;
        let read = response.bytes();
        let body = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| GeneratorError::Timeout(limit))??,
            None => read.await?,
        };

        let parsed: ChatCompletionsResponse = serde_json::from_slice(&body)?;
        parsed
            .content()
            .map(str::to_string)
            .ok_or(GeneratorError::EmptyResponse)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GeneratorError> {
        let started = Instant::now();
        let content = self.complete(&self.build_request(prompt, false)).await?;
        debug!(
            generator = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = content.chars().count(),
            "generation complete"
        );
        Ok(content)
    }

    fn supports_streaming(&self) -> bool {
        self.stream
    }

    async fn generate_stream(&self, prompt: &Prompt) -> Result<FrameProducer, GeneratorError> {
        if !self.stream {
            return Ok(FrameProducer::WholeText(self.generate(prompt).await?));
        }

        let response = self.send(&self.build_request(prompt, true)).await?;
        debug!(generator = %self.name, "streaming generation started");
        Ok(FrameProducer::AsyncFragments(fragments_from_sse(
            response.bytes_stream().boxed(),
            self.timeout,
        )))
    }

    async fn warm_up(&self) -> Result<(), GeneratorError> {
        if !self.warm_up {
            return Ok(());
        }

        let started = Instant::now();
        let mut request = self.build_request(&Prompt::user("ping"), false);
        request.max_tokens = Some(1);
        self.complete(&request).await?;
        info!(
            generator = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generator warmed up"
        );
        Ok(())
    }
}

type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

struct SseFragments {
    bytes: ByteStream,
    idle_limit: Option<Duration>,
    decoder: SseLineDecoder,
    pending: VecDeque<Result<String, GeneratorError>>,
    finished: bool,
}

impl SseFragments {
    fn queue(&mut self, event: SseEvent) {
        if self.finished {
            return;
        }
        if event.is_done() {
            self.finished = true;
            return;
        }
        let Some(data) = event.data else {
            return;
        };

        match serde_json::from_str::<ChatCompletionsStreamResponse>(&data) {
            Ok(chunk) => {
                if let Some(content) = chunk.content_delta().filter(|c| !c.is_empty()) {
                    self.pending.push_back(Ok(content.to_string()));
                }
            }
            Err(err) => {
                self.pending.push_back(Err(GeneratorError::Payload(err)));
                self.finished = true;
            }
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, GeneratorError>> {
        let Some(limit) = self.idle_limit else {
            return self.bytes.next().await.map(|r| r.map_err(GeneratorError::Request));
        };
        match tokio::time::timeout(limit, self.bytes.next()).await {
            Ok(next) => next.map(|r| r.map_err(GeneratorError::Request)),
            Err(_) => Some(Err(GeneratorError::Timeout(limit))),
        }
    }
}

/// Turns an SSE chat-completions body into content fragments, ending at
/// `[DONE]`, at end of body, or after the first error. With an `idle_limit`,
/// a body that sends nothing for that long ends with [`GeneratorError::Timeout`].
pub fn fragments_from_sse(
    bytes: ByteStream,
    idle_limit: Option<Duration>,
) -> BoxStream<'static, Result<String, GeneratorError>> {
    let state = SseFragments {
        bytes,
        idle_limit,
        decoder: SseLineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(next) = state.pending.pop_front() {
                return Some((next, state));
            }
            if state.finished {
                return None;
            }

            match state.next_chunk().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.push(&chunk) {
                        state.queue(event);
                    }
                }
                Some(Err(err)) => {
                    state.pending.push_back(Err(err));
                    state.finished = true;
                }
                None => {
                    if let Some(event) = state.decoder.finish() {
                        state.queue(event);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
