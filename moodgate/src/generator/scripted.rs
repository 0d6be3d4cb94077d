//! In-process generator that replays scripted answers.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{FrameProducer, Generator, GeneratorError, Prompt};

pub enum StreamScript {
    Whole(String),
    Sync(Vec<Result<String, GeneratorError>>),
    Async(Vec<Result<String, GeneratorError>>),
}

pub struct ScriptedGenerator {
    name: String,
    replies: Mutex<VecDeque<Result<String, GeneratorError>>>,
    fallback: Option<String>,
    stream: Mutex<Option<StreamScript>>,
    delay: Option<Duration>,
    warm_up_delay: Option<Duration>,
    warm_up_error: Mutex<Option<GeneratorError>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            stream: Mutex::new(None),
            delay: None,
            warm_up_delay: None,
            warm_up_error: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with `text` once the scripted replies run out.
    pub fn always(name: &str, text: &str) -> Self {
        let mut generator = Self::new(name);
        generator.fallback = Some(text.to_string());
        generator
    }

    pub fn with_reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn with_error(self, err: GeneratorError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        *self.stream.lock().unwrap() = Some(script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_warm_up_delay(mut self, delay: Duration) -> Self {
        self.warm_up_delay = Some(delay);
        self
    }

    pub fn with_warm_up_error(self, err: GeneratorError) -> Self {
        *self.warm_up_error.lock().unwrap() = Some(err);
        self
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GeneratorError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply,
            None => self.fallback.clone().ok_or(GeneratorError::EmptyResponse),
        }
    }

    fn supports_streaming(&self) -> bool {
        self.stream.lock().unwrap().is_some()
    }

    async fn generate_stream(&self, prompt: &Prompt) -> Result<FrameProducer, GeneratorError> {
        let script = self.stream.lock().unwrap().take();
        match script {
            None => Ok(FrameProducer::WholeText(self.generate(prompt).await?)),
            Some(script) => {
                self.prompts.lock().unwrap().push(prompt.clone());
                Ok(match script {
                    StreamScript::Whole(text) => FrameProducer::WholeText(text),
                    StreamScript::Sync(items) => FrameProducer::SyncFragments(Box::new(items.into_iter())),
                    StreamScript::Async(items) => {
                        FrameProducer::AsyncFragments(stream::iter(items).boxed())
                    }
                })
            }
        }
    }

    async fn warm_up(&self) -> Result<(), GeneratorError> {
        if let Some(delay) = self.warm_up_delay {
            tokio::time::sleep(delay).await;
        }
        let err = self.warm_up_error.lock().unwrap().take();
        match err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
