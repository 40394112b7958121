use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use resumer_core::{ResumerError, ResumerResult};
use std::time::Duration;
use uuid::Uuid;

/// Text tokens produced for one reply.
pub type TokenStream = BoxStream<'static, ResumerResult<String>>;

/// Source of assistant replies for chat connections.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, conversation_id: Uuid, prompt: &str) -> ResumerResult<TokenStream>;
}

/// Echoes the prompt back word by word, optionally pausing between tokens.
#[derive(Debug, Clone)]
pub struct EchoGenerator {
    prefix: String,
    delay: Duration,
}

impl EchoGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            prefix: "Echo: ".to_string(),
            delay,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// The complete reply this generator will produce for `prompt`.
    pub fn reply_for(&self, prompt: &str) -> String {
        format!("{}{prompt}", self.prefix)
    }

    fn tokenize(&self, prompt: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        if !self.prefix.is_empty() {
            tokens.push(self.prefix.clone());
        }
        tokens.extend(prompt.split_inclusive(' ').map(str::to_string));
        tokens
    }
}

impl Default for EchoGenerator {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(&self, _conversation_id: Uuid, prompt: &str) -> ResumerResult<TokenStream> {
        if prompt.trim().is_empty() {
            return Err(ResumerError::Generator("prompt is empty".into()));
        }
        let delay = self.delay;
        let stream = futures_util::stream::iter(self.tokenize(prompt)).then(move |token| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(token)
        });
        Ok(stream.boxed())
    }
}
