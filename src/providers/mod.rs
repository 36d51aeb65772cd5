use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;

pub mod claude_cli;
pub mod demo;

/// A block of content inside an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentBlock {
    Text(String),
    ToolUse { name: String },
}

/// One message of a streamed code-generation session
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMessage {
    Assistant(Vec<ContentBlock>),
    /// Terminal sentinel; nothing after it is consumed
    Result {
        summary: Option<String>,
        is_error: bool,
    },
    Other,
}

/// Configuration bundle handed to every query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    pub allowed_tools: Vec<String>,
    pub system_prompt: String,
    pub max_turns: u32,
    pub permission_mode: String,
    pub working_dir: Option<PathBuf>,
}

impl QueryOptions {
    pub fn new(allowed_tools: Vec<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            allowed_tools,
            system_prompt: system_prompt.into(),
            max_turns: 10,
            permission_mode: "acceptEdits".to_string(),
            working_dir: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_permission_mode(mut self, mode: impl Into<String>) -> Self {
        self.permission_mode = mode.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Code generation service unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Code generation failed: {0}")]
    Execution(String),
}

/// Stream type for responses
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ProviderMessage, ProviderError>> + Send>>;

/// An external code-generation service driven as an opaque streaming call
#[async_trait]
pub trait CodeGenProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the service is installed and usable at all
    fn is_available(&self) -> bool;

    async fn query(&self, prompt: &str, options: &QueryOptions) -> Result<ResponseStream, ProviderError>;
}

/// Drain a response stream, accumulating assistant text blocks until the
/// terminal result message arrives.
pub async fn collect_text(mut stream: ResponseStream) -> Result<Vec<String>, ProviderError> {
    let mut parts = Vec::new();

    while let Some(message) = stream.next().await {
        match message? {
            ProviderMessage::Assistant(blocks) => {
                for block in blocks {
                    if let ContentBlock::Text(text) = block {
                        parts.push(text);
                    }
                }
            }
            ProviderMessage::Result { is_error: true, summary } => {
                return Err(ProviderError::Execution(
                    summary.unwrap_or_else(|| "service reported an error".to_string()),
                ));
            }
            ProviderMessage::Result { .. } => break,
            ProviderMessage::Other => {}
        }
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn boxed(items: Vec<Result<ProviderMessage, ProviderError>>) -> ResponseStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_collect_text_stops_at_result() {
        let stream = boxed(vec![
            Ok(ProviderMessage::Other),
            Ok(ProviderMessage::Assistant(vec![
                ContentBlock::Text("first".to_string()),
                ContentBlock::ToolUse { name: "Write".to_string() },
            ])),
            Ok(ProviderMessage::Assistant(vec![ContentBlock::Text("second".to_string())])),
            Ok(ProviderMessage::Result { summary: None, is_error: false }),
            Ok(ProviderMessage::Assistant(vec![ContentBlock::Text("ignored".to_string())])),
        ]);

        let parts = collect_text(stream).await.unwrap();
        assert_eq!(parts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_collect_text_surfaces_errors() {
        let stream = boxed(vec![
            Ok(ProviderMessage::Assistant(vec![ContentBlock::Text("partial".to_string())])),
            Err(ProviderError::Stream("pipe closed".to_string())),
        ]);
        assert!(matches!(collect_text(stream).await, Err(ProviderError::Stream(_))));

        let stream = boxed(vec![Ok(ProviderMessage::Result {
            summary: Some("max turns reached".to_string()),
            is_error: true,
        })]);
        match collect_text(stream).await {
            Err(ProviderError::Execution(msg)) => assert_eq!(msg, "max turns reached"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_query_options_builder() {
        let options = QueryOptions::new(vec!["Read".to_string()], "prompt")
            .with_max_turns(3)
            .with_permission_mode("plan")
            .with_working_dir("/tmp/out");

        assert_eq!(options.max_turns, 3);
        assert_eq!(options.permission_mode, "plan");
        assert_eq!(options.working_dir, Some(PathBuf::from("/tmp/out")));
    }
}
