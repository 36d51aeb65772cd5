use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;

use super::{CodeGenProvider, ContentBlock, ProviderError, ProviderMessage, QueryOptions, ResponseStream};

/// Drives the `claude` CLI in print mode with NDJSON streaming output
#[derive(Debug, Clone)]
pub struct ClaudeCliProvider {
    command: String,
    model: Option<String>,
}

impl ClaudeCliProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn build_command(&self, prompt: &str, options: &QueryOptions) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--max-turns")
            .arg(options.max_turns.to_string())
            .arg("--permission-mode")
            .arg(&options.permission_mode);

        if !options.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(options.allowed_tools.join(","));
        }
        if !options.system_prompt.is_empty() {
            cmd.arg("--append-system-prompt").arg(&options.system_prompt);
        }
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for ClaudeCliProvider {
    fn default() -> Self {
        Self::new("claude")
    }
}

#[async_trait]
impl CodeGenProvider for ClaudeCliProvider {
    fn name(&self) -> &str {
        "claude-cli"
    }

    fn is_available(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    async fn query(&self, prompt: &str, options: &QueryOptions) -> Result<ResponseStream, ProviderError> {
        if !self.is_available() {
            return Err(ProviderError::Unavailable(format!("'{}' not found on PATH", self.command)));
        }

        let mut child = self.build_command(prompt, options).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Stream("stdout was not captured".to_string()))?;

        tracing::debug!(pid = ?child.id(), "spawned {}", self.command);

        let lines = LinesStream::new(BufReader::new(stdout).lines());

        // The child is carried along so it is reaped (or killed on drop) with the stream
        let stream = futures::stream::unfold(Some((lines, child)), |state| async move {
            let (mut lines, mut child) = state?;
            loop {
                match lines.next().await {
                    Some(Ok(line)) => {
                        if let Some(message) = parse_stream_line(&line) {
                            return Some((Ok(message), Some((lines, child))));
                        }
                    }
                    Some(Err(e)) => return Some((Err(ProviderError::Stream(e.to_string())), None)),
                    None => {
                        return match child.wait().await {
                            Ok(status) if status.success() => None,
                            Ok(status) => Some((
                                Err(ProviderError::Execution(format!("process exited with {}", status))),
                                None,
                            )),
                            Err(e) => Some((Err(ProviderError::Stream(e.to_string())), None)),
                        };
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Map one NDJSON line of CLI output to a provider message.
/// Lines that are not JSON are skipped.
pub fn parse_stream_line(line: &str) -> Option<ProviderMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let parsed: Value = serde_json::from_str(line).ok()?;

    let message = match parsed.get("type").and_then(Value::as_str).unwrap_or("") {
        "assistant" => {
            // Current CLI versions nest the API message; older ones put content at the top level
            let content = parsed
                .get("message")
                .and_then(|m| m.get("content"))
                .or_else(|| parsed.get("content"))
                .and_then(Value::as_array);

            let blocks = content
                .map(|blocks| blocks.iter().filter_map(parse_block).collect())
                .unwrap_or_default();
            ProviderMessage::Assistant(blocks)
        }
        "result" => {
            let subtype = parsed.get("subtype").and_then(Value::as_str).unwrap_or("");
            let is_error = parsed
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false)
                || subtype.starts_with("error");
            ProviderMessage::Result {
                summary: parsed.get("result").and_then(Value::as_str).map(str::to_string),
                is_error,
            }
        }
        _ => ProviderMessage::Other,
    };

    Some(message)
}

fn parse_block(block: &Value) -> Option<ContentBlock> {
    match block.get("type").and_then(Value::as_str)? {
        "text" => block
            .get("text")
            .and_then(Value::as_str)
            .map(|text| ContentBlock::Text(text.to_string())),
        "tool_use" => Some(ContentBlock::ToolUse {
            name: block
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assistant_message() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Created app.py"},{"type":"tool_use","name":"Write","input":{}}]}}"#;
        let message = parse_stream_line(line).unwrap();

        assert_eq!(
            message,
            ProviderMessage::Assistant(vec![
                ContentBlock::Text("Created app.py".to_string()),
                ContentBlock::ToolUse { name: "Write".to_string() },
            ])
        );
    }

    #[test]
    fn test_parse_flat_assistant_content() {
        let line = r#"{"type":"assistant","content":[{"type":"text","text":"hi"}]}"#;
        assert_eq!(
            parse_stream_line(line),
            Some(ProviderMessage::Assistant(vec![ContentBlock::Text("hi".to_string())]))
        );
    }

    #[test]
    fn test_parse_result_message() {
        let ok = r#"{"type":"result","subtype":"success","is_error":false,"result":"done"}"#;
        assert_eq!(
            parse_stream_line(ok),
            Some(ProviderMessage::Result { summary: Some("done".to_string()), is_error: false })
        );

        let failed = r#"{"type":"result","subtype":"error_max_turns"}"#;
        assert_eq!(
            parse_stream_line(failed),
            Some(ProviderMessage::Result { summary: None, is_error: true })
        );
    }

    #[test]
    fn test_parse_skips_noise() {
        assert_eq!(parse_stream_line(""), None);
        assert_eq!(parse_stream_line("not json"), None);
        assert_eq!(
            parse_stream_line(r#"{"type":"system","subtype":"init"}"#),
            Some(ProviderMessage::Other)
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let provider = ClaudeCliProvider::new("codefleet-definitely-not-installed");
        assert!(!provider.is_available());

        let options = QueryOptions::new(vec![], "");
        let result = provider.query("hello", &options).await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }
}
