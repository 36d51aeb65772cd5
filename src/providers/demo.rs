use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::{CodeGenProvider, ContentBlock, ProviderError, ProviderMessage, QueryOptions, ResponseStream};

/// A scripted reply served by [`DemoProvider`]
#[derive(Debug, Clone, Default)]
pub struct DemoReply {
    pub text: Vec<String>,
    /// Files written into the query's working directory before replying
    pub files: Vec<(PathBuf, String)>,
    pub error: Option<String>,
    pub delay: Duration,
}

impl DemoReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: vec![text.into()],
            ..Default::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Offline stand-in for the code generation CLI.
///
/// Scripted replies are served first, in order; once the script runs dry the
/// provider falls back to canned behaviour: decomposition prompts get a
/// three-way split and task prompts get a notes file written to the working
/// directory.
pub struct DemoProvider {
    available: bool,
    script: Mutex<VecDeque<DemoReply>>,
    prompts: Mutex<Vec<String>>,
    files_written: AtomicUsize,
}

impl DemoProvider {
    pub fn new() -> Self {
        Self {
            available: true,
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            files_written: AtomicUsize::new(0),
        }
    }

    pub fn scripted(replies: Vec<DemoReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Self::new()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub async fn push_reply(&self, reply: DemoReply) {
        self.script.lock().await.push_back(reply);
    }

    /// Every prompt received so far, in order
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    fn canned_reply(&self, prompt: &str) -> DemoReply {
        if prompt.contains("\"subtasks\"") {
            let objective = extract_objective(prompt);
            return DemoReply::text(canned_decomposition(&objective));
        }

        let n = self.files_written.fetch_add(1, Ordering::SeqCst) + 1;
        let file = format!("demo_output_{}.md", n);
        DemoReply::text(format!("Demo mode: wrote {}", file))
            .with_file(file, format!("# Demo output\n\n{}\n", prompt.trim()))
    }
}

impl Default for DemoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeGenProvider for DemoProvider {
    fn name(&self) -> &str {
        "demo"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn query(&self, prompt: &str, options: &QueryOptions) -> Result<ResponseStream, ProviderError> {
        if !self.available {
            return Err(ProviderError::Unavailable("demo provider disabled".to_string()));
        }

        self.prompts.lock().await.push(prompt.to_string());

        let scripted = self.script.lock().await.pop_front();
        let reply = scripted.unwrap_or_else(|| self.canned_reply(prompt));

        if !reply.delay.is_zero() {
            sleep(reply.delay).await;
        }
        if let Some(error) = reply.error {
            return Err(ProviderError::Execution(error));
        }

        if let Some(dir) = &options.working_dir {
            for (path, content) in &reply.files {
                let target = dir.join(path);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, content).await?;
            }
        }

        let blocks = reply.text.into_iter().map(ContentBlock::Text).collect();
        let messages = vec![
            Ok(ProviderMessage::Other),
            Ok(ProviderMessage::Assistant(blocks)),
            Ok(ProviderMessage::Result {
                summary: None,
                is_error: false,
            }),
        ];

        Ok(Box::pin(stream::iter(messages)))
    }
}

fn extract_objective(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.trim().strip_prefix("Main task:"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "the project".to_string())
}

fn canned_decomposition(objective: &str) -> String {
    let subtasks: Vec<serde_json::Value> = [
        ("task_1", "backend_coder", "Implement the core logic and API for"),
        ("task_2", "frontend_coder", "Build the user interface for"),
        ("task_3", "devops_coder", "Write a Dockerfile and CI workflow for"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (id, role, verb))| {
        serde_json::json!({
            "id": id,
            "description": format!("{} {}", verb, objective),
            "assigned_to": role,
            "priority": i + 1,
            "estimated_duration": 30,
            "tools_needed": ["Read", "Write", "Edit"],
            "dependencies": []
        })
    })
    .collect();

    format!(
        "Here is the breakdown:\n```json\n{}\n```",
        serde_json::json!({ "subtasks": subtasks })
    )
}
