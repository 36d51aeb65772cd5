use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::agent::{AgentSettings, TaskExecutor};
use super::{Agent, AgentResult, AgentRole, RoleProfile, Task, TaskOutcome};
use crate::providers::{collect_text, CodeGenProvider, QueryOptions};

/// Build a coding agent whose tasks write into `output_dir`.
///
/// A relative `output_dir` is resolved against the current directory once,
/// at construction.
pub fn coding_agent(
    role: AgentRole,
    provider: Arc<dyn CodeGenProvider>,
    settings: AgentSettings,
    output_dir: impl AsRef<Path>,
) -> AgentResult<Agent> {
    let output_dir = resolve_output_dir(output_dir.as_ref())?;
    let profile = RoleProfile::for_role(role);
    let options = settings.query_options(&profile).with_working_dir(&output_dir);
    let executor = CodingExecutor {
        role,
        provider,
        options,
        output_dir,
    };
    Ok(Agent::with_executor(role.as_str(), profile, settings, Box::new(executor)))
}

fn resolve_output_dir(dir: &Path) -> std::io::Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

/// Runs a task and reports which files appeared in the output directory,
/// found by listing it before and after the call.
pub struct CodingExecutor {
    role: AgentRole,
    provider: Arc<dyn CodeGenProvider>,
    options: QueryOptions,
    output_dir: PathBuf,
}

impl CodingExecutor {
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn build_prompt(&self, task: &Task) -> String {
        let examples: Vec<String> = example_files(self.role)
            .iter()
            .map(|name| format!("- {}", self.output_dir.join(name).display()))
            .collect();

        format!(
            "As a {role}, implement the following task by creating real files.\n\n\
             Task: {description}\n\n\
             Requirements:\n\
             - You MUST use the Write tool to create every file; do not only describe code\n\
             - Put all files inside {dir}\n\
             - Create complete, runnable files rather than fragments\n\n\
             Example file paths:\n{examples}\n\n\
             When finished, list the files you created and summarise what each one does.\n",
            role = self.role,
            description = task.description,
            dir = self.output_dir.display(),
            examples = examples.join("\n"),
        )
    }
}

#[async_trait]
impl TaskExecutor for CodingExecutor {
    async fn execute(&self, task: &Task) -> AgentResult<TaskOutcome> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let before = snapshot_dir(&self.output_dir).await?;

        let prompt = self.build_prompt(task);
        let stream = self.provider.query(&prompt, &self.options).await?;
        let parts = collect_text(stream).await?;

        let after = snapshot_dir(&self.output_dir).await?;
        let created_files: Vec<PathBuf> = after.difference(&before).cloned().collect();
        debug!(role = %self.role, created = created_files.len(), "directory diff complete");

        let warning = if created_files.is_empty() {
            warn!(role = %self.role, "task finished without creating any files: {}", task.short_description(50));
            Some(format!("No files were created in {}", self.output_dir.display()))
        } else {
            None
        };

        let summary = if parts.is_empty() {
            "Task completed".to_string()
        } else {
            parts.join("\n")
        };

        Ok(TaskOutcome::Files {
            summary,
            created_files,
            warning,
        })
    }
}

fn example_files(role: AgentRole) -> &'static [&'static str] {
    match role {
        AgentRole::FrontendCoder => &["index.html", "src/App.jsx", "src/styles.css"],
        AgentRole::BackendCoder => &["main.py", "app/api.py", "requirements.txt"],
        AgentRole::DevopsCoder => &["Dockerfile", "docker-compose.yml", ".github/workflows/ci.yml"],
        AgentRole::ProjectManager => &["PLAN.md"],
    }
}

/// Every file under `root`, as paths relative to it
pub async fn snapshot_dir(root: &Path) -> std::io::Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    if !root.exists() {
        return Ok(files);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                files.insert(relative.to_path_buf());
            }
        }
    }
    Ok(files)
}
