use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::agent::AgentSettings;
use super::{Agent, AgentRole, RoleProfile, Task, TaskStatus};
use crate::providers::{collect_text, CodeGenProvider, ProviderError, QueryOptions};

const FRONTEND_KEYWORDS: &[&str] = &["react", "vue", "html", "css", "frontend", "ui", "component"];
const DEVOPS_KEYWORDS: &[&str] = &["docker", "deploy", "ci", "cd", "kubernetes", "devops"];

/// One entry of the `subtasks` array the service is asked to return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub id: String,
    pub description: String,
    pub assigned_to: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_duration")]
    pub estimated_duration: u32,
    #[serde(default)]
    pub tools_needed: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_priority() -> u32 {
    1
}

fn default_duration() -> u32 {
    30
}

impl From<SubtaskSpec> for Task {
    fn from(spec: SubtaskSpec) -> Self {
        let mut task = Task::new(spec.id, spec.description, spec.assigned_to);
        task.priority = spec.priority;
        task.estimated_duration = Some(spec.estimated_duration);
        task.tools_needed = spec.tools_needed;
        task.dependencies = spec.dependencies;
        task
    }
}

#[derive(Debug, Deserialize)]
struct Decomposition {
    #[serde(default)]
    subtasks: Vec<SubtaskSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub status: TaskStatus,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedEntry {
    pub completion_time: DateTime<Utc>,
    pub result: Option<String>,
}

/// The project manager's own ledger of delegated work
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectBook {
    pub active_tasks: BTreeMap<String, TaskProgress>,
    pub completed_tasks: BTreeMap<String, CompletedEntry>,
}

/// Splits a free-text objective into role-assignable subtasks
pub struct ProjectManager {
    agent: Agent,
    provider: Arc<dyn CodeGenProvider>,
    options: QueryOptions,
    coding_agents: Vec<String>,
    book: Mutex<ProjectBook>,
}

impl ProjectManager {
    pub fn new(provider: Arc<dyn CodeGenProvider>, settings: AgentSettings) -> Self {
        let profile = RoleProfile::for_role(AgentRole::ProjectManager);
        let options = settings.query_options(&profile);
        let agent = Agent::new(AgentRole::ProjectManager.as_str(), profile, provider.clone(), settings);

        Self {
            agent,
            provider,
            options,
            coding_agents: [AgentRole::FrontendCoder, AgentRole::BackendCoder, AgentRole::DevopsCoder]
                .iter()
                .map(|role| role.as_str().to_string())
                .collect(),
            book: Mutex::new(ProjectBook::default()),
        }
    }

    /// The underlying agent, for lifecycle and status
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn coding_agents(&self) -> &[String] {
        &self.coding_agents
    }

    /// Decompose `main_task` into subtasks. Never fails: an unavailable
    /// service, a failed call, or an unusable reply all yield the single
    /// keyword-routed fallback task.
    pub async fn analyze_and_delegate_task(&self, main_task: &str) -> Vec<Task> {
        if !self.provider.is_available() {
            info!("code generation service unavailable; using keyword fallback");
            return vec![fallback_task(main_task)];
        }

        let prompt = decomposition_prompt(main_task, &self.coding_agents);
        let response = match self.request(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("task analysis call failed: {}", e);
                return vec![fallback_task(main_task)];
            }
        };

        match parse_subtasks(&response) {
            Some(specs) => {
                info!(count = specs.len(), "task analysis produced subtasks");
                specs.into_iter().map(Task::from).collect()
            }
            None => {
                warn!("task analysis reply had no usable subtasks; using keyword fallback");
                vec![fallback_task(main_task)]
            }
        }
    }

    async fn request(&self, prompt: &str) -> Result<String, ProviderError> {
        let stream = self.provider.query(prompt, &self.options).await?;
        Ok(collect_text(stream).await?.join("\n"))
    }

    pub async fn update_project_status(&self, task_id: &str, status: TaskStatus, result: Option<String>) {
        let mut book = self.book.lock().await;
        if status == TaskStatus::Completed {
            book.active_tasks.remove(task_id);
            book.completed_tasks.insert(
                task_id.to_string(),
                CompletedEntry {
                    completion_time: Utc::now(),
                    result,
                },
            );
        } else {
            book.active_tasks.insert(
                task_id.to_string(),
                TaskProgress {
                    status,
                    last_updated: Utc::now(),
                },
            );
        }
    }

    pub async fn project_status(&self) -> ProjectBook {
        self.book.lock().await.clone()
    }
}

fn decomposition_prompt(main_task: &str, coding_agents: &[String]) -> String {
    format!(
        r#"Analyze the following project task and split it into subtasks to be assigned to these coding agents: {agents}.

Main task: {main_task}

Please output in the following JSON format:
{{
  "subtasks": [
    {{
      "id": "task_1",
      "description": "Task description",
      "assigned_to": "{choices}",
      "priority": 1,
      "estimated_duration": 30,
      "tools_needed": ["Read", "Write", "Edit"],
      "dependencies": []
    }}
  ]
}}
"#,
        agents = coding_agents.join(", "),
        main_task = main_task,
        choices = coding_agents.join("|"),
    )
}

/// Locate the JSON object in a free-text reply: first an object opening with
/// a `"subtasks"` key, otherwise the span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    json_candidates(text).into_iter().next()
}

fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    if let Ok(re) = Regex::new(r#"(?s)\{\s*"subtasks"\s*:\s*\[.*\]\s*\}"#) {
        if let Some(m) = re.find(text) {
            candidates.push(m.as_str());
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            let span = &text[start..=end];
            if !candidates.contains(&span) {
                candidates.push(span);
            }
        }
    }

    candidates
}

/// Parse the service's reply into subtask specs. `None` when no candidate
/// object parses or the parsed list is empty.
pub fn parse_subtasks(text: &str) -> Option<Vec<SubtaskSpec>> {
    json_candidates(text).into_iter().find_map(|candidate| {
        serde_json::from_str::<Decomposition>(candidate)
            .ok()
            .map(|d| d.subtasks)
            .filter(|subtasks| !subtasks.is_empty())
    })
}

/// Route a submission to a single role by keyword
pub fn classify_submission(text: &str) -> AgentRole {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mentions = |keywords: &[&str]| {
        words.iter().any(|word| {
            keywords
                .iter()
                .any(|kw| *word == *kw || (kw.len() > 3 && word.starts_with(kw)))
        })
    };

    if mentions(FRONTEND_KEYWORDS) {
        AgentRole::FrontendCoder
    } else if mentions(DEVOPS_KEYWORDS) {
        AgentRole::DevopsCoder
    } else {
        AgentRole::BackendCoder
    }
}

/// The single task produced when decomposition is not possible
pub fn fallback_task(main_task: &str) -> Task {
    let role = classify_submission(main_task);
    let mut task = Task::new("task_1", main_task, role.as_str());
    task.priority = 1;
    task.estimated_duration = Some(30);
    task.tools_needed = vec!["Write".to_string(), "Edit".to_string(), "Read".to_string()];
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::demo::{DemoProvider, DemoReply};

    const GOOD_REPLY: &str = r#"Sure! Here's the plan:
```json
{
  "subtasks": [
    {"id": "task_1", "description": "Build the React UI", "assigned_to": "frontend_coder", "priority": 2,
     "estimated_duration": 45, "tools_needed": ["Write"], "dependencies": ["task_2"]},
    {"id": "task_2", "description": "Create the REST API", "assigned_to": "backend_coder"},
    {"id": "task_3", "description": "Write docs", "assigned_to": "tech_writer"}
  ]
}
```
Let me know if you need changes."#;

    #[test]
    fn test_parse_subtasks_from_prose() {
        let specs = parse_subtasks(GOOD_REPLY).unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].priority, 2);
        assert_eq!(specs[0].dependencies, vec!["task_2"]);
        // Defaults for omitted fields
        assert_eq!(specs[1].priority, 1);
        assert_eq!(specs[1].estimated_duration, 30);
        assert!(specs[1].tools_needed.is_empty());
        // Unknown assignees are kept; routing decides what to do with them
        assert_eq!(specs[2].assigned_to, "tech_writer");
    }

    #[test]
    fn test_extract_prefers_subtasks_object() {
        let text = r#"{"note": 1} and then {"subtasks": [{"id": "a"}]} done"#;
        assert_eq!(extract_json_object(text), Some(r#"{"subtasks": [{"id": "a"}]}"#));

        let plain = r#"prefix {"tasks": []} suffix"#;
        assert_eq!(extract_json_object(plain), Some(r#"{"tasks": []}"#));
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_subtasks_rejects_bad_replies() {
        assert!(parse_subtasks("").is_none());
        assert!(parse_subtasks("I cannot help with that").is_none());
        assert!(parse_subtasks(r#"{"subtasks": []}"#).is_none());
        assert!(parse_subtasks(r#"{"subtasks": [{"id": "x"}"#).is_none());
        assert!(parse_subtasks(r#"{"subtasks": [{"id": "x", "description": "y"}]}"#).is_none());
    }

    #[test]
    fn test_fallback_keyword_rule() {
        assert_eq!(classify_submission("Containerize with Docker"), AgentRole::DevopsCoder);
        assert_eq!(classify_submission("A React counter app"), AgentRole::FrontendCoder);
        assert_eq!(classify_submission("Reusable UI components"), AgentRole::FrontendCoder);
        assert_eq!(classify_submission("Set up Kubernetes manifests"), AgentRole::DevopsCoder);
        assert_eq!(classify_submission("Write a CSV parsing library"), AgentRole::BackendCoder);
        // "build" must not be read as "ui", nor "code" as "cd"
        assert_eq!(classify_submission("Build a code formatter"), AgentRole::BackendCoder);
    }

    #[test]
    fn test_docker_ci_fallback_task() {
        let task = fallback_task("Build a Docker CI pipeline for deployment");
        assert_eq!(task.assigned_to, "devops_coder");
        assert_eq!(task.priority, 1);
        assert_eq!(task.estimated_duration, Some(30));
        assert_eq!(task.tools_needed, vec!["Write", "Edit", "Read"]);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_unavailable_service_uses_fallback() {
        let provider = Arc::new(DemoProvider::unavailable());
        let pm = ProjectManager::new(provider.clone(), AgentSettings::default());

        let tasks = pm
            .analyze_and_delegate_task("Build a Docker CI pipeline for deployment")
            .await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].assigned_to, "devops_coder");
        assert_eq!(tasks[0].tools_needed, vec!["Write", "Edit", "Read"]);
        assert!(provider.prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reply_uses_fallback() {
        let provider = Arc::new(DemoProvider::scripted(vec![DemoReply::text("{ not json at all }")]));
        let pm = ProjectManager::new(provider, AgentSettings::default());

        let tasks = pm.analyze_and_delegate_task("Make a Vue dashboard").await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].assigned_to, "frontend_coder");
    }

    #[tokio::test]
    async fn test_failed_call_uses_fallback() {
        let provider = Arc::new(DemoProvider::scripted(vec![DemoReply::failing("timeout")]));
        let pm = ProjectManager::new(provider, AgentSettings::default());

        let tasks = pm.analyze_and_delegate_task("Write a CLI tool").await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].assigned_to, "backend_coder");
    }

    #[tokio::test]
    async fn test_decomposition_from_service() {
        let provider = Arc::new(DemoProvider::scripted(vec![DemoReply::text(GOOD_REPLY)]));
        let pm = ProjectManager::new(provider.clone(), AgentSettings::default());

        let tasks = pm.analyze_and_delegate_task("Todo app with API").await;
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id, "task_1");
        assert_eq!(tasks[0].estimated_duration, Some(45));
        assert_eq!(tasks[1].assigned_to, "backend_coder");

        let prompt = provider.prompts().await.remove(0);
        assert!(prompt.contains("Main task: Todo app with API"));
        assert!(prompt.contains("\"subtasks\""));
        assert!(prompt.contains("frontend_coder|backend_coder|devops_coder"));
    }

    #[tokio::test]
    async fn test_project_book() {
        let pm = ProjectManager::new(Arc::new(DemoProvider::new()), AgentSettings::default());

        pm.update_project_status("task_1", TaskStatus::InProgress, None).await;
        assert!(pm.project_status().await.active_tasks.contains_key("task_1"));

        pm.update_project_status("task_1", TaskStatus::Completed, Some("done".to_string()))
            .await;
        let book = pm.project_status().await;
        assert!(book.active_tasks.is_empty());
        assert_eq!(book.completed_tasks["task_1"].result.as_deref(), Some("done"));
    }
}
