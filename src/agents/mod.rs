pub mod agent;
pub mod coder;
pub mod orchestrator;
pub mod project_manager;
pub mod role;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::providers::ProviderError;

pub use agent::Agent;
pub use orchestrator::Orchestrator;
pub use project_manager::ProjectManager;
pub use role::{AgentRole, RoleProfile};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Executor panicked while running task {0}")]
    ExecutorPanicked(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Task lifecycle: `Pending` → `InProgress` → `Completed` | `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What a finished task produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    Text {
        text: String,
    },
    Files {
        summary: String,
        created_files: Vec<PathBuf>,
        warning: Option<String>,
    },
    Error {
        message: String,
    },
}

impl TaskOutcome {
    pub fn created_files(&self) -> &[PathBuf] {
        match self {
            Self::Files { created_files, .. } => created_files,
            _ => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn summary(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Files { summary, .. } => summary,
            Self::Error { message } => message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub assigned_to: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskOutcome>,
    /// Informational only; never used for ordering
    pub priority: u32,
    pub parent_task_id: Option<String>,
    pub subtasks: Vec<String>,
    pub tools_needed: Vec<String>,
    /// Declared by the decomposition but not enforced
    pub dependencies: Vec<String>,
    /// Minutes
    pub estimated_duration: Option<u32>,
    /// Submission this task was dispatched for
    pub project_id: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, assigned_to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assigned_to: assigned_to.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            priority: 1,
            parent_task_id: None,
            subtasks: Vec::new(),
            tools_needed: Vec::new(),
            dependencies: Vec::new(),
            estimated_duration: None,
            project_id: None,
        }
    }

    pub fn transition(&mut self, next: TaskStatus) -> AgentResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AgentError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> AgentResult<()> {
        self.transition(TaskStatus::InProgress)
    }

    pub fn complete(&mut self, outcome: TaskOutcome) -> AgentResult<()> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(outcome);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> AgentResult<()> {
        self.transition(TaskStatus::Failed)?;
        self.result = Some(TaskOutcome::Error {
            message: message.into(),
        });
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Description cut to `max` characters for log lines
    pub fn short_description(&self, max: usize) -> String {
        truncate(&self.description, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskRequest,
    TaskResult,
    StatusUpdate,
    Coordination,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskRequest => write!(f, "task_request"),
            Self::TaskResult => write!(f, "task_result"),
            Self::StatusUpdate => write!(f, "status_update"),
            Self::Coordination => write!(f, "coordination"),
        }
    }
}

/// Envelope passed between agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentMessage {
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            message_type,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn priority(&self) -> Option<u32> {
        self.metadata
            .get("priority")
            .and_then(|v| v.as_u64())
            .and_then(|p| u32::try_from(p).ok())
    }

    pub fn tools_needed(&self) -> Vec<String> {
        self.metadata
            .get("tools_needed")
            .and_then(|v| v.as_array())
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A finished task as remembered by the agent that ran it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent_id: String,
    pub project_id: Option<String>,
    /// Subtask id from the decomposition, when dispatched by the orchestrator
    pub parent_task_id: Option<String>,
    pub description: String,
    pub status: TaskStatus,
    pub outcome: TaskOutcome,
    pub completed_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn from_task(agent_id: &str, task: &Task) -> Option<Self> {
        Some(Self {
            task_id: task.id.clone(),
            agent_id: agent_id.to_string(),
            project_id: task.project_id.clone(),
            parent_task_id: task.parent_task_id.clone(),
            description: task.description.clone(),
            status: task.status,
            outcome: task.result.clone()?,
            completed_at: task.completed_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Point-in-time report of a single agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub role: AgentRole,
    pub is_running: bool,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub current_tasks_count: usize,
    pub pending_messages: usize,
    /// Ids of the most recently finished tasks, oldest first
    pub recent_results: Vec<String>,
    pub message_history_length: usize,
}

/// One entry of an agent's conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// `user` for prompts, `assistant` for replies
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ConversationMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
            agent_id: Some(agent_id.into()),
            metadata: HashMap::new(),
        }
    }
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
