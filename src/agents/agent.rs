use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    AgentError, AgentMessage, AgentResult, AgentRole, AgentStatus, ConversationMessage, MessageType, RoleProfile,
    Task, TaskOutcome, TaskRecord, TaskStatus,
};
use crate::providers::{collect_text, CodeGenProvider, QueryOptions};

/// Timing and bookkeeping knobs shared by every agent
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Capacity of the recent-results ring
    pub recent_results: usize,
    pub max_turns: u32,
    pub permission_mode: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            recent_results: 10,
            max_turns: 10,
            permission_mode: "acceptEdits".to_string(),
        }
    }
}

impl AgentSettings {
    pub fn query_options(&self, profile: &RoleProfile) -> QueryOptions {
        QueryOptions::new(profile.allowed_tools.clone(), profile.system_prompt.clone())
            .with_max_turns(self.max_turns)
            .with_permission_mode(self.permission_mode.clone())
    }
}

/// Runs one task through the external service
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> AgentResult<TaskOutcome>;
}

/// Plain execution: one prompt, accumulated text as the result
pub struct PromptExecutor {
    role: AgentRole,
    provider: Arc<dyn CodeGenProvider>,
    options: QueryOptions,
}

impl PromptExecutor {
    pub fn new(role: AgentRole, provider: Arc<dyn CodeGenProvider>, options: QueryOptions) -> Self {
        Self { role, provider, options }
    }

    fn build_prompt(&self, task: &Task) -> String {
        let mut prompt = format!(
            "As a {}, please execute the following task:\n\nTask: {}\n\nUse the following tools as needed:\n",
            self.role, task.description
        );
        for tool in &self.options.allowed_tools {
            prompt.push_str(&format!("- {}\n", tool));
        }
        if !task.tools_needed.is_empty() {
            prompt.push_str(&format!("\nThe planner suggested: {}\n", task.tools_needed.join(", ")));
        }
        prompt.push_str("\nPlease report the execution results in detail.\n");
        prompt
    }
}

#[async_trait]
impl TaskExecutor for PromptExecutor {
    async fn execute(&self, task: &Task) -> AgentResult<TaskOutcome> {
        let prompt = self.build_prompt(task);
        let stream = self.provider.query(&prompt, &self.options).await?;
        let parts = collect_text(stream).await?;

        let text = if parts.is_empty() {
            "Task completed".to_string()
        } else {
            parts.join("\n")
        };
        Ok(TaskOutcome::Text { text })
    }
}

#[derive(Default)]
struct AgentState {
    inbox: VecDeque<AgentMessage>,
    tasks: Vec<Task>,
    completed_tasks: usize,
    failed_tasks: usize,
    recent: VecDeque<TaskRecord>,
    task_results: HashMap<String, TaskRecord>,
    history: Vec<ConversationMessage>,
}

impl AgentState {
    fn remember(&mut self, record: TaskRecord, capacity: usize) {
        self.task_results.insert(record.task_id.clone(), record.clone());
        self.recent.push_back(record);
        while self.recent.len() > capacity {
            self.recent.pop_front();
        }
    }
}

struct AgentInner {
    id: String,
    profile: RoleProfile,
    settings: AgentSettings,
    executor: Box<dyn TaskExecutor>,
    running: AtomicBool,
    generation: AtomicU64,
    state: Mutex<AgentState>,
}

/// A polling worker with an inbound message queue and an in-flight task list.
///
/// Cloning yields another handle to the same agent. All state lives behind a
/// lock that is never held across the external call, so the orchestrator can
/// observe an agent while it works.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// An agent that executes tasks with a plain prompt
    pub fn new(
        id: impl Into<String>,
        profile: RoleProfile,
        provider: Arc<dyn CodeGenProvider>,
        settings: AgentSettings,
    ) -> Self {
        let options = settings.query_options(&profile);
        let executor = PromptExecutor::new(profile.role, provider, options);
        Self::with_executor(id, profile, settings, Box::new(executor))
    }

    pub fn with_executor(
        id: impl Into<String>,
        profile: RoleProfile,
        settings: AgentSettings,
        executor: Box<dyn TaskExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                id: id.into(),
                profile,
                settings,
                executor,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                state: Mutex::new(AgentState::default()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn role(&self) -> AgentRole {
        self.inner.profile.role
    }

    pub fn profile(&self) -> &RoleProfile {
        &self.inner.profile
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Spawn the polling loop. Returns `false` if the agent was already running.
    pub fn start(&self) -> bool {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!(agent = %self.id(), "start called on a running agent; ignoring");
            return false;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let agent = self.clone();
        tokio::spawn(async move { agent.run_loop(generation).await });

        info!(agent = %self.id(), role = %self.role(), "agent started");
        true
    }

    /// Ask the loop to exit at its next iteration boundary. A task already
    /// talking to the service runs to completion first.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        info!(agent = %self.id(), "agent stopped");
    }

    pub async fn send_message_to_agent(&self, message: AgentMessage) {
        self.inner.state.lock().await.inbox.push_back(message);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.inner.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(&self, generation: u64) {
        while self.is_current(generation) {
            let agent = self.clone();
            let handle = tokio::spawn(async move { agent.tick().await });
            match handle.await {
                Ok(Ok(())) => sleep(self.inner.settings.poll_interval).await,
                Ok(Err(e)) => {
                    error!(agent = %self.id(), "error in autonomous loop: {}", e);
                    sleep(self.inner.settings.error_backoff).await;
                }
                Err(e) => {
                    error!(agent = %self.id(), "autonomous loop iteration aborted: {}", e);
                    sleep(self.inner.settings.error_backoff).await;
                }
            }
        }
        debug!(agent = %self.id(), "autonomous loop exited");
    }

    /// One loop iteration: take at most one message, then run every pending task.
    ///
    /// The message leaves the inbox and its task enters the in-flight list
    /// under one guard, so [`Agent::is_drained`] never sees the gap.
    pub async fn tick(&self) -> AgentResult<()> {
        let pending: Vec<String> = {
            let mut state = self.inner.state.lock().await;
            if let Some(message) = state.inbox.pop_front() {
                if let Some(task) = self.task_from_message(&message) {
                    info!(agent = %self.id(), "received new task: {}", task.short_description(50));
                    state.tasks.push(task);
                }
            }
            state
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending)
                .map(|t| t.id.clone())
                .collect()
        };

        for task_id in pending {
            self.execute_task(&task_id).await?;
        }
        Ok(())
    }

    fn task_from_message(&self, message: &AgentMessage) -> Option<Task> {
        if message.message_type != MessageType::TaskRequest {
            debug!(agent = %self.id(), kind = %message.message_type, "ignoring message from {}", message.sender_id);
            return None;
        }

        let mut task = Task::new(
            format!("{}_{}", self.id(), Uuid::new_v4().simple()),
            message.content.clone(),
            self.id(),
        );
        task.parent_task_id = message.metadata_str("task_id").map(str::to_string);
        task.project_id = message.metadata_str("project_id").map(str::to_string);
        task.priority = message.priority().unwrap_or(1);
        task.tools_needed = message.tools_needed();
        task.estimated_duration = message
            .metadata
            .get("estimated_duration")
            .and_then(|v| v.as_u64())
            .and_then(|d| u32::try_from(d).ok());
        Some(task)
    }

    async fn execute_task(&self, task_id: &str) -> AgentResult<()> {
        let task = {
            let mut state = self.inner.state.lock().await;
            let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) else {
                return Ok(());
            };
            if task.status != TaskStatus::Pending {
                return Ok(());
            }
            task.start()?;
            task.clone()
        };

        info!(agent = %self.id(), "starting task: {}", task.short_description(50));
        self.add_conversation_message(ConversationMessage::new("user", task.description.clone(), self.id()))
            .await;
        let agent = self.clone();
        let running = task.clone();
        let handle = tokio::spawn(async move { agent.inner.executor.execute(&running).await });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(agent = %self.id(), "executor aborted on task {}: {}", task.id, e);
                Err(AgentError::ExecutorPanicked(task.id.clone()))
            }
        };

        let mut state = self.inner.state.lock().await;
        let index = state
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| AgentError::TaskNotFound(task_id.to_string()))?;
        let mut task = state.tasks.remove(index);

        match outcome {
            Ok(outcome) => {
                task.complete(outcome)?;
                state.completed_tasks += 1;
                info!(agent = %self.id(), "completed task: {}", task.short_description(50));
            }
            Err(e) => {
                task.fail(format!("Error: {}", e))?;
                state.failed_tasks += 1;
                error!(agent = %self.id(), "task {} failed: {}", task.id, e);
            }
        }

        if let Some(record) = TaskRecord::from_task(self.id(), &task) {
            state.history.push(ConversationMessage::new(
                "assistant",
                record.outcome.summary().to_string(),
                self.id(),
            ));
            state.remember(record, self.inner.settings.recent_results);
        }
        Ok(())
    }

    pub async fn add_conversation_message(&self, message: ConversationMessage) {
        self.inner.state.lock().await.history.push(message);
    }

    /// Prompts and replies exchanged by this agent, oldest first
    pub async fn get_conversation_history(&self) -> Vec<ConversationMessage> {
        self.inner.state.lock().await.history.clone()
    }

    pub async fn clear_conversation_history(&self) {
        self.inner.state.lock().await.history.clear();
    }

    pub async fn in_flight_count(&self) -> usize {
        self.inner.state.lock().await.tasks.len()
    }

    pub async fn pending_messages(&self) -> usize {
        self.inner.state.lock().await.inbox.len()
    }

    /// In-flight and queued work are both gone
    pub async fn is_drained(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.tasks.is_empty() && state.inbox.is_empty()
    }

    pub async fn current_tasks(&self) -> Vec<Task> {
        self.inner.state.lock().await.tasks.clone()
    }

    /// The most recent finished tasks, oldest first
    pub async fn recent_results(&self) -> Vec<TaskRecord> {
        self.inner.state.lock().await.recent.iter().cloned().collect()
    }

    pub async fn task_result(&self, task_id: &str) -> Option<TaskRecord> {
        self.inner.state.lock().await.task_results.get(task_id).cloned()
    }

    /// Every finished task dispatched for the given submission, oldest first
    pub async fn results_for_project(&self, project_id: &str) -> Vec<TaskRecord> {
        let state = self.inner.state.lock().await;
        let mut records: Vec<TaskRecord> = state
            .task_results
            .values()
            .filter(|r| r.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.completed_at);
        records
    }

    pub async fn get_status(&self) -> AgentStatus {
        let state = self.inner.state.lock().await;
        let skip = state.recent.len().saturating_sub(5);

        AgentStatus {
            agent_id: self.id().to_string(),
            role: self.role(),
            is_running: self.is_running(),
            completed_tasks: state.completed_tasks,
            failed_tasks: state.failed_tasks,
            current_tasks_count: state.tasks.len(),
            pending_messages: state.inbox.len(),
            recent_results: state.recent.iter().skip(skip).map(|r| r.task_id.clone()).collect(),
            message_history_length: state.history.len(),
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.inner.id)
            .field("role", &self.inner.profile.role)
            .field("running", &self.is_running())
            .finish()
    }
}
