use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::agent::AgentSettings;
use super::coder::coding_agent;
use super::{
    truncate, Agent, AgentError, AgentMessage, AgentResult, AgentRole, AgentStatus, MessageType, ProjectManager,
    Task, TaskRecord, TaskStatus,
};
use crate::app::task_builder::TaskBuilder;
use crate::providers::CodeGenProvider;

const PROJECT_MANAGER_ID: &str = "project_manager";
const MESSAGE_LOG_CONTENT_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub monitor_interval: Duration,
    pub monitor_backoff: Duration,
    pub drain_poll: Duration,
    pub drain_timeout: Duration,
    /// Where coding agents write their files
    pub output_dir: PathBuf,
    pub agent: AgentSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(5),
            monitor_backoff: Duration::from_secs(10),
            drain_poll: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(300),
            output_dir: PathBuf::from("output"),
            agent: AgentSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A decomposed subtask as seen by the project record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSummary {
    pub id: String,
    pub description: String,
    pub assigned_to: String,
    pub priority: u32,
    /// `false` when no agent with that name exists
    pub dispatched: bool,
}

impl SubtaskSummary {
    fn from_task(task: &Task, dispatched: bool) -> Self {
        Self {
            id: task.id.clone(),
            description: task.description.clone(),
            assigned_to: task.assigned_to.clone(),
            priority: task.priority,
            dispatched,
        }
    }
}

/// Everything the system did for one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub submission: String,
    pub status: ProjectStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub subtasks: Vec<SubtaskSummary>,
    pub results: Vec<TaskRecord>,
    pub created_files: Vec<PathBuf>,
    pub error: Option<String>,
}

impl ProjectRecord {
    fn begin(id: String, submission: String) -> Self {
        Self {
            id,
            submission,
            status: ProjectStatus::InProgress,
            started_at: Utc::now(),
            ended_at: None,
            subtasks: Vec::new(),
            results: Vec::new(),
            created_files: Vec::new(),
            error: None,
        }
    }

    fn finish(&mut self, results: Vec<TaskRecord>) {
        let mut seen = BTreeSet::new();
        self.created_files = results
            .iter()
            .flat_map(|r| r.outcome.created_files().iter().cloned())
            .filter(|path| seen.insert(path.clone()))
            .collect();
        self.status = classify(&results);
        self.results = results;
        self.ended_at = Some(Utc::now());
    }

    fn fail(&mut self, error: impl Into<String>) {
        self.status = ProjectStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }
}

/// Project verdict: at least one result, and either some file was created
/// or no subtask failed
pub fn classify(results: &[TaskRecord]) -> ProjectStatus {
    if results.is_empty() {
        return ProjectStatus::Failed;
    }
    let any_files = results.iter().any(|r| !r.outcome.created_files().is_empty());
    let any_error = results.iter().any(|r| r.outcome.is_error());
    if any_files || !any_error {
        ProjectStatus::Completed
    } else {
        ProjectStatus::Failed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub system_running: bool,
    pub total_agents: usize,
    pub total_completed_tasks: usize,
    pub total_active_tasks: usize,
    pub pending_projects: usize,
    pub completed_projects: usize,
    pub agent_details: BTreeMap<String, AgentStatus>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentPerformance {
    pub completion_rate: f64,
    pub total_tasks: usize,
    pub workload: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    /// Percent, two decimals
    pub overall_completion_rate: f64,
    pub total_system_tasks: usize,
    pub system_utilization: usize,
    pub agent_performance: BTreeMap<String, AgentPerformance>,
    pub system_running: bool,
    pub message_throughput: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageLogEntry {
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub receiver_id: String,
    pub message_type: MessageType,
    pub content: String,
}

impl From<&AgentMessage> for MessageLogEntry {
    fn from(message: &AgentMessage) -> Self {
        Self {
            timestamp: message.timestamp,
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            message_type: message.message_type,
            content: truncate(&message.content, MESSAGE_LOG_CONTENT_LIMIT),
        }
    }
}

#[derive(Debug)]
struct Submission {
    id: String,
    text: String,
}

/// Counts a project as in progress for as long as it lives
struct ActiveProject<'a>(&'a AtomicUsize);

impl<'a> ActiveProject<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveProject<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct OrchestratorInner {
    settings: OrchestratorSettings,
    provider: Arc<dyn CodeGenProvider>,
    project_manager: ProjectManager,
    coding_agents: RwLock<BTreeMap<String, Agent>>,
    running: AtomicBool,
    generation: AtomicU64,
    submissions: Mutex<VecDeque<Submission>>,
    message_log: Mutex<Vec<AgentMessage>>,
    completed: Mutex<Vec<ProjectRecord>>,
    active_projects: AtomicUsize,
}

/// Owns the agent crew and turns project submissions into dispatched work.
///
/// Submissions are handled strictly one at a time: the monitor loop pops
/// one, has the project manager decompose it, sends each subtask to its
/// coding agent, waits until those agents have drained, and files the
/// aggregated [`ProjectRecord`].
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CodeGenProvider>, settings: OrchestratorSettings) -> AgentResult<Self> {
        if provider.is_available() {
            info!(provider = provider.name(), "code generation service available");
        } else {
            warn!(provider = provider.name(), "code generation service unavailable; running in fallback mode");
        }

        let project_manager = ProjectManager::new(provider.clone(), settings.agent.clone());

        let mut coding_agents = BTreeMap::new();
        for role in AgentRole::all().into_iter().filter(AgentRole::is_coder) {
            let agent = coding_agent(role, provider.clone(), settings.agent.clone(), &settings.output_dir)?;
            coding_agents.insert(agent.id().to_string(), agent);
        }

        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                settings,
                provider,
                project_manager,
                coding_agents: RwLock::new(coding_agents),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                submissions: Mutex::new(VecDeque::new()),
                message_log: Mutex::new(Vec::new()),
                completed: Mutex::new(Vec::new()),
                active_projects: AtomicUsize::new(0),
            }),
        })
    }

    pub fn provider(&self) -> &Arc<dyn CodeGenProvider> {
        &self.inner.provider
    }

    pub fn project_manager(&self) -> &ProjectManager {
        &self.inner.project_manager
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    async fn all_agents(&self) -> Vec<Agent> {
        let mut agents = vec![self.inner.project_manager.agent().clone()];
        agents.extend(self.inner.coding_agents.read().await.values().cloned());
        agents
    }

    async fn coding_agent(&self, agent_id: &str) -> Option<Agent> {
        self.inner.coding_agents.read().await.get(agent_id).cloned()
    }

    /// Start every agent and the monitor loop. Returns `false` if the system
    /// was already running.
    pub async fn start_system(&self) -> bool {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("start_system called while running; ignoring");
            return false;
        }
        info!("starting multi-agent system");

        for agent in self.all_agents().await {
            agent.start();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.monitor_loop(generation).await });

        info!("system started");
        true
    }

    /// Stop the monitor loop and every agent. Work already talking to the
    /// service finishes; queued submissions stay queued.
    pub async fn stop_system(&self) {
        info!("stopping system");
        self.inner.running.store(false, Ordering::SeqCst);
        for agent in self.all_agents().await {
            agent.stop();
        }
        info!("system stopped");
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.inner.generation.load(Ordering::SeqCst) == generation
    }

    async fn monitor_loop(&self, generation: u64) {
        while self.is_current(generation) {
            let orchestrator = self.clone();
            let handle = tokio::spawn(async move { orchestrator.process_next_submission().await });
            match handle.await {
                Ok(_) => sleep(self.inner.settings.monitor_interval).await,
                Err(e) => {
                    error!("error in system monitoring loop: {}", e);
                    sleep(self.inner.settings.monitor_backoff).await;
                }
            }
        }
        debug!("monitor loop exited");
    }

    /// Queue a project for processing and return its id
    pub async fn submit_project_task(&self, text: impl Into<String>) -> String {
        let text = text.into();
        let id = Uuid::new_v4().to_string();
        info!(project = %id, "new project task submitted: {}", truncate(&text, 100));
        self.inner.submissions.lock().await.push_back(Submission { id: id.clone(), text });
        id
    }

    /// Process the oldest queued submission, if any, to its final record
    pub async fn process_next_submission(&self) -> Option<ProjectRecord> {
        let (submission, _active) = {
            let mut queue = self.inner.submissions.lock().await;
            let submission = queue.pop_front()?;
            (submission, ActiveProject::enter(&self.inner.active_projects))
        };

        let record = self.run_project(submission).await;
        self.inner.completed.lock().await.push(record.clone());
        Some(record)
    }

    async fn run_project(&self, submission: Submission) -> ProjectRecord {
        info!(project = %submission.id, "processing project task: {}", truncate(&submission.text, 100));
        let mut record = ProjectRecord::begin(submission.id.clone(), submission.text.clone());

        let tasks = self.decompose(&record.id, &submission.text).await;
        if tasks.is_empty() {
            warn!(project = %record.id, "task analysis failed");
            record.fail("Task analysis failed");
            return record;
        }

        let mut assigned: BTreeMap<String, Agent> = BTreeMap::new();
        for task in &tasks {
            let Some(agent) = self.coding_agent(&task.assigned_to).await else {
                warn!(project = %record.id, "no agent named {}; subtask {} not dispatched", task.assigned_to, task.id);
                record.subtasks.push(SubtaskSummary::from_task(task, false));
                continue;
            };

            let message = dispatch_message(task, &record.id);
            self.inner.message_log.lock().await.push(message.clone());
            agent.send_message_to_agent(message).await;
            self.inner
                .project_manager
                .update_project_status(&task.id, TaskStatus::InProgress, None)
                .await;
            info!(agent = %agent.id(), project = %record.id, "assigned task: {}", task.short_description(50));

            record.subtasks.push(SubtaskSummary::from_task(task, true));
            assigned.insert(agent.id().to_string(), agent);
        }

        let agents: Vec<Agent> = assigned.into_values().collect();
        let drained = self.wait_for_drain(&agents).await;

        let mut results = Vec::new();
        for agent in &agents {
            results.extend(agent.results_for_project(&record.id).await);
        }
        results.sort_by_key(|r| r.completed_at);

        for result in &results {
            if let Some(subtask_id) = &result.parent_task_id {
                self.inner
                    .project_manager
                    .update_project_status(subtask_id, result.status, Some(result.outcome.summary().to_string()))
                    .await;
            }
        }

        record.finish(results);
        if !drained {
            let note = format!(
                "Timed out after {}s waiting for agents; collected partial results",
                self.inner.settings.drain_timeout.as_secs()
            );
            warn!(project = %record.id, "{}", note);
            record.error = Some(note);
        }

        info!(
            project = %record.id,
            status = %record.status,
            results = record.results.len(),
            files = record.created_files.len(),
            "project finished"
        );
        record
    }

    /// Decomposition never fails by returning an error, but a panic inside it
    /// counts as an empty plan.
    async fn decompose(&self, project_id: &str, text: &str) -> Vec<Task> {
        let orchestrator = self.clone();
        let text = text.to_string();
        let handle =
            tokio::spawn(async move { orchestrator.inner.project_manager.analyze_and_delegate_task(&text).await });
        match handle.await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(project = %project_id, "task analysis aborted: {}", e);
                Vec::new()
            }
        }
    }

    /// Poll until every agent has neither in-flight tasks nor queued
    /// messages. `false` on timeout.
    async fn wait_for_drain(&self, agents: &[Agent]) -> bool {
        let deadline = Instant::now() + self.inner.settings.drain_timeout;
        loop {
            let mut drained = true;
            for agent in agents {
                if !agent.is_drained().await {
                    drained = false;
                    break;
                }
            }
            if drained {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.inner.settings.drain_poll).await;
        }
    }

    async fn is_idle(&self) -> bool {
        if self.inner.active_projects.load(Ordering::SeqCst) > 0 {
            return false;
        }
        if !self.inner.submissions.lock().await.is_empty() {
            return false;
        }
        for agent in self.all_agents().await {
            if agent.in_flight_count().await > 0 {
                return false;
            }
        }
        true
    }

    /// Wait until no work is queued, processing or in flight, or until
    /// `timeout` elapses. Returns the system status either way.
    pub async fn wait_for_completion(&self, timeout: Duration) -> SystemStatus {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle().await {
                info!("all tasks completed");
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("timeout ({}s) reached waiting for completion", timeout.as_secs());
                break;
            }
            sleep(self.inner.settings.drain_poll.min(deadline - now)).await;
        }
        self.get_system_status().await
    }

    pub async fn get_system_status(&self) -> SystemStatus {
        let mut agent_details = BTreeMap::new();
        for agent in self.all_agents().await {
            agent_details.insert(agent.id().to_string(), agent.get_status().await);
        }

        SystemStatus {
            system_running: self.is_running(),
            total_agents: agent_details.len(),
            total_completed_tasks: agent_details.values().map(|s| s.completed_tasks).sum(),
            total_active_tasks: agent_details.values().map(|s| s.current_tasks_count).sum(),
            pending_projects: self.inner.submissions.lock().await.len(),
            completed_projects: self.inner.completed.lock().await.len(),
            agent_details,
            timestamp: Utc::now(),
        }
    }

    pub async fn get_agent_details(&self, agent_id: &str) -> AgentResult<AgentStatus> {
        let agent = if agent_id == PROJECT_MANAGER_ID {
            Some(self.inner.project_manager.agent().clone())
        } else {
            self.coding_agent(agent_id).await
        };
        match agent {
            Some(agent) => Ok(agent.get_status().await),
            None => Err(AgentError::AgentNotFound(agent_id.to_string())),
        }
    }

    /// The last `limit` dispatched messages, oldest first
    pub async fn get_message_log(&self, limit: usize) -> Vec<MessageLogEntry> {
        let log = self.inner.message_log.lock().await;
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).map(MessageLogEntry::from).collect()
    }

    pub async fn completed_projects(&self) -> Vec<ProjectRecord> {
        self.inner.completed.lock().await.clone()
    }

    pub async fn get_active_agent_count(&self) -> usize {
        self.all_agents().await.iter().filter(|a| a.is_running()).count()
    }

    /// Register an extra coding agent under its own id. Started right away
    /// when the system is running.
    pub async fn add_custom_agent(&self, agent: Agent) -> bool {
        if agent.role() == AgentRole::ProjectManager || agent.id() == PROJECT_MANAGER_ID {
            warn!(agent = %agent.id(), "only coding agents can be added");
            return false;
        }

        let mut agents = self.inner.coding_agents.write().await;
        if agents.contains_key(agent.id()) {
            warn!(agent = %agent.id(), "agent already exists");
            return false;
        }
        if self.is_running() {
            agent.start();
        }
        info!(agent = %agent.id(), "added custom agent");
        agents.insert(agent.id().to_string(), agent);
        true
    }

    /// Remove and stop a coding agent. The project manager cannot be removed.
    pub async fn remove_agent(&self, agent_id: &str) -> bool {
        if agent_id == PROJECT_MANAGER_ID {
            warn!(agent = %agent_id, "cannot remove the project manager");
            return false;
        }
        match self.inner.coding_agents.write().await.remove(agent_id) {
            Some(agent) => {
                agent.stop();
                info!(agent = %agent_id, "removed agent");
                true
            }
            None => {
                warn!(agent = %agent_id, "cannot remove unknown agent");
                false
            }
        }
    }

    pub fn create_structured_task(
        main_objective: &str,
        requirements: &[&str],
        constraints: &[&str],
        deliverables: &[&str],
    ) -> String {
        TaskBuilder::new()
            .set_objective(main_objective)
            .add_requirements(requirements.iter().copied())
            .add_constraints(constraints.iter().copied())
            .add_deliverables(deliverables.iter().copied())
            .build()
    }

    pub async fn get_performance_metrics(&self) -> PerformanceMetrics {
        let status = self.get_system_status().await;

        let failed: usize = status.agent_details.values().map(|s| s.failed_tasks).sum();
        let total_tasks = status.total_completed_tasks + failed + status.total_active_tasks;

        let agent_performance = status
            .agent_details
            .iter()
            .map(|(id, s)| {
                let total = s.completed_tasks + s.failed_tasks + s.current_tasks_count;
                let performance = AgentPerformance {
                    completion_rate: percent(s.completed_tasks, total),
                    total_tasks: total,
                    workload: s.current_tasks_count,
                };
                (id.clone(), performance)
            })
            .collect();

        PerformanceMetrics {
            overall_completion_rate: percent(status.total_completed_tasks, total_tasks),
            total_system_tasks: total_tasks,
            system_utilization: status.total_active_tasks,
            agent_performance,
            system_running: status.system_running,
            message_throughput: self.inner.message_log.lock().await.len(),
        }
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let value = part as f64 / total as f64 * 100.0;
    (value * 100.0).round() / 100.0
}

fn dispatch_message(task: &Task, project_id: &str) -> AgentMessage {
    let mut message = AgentMessage::new(
        PROJECT_MANAGER_ID,
        task.assigned_to.clone(),
        MessageType::TaskRequest,
        task.description.clone(),
    )
    .with_metadata("task_id", task.id.clone())
    .with_metadata("priority", task.priority)
    .with_metadata("tools_needed", task.tools_needed.clone())
    .with_metadata("project_id", project_id);
    if let Some(duration) = task.estimated_duration {
        message = message.with_metadata("estimated_duration", duration);
    }
    message
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("running", &self.is_running())
            .field("provider", &self.inner.provider.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{RoleProfile, TaskOutcome};
    use crate::providers::demo::{DemoProvider, DemoReply};

    fn fast_settings(output_dir: &std::path::Path) -> OrchestratorSettings {
        OrchestratorSettings {
            monitor_interval: Duration::from_millis(10),
            monitor_backoff: Duration::from_millis(10),
            drain_poll: Duration::from_millis(10),
            drain_timeout: Duration::from_secs(5),
            output_dir: output_dir.to_path_buf(),
            agent: AgentSettings {
                poll_interval: Duration::from_millis(10),
                error_backoff: Duration::from_millis(10),
                ..Default::default()
            },
        }
    }

    async fn wait_for_projects(orchestrator: &Orchestrator, count: usize) -> Vec<ProjectRecord> {
        for _ in 0..500 {
            let done = orchestrator.completed_projects().await;
            if done.len() >= count {
                return done;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("projects did not complete in time");
    }

    fn record(outcome: TaskOutcome) -> TaskRecord {
        TaskRecord {
            task_id: "t".to_string(),
            agent_id: "backend_coder".to_string(),
            project_id: Some("p".to_string()),
            parent_task_id: None,
            description: "d".to_string(),
            status: if outcome.is_error() {
                TaskStatus::Failed
            } else {
                TaskStatus::Completed
            },
            outcome,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_classification_rules() {
        let text = record(TaskOutcome::Text { text: "ok".to_string() });
        let error = record(TaskOutcome::Error {
            message: "boom".to_string(),
        });
        let files = record(TaskOutcome::Files {
            summary: "wrote".to_string(),
            created_files: vec![PathBuf::from("main.py")],
            warning: None,
        });

        assert_eq!(classify(&[]), ProjectStatus::Failed);
        assert_eq!(classify(&[text.clone()]), ProjectStatus::Completed);
        assert_eq!(classify(&[error.clone()]), ProjectStatus::Failed);
        assert_eq!(classify(&[text, error.clone()]), ProjectStatus::Failed);
        assert_eq!(classify(&[files, error]), ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_wait_for_completion_on_idle_system() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(DemoProvider::new()), fast_settings(dir.path())).unwrap();

        let status = orchestrator.wait_for_completion(Duration::ZERO).await;
        assert_eq!(status.total_active_tasks, 0);
        assert_eq!(status.total_agents, 4);
        assert!(!status.system_running);
        assert_eq!(status.pending_projects, 0);
    }

    #[tokio::test]
    async fn test_end_to_end_with_demo_provider() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(DemoProvider::new()), fast_settings(dir.path())).unwrap();

        assert!(orchestrator.start_system().await);
        assert!(!orchestrator.start_system().await);
        assert_eq!(orchestrator.get_active_agent_count().await, 4);

        let id = orchestrator.submit_project_task("Build a todo app").await;
        let projects = wait_for_projects(&orchestrator, 1).await;
        let project = &projects[0];

        assert_eq!(project.id, id);
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.subtasks.len(), 3);
        assert!(project.subtasks.iter().all(|s| s.dispatched));
        assert_eq!(project.results.len(), 3);
        assert_eq!(project.created_files.len(), 3);
        assert!(project.error.is_none());
        for file in &project.created_files {
            assert!(dir.path().join(file).is_file());
        }

        let log = orchestrator.get_message_log(50).await;
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|m| m.sender_id == "project_manager"));

        let status = orchestrator.wait_for_completion(Duration::from_secs(2)).await;
        assert_eq!(status.total_active_tasks, 0);
        assert_eq!(status.total_completed_tasks, 3);
        assert_eq!(status.completed_projects, 1);

        let metrics = orchestrator.get_performance_metrics().await;
        assert_eq!(metrics.overall_completion_rate, 100.0);
        assert_eq!(metrics.message_throughput, 3);

        orchestrator.stop_system().await;
        assert_eq!(orchestrator.get_active_agent_count().await, 0);
    }

    #[tokio::test]
    async fn test_results_are_scoped_per_project() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(DemoProvider::new()), fast_settings(dir.path())).unwrap();
        orchestrator.start_system().await;

        let first = orchestrator.submit_project_task("First project").await;
        let second = orchestrator.submit_project_task("Second project").await;
        let projects = wait_for_projects(&orchestrator, 2).await;

        assert_eq!(projects[0].id, first);
        assert_eq!(projects[1].id, second);
        for project in &projects {
            assert_eq!(project.results.len(), 3);
            assert!(project
                .results
                .iter()
                .all(|r| r.project_id.as_deref() == Some(project.id.as_str())));
        }

        orchestrator.stop_system().await;
    }

    #[tokio::test]
    async fn test_unknown_assignee_is_not_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"subtasks": [{"id": "task_1", "description": "Write docs", "assigned_to": "tech_writer"}]}"#;
        let provider = Arc::new(DemoProvider::scripted(vec![DemoReply::text(reply)]));
        let orchestrator = Orchestrator::new(provider, fast_settings(dir.path())).unwrap();

        orchestrator.submit_project_task("Document everything").await;
        let project = orchestrator.process_next_submission().await.unwrap();

        assert_eq!(project.subtasks.len(), 1);
        assert!(!project.subtasks[0].dispatched);
        assert!(project.results.is_empty());
        assert_eq!(project.status, ProjectStatus::Failed);
        assert!(orchestrator.get_message_log(10).await.is_empty());
        assert!(orchestrator.process_next_submission().await.is_none());
    }

    struct PanickingPlanner;

    #[async_trait::async_trait]
    impl CodeGenProvider for PanickingPlanner {
        fn name(&self) -> &str {
            "panicking"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn query(
            &self,
            _prompt: &str,
            _options: &crate::providers::QueryOptions,
        ) -> Result<crate::providers::ResponseStream, crate::providers::ProviderError> {
            panic!("planner crashed");
        }
    }

    #[tokio::test]
    async fn test_panicking_analysis_fails_the_project() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(PanickingPlanner), fast_settings(dir.path())).unwrap();

        orchestrator.submit_project_task("Build a todo app").await;
        let project = orchestrator.process_next_submission().await.unwrap();

        assert_eq!(project.status, ProjectStatus::Failed);
        assert_eq!(project.error.as_deref(), Some("Task analysis failed"));
        assert!(project.subtasks.is_empty());
        assert!(orchestrator.get_message_log(10).await.is_empty());
        assert_eq!(orchestrator.completed_projects().await.len(), 1);
    }

    #[test]
    fn test_shared_output_files_are_listed_once() {
        let shared = PathBuf::from("docker-compose.yml");
        let mut frontend = record(TaskOutcome::Files {
            summary: "ui".to_string(),
            created_files: vec![PathBuf::from("index.html"), shared.clone()],
            warning: None,
        });
        frontend.agent_id = "frontend_coder".to_string();
        let devops = record(TaskOutcome::Files {
            summary: "compose".to_string(),
            created_files: vec![shared.clone()],
            warning: None,
        });

        let mut project = ProjectRecord::begin("p".to_string(), "Ship it".to_string());
        project.finish(vec![frontend, devops]);

        assert_eq!(project.created_files, vec![PathBuf::from("index.html"), shared]);
        assert_eq!(project.results.len(), 2);
        assert_eq!(project.status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_drain_timeout_keeps_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"subtasks": [{"id": "task_1", "description": "Slow job", "assigned_to": "backend_coder"}]}"#;
        let provider = Arc::new(DemoProvider::scripted(vec![
            DemoReply::text(reply),
            DemoReply::text("late").with_delay(Duration::from_millis(500)),
        ]));
        let settings = OrchestratorSettings {
            drain_timeout: Duration::from_millis(50),
            ..fast_settings(dir.path())
        };
        let orchestrator = Orchestrator::new(provider, settings).unwrap();
        orchestrator.start_system().await;

        orchestrator.submit_project_task("Slow project").await;
        let project = wait_for_projects(&orchestrator, 1).await.remove(0);

        assert!(project.error.as_deref().unwrap().starts_with("Timed out"));
        assert!(project.results.is_empty());
        assert_eq!(project.status, ProjectStatus::Failed);

        orchestrator.stop_system().await;
    }

    #[tokio::test]
    async fn test_agent_management() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(DemoProvider::new());
        let orchestrator = Orchestrator::new(provider.clone(), fast_settings(dir.path())).unwrap();

        assert!(!orchestrator.remove_agent("project_manager").await);
        assert!(orchestrator.remove_agent("devops_coder").await);
        assert!(!orchestrator.remove_agent("devops_coder").await);
        assert!(orchestrator.get_agent_details("devops_coder").await.is_err());

        let custom = Agent::new(
            "qa_coder",
            RoleProfile::for_role(AgentRole::BackendCoder),
            provider,
            AgentSettings::default(),
        );
        assert!(orchestrator.add_custom_agent(custom.clone()).await);
        assert!(!orchestrator.add_custom_agent(custom).await);

        let details = orchestrator.get_agent_details("qa_coder").await.unwrap();
        assert_eq!(details.role, AgentRole::BackendCoder);
        assert_eq!(orchestrator.get_system_status().await.total_agents, 4);
        assert!(orchestrator.get_agent_details("project_manager").await.is_ok());
    }

    #[test]
    fn test_structured_task_text() {
        let text = Orchestrator::create_structured_task("Ship it", &["fast"], &[], &["binary"]);
        assert_eq!(text, "Main Objective: Ship it\nRequirements:\n- fast\nDeliverables:\n- binary");
    }

    #[tokio::test]
    async fn test_message_log_truncates_content() {
        let dir = tempfile::tempdir().unwrap();
        let long = "x".repeat(300);
        let reply = serde_json::json!({
            "subtasks": [{"id": "task_1", "description": long, "assigned_to": "backend_coder"}]
        })
        .to_string();
        let provider = Arc::new(DemoProvider::scripted(vec![DemoReply::text(reply)]));
        let orchestrator = Orchestrator::new(provider, fast_settings(dir.path())).unwrap();
        orchestrator.start_system().await;

        orchestrator.submit_project_task("Long task").await;
        wait_for_projects(&orchestrator, 1).await;

        let log = orchestrator.get_message_log(1).await;
        assert_eq!(log[0].content.chars().count(), 203);
        assert!(log[0].content.ends_with("..."));

        orchestrator.stop_system().await;
    }
}
