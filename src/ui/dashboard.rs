use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::fmt::Write as _;

use crate::agents::orchestrator::{ProjectRecord, ProjectStatus, SystemStatus};

const RULE_WIDTH: usize = 60;

fn running_icon(running: bool) -> &'static str {
    if running {
        "🟢"
    } else {
        "🔴"
    }
}

/// Plain-text dashboard for printing to stdout
pub fn format_dashboard(status: &SystemStatus) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "CodeFleet Dashboard");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(
        out,
        "{} System Status: {}",
        running_icon(status.system_running),
        if status.system_running { "Running" } else { "Stopped" }
    );
    let _ = writeln!(out, "Agents: {}", status.total_agents);
    let _ = writeln!(out, "Completed Tasks: {}", status.total_completed_tasks);
    let _ = writeln!(out, "Active Tasks: {}", status.total_active_tasks);
    let _ = writeln!(out, "Pending Projects: {}", status.pending_projects);
    let _ = writeln!(out, "Completed Projects: {}", status.completed_projects);

    let _ = writeln!(out, "\nAgent Details:");
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    for (id, agent) in &status.agent_details {
        let _ = writeln!(out, "{} {} ({})", running_icon(agent.is_running), id, agent.role);
        let _ = writeln!(
            out,
            "    Completed: {}, Failed: {}, Active: {}, Pending: {}",
            agent.completed_tasks, agent.failed_tasks, agent.current_tasks_count, agent.pending_messages
        );
        if !agent.recent_results.is_empty() {
            let _ = writeln!(out, "    Recent Results: {}", agent.recent_results.join(", "));
        }
    }

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Last Updated: {}", status.timestamp.to_rfc3339());
    let _ = write!(out, "{}", rule);
    out
}

/// Short report of a finished project
pub fn format_project(project: &ProjectRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Project {} [{}]", project.id, project.status);
    let _ = writeln!(out, "Submission: {}", project.submission);

    for subtask in &project.subtasks {
        let marker = if subtask.dispatched { "->" } else { "x " };
        let _ = writeln!(out, "  {} {}: {}", marker, subtask.assigned_to, subtask.description);
    }
    if !project.created_files.is_empty() {
        let _ = writeln!(out, "Created files:");
        for file in &project.created_files {
            let _ = writeln!(out, "  - {}", file.display());
        }
    }
    if let Some(error) = &project.error {
        let _ = writeln!(out, "Error: {}", error);
    }
    out.trim_end().to_string()
}

/// Live terminal view of the system
#[derive(Debug, Clone)]
pub struct DashboardView {
    status: SystemStatus,
    projects: Vec<ProjectRecord>,
}

impl DashboardView {
    pub fn new(status: SystemStatus, projects: Vec<ProjectRecord>) -> Self {
        Self { status, projects }
    }

    pub fn update(&mut self, status: SystemStatus, projects: Vec<ProjectRecord>) {
        self.status = status;
        self.projects = projects;
    }

    pub fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // Summary
                Constraint::Min(6),    // Agents
                Constraint::Length(8), // Projects
                Constraint::Length(1), // Help
            ])
            .split(frame.area());

        frame.render_widget(self.summary(), chunks[0]);
        frame.render_widget(self.agent_panel(), chunks[1]);
        frame.render_widget(self.project_list(), chunks[2]);
        frame.render_widget(
            Paragraph::new("q: quit").style(Style::default().fg(Color::DarkGray)),
            chunks[3],
        );
    }

    fn summary(&self) -> Paragraph<'_> {
        let s = &self.status;
        let state = if s.system_running {
            Span::styled("Running", Style::default().fg(Color::Green))
        } else {
            Span::styled("Stopped", Style::default().fg(Color::Red))
        };

        let lines = vec![
            Line::from(vec![Span::raw("System: "), state]),
            Line::from(format!(
                "Agents {}  Completed {}  Active {}  Pending projects {}  Completed projects {}",
                s.total_agents, s.total_completed_tasks, s.total_active_tasks, s.pending_projects, s.completed_projects
            )),
        ];
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" CodeFleet "))
    }

    fn agent_panel(&self) -> Paragraph<'_> {
        let lines: Vec<Line> = self
            .status
            .agent_details
            .iter()
            .map(|(id, agent)| {
                let state = if agent.is_running {
                    Span::styled("running ", Style::default().fg(Color::Green))
                } else {
                    Span::styled("stopped ", Style::default().fg(Color::Red))
                };
                Line::from(vec![
                    Span::styled(format!("{:<16}", id), Style::default().add_modifier(Modifier::BOLD)),
                    state,
                    Span::raw(format!(
                        "done {}  failed {}  active {}  queued {}",
                        agent.completed_tasks, agent.failed_tasks, agent.current_tasks_count, agent.pending_messages
                    )),
                ])
            })
            .collect();

        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Agents "))
    }

    fn project_list(&self) -> Paragraph<'_> {
        let lines: Vec<Line> = self
            .projects
            .iter()
            .rev()
            .map(|p| {
                let color = match p.status {
                    ProjectStatus::Completed => Color::Green,
                    ProjectStatus::Failed => Color::Red,
                    ProjectStatus::InProgress => Color::Yellow,
                };
                Line::from(vec![
                    Span::styled(format!("[{}] ", p.status), Style::default().fg(color)),
                    Span::raw(format!("{} ({} files)", p.submission, p.created_files.len())),
                ])
            })
            .collect();

        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(" Projects "))
    }
}
