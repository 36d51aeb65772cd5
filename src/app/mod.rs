pub mod monitor;
pub mod progress;
pub mod task_builder;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::Stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use crate::agents::orchestrator::ProjectRecord;
use crate::agents::Orchestrator;
use crate::config::FleetConfig;
use crate::providers::claude_cli::ClaudeCliProvider;
use crate::providers::demo::DemoProvider;
use crate::providers::CodeGenProvider;
use crate::ui::dashboard::{format_dashboard, format_project, DashboardView};
use progress::ProgressTracker;

/// Command-line switches: `codefleet [--demo] [--dashboard] [project text...]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    /// Use the offline demo provider instead of the CLI
    pub demo: bool,
    pub dashboard: bool,
    pub submission: Option<String>,
}

impl CliArgs {
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        let mut words = Vec::new();
        for arg in args.into_iter().map(Into::into) {
            match arg.as_str() {
                "--demo" => parsed.demo = true,
                "--dashboard" => parsed.dashboard = true,
                _ => words.push(arg),
            }
        }
        if !words.is_empty() {
            parsed.submission = Some(words.join(" "));
        }
        parsed
    }
}

pub struct Application {
    config: FleetConfig,
    orchestrator: Orchestrator,
    dashboard: bool,
    progress: ProgressTracker,
}

impl Application {
    pub fn new(config: FleetConfig, args: &CliArgs) -> Result<Self> {
        let provider: Arc<dyn CodeGenProvider> = if args.demo {
            info!("running with the demo provider");
            Arc::new(DemoProvider::new())
        } else {
            Arc::new(ClaudeCliProvider::new(config.provider.command.clone()).with_model(config.provider.model.clone()))
        };

        let orchestrator = Orchestrator::new(provider, config.orchestrator_settings())?;
        let dashboard = args.dashboard || config.ui.dashboard;

        Ok(Self {
            config,
            orchestrator,
            dashboard,
            progress: ProgressTracker::new(),
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Run one project to completion and report on it
    pub async fn run(&mut self, submission: String) -> Result<()> {
        self.progress = ProgressTracker::new();
        self.progress.add_phase("project", "Decompose and build the submission", 30);
        self.progress.add_phase("shutdown", "Let agents drain and stop the system", 1);
        self.progress.start_tracking();

        self.orchestrator.start_system().await;
        let project_id = self.orchestrator.submit_project_task(submission).await;

        let result = if self.dashboard {
            self.run_dashboard(&project_id).await
        } else {
            let project = self.wait_for_project(&project_id).await;
            println!("{}\n", format_project(&project));
            Ok(())
        };
        self.progress.complete_phase(None);

        self.progress.start_phase(1);
        let status = self.orchestrator.wait_for_completion(Duration::ZERO).await;
        self.orchestrator.stop_system().await;
        self.progress.complete_phase(None);

        let summary = self.progress.get_progress_summary();
        info!(
            phases = summary.completed_phases,
            minutes = summary.total_time_minutes,
            "run finished"
        );
        if !self.dashboard {
            println!("{}", format_dashboard(&status));
        }
        result
    }

    async fn find_project(&self, project_id: &str) -> Option<ProjectRecord> {
        self.orchestrator
            .completed_projects()
            .await
            .into_iter()
            .find(|p| p.id == project_id)
    }

    async fn wait_for_project(&self, project_id: &str) -> ProjectRecord {
        loop {
            if let Some(project) = self.find_project(project_id).await {
                return project;
            }
            sleep(self.config.orchestrator_settings().drain_poll).await;
        }
    }

    async fn run_dashboard(&mut self, project_id: &str) -> Result<()> {
        let mut terminal = self.setup_terminal()?;
        let result = self.dashboard_loop(&mut terminal, project_id).await;
        self.restore_terminal(&mut terminal)?;

        if let Some(project) = self.find_project(project_id).await {
            println!("{}", format_project(&project));
        }
        result
    }

    async fn dashboard_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
        project_id: &str,
    ) -> Result<()> {
        let refresh = self.config.refresh_interval();
        let mut view = DashboardView::new(
            self.orchestrator.get_system_status().await,
            self.orchestrator.completed_projects().await,
        );

        loop {
            view.update(
                self.orchestrator.get_system_status().await,
                self.orchestrator.completed_projects().await,
            );
            terminal.draw(|frame| view.render(frame))?;

            if event::poll(refresh)? {
                if let Event::Key(key) = event::read()? {
                    if is_quit(&key) {
                        info!(project = %project_id, "dashboard closed");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn setup_terminal(&self) -> Result<Terminal<CrosstermBackend<Stdout>>> {
        crossterm::terminal::enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
        Ok(Terminal::new(CrosstermBackend::new(stdout))?)
    }

    fn restore_terminal(&self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        crossterm::terminal::disable_raw_mode()?;
        crossterm::execute!(terminal.backend_mut(), crossterm::terminal::LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        Ok(())
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
}
