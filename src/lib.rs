pub mod agents;
pub mod app;
pub mod config;
pub mod providers;
pub mod ui;

use anyhow::Result;

use app::task_builder::create_web_app_task;
use app::{Application, CliArgs};
use config::FleetConfig;

pub async fn run(args: CliArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let submission = args.submission.clone().unwrap_or_else(create_web_app_task);

    let mut app = Application::new(config, &args)?;
    app.run(submission).await
}
