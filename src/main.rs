use anyhow::Result;
use tracing_subscriber::EnvFilter;

use codefleet::app::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let args = CliArgs::parse(std::env::args().skip(1));
    codefleet::run(args).await
}
