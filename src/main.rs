use anyhow::Result;
use reviewer_assignment_lib::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    reviewer_assignment_lib::run(config).await
}
