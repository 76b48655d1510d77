//! Demo binary: runs a scripted server/client session and prints a summary.
mod config;
mod demo;
mod logging;

use anyhow::{Context, Result};
use config::CliConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = CliConfig::from_env();
    let session_id = logging::session_id(&config);
    let _guard = logging::setup_logging(&config, &session_id)?;

    let summary = demo::run(&config, session_id).await?;
    let json = serde_json::to_string_pretty(&summary).context("encoding session summary")?;
    match &config.summary_path {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing summary to {}", path.display()))?;
            tracing::info!(path = %path.display(), "summary written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
