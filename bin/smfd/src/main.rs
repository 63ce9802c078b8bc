use anyhow::{Context, Result};
use smf_api::SmfConfig;
use std::process::ExitCode;
use tracing::info;

mod app;
mod logging;
mod procedures;

use app::SmfApp;

const CONFIG_ENV: &str = "SMF_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/smfcfg.yaml";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = SmfConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    logging::init(&config.logger)?;
    logging::install_panic_hook();

    info!("Starting smfd (config: {})", config_path);

    let app = SmfApp::new(&config)?;
    app.run().await
}
