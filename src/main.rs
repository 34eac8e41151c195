//! Agent orchestration server entry point.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use agent_orchestra::config::{AppConfig, load_llm_settings};
use agent_orchestra::{server, telemetry};
use anyhow::Context;
use dotenvy::dotenv;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment.
    let _ = dotenv();

    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init(config.logging.json);

    let llm = match load_llm_settings() {
        Ok(settings) => Some(settings),
        Err(reason) => {
            warn!(name: "llm.config.missing", %reason, "LLM settings not found");
            None
        }
    };

    server::start_server(Arc::new(config), llm).await
}
