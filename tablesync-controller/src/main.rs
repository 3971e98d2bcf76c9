use tablesync_telemetry::init_tracing;

use crate::config::load_controller_config;
use crate::core::start_controller;

mod config;
mod core;
mod stats;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_name = env!("CARGO_BIN_NAME");

    let _log_flusher = init_tracing(app_name)?;

    let config = load_controller_config()?;
    start_controller(config).await?;

    Ok(())
}
