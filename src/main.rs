// SPDX-License-Identifier: MIT
use anyhow::Result;
use app_telemetry::host::load_config_tree;
use app_telemetry::telemetry::{init_telemetry, TelemetryOptions};
use app_telemetry::worker::LoggingService;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Demo host: wires telemetry from layered configuration and logs periodically.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Base JSON configuration file.
    #[arg(short, long, env = "APP_CONFIG", default_value = "appsettings.json")]
    config: PathBuf,

    /// Environment name; loads `<config stem>.<environment>.json` when present.
    #[arg(short, long, env = "APP_ENVIRONMENT")]
    environment: Option<String>,

    /// Configuration overrides of the form `Section:Key=value`, optionally
    /// prefixed with `--` or `/`. Everything after the first override is taken verbatim.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    overrides: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let tree = load_config_tree(
        &args.config,
        args.environment.as_deref(),
        std::env::vars(),
        &args.overrides,
    )?;

    let telemetry = init_telemetry(
        &tree,
        TelemetryOptions::new().service_version(app_telemetry::build_version!()),
    )?;
    info!("Application starting");

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(LoggingService::default().run(cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    worker.await?;

    telemetry.shutdown()?;
    Ok(())
}
