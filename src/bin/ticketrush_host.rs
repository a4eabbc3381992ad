//! Headless host binary for stdin/stdout JSON communication.
//!
//! Loads configuration, starts the scheduler, and serves host commands as
//! newline-delimited JSON on stdin/stdout until stdin closes or
//! `runtime.stop` arrives.
//!
//! Configuration comes from `$TICKETRUSH_CONFIG`, else the default config
//! path if that file exists, else built-in defaults. All tracing output goes
//! to stderr so that stdout remains a clean JSON protocol channel.

use std::path::PathBuf;
use std::sync::Arc;
use ticketrush::RushConfig;
use ticketrush::RushEngine;
use ticketrush::host::stdio::run_stdio_bridge;
use tokio_util::sync::CancellationToken;

fn load_config() -> anyhow::Result<RushConfig> {
    let explicit = std::env::var_os("TICKETRUSH_CONFIG").map(PathBuf::from);
    let path = match explicit {
        Some(path) => path,
        None => {
            let default = RushConfig::default_config_path();
            if !default.exists() {
                tracing::info!("no config file found; using defaults");
                return Ok(RushConfig::default());
            }
            default
        }
    };

    tracing::info!(path = %path.display(), "loading config");
    RushConfig::from_file(&path)
        .map_err(|e| anyhow::anyhow!("cannot load config {}: {e}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ticketrush=info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ticketrush-host starting");

    let config = load_config()?;
    let engine = Arc::new(
        RushEngine::from_config(config).map_err(|e| anyhow::anyhow!("invalid config: {e}"))?,
    );
    if let Err(e) = engine.load_state() {
        tracing::error!(error = %e, "cannot restore task snapshot; starting empty");
    }

    let cancel = CancellationToken::new();
    let scheduler = engine.start(cancel.clone());

    let bridge_result = run_stdio_bridge(Arc::clone(&engine)).await;

    cancel.cancel();
    let _ = scheduler.await;
    engine.shutdown().await;

    bridge_result.map_err(|e| {
        tracing::error!(error = %e, "ticketrush-host exited with error");
        anyhow::anyhow!("ticketrush-host failed: {e}")
    })?;

    tracing::info!("ticketrush-host shut down cleanly");
    Ok(())
}
