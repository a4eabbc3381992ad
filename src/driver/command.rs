//! Purchase driver that shells out to an external automation script.
//!
//! The configured argv is extended with the attempt's parameters:
//!
//! ```text
//! <argv...> --platform android --device <id> --url <event_url> --quantity <n> [--price <p>]
//! <argv...> --platform android --prepare --device <id> --url <event_url>
//! <argv...> --platform android --diagnose --device <id>
//! ```
//!
//! Exit status 0 means success. Otherwise the last non-empty line of stderr
//! (or stdout) becomes the failure reason.

use crate::device::{Device, Platform};
use crate::driver::{AttemptOutcome, PurchaseDriver};
use crate::error::{Result, RushError};
use crate::task::Task;
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommandDriver {
    platform: Platform,
    program: String,
    base_args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandDriver {
    /// Returns `None` for an empty argv.
    #[must_use]
    pub fn from_argv(platform: Platform, argv: &[String], timeout: Option<Duration>) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            platform,
            program: program.clone(),
            base_args: rest.to_vec(),
            timeout,
        })
    }

    fn purchase_args(device: &Device, task: &Task) -> Vec<String> {
        let mut args = vec![
            "--device".to_owned(),
            device.device_id.clone(),
            "--url".to_owned(),
            task.event_url.clone(),
            "--quantity".to_owned(),
            task.quantity.to_string(),
        ];
        if let Some(price) = task.target_price {
            args.push("--price".to_owned());
            args.push(price.to_string());
        }
        args
    }

    async fn run(&self, extra: Vec<String>) -> Result<Output> {
        let resolved = which::which(&self.program)
            .map_err(|_| RushError::Attempt(format!("{} is not installed", self.program)))?;

        let mut command = Command::new(resolved);
        command
            .args(&self.base_args)
            .arg("--platform")
            .arg(self.platform.as_str())
            .args(&extra)
            .kill_on_drop(true);
        debug!(program = %self.program, args = ?extra, "running automation command");

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| {
                    RushError::Attempt(format!(
                        "{} timed out after {}s",
                        self.program,
                        limit.as_secs()
                    ))
                })?,
            None => command.output().await,
        };
        output.map_err(|e| RushError::Attempt(format!("failed to run {}: {e}", self.program)))
    }

    async fn run_checked(&self, extra: Vec<String>) -> Result<()> {
        let output = self.run(extra).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RushError::Attempt(failure_reason(&output)))
        }
    }
}

#[async_trait]
impl PurchaseDriver for CommandDriver {
    async fn attempt_purchase(&self, device: &Device, task: &Task) -> AttemptOutcome {
        match self.run(Self::purchase_args(device, task)).await {
            Ok(output) if output.status.success() => AttemptOutcome::Succeeded {
                note: last_line(&output.stdout),
            },
            Ok(output) => AttemptOutcome::failed(failure_reason(&output)),
            Err(e) => AttemptOutcome::failed(e.to_string()),
        }
    }

    async fn prepare(&self, device: &Device, task: &Task) -> Result<()> {
        self.run_checked(vec![
            "--prepare".to_owned(),
            "--device".to_owned(),
            device.device_id.clone(),
            "--url".to_owned(),
            task.event_url.clone(),
        ])
        .await
    }

    async fn diagnose(&self, device: &Device) -> Result<()> {
        self.run_checked(vec![
            "--diagnose".to_owned(),
            "--device".to_owned(),
            device.device_id.clone(),
        ])
        .await
    }
}

fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(str::to_owned)
}

fn failure_reason(output: &Output) -> String {
    last_line(&output.stderr)
        .or_else(|| last_line(&output.stdout))
        .unwrap_or_else(|| format!("automation exited with {}", output.status))
}
