// SPDX-License-Identifier: MIT
//! Demo background task that logs at every severity on a fixed cadence.

use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Periodic log emitter. One cycle logs info, warn, error, and a critical
/// error, `step` apart, then rests for `rest`.
#[derive(Clone, Debug)]
pub struct LoggingService {
    step: Duration,
    rest: Duration,
}

impl Default for LoggingService {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(1),
            rest: Duration::from_secs(10),
        }
    }
}

impl LoggingService {
    pub fn new(step: Duration, rest: Duration) -> Self {
        Self { step, rest }
    }

    /// Runs until `cancel` fires; returns the number of completed cycles.
    #[instrument(name = "logging_service", skip_all)]
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut cycles = 0;
        while !cancel.is_cancelled() {
            info!(time = %Utc::now().to_rfc3339(), "Service running");
            if !self.pause(self.step, &cancel).await {
                break;
            }
            warn!(info = "Warning info", "This is a test warning");
            if !self.pause(self.step, &cancel).await {
                break;
            }
            error!(info = "Error info", "This is a test error");
            if !self.pause(self.step, &cancel).await {
                break;
            }
            error!(critical = true, info = "Critical Error info", "This is a critical error test");
            if !self.pause(self.rest, &cancel).await {
                break;
            }
            cycles += 1;
        }
        info!(cycles, "logging service stopped");
        cycles
    }

    /// Sleeps for `duration`; false if cancelled first.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
