use std::sync::Arc;

use crate::clock::Clock;
use crate::models::{LogLevel, RunId, RunLogEntry};
use crate::storage::Storage;

/// Writes each pipeline event both to tracing and to the run's stored log.
///
/// A failed log write never fails the run; it is reported through tracing.
pub struct RunLogger {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    run_id: RunId,
}

impl RunLogger {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, run_id: RunId) -> Self {
        Self {
            storage,
            clock,
            run_id,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into()).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message.into()).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into()).await;
    }

    async fn log(&self, level: LogLevel, message: String) {
        let run_id = self.run_id.get();
        match level {
            LogLevel::Info => tracing::info!(run_id, "{message}"),
            LogLevel::Warning => tracing::warn!(run_id, "{message}"),
            LogLevel::Error => tracing::error!(run_id, "{message}"),
        }

        let entry = RunLogEntry {
            run_id: self.run_id,
            timestamp: self.clock.now(),
            level,
            message,
        };
        if let Err(e) = self.storage.append_log(&entry).await {
            tracing::warn!(run_id, "Failed to store run log entry: {e:#}");
        }
    }
}
