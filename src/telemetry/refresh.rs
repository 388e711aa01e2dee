use std::time::{Duration, SystemTime};

use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    MissingRefreshToken,
    Failed,
    Abandoned,
}

/// Structured events for a single refresh attempt and the waiters it serves.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    context: String,
}

impl RefreshTelemetry {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            context: context.into(),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn emit_start(&self, at: SystemTime) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            timestamp = ?at,
            "refresh.start"
        );
    }

    pub fn emit_success(&self, elapsed: Duration, resumed: usize) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            outcome = ?RefreshOutcome::Success,
            elapsed_ms = elapsed.as_millis() as u64,
            resumed,
            "refresh.success"
        );
    }

    pub fn emit_failure(&self, outcome: RefreshOutcome, error: &Error, rejected: usize) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            context = %self.context,
            outcome = ?outcome,
            rejected,
            error = %error,
            "refresh.failure"
        );
    }
}
