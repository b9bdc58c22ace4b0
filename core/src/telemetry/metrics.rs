use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Counts controller operations by outcome.
pub struct MetricsRecorder {
    inner: Mutex<OperationCounts>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub informational: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(OperationCounts::default()),
        }
    }

    pub fn record_success(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.succeeded += 1;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.failed += 1;
        }
    }

    pub fn record_informational(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.informational += 1;
        }
    }

    pub fn snapshot(&self) -> OperationCounts {
        self.inner
            .lock()
            .map(|counts| *counts)
            .unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
