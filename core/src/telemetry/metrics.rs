use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Counters shared by every sensor task of one analysis run.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub processed: usize,
    pub detections: usize,
    pub failures: BTreeMap<String, usize>,
}

impl MetricsSnapshot {
    pub fn error_count(&self) -> usize {
        self.failures.values().sum()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_processed(&self, detected: bool) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.processed += 1;
            if detected {
                metrics.detections += 1;
            }
        }
    }

    pub fn record_error(&self, kind: &str) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics.failures.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            metrics.clone()
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
