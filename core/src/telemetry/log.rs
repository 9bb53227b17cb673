use log::{info, warn};

/// Log helper that prefixes every line with the sensor it belongs to.
#[derive(Debug, Clone)]
pub struct LogManager {
    scope: String,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            scope: "pipeline".into(),
        }
    }

    pub fn for_sensor(sensor: &str) -> Self {
        Self {
            scope: sensor.to_string(),
        }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.scope, message);
    }

    /// Non-fatal condition worth surfacing, e.g. missing quality annotations.
    pub fn advisory(&self, message: &str) {
        warn!("[{}] {}", self.scope, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
