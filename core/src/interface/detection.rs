use crate::series::SnrSeries;
use crate::time::GpsTime;
use serde::{Deserialize, Serialize};

/// Per-sensor outcome of a successful pipeline run. The SNR series is kept
/// for downstream plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub sensor: String,
    pub detected: bool,
    pub peak_snr: f64,
    pub peak_time: GpsTime,
    pub snr_series: SnrSeries,
}

impl DetectionResult {
    pub fn new(
        sensor: impl Into<String>,
        detected: bool,
        peak_snr: f64,
        peak_time: GpsTime,
        snr_series: SnrSeries,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            detected,
            peak_snr,
            peak_time,
            snr_series,
        }
    }
}

/// Timing agreement between two sensors' peaks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoincidenceResult {
    pub delta_t: f64,
    pub coincident: bool,
}
