use crate::interface::detection::DetectionResult;
use crate::math::stats::StatsHelper;
use crate::prelude::{ProcessingStage, SensorState, StageError, StageResult};
use crate::series::SnrSeries;
use crate::telemetry::log::LogManager;
use crate::time::{GpsTime, TimeSpan};

/// Search window around an expected arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakWindow {
    pub expected_time: GpsTime,
    pub half_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub time: GpsTime,
    pub snr: f64,
}

/// Largest |SNR| inside the valid region, optionally restricted to a window.
/// Ties go to the lowest index.
pub fn find_peak(snr: &SnrSeries, window: Option<PeakWindow>) -> StageResult<Peak> {
    let valid = snr.valid_range();
    let range = match window {
        None => valid.clone(),
        Some(w) => {
            let requested = snr.index_range(
                w.expected_time - w.half_width,
                w.expected_time + w.half_width,
            );
            let range = requested.start.max(valid.start)..requested.end.min(valid.end);
            if range.is_empty() {
                return Err(StageError::WindowOutOfRange {
                    requested: TimeSpan::centered(w.expected_time, w.half_width),
                    valid: snr.valid_span(),
                });
            }
            range
        }
    };
    if range.is_empty() {
        return Err(StageError::WindowOutOfRange {
            requested: snr.valid_span(),
            valid: snr.valid_span(),
        });
    }

    let (offset, value) = StatsHelper::argmax(range.clone().map(|i| snr.magnitude(i)))
        .ok_or_else(|| StageError::Internal("empty peak search range".into()))?;
    let index = range.start + offset;
    Ok(Peak {
        index,
        time: snr.time_at(index),
        snr: value,
    })
}

/// Turns an SNR series into a detection decision for one sensor.
pub struct PeakDetector {
    sensor: String,
    threshold: f64,
    window: Option<PeakWindow>,
    logger: LogManager,
}

impl PeakDetector {
    pub fn new(sensor: impl Into<String>, threshold: f64, window: Option<PeakWindow>) -> Self {
        Self {
            sensor: sensor.into(),
            threshold,
            window,
            logger: LogManager::new(),
        }
    }

    pub fn with_logger(mut self, logger: LogManager) -> Self {
        self.logger = logger;
        self
    }

    pub fn detect(&self, snr: SnrSeries) -> StageResult<DetectionResult> {
        let peak = find_peak(&snr, self.window)?;
        let detected = peak.snr > self.threshold;
        self.logger.record(&format!(
            "peak SNR {:.2} at {} -> {}",
            peak.snr,
            peak.time,
            if detected { "detected" } else { "no detection" }
        ));
        Ok(DetectionResult::new(
            self.sensor.clone(),
            detected,
            peak.snr,
            peak.time,
            snr,
        ))
    }
}

impl ProcessingStage for PeakDetector {
    type Input = SnrSeries;
    type Output = DetectionResult;

    fn completes(&self) -> SensorState {
        SensorState::Peaked
    }

    fn execute(&self, input: SnrSeries) -> StageResult<DetectionResult> {
        self.detect(input)
    }
}
