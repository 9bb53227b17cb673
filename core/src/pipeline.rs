//! Per-sensor state machine and the multi-sensor orchestrator.
//!
//! Each sensor runs `Raw -> Validated -> Preprocessed -> Filtered -> Peaked`
//! on its own blocking task. A failure is terminal for that sensor only; the
//! orchestrator records it and pairs whatever results survived.

use crate::config::AnalysisConfig;
use crate::interface::detection::{CoincidenceResult, DetectionResult};
use crate::interface::quality::VetoLookup;
use crate::interface::source::StrainSource;
use crate::prelude::{ProcessingStage, SensorState, StageError, StageResult};
use crate::processing::coincidence::CoincidenceEvaluator;
use crate::processing::matched_filter::MatchedFilterEngine;
use crate::processing::peak::PeakDetector;
use crate::processing::preprocess::Preprocessor;
use crate::processing::template::TemplateGenerator;
use crate::processing::validator::Validator;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::time::GpsTime;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag with an optional deadline, checked before every
/// state transition.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }

    pub fn check(&self, state: SensorState) -> StageResult<()> {
        if self.is_cancelled() {
            Err(StageError::Cancelled { state })
        } else {
            Ok(())
        }
    }
}

/// Why a sensor branch stopped, and how far it got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFailure {
    pub reached_state: SensorState,
    pub kind: String,
    pub message: String,
}

impl SensorFailure {
    fn from_error(reached_state: SensorState, err: &StageError) -> Self {
        Self {
            reached_state,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SensorOutcome {
    Detected(DetectionResult),
    Failed(SensorFailure),
}

impl SensorOutcome {
    pub fn detection(&self) -> Option<&DetectionResult> {
        match self {
            SensorOutcome::Detected(result) => Some(result),
            SensorOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SensorFailure> {
        match self {
            SensorOutcome::Detected(_) => None,
            SensorOutcome::Failed(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub sensor: String,
    pub outcome: SensorOutcome,
}

/// Timing comparison of one sensor pair; `result` is `None` when either
/// branch failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoincidenceEntry {
    pub a: String,
    pub b: String,
    pub result: Option<CoincidenceResult>,
}

/// Everything the reporting side needs for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub event_time: GpsTime,
    pub sensors: Vec<SensorReport>,
    pub coincidences: Vec<CoincidenceEntry>,
    pub metrics: MetricsSnapshot,
}

impl AnalysisReport {
    pub fn outcome(&self, sensor: &str) -> Option<&SensorOutcome> {
        self.sensors
            .iter()
            .find(|report| report.sensor == sensor)
            .map(|report| &report.outcome)
    }

    pub fn detection(&self, sensor: &str) -> Option<&DetectionResult> {
        self.outcome(sensor).and_then(SensorOutcome::detection)
    }

    pub fn coincidence(&self, a: &str, b: &str) -> Option<&CoincidenceEntry> {
        self.coincidences
            .iter()
            .find(|entry| (entry.a == a && entry.b == b) || (entry.a == b && entry.b == a))
    }

    pub fn to_json_pretty(&self) -> StageResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| StageError::Internal(format!("serialising report: {}", err)))
    }
}

/// Runs one sensor through every stage. A panic inside a stage is reported
/// as an `Internal` failure at the last state reached.
pub fn run_sensor(
    source: &dyn StrainSource,
    config: &AnalysisConfig,
    sensor: &str,
    event: GpsTime,
    token: &CancelToken,
) -> Result<DetectionResult, SensorFailure> {
    let logger = LogManager::for_sensor(sensor);
    let mut state = SensorState::Raw;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        advance(source, config, sensor, event, token, &logger, &mut state)
    }));
    match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => {
            logger.advisory(&format!("stopped after {}: {}", state, err));
            Err(SensorFailure::from_error(state, &err))
        }
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            let err = StageError::Internal(format!("sensor worker panicked: {}", detail));
            logger.advisory(&format!("stopped after {}: {}", state, err));
            Err(SensorFailure::from_error(state, &err))
        }
    }
}

fn advance(
    source: &dyn StrainSource,
    config: &AnalysisConfig,
    sensor: &str,
    event: GpsTime,
    token: &CancelToken,
    logger: &LogManager,
    state: &mut SensorState,
) -> StageResult<DetectionResult> {
    token.check(*state)?;
    let raw = source.fetch(sensor, event, config.fetch_half_window)?;
    let veto = VetoLookup::resolve(
        source,
        source.capabilities(),
        sensor,
        config.veto_flag.as_deref(),
    );
    let validator =
        Validator::new(&config.allowed_sample_rates, veto).with_logger(logger.clone());
    let validated = validator.execute(raw)?;
    *state = validator.completes();

    token.check(*state)?;
    let rate = validated.sample_rate();
    let preprocessor =
        Preprocessor::new(config.preprocess_config(event)).with_logger(logger.clone());
    let generator = TemplateGenerator::new().with_max_duration(config.max_template_duration());
    // Template synthesis only needs the sample rate, so it overlaps with
    // conditioning; the result is sized to the whitened window afterwards.
    let (conditioned, template) = std::thread::scope(|scope| {
        let worker = scope.spawn(|| generator.synthesize(&config.template, rate));
        let conditioned = preprocessor.execute(validated);
        let template = worker
            .join()
            .map_err(|_| StageError::Internal("template worker panicked".into()))?;
        Ok::<_, StageError>((conditioned?, template?))
    })?;
    *state = preprocessor.completes();

    token.check(*state)?;
    let template = template.resized(conditioned.whitened.len())?;
    let engine = MatchedFilterEngine::new(config.template.f_low, config.psd_window_length)
        .with_template(template)
        .with_logger(logger.clone());
    let mut snr = engine.execute(conditioned)?;
    if let Some(half_width) = config.search_half_window {
        snr = engine.restrict(snr, event, half_width)?;
    }
    *state = engine.completes();

    token.check(*state)?;
    let detector = PeakDetector::new(sensor, config.snr_threshold, config.peak_window(event))
        .with_logger(logger.clone());
    let detection = detector.execute(snr)?;
    *state = detector.completes();
    Ok(detection)
}

/// Analyses one event across every configured sensor. Per-sensor failures
/// end up in the report; only an invalid configuration is returned as an
/// error.
pub async fn analyze_event(
    source: Arc<dyn StrainSource>,
    config: Arc<AnalysisConfig>,
    event: GpsTime,
    token: CancelToken,
) -> StageResult<AnalysisReport> {
    config.validate()?;
    let logger = LogManager::new();
    let metrics = MetricsRecorder::new();
    logger.record(&format!(
        "analysing event {} across {} sensors",
        event,
        config.sensors.len()
    ));

    let handles: Vec<_> = config
        .sensors
        .iter()
        .map(|sensor| {
            let source = Arc::clone(&source);
            let config = Arc::clone(&config);
            let token = token.clone();
            let id = sensor.clone();
            let handle = tokio::task::spawn_blocking(move || {
                run_sensor(source.as_ref(), &config, &id, event, &token)
            });
            (sensor.clone(), handle)
        })
        .collect();

    let mut sensors = Vec::with_capacity(handles.len());
    for (sensor, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(detection)) => {
                metrics.record_processed(detection.detected);
                SensorOutcome::Detected(detection)
            }
            Ok(Err(failure)) => {
                metrics.record_error(&failure.kind);
                SensorOutcome::Failed(failure)
            }
            Err(join_err) => {
                let err = StageError::Internal(format!("sensor task failed: {}", join_err));
                metrics.record_error(err.kind());
                SensorOutcome::Failed(SensorFailure::from_error(SensorState::Raw, &err))
            }
        };
        sensors.push(SensorReport { sensor, outcome });
    }

    let evaluator = CoincidenceEvaluator::new(config.coincidence_tolerance);
    let mut coincidences = Vec::new();
    for (i, first) in sensors.iter().enumerate() {
        for second in &sensors[i + 1..] {
            let result = evaluator.evaluate(first.outcome.detection(), second.outcome.detection());
            match &result {
                Some(r) => logger.record(&format!(
                    "{}/{}: delta_t {:.6} s, coincident {}",
                    first.sensor, second.sensor, r.delta_t, r.coincident
                )),
                None => logger.advisory(&format!(
                    "{}/{}: coincidence unavailable",
                    first.sensor, second.sensor
                )),
            }
            coincidences.push(CoincidenceEntry {
                a: first.sensor.clone(),
                b: second.sensor.clone(),
                result,
            });
        }
    }

    Ok(AnalysisReport {
        event_time: event,
        sensors,
        coincidences,
        metrics: metrics.snapshot(),
    })
}
