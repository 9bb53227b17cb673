use crate::time::{GpsTime, TimeSpan};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-sensor pipeline state. Transitions only move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorState {
    Raw,
    Validated,
    Preprocessed,
    Filtered,
    Peaked,
}

impl SensorState {
    pub fn next(self) -> Option<SensorState> {
        match self {
            SensorState::Raw => Some(SensorState::Validated),
            SensorState::Validated => Some(SensorState::Preprocessed),
            SensorState::Preprocessed => Some(SensorState::Filtered),
            SensorState::Filtered => Some(SensorState::Peaked),
            SensorState::Peaked => None,
        }
    }
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorState::Raw => "raw",
            SensorState::Validated => "validated",
            SensorState::Preprocessed => "preprocessed",
            SensorState::Filtered => "filtered",
            SensorState::Peaked => "peaked",
        };
        f.write_str(name)
    }
}

/// Common error type for every stage of the detection pipeline.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("sample rate {actual} Hz is not one of the allowed rates {allowed:?}")]
    SampleRateMismatch { actual: f64, allowed: Vec<f64> },
    #[error("veto flag '{flag}' active over {active}, overlapping series span {series}")]
    VetoActive {
        flag: String,
        active: TimeSpan,
        series: TimeSpan,
    },
    #[error("sample gap of {gap:.9}s after {time} (index {index}), expected {expected:.9}s")]
    Discontinuity {
        index: usize,
        time: GpsTime,
        gap: f64,
        expected: f64,
    },
    #[error("insufficient data for {what}: requested {requested}, available {available}")]
    InsufficientData {
        what: &'static str,
        requested: TimeSpan,
        available: TimeSpan,
    },
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("window {requested} lies outside the valid region {valid}")]
    WindowOutOfRange { requested: TimeSpan, valid: TimeSpan },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("data acquisition failed: {0}")]
    Acquisition(String),
    #[error("cancelled while {state}")]
    Cancelled { state: SensorState },
    #[error("internal failure: {0}")]
    Internal(String),
}

impl StageError {
    /// Stable tag used in reports and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::SampleRateMismatch { .. } => "SampleRateMismatch",
            StageError::VetoActive { .. } => "VetoActive",
            StageError::Discontinuity { .. } => "Discontinuity",
            StageError::InsufficientData { .. } => "InsufficientDataError",
            StageError::Numerical(_) => "NumericalError",
            StageError::WindowOutOfRange { .. } => "WindowOutOfRangeError",
            StageError::InvalidInput(_) => "InvalidInput",
            StageError::Acquisition(_) => "Acquisition",
            StageError::Cancelled { .. } => "Cancelled",
            StageError::Internal(_) => "Internal",
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

/// A single step of the per-sensor pipeline. Each stage consumes its input
/// by value and yields a freshly allocated output.
pub trait ProcessingStage {
    type Input;
    type Output;

    /// State the sensor is in once this stage has succeeded.
    fn completes(&self) -> SensorState;

    fn execute(&self, input: Self::Input) -> StageResult<Self::Output>;
}
