//! Transient-signal detection core.
//!
//! Raw sensor series are validated, conditioned (band-limit, notch, PSD,
//! crop, whiten), matched-filtered against a synthetic template and reduced
//! to a peak per sensor. Peak times from independent sensors are then
//! checked for coincidence. Each sensor runs as an independent branch; a
//! failing branch never aborts the others.

pub mod config;
pub mod interface;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod series;
pub mod telemetry;
pub mod time;

pub use config::AnalysisConfig;
pub use pipeline::{analyze_event, AnalysisReport, CancelToken, SensorOutcome};
pub use prelude::{ProcessingStage, SensorState, StageError, StageResult};
