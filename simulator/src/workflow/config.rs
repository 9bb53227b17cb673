use crate::generator::scenario::{FlagSegment, ScenarioConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use transientcore::time::GpsTime;
use transientcore::AnalysisConfig;

/// Everything one driver invocation needs: the events to analyse, the
/// analysis parameters and the synthetic data scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub events: Vec<GpsTime>,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

/// Command-line overrides used when no workflow file is given.
#[derive(Clone, Debug, Default)]
pub struct WorkflowArgs {
    pub events: Vec<f64>,
    pub sensors: Vec<String>,
    pub amplitude: f64,
    pub noise: f64,
    pub seed: u64,
    pub veto_sensor: Option<String>,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .analysis
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Reference analysis parameters with the scenario shaped by `args`.
    pub fn from_args(args: &WorkflowArgs) -> Self {
        let mut analysis = AnalysisConfig::reference();
        if !args.sensors.is_empty() {
            analysis.sensors = args.sensors.clone();
        }
        let events: Vec<GpsTime> = args.events.iter().copied().map(GpsTime::from_seconds).collect();

        let mut scenario = ScenarioConfig {
            injection_amplitude: args.amplitude,
            noise: args.noise,
            seed: args.seed,
            ..Default::default()
        };
        if let (Some(sensor), Some(flag)) = (&args.veto_sensor, &analysis.veto_flag) {
            let margin = analysis.fetch_half_window;
            for event in &events {
                scenario.segments.push(FlagSegment {
                    sensor: sensor.clone(),
                    flag: flag.clone(),
                    start: event.seconds() - margin,
                    end: event.seconds() + margin,
                });
            }
        }

        Self {
            events,
            analysis,
            scenario,
        }
    }
}
