use crate::generator::scenario::SyntheticSource;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use transientcore::interface::StrainSource;
use transientcore::pipeline::{analyze_event, AnalysisReport, CancelToken, SensorOutcome};
use transientcore::time::GpsTime;
use transientcore::AnalysisConfig;

/// Drives the analysis core over one or more events.
#[derive(Clone)]
pub struct Runner {
    analysis: Arc<AnalysisConfig>,
    source: Arc<dyn StrainSource>,
    timeout: Option<Duration>,
}

impl Runner {
    pub fn new(config: &WorkflowConfig) -> Self {
        let source = SyntheticSource::new(config.scenario.clone(), &config.analysis.template);
        Self::with_source(config.analysis.clone(), Arc::new(source))
    }

    pub fn with_source(analysis: AnalysisConfig, source: Arc<dyn StrainSource>) -> Self {
        Self {
            analysis: Arc::new(analysis),
            source,
            timeout: None,
        }
    }

    /// Per-event deadline after which remaining sensor work is abandoned.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn execute(&self, event: GpsTime) -> anyhow::Result<AnalysisReport> {
        let token = match self.timeout {
            Some(timeout) => CancelToken::with_timeout(timeout),
            None => CancelToken::new(),
        };
        let report = analyze_event(
            Arc::clone(&self.source),
            Arc::clone(&self.analysis),
            event,
            token,
        )
        .await
        .with_context(|| format!("analysing event {}", event))?;
        log::info!("{}", summarize(&report));
        Ok(report)
    }

    pub async fn execute_all(&self, events: &[GpsTime]) -> anyhow::Result<Vec<AnalysisReport>> {
        let mut reports = Vec::with_capacity(events.len());
        for &event in events {
            reports.push(self.execute(event).await?);
        }
        Ok(reports)
    }
}

/// One-line human summary of a report.
pub fn summarize(report: &AnalysisReport) -> String {
    let sensors: Vec<String> = report
        .sensors
        .iter()
        .map(|entry| match &entry.outcome {
            SensorOutcome::Detected(result) => format!(
                "{} snr={:.2}{}",
                entry.sensor,
                result.peak_snr,
                if result.detected { " detected" } else { "" }
            ),
            SensorOutcome::Failed(failure) => format!(
                "{} failed({}) after {}",
                entry.sensor, failure.kind, failure.reached_state
            ),
        })
        .collect();
    let coincidences: Vec<String> = report
        .coincidences
        .iter()
        .map(|entry| match &entry.result {
            Some(result) => format!(
                "{}/{} dt={:.6}s coincident={}",
                entry.a, entry.b, result.delta_t, result.coincident
            ),
            None => format!("{}/{} unavailable", entry.a, entry.b),
        })
        .collect();
    format!(
        "event {} -> [{}] [{}]",
        report.event_time,
        sensors.join(", "),
        coincidences.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowArgs;

    fn args(veto_sensor: Option<&str>) -> WorkflowArgs {
        WorkflowArgs {
            events: vec![1000.0],
            sensors: vec!["H1".into(), "L1".into()],
            amplitude: 20.0,
            noise: 1.0,
            seed: 1,
            veto_sensor: veto_sensor.map(String::from),
        }
    }

    #[tokio::test]
    async fn runner_detects_injected_event() {
        let cfg = WorkflowConfig::from_args(&args(None));
        let runner = Runner::new(&cfg);
        let reports = runner.execute_all(&cfg.events).await.unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert!(report.detection("H1").unwrap().detected);
        assert!(report.detection("L1").unwrap().detected);
        let coincidence = report.coincidence("H1", "L1").unwrap().result.unwrap();
        assert!(coincidence.coincident);
        assert!(summarize(report).contains("coincident=true"));
    }

    #[tokio::test]
    async fn runner_reports_vetoed_sensor() {
        let cfg = WorkflowConfig::from_args(&args(Some("H1")));
        let report = Runner::new(&cfg).execute(cfg.events[0]).await.unwrap();
        let failure = report.outcome("H1").and_then(SensorOutcome::failure).unwrap();
        assert_eq!(failure.kind, "VetoActive");
        assert!(report.coincidence("H1", "L1").unwrap().result.is_none());
        assert!(summarize(&report).contains("unavailable"));
    }
}
