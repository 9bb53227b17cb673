use anyhow::Context;
use std::fs;
use std::path::Path;
use transientcore::pipeline::AnalysisReport;

/// Writes every report of a batch run as one pretty-printed JSON array.
pub fn write_reports<P: AsRef<Path>>(path: P, reports: &[AnalysisReport]) -> anyhow::Result<()> {
    let path_ref = path.as_ref();
    if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(reports).context("serialising reports")?;
    fs::write(path_ref, contents)
        .with_context(|| format!("writing report {}", path_ref.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use transientcore::telemetry::MetricsSnapshot;
    use transientcore::time::GpsTime;

    #[test]
    fn reports_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("analysis.json");
        let report = AnalysisReport {
            event_time: GpsTime::from_seconds(1000.0),
            sensors: Vec::new(),
            coincidences: Vec::new(),
            metrics: MetricsSnapshot::default(),
        };
        write_reports(&path, &[report.clone()]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let parsed: Vec<AnalysisReport> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, vec![report]);
    }
}
