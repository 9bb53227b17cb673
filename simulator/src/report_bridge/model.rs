use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use transientcore::pipeline::AnalysisReport;
use transientcore::time::GpsTime;

/// Most recent reports published to the presentation side, oldest first.
/// Each report carries full SNR series, so only the last few are kept.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportModel {
    pub reports: VecDeque<AnalysisReport>,
}

impl ReportModel {
    pub const HISTORY_LIMIT: usize = 8;

    pub fn latest(&self) -> Option<&AnalysisReport> {
        self.reports.back()
    }

    pub fn push(&mut self, report: AnalysisReport) {
        while self.reports.len() >= Self::HISTORY_LIMIT {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub event_time: GpsTime,
}
