//! Explicit analysis parameters, passed once into the pipeline entry point.

use crate::prelude::{StageError, StageResult};
use crate::processing::peak::PeakWindow;
use crate::processing::preprocess::PreprocessConfig;
use crate::processing::template::{Approximant, TemplateParams};
use crate::time::GpsTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Every tunable of an analysis run. Nothing here has a serde default: a
/// configuration file must spell out each value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub sensors: Vec<String>,
    /// Half-width of the span fetched around the event, in seconds.
    pub fetch_half_window: f64,
    pub allowed_sample_rates: Vec<f64>,
    /// Quality flag whose active segments veto a sensor.
    pub veto_flag: Option<String>,
    pub band_low: f64,
    pub band_high: f64,
    pub notch_frequencies: Vec<f64>,
    pub notch_q: f64,
    /// Welch segment length, in seconds.
    pub psd_window_length: f64,
    pub crop_half_width: f64,
    /// Strict SNR window around the event; must sit inside the valid region.
    pub search_half_window: Option<f64>,
    /// Peak search window around the event; only needs to intersect it.
    pub peak_half_window: Option<f64>,
    pub snr_threshold: f64,
    pub coincidence_tolerance: f64,
    pub template: TemplateParams,
}

impl AnalysisConfig {
    /// Value set used by the driver when no workflow file is given.
    pub fn reference() -> Self {
        Self {
            sensors: vec!["H1".into(), "L1".into()],
            fetch_half_window: 32.0,
            allowed_sample_rates: vec![4096.0, 16384.0],
            veto_flag: Some("CBC_CAT2".into()),
            band_low: 30.0,
            band_high: 500.0,
            notch_frequencies: vec![60.0, 120.0, 180.0, 240.0],
            notch_q: 30.0,
            psd_window_length: 4.0,
            crop_half_width: 4.0,
            search_half_window: Some(1.0),
            peak_half_window: None,
            snr_threshold: 8.0,
            coincidence_tolerance: 0.01,
            template: TemplateParams {
                mass1: 36.0,
                mass2: 29.0,
                distance: 410.0,
                f_low: 30.0,
                approximant: Approximant::InspiralRingdown,
            },
        }
    }

    /// Rejects inconsistent values before any sensor runs.
    pub fn validate(&self) -> StageResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        let invalid = |msg: String| Err(StageError::InvalidInput(msg));

        if self.sensors.is_empty() {
            return invalid("at least one sensor is required".into());
        }
        let unique: BTreeSet<&str> = self.sensors.iter().map(String::as_str).collect();
        if unique.len() != self.sensors.len() {
            return invalid(format!("duplicate sensor names in {:?}", self.sensors));
        }
        if self.allowed_sample_rates.is_empty()
            || !self.allowed_sample_rates.iter().all(|&r| positive(r))
        {
            return invalid(format!(
                "allowed sample rates must be positive, got {:?}",
                self.allowed_sample_rates
            ));
        }
        if !(self.band_low.is_finite() && self.band_low >= 0.0 && self.band_high > self.band_low)
        {
            return invalid(format!(
                "band [{}, {}] Hz is empty",
                self.band_low, self.band_high
            ));
        }
        let nyquist = self
            .allowed_sample_rates
            .iter()
            .fold(f64::INFINITY, |acc, &r| acc.min(r))
            / 2.0;
        if self.band_high > nyquist {
            return invalid(format!(
                "band upper edge {} Hz exceeds the {} Hz Nyquist limit",
                self.band_high, nyquist
            ));
        }
        if !self.notch_frequencies.iter().all(|&f| positive(f)) || !positive(self.notch_q) {
            return invalid(format!(
                "notches {:?} with q {} are not usable",
                self.notch_frequencies, self.notch_q
            ));
        }
        if !positive(self.fetch_half_window) || !positive(self.crop_half_width) {
            return invalid("fetch and crop half-widths must be positive".into());
        }
        if self.crop_half_width > self.fetch_half_window {
            return invalid(format!(
                "crop half-width {} s exceeds fetch half-window {} s",
                self.crop_half_width, self.fetch_half_window
            ));
        }
        if !positive(self.psd_window_length) || self.psd_window_length > 2.0 * self.fetch_half_window
        {
            return invalid(format!(
                "PSD window {} s does not fit the {} s fetch",
                self.psd_window_length,
                2.0 * self.fetch_half_window
            ));
        }
        for (name, window) in [
            ("search", self.search_half_window),
            ("peak", self.peak_half_window),
        ] {
            if let Some(half_width) = window {
                if !positive(half_width) || half_width > self.crop_half_width {
                    return invalid(format!(
                        "{} half-window {} s must be positive and within the crop",
                        name, half_width
                    ));
                }
            }
        }
        if !self.snr_threshold.is_finite() {
            return invalid("SNR threshold must be finite".into());
        }
        if !(self.coincidence_tolerance.is_finite() && self.coincidence_tolerance >= 0.0) {
            return invalid(format!(
                "coincidence tolerance {} must be non-negative",
                self.coincidence_tolerance
            ));
        }
        self.template.check()?;
        let duration = self.template.inspiral_duration();
        if !(duration.is_finite() && duration <= self.max_template_duration()) {
            return invalid(format!(
                "template from {} Hz lasts {:.1} s, longer than the {} s analysis window",
                self.template.f_low,
                duration,
                self.max_template_duration()
            ));
        }
        Ok(())
    }

    /// Bound passed to template synthesis: the template must fit the crop.
    pub fn max_template_duration(&self) -> f64 {
        2.0 * self.crop_half_width
    }

    pub fn preprocess_config(&self, event: GpsTime) -> PreprocessConfig {
        PreprocessConfig {
            f_low: self.band_low,
            f_high: self.band_high,
            notch_frequencies: self.notch_frequencies.clone(),
            notch_q: self.notch_q,
            analysis_center: event,
            analysis_half_width: self.crop_half_width,
            psd_window_length: self.psd_window_length,
        }
    }

    pub fn peak_window(&self, event: GpsTime) -> Option<PeakWindow> {
        self.peak_half_window.map(|half_width| PeakWindow {
            expected_time: event,
            half_width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_config_is_valid() {
        assert!(AnalysisConfig::reference().validate().is_ok());
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        let cases: Vec<fn(&mut AnalysisConfig)> = vec![
            |c| c.sensors.clear(),
            |c| c.sensors = vec!["H1".into(), "H1".into()],
            |c| c.band_high = c.band_low,
            |c| c.band_high = 4000.0,
            |c| c.crop_half_width = 64.0,
            |c| c.psd_window_length = 128.0,
            |c| c.search_half_window = Some(10.0),
            |c| c.coincidence_tolerance = -0.01,
            |c| c.template.mass1 = 0.0,
            |c| c.notch_q = 0.0,
            |c| c.template.f_low = 1e-3,
            |c| c.template.f_low = 5.0,
        ];
        for (idx, mutate) in cases.into_iter().enumerate() {
            let mut cfg = AnalysisConfig::reference();
            mutate(&mut cfg);
            let err = cfg.validate().unwrap_err();
            assert_eq!(err.kind(), "InvalidInput", "case {}", idx);
        }
    }

    #[test]
    fn preprocess_config_follows_event() {
        let cfg = AnalysisConfig::reference();
        let pre = cfg.preprocess_config(GpsTime::from_seconds(1_126_259_462.4));
        assert_eq!(pre.analysis_center, GpsTime::from_seconds(1_126_259_462.4));
        assert_eq!(pre.analysis_half_width, cfg.crop_half_width);
        assert_eq!(pre.notch_frequencies.len(), 4);
        assert!(cfg.peak_window(pre.analysis_center).is_none());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = AnalysisConfig::reference();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: AnalysisConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
