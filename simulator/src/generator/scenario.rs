use crate::generator::template::{inject, line_interference};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use transientcore::interface::{SegmentList, SourceCapabilities, StrainSource};
use transientcore::processing::{TemplateGenerator, TemplateParams};
use transientcore::series::RawSeries;
use transientcore::time::{GpsTime, TimeSpan};
use transientcore::{StageError, StageResult};

/// Active interval of a quality flag on one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSegment {
    pub sensor: String,
    pub flag: String,
    pub start: f64,
    pub end: f64,
}

/// Configuration for generating synthetic sensor data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub sample_rate: f64,
    /// Half-range of the uniform noise.
    pub noise: f64,
    pub seed: u64,
    pub line_frequency: Option<f64>,
    pub line_amplitude: f64,
    /// Peak amplitude of the injected signal; zero disables injection.
    pub injection_amplitude: f64,
    /// Injected waveform; the analysis template is used when absent.
    pub injection: Option<TemplateParams>,
    /// Per-sensor arrival offset in seconds relative to the event.
    pub offsets: BTreeMap<String, f64>,
    pub quality_annotations: bool,
    /// Flags the source can resolve, even when no segment is active.
    pub known_flags: Vec<String>,
    pub segments: Vec<FlagSegment>,
    pub description: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 4096.0,
            noise: 1.0,
            seed: 0,
            line_frequency: Some(60.0),
            line_amplitude: 0.5,
            injection_amplitude: 20.0,
            injection: None,
            offsets: BTreeMap::new(),
            quality_annotations: true,
            known_flags: vec!["CBC_CAT2".into()],
            segments: Vec::new(),
            description: None,
        }
    }
}

/// In-memory data source: noise, optional line interference and an injected
/// signal at the requested event time.
pub struct SyntheticSource {
    config: ScenarioConfig,
    injection: TemplateParams,
    generator: TemplateGenerator,
}

impl SyntheticSource {
    pub fn new(config: ScenarioConfig, analysis_template: &TemplateParams) -> Self {
        let injection = config
            .injection
            .clone()
            .unwrap_or_else(|| analysis_template.clone());
        Self {
            config,
            injection,
            generator: TemplateGenerator::new(),
        }
    }

    fn seed_for(&self, sensor: &str, center: GpsTime) -> u64 {
        sensor
            .bytes()
            .fold(self.config.seed ^ center.seconds().to_bits(), |acc, b| {
                acc.wrapping_mul(1_099_511_628_211).wrapping_add(b as u64)
            })
    }
}

impl StrainSource for SyntheticSource {
    fn fetch(&self, sensor: &str, center: GpsTime, half_window: f64) -> StageResult<RawSeries> {
        let rate = self.config.sample_rate;
        if !(half_window.is_finite() && half_window > 0.0) {
            return Err(StageError::Acquisition(format!(
                "cannot fetch a {} s half-window",
                half_window
            )));
        }
        let start = center - half_window;
        let length = (2.0 * half_window * rate).round() as usize;

        let mut rng = StdRng::seed_from_u64(self.seed_for(sensor, center));
        let noise = self.config.noise.abs();
        let mut samples: Vec<f64> = if noise > 0.0 {
            (0..length).map(|_| rng.gen_range(-noise..noise)).collect()
        } else {
            vec![0.0; length]
        };

        if let Some(frequency) = self.config.line_frequency {
            let line = line_interference(
                start.seconds(),
                length,
                rate,
                frequency,
                self.config.line_amplitude,
            );
            samples.iter_mut().zip(line).for_each(|(s, l)| *s += l);
        }

        if self.config.injection_amplitude != 0.0 {
            let template = self.generator.synthesize(&self.injection, rate)?;
            let offset = self.config.offsets.get(sensor).copied().unwrap_or(0.0);
            let at = ((center + offset - start) * rate).round() as i64;
            inject(&mut samples, &template, at, self.config.injection_amplitude);
        }

        Ok(RawSeries::uniform(start, rate, samples))
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            quality_annotations: self.config.quality_annotations,
        }
    }

    fn lookup_flag(&self, sensor: &str, flag: &str) -> Option<SegmentList> {
        if !self.config.known_flags.iter().any(|known| known == flag) {
            return None;
        }
        let spans = self
            .config
            .segments
            .iter()
            .filter(|segment| segment.sensor == sensor && segment.flag == flag)
            .map(|segment| {
                TimeSpan::new(
                    GpsTime::from_seconds(segment.start),
                    GpsTime::from_seconds(segment.end),
                )
            })
            .collect();
        Some(SegmentList::new(spans))
    }
}
