//! Time-domain reference waveforms for the matched filter.
//!
//! Both approximants use the leading-order (Newtonian) chirp of a compact
//! binary: frequency and amplitude sweep upward until the innermost stable
//! circular orbit. `InspiralRingdown` continues with a damped sinusoid at
//! the ringdown frequency of the remnant.

use crate::math::stats::StatsHelper;
use crate::prelude::{StageError, StageResult};
use crate::series::SampledSeries;
use crate::time::GpsTime;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// G * M_sun / c^3 in seconds.
const SOLAR_MASS_SECONDS: f64 = 4.925_490_947e-6;
/// One megaparsec divided by c, in seconds.
const MEGAPARSEC_SECONDS: f64 = 1.029_271_250_3e14;
/// Remnant spin assumed for the ringdown fits.
const REMNANT_SPIN: f64 = 0.7;
/// Ringdown length in units of its decay time.
const RINGDOWN_DECAY_TIMES: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Approximant {
    NewtonianInspiral,
    InspiralRingdown,
}

impl Approximant {
    pub fn id(&self) -> &'static str {
        match self {
            Approximant::NewtonianInspiral => "NewtonianInspiral",
            Approximant::InspiralRingdown => "InspiralRingdown",
        }
    }
}

impl fmt::Display for Approximant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Approximant {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NewtonianInspiral" => Ok(Approximant::NewtonianInspiral),
            "InspiralRingdown" => Ok(Approximant::InspiralRingdown),
            other => Err(StageError::InvalidInput(format!(
                "unknown approximant '{}'",
                other
            ))),
        }
    }
}

/// Physical parameters a template is generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParams {
    /// Component masses in solar masses.
    pub mass1: f64,
    pub mass2: f64,
    /// Luminosity distance in megaparsecs.
    pub distance: f64,
    pub f_low: f64,
    pub approximant: Approximant,
}

impl TemplateParams {
    pub fn total_mass(&self) -> f64 {
        self.mass1 + self.mass2
    }

    pub fn chirp_mass(&self) -> f64 {
        (self.mass1 * self.mass2).powf(0.6) / self.total_mass().powf(0.2)
    }

    /// Inspiral length from `f_low` up to the last stable orbit, in seconds.
    /// Zero when `f_low` is already past that orbit.
    pub fn inspiral_duration(&self) -> f64 {
        let mc = self.chirp_mass() * SOLAR_MASS_SECONDS;
        let f_end = isco_frequency(self.total_mass());
        if self.f_low >= f_end {
            return 0.0;
        }
        time_to_coalescence(mc, self.f_low) - time_to_coalescence(mc, f_end)
    }

    pub(crate) fn check(&self) -> StageResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.mass1) && positive(self.mass2)) {
            return Err(StageError::InvalidInput(format!(
                "masses must be positive, got {} and {}",
                self.mass1, self.mass2
            )));
        }
        if !positive(self.distance) {
            return Err(StageError::InvalidInput(format!(
                "distance must be positive, got {}",
                self.distance
            )));
        }
        if !positive(self.f_low) {
            return Err(StageError::InvalidInput(format!(
                "f_low must be positive, got {}",
                self.f_low
            )));
        }
        Ok(())
    }
}

/// Generated waveform plus the index of its reference point (peak |h|).
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTemplate {
    series: SampledSeries,
    params: TemplateParams,
    reference_index: usize,
}

impl WaveformTemplate {
    pub fn series(&self) -> &SampledSeries {
        &self.series
    }

    pub fn params(&self) -> &TemplateParams {
        &self.params
    }

    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Pads with zeros or truncates at the tail to exactly `len` samples.
    /// Fails if truncation would cut away the reference point.
    pub fn resized(self, len: usize) -> StageResult<WaveformTemplate> {
        if self.reference_index >= len {
            return Err(StageError::Numerical(format!(
                "template reference sample {} does not fit a {}-sample window",
                self.reference_index, len
            )));
        }
        let WaveformTemplate {
            series,
            params,
            reference_index,
        } = self;
        let sample_rate = series.sample_rate();
        let mut samples = series.into_samples();
        samples.resize(len, 0.0);
        Ok(WaveformTemplate {
            series: SampledSeries::new(GpsTime::default(), sample_rate, samples)?,
            params,
            reference_index,
        })
    }
}

pub struct TemplateGenerator {
    edge_trim_fraction: f64,
    max_duration: f64,
}

impl TemplateGenerator {
    /// Fraction of the waveform duration trimmed from each edge.
    pub const DEFAULT_EDGE_TRIM: f64 = 0.02;
    /// Longest inspiral, in seconds, synthesised unless a tighter bound is set.
    pub const DEFAULT_MAX_DURATION: f64 = 256.0;

    pub fn new() -> Self {
        Self {
            edge_trim_fraction: Self::DEFAULT_EDGE_TRIM,
            max_duration: Self::DEFAULT_MAX_DURATION,
        }
    }

    pub fn with_edge_trim(edge_trim_fraction: f64) -> Self {
        Self {
            edge_trim_fraction: edge_trim_fraction.clamp(0.0, 0.49),
            ..Self::new()
        }
    }

    /// Rejects parameters whose inspiral would outlast `seconds`.
    pub fn with_max_duration(mut self, seconds: f64) -> Self {
        self.max_duration = seconds;
        self
    }

    /// Synthesises the waveform and resizes it to `target_len` samples.
    pub fn generate(
        &self,
        params: &TemplateParams,
        sample_rate: f64,
        target_len: usize,
    ) -> StageResult<WaveformTemplate> {
        self.synthesize(params, sample_rate)?.resized(target_len)
    }

    /// Synthesises the waveform at its natural length, edges trimmed.
    pub fn synthesize(
        &self,
        params: &TemplateParams,
        sample_rate: f64,
    ) -> StageResult<WaveformTemplate> {
        params.check()?;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StageError::InvalidInput(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }

        let duration = params.inspiral_duration();
        if !(duration.is_finite() && duration <= self.max_duration) {
            return Err(StageError::InvalidInput(format!(
                "inspiral from {} Hz lasts {:.1} s, longer than the {} s limit",
                params.f_low, duration, self.max_duration
            )));
        }

        let mut samples = inspiral(params, sample_rate);
        if params.approximant == Approximant::InspiralRingdown && !samples.is_empty() {
            samples = append_ringdown(samples, params, sample_rate);
        }

        let trim = (samples.len() as f64 * self.edge_trim_fraction).floor() as usize;
        let samples = if samples.len() > 2 * trim {
            samples[trim..samples.len() - trim].to_vec()
        } else {
            Vec::new()
        };

        if samples.is_empty() {
            return Err(StageError::Numerical(format!(
                "{} waveform for masses {}/{} from {} Hz is empty",
                params.approximant, params.mass1, params.mass2, params.f_low
            )));
        }
        if !StatsHelper::all_finite(&samples) {
            return Err(StageError::Numerical(format!(
                "{} waveform contains non-finite samples",
                params.approximant
            )));
        }

        let (reference_index, _) = StatsHelper::argmax(samples.iter().map(|v| v.abs()))
            .ok_or_else(|| StageError::Numerical("waveform has no peak".into()))?;
        let series = SampledSeries::new(GpsTime::default(), sample_rate, samples)?;
        Ok(WaveformTemplate {
            series,
            params: params.clone(),
            reference_index,
        })
    }
}

impl Default for TemplateGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Gravitational-wave frequency at the innermost stable circular orbit.
fn isco_frequency(total_mass: f64) -> f64 {
    1.0 / (6f64.powf(1.5) * PI * total_mass * SOLAR_MASS_SECONDS)
}

/// Time left to coalescence once the signal reaches `frequency`.
fn time_to_coalescence(chirp_mass_s: f64, frequency: f64) -> f64 {
    5.0 / 256.0 * chirp_mass_s.powf(-5.0 / 3.0) * (PI * frequency).powf(-8.0 / 3.0)
}

/// Strain amplitude of the dominant harmonic at `frequency`.
fn chirp_amplitude(chirp_mass_s: f64, frequency: f64, distance_s: f64) -> f64 {
    4.0 * chirp_mass_s.powf(5.0 / 3.0) * (PI * frequency).powf(2.0 / 3.0) / distance_s
}

fn inspiral(params: &TemplateParams, sample_rate: f64) -> Vec<f64> {
    let mc = params.chirp_mass() * SOLAR_MASS_SECONDS;
    let distance = params.distance * MEGAPARSEC_SECONDS;
    let f_end = isco_frequency(params.total_mass());
    if params.f_low >= f_end {
        return Vec::new();
    }
    let tau_start = time_to_coalescence(mc, params.f_low);
    let tau_end = time_to_coalescence(mc, f_end);
    let count = ((tau_start - tau_end) * sample_rate).floor() as usize;

    (0..count)
        .map(|i| {
            let tau = tau_start - i as f64 / sample_rate;
            let frequency = (5.0 / (256.0 * tau)).powf(3.0 / 8.0) * mc.powf(-5.0 / 8.0) / PI;
            let phase = -2.0 * (tau / (5.0 * mc)).powf(5.0 / 8.0);
            chirp_amplitude(mc, frequency, distance) * phase.cos()
        })
        .collect()
}

fn append_ringdown(mut samples: Vec<f64>, params: &TemplateParams, sample_rate: f64) -> Vec<f64> {
    let total = params.total_mass() * SOLAR_MASS_SECONDS;
    let frequency = (1.0 - 0.63 * (1.0 - REMNANT_SPIN).powf(0.3)) / (2.0 * PI * total);
    let quality = 2.0 * (1.0 - REMNANT_SPIN).powf(-0.45);
    let decay = quality / (PI * frequency);
    let count = (RINGDOWN_DECAY_TIMES * decay * sample_rate).ceil() as usize;

    // Start from the inspiral amplitude at the last stable orbit, in phase
    // with the final inspiral sample.
    let envelope = chirp_amplitude(
        params.chirp_mass() * SOLAR_MASS_SECONDS,
        isco_frequency(params.total_mass()),
        params.distance * MEGAPARSEC_SECONDS,
    );
    let last = samples.last().copied().unwrap_or(0.0);
    let phase0 = (last / envelope).clamp(-1.0, 1.0).acos();
    samples.extend((1..=count).map(|i| {
        let t = i as f64 / sample_rate;
        envelope * (-t / decay).exp() * (phase0 + 2.0 * PI * frequency * t).cos()
    }));
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(approximant: Approximant) -> TemplateParams {
        TemplateParams {
            mass1: 36.0,
            mass2: 29.0,
            distance: 400.0,
            f_low: 30.0,
            approximant,
        }
    }

    #[test]
    fn inspiral_has_expected_duration_and_scale() {
        let template = TemplateGenerator::with_edge_trim(0.0)
            .synthesize(&params(Approximant::NewtonianInspiral), 4096.0)
            .unwrap();
        let seconds = template.len() as f64 / 4096.0;
        assert!(seconds > 0.2 && seconds < 0.4, "duration {seconds}");
        let peak = template.series().samples()[template.reference_index()].abs();
        assert!(peak > 1e-23 && peak < 1e-19, "peak {peak}");
        // The chirp grows in amplitude, so the peak sits in the final tenth.
        assert!(template.reference_index() > template.len() * 9 / 10);
    }

    #[test]
    fn trimming_removes_fixed_fraction() {
        let p = params(Approximant::NewtonianInspiral);
        let full = TemplateGenerator::with_edge_trim(0.0).synthesize(&p, 4096.0).unwrap();
        let trimmed = TemplateGenerator::with_edge_trim(0.1).synthesize(&p, 4096.0).unwrap();
        let trim = (full.len() as f64 * 0.1).floor() as usize;
        assert_eq!(trimmed.len(), full.len() - 2 * trim);
        assert_eq!(
            trimmed.series().samples()[0],
            full.series().samples()[trim]
        );
    }

    #[test]
    fn ringdown_extends_inspiral() {
        let gen = TemplateGenerator::with_edge_trim(0.0);
        let inspiral = gen
            .synthesize(&params(Approximant::NewtonianInspiral), 4096.0)
            .unwrap();
        let full = gen
            .synthesize(&params(Approximant::InspiralRingdown), 4096.0)
            .unwrap();
        assert!(full.len() > inspiral.len());
        assert_eq!(
            &full.series().samples()[..inspiral.len()],
            inspiral.series().samples()
        );
        let tail = full.series().samples().last().unwrap().abs();
        assert!(tail < full.series().samples()[full.reference_index()].abs() * 1e-3);
    }

    #[test]
    fn resize_pads_at_tail_without_wrapping() {
        let template = TemplateGenerator::new()
            .generate(&params(Approximant::NewtonianInspiral), 4096.0, 8192)
            .unwrap();
        assert_eq!(template.len(), 8192);
        let natural = TemplateGenerator::new()
            .synthesize(&params(Approximant::NewtonianInspiral), 4096.0)
            .unwrap();
        let samples = template.series().samples();
        assert_eq!(&samples[..natural.len()], natural.series().samples());
        assert!(samples[natural.len()..].iter().all(|&v| v == 0.0));
        assert_eq!(template.reference_index(), natural.reference_index());
    }

    #[test]
    fn truncation_past_reference_is_rejected() {
        let err = TemplateGenerator::new()
            .generate(&params(Approximant::NewtonianInspiral), 4096.0, 16)
            .unwrap_err();
        assert_eq!(err.kind(), "NumericalError");
    }

    #[test]
    fn f_low_above_isco_yields_numerical_error() {
        let mut p = params(Approximant::NewtonianInspiral);
        p.f_low = 500.0;
        let err = TemplateGenerator::new().synthesize(&p, 4096.0).unwrap_err();
        assert_eq!(err.kind(), "NumericalError");
    }

    #[test]
    fn overlong_inspiral_is_rejected_before_synthesis() {
        let mut p = params(Approximant::NewtonianInspiral);
        p.f_low = 1e-3;
        assert!(p.inspiral_duration() > 1e9);
        let err = TemplateGenerator::new().synthesize(&p, 4096.0).unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");

        let p = params(Approximant::InspiralRingdown);
        let err = TemplateGenerator::new()
            .with_max_duration(0.1)
            .synthesize(&p, 4096.0)
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
        assert!(TemplateGenerator::new()
            .with_max_duration(1.0)
            .synthesize(&p, 4096.0)
            .is_ok());
    }

    #[test]
    fn approximant_ids_round_trip_and_reject_unknown() {
        for approximant in [Approximant::NewtonianInspiral, Approximant::InspiralRingdown] {
            assert_eq!(approximant.id().parse::<Approximant>().unwrap(), approximant);
        }
        assert!("SEOBNRv4".parse::<Approximant>().is_err());
    }
}
