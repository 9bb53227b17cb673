use crate::math::fft::FftHelper;
use crate::prelude::{ProcessingStage, SensorState, StageError, StageResult};
use crate::processing::preprocess::ConditionedSeries;
use crate::processing::psd::NoisePowerSpectrum;
use crate::processing::template::WaveformTemplate;
use crate::series::{SampledSeries, SnrSeries};
use crate::telemetry::log::LogManager;
use crate::time::{GpsTime, TimeSpan};
use num_complex::Complex64;
use rustfft::num_traits::Zero;

/// Frequency-domain matched filter producing a complex SNR time series
/// normalised so that each quadrature of pure noise has unit variance.
pub struct MatchedFilterEngine {
    f_low: f64,
    settle_seconds: f64,
    template: Option<WaveformTemplate>,
    logger: LogManager,
}

impl MatchedFilterEngine {
    /// `settle_seconds` is the nominal edge trimmed from each side of the
    /// output; it tracks the PSD averaging length.
    pub fn new(f_low: f64, settle_seconds: f64) -> Self {
        Self {
            f_low,
            settle_seconds,
            template: None,
            logger: LogManager::new(),
        }
    }

    /// Binds the template used when the engine runs as a pipeline stage.
    pub fn with_template(mut self, template: WaveformTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_logger(mut self, logger: LogManager) -> Self {
        self.logger = logger;
        self
    }

    /// Samples trimmed from each edge of an `n`-sample output. Falls back to
    /// a quarter of the series when the nominal trim would leave nothing.
    pub fn settling_trim(&self, n: usize, sample_rate: f64) -> usize {
        let nominal = (self.settle_seconds * sample_rate).round().max(0.0) as usize;
        if nominal.saturating_mul(2) >= n {
            n / 4
        } else {
            nominal
        }
    }

    pub fn filter(
        &self,
        whitened: &SampledSeries,
        template: &WaveformTemplate,
        psd: &NoisePowerSpectrum,
    ) -> StageResult<SnrSeries> {
        let n = whitened.len();
        let rate = whitened.sample_rate();
        if template.len() != n || template.series().sample_rate() != rate {
            return Err(StageError::InvalidInput(format!(
                "template ({} samples at {} Hz) does not match data ({} samples at {} Hz)",
                template.len(),
                template.series().sample_rate(),
                n,
                rate
            )));
        }
        if n == 0 {
            return Err(StageError::InvalidInput("no samples to filter".into()));
        }

        let fft = FftHelper::new(n);
        let data = fft.forward(whitened.samples());
        let reference = fft.forward(template.series().samples());

        // One-sided product over positive frequencies above f_low; doubling
        // makes the real part equal the band-limited correlation.
        let mut product = vec![Complex64::zero(); n];
        let mut template_power = 0.0;
        for k in 1..(n + 1) / 2 {
            let frequency = k as f64 * rate / n as f64;
            if frequency < self.f_low {
                continue;
            }
            let Some(amplitude) = psd.whitening_amplitude(frequency, rate) else {
                continue;
            };
            let h = reference[k] / amplitude;
            product[k] = data[k] * h.conj() * 2.0;
            template_power += h.norm_sqr();
        }
        let sigma_sq = 2.0 * template_power / n as f64;
        if !(sigma_sq.is_finite() && sigma_sq > 0.0) {
            return Err(StageError::Numerical(format!(
                "template has no noise-weighted power above {} Hz",
                self.f_low
            )));
        }
        let sigma = sigma_sq.sqrt();

        // Lag L aligns the template start with sample L; report it at the
        // sample where the template's reference point lands instead.
        let correlation = fft.inverse(product);
        let shift = template.reference_index() % n;
        let values: Vec<Complex64> = (0..n)
            .map(|i| correlation[(i + n - shift) % n] / sigma)
            .collect();
        if values.iter().any(|v| !(v.re.is_finite() && v.im.is_finite())) {
            return Err(StageError::Numerical("SNR series is not finite".into()));
        }

        let trim = self.settling_trim(n, rate);
        self.logger.record(&format!(
            "filtered {} samples, template sigma {:.4}, trimming {} samples per edge",
            n, sigma, trim
        ));
        SnrSeries::new(whitened.start(), rate, values, trim..n - trim)
    }

    /// Narrows the valid region to `center ± half_width`. The whole window
    /// must lie inside the current valid region.
    pub fn restrict(
        &self,
        snr: SnrSeries,
        center: GpsTime,
        half_width: f64,
    ) -> StageResult<SnrSeries> {
        let requested = TimeSpan::centered(center, half_width);
        let valid = snr.valid_range();
        let last_valid = valid.end.checked_sub(1).map(|i| snr.time_at(i));
        let tolerance = 0.5 / snr.sample_rate();
        let inside = match last_valid {
            Some(last) if !valid.is_empty() => {
                requested.start >= snr.time_at(valid.start) - tolerance
                    && requested.end <= last + tolerance
            }
            _ => false,
        };
        if !inside {
            return Err(StageError::WindowOutOfRange {
                requested,
                valid: snr.valid_span(),
            });
        }
        let range = snr.index_range(requested.start, requested.end);
        snr.with_valid(range.start.max(valid.start)..range.end.min(valid.end))
    }
}

impl ProcessingStage for MatchedFilterEngine {
    type Input = ConditionedSeries;
    type Output = SnrSeries;

    fn completes(&self) -> SensorState {
        SensorState::Filtered
    }

    fn execute(&self, input: ConditionedSeries) -> StageResult<SnrSeries> {
        let template = self
            .template
            .as_ref()
            .ok_or_else(|| StageError::Internal("matched filter has no template".into()))?;
        self.filter(&input.whitened, template, &input.psd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::preprocess::{PreprocessConfig, Preprocessor};
    use crate::processing::template::{Approximant, TemplateGenerator, TemplateParams};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const RATE: f64 = 4096.0;

    fn params() -> TemplateParams {
        TemplateParams {
            mass1: 36.0,
            mass2: 29.0,
            distance: 400.0,
            f_low: 30.0,
            approximant: Approximant::NewtonianInspiral,
        }
    }

    fn template(len: usize) -> WaveformTemplate {
        TemplateGenerator::new().generate(&params(), RATE, len).unwrap()
    }

    /// Peak-normalised template placed so its reference sample lands at `at`.
    fn injected(len: usize, template: &WaveformTemplate, at: usize, amplitude: f64) -> Vec<f64> {
        let samples = template.series().samples();
        let peak = samples[template.reference_index()].abs();
        let mut data = vec![0.0; len];
        for (j, value) in samples.iter().enumerate() {
            let idx = at as i64 - template.reference_index() as i64 + j as i64;
            if idx >= 0 && (idx as usize) < len {
                data[idx as usize] += amplitude * value / peak;
            }
        }
        data
    }

    #[test]
    fn noiseless_match_scales_linearly_with_amplitude() {
        let n = 8192;
        let tmpl = template(n);
        let psd = NoisePowerSpectrum::white(RATE, 0.25);
        let engine = MatchedFilterEngine::new(30.0, 0.5);
        let start = GpsTime::from_seconds(500.0);

        let mut peaks = Vec::new();
        for amplitude in [1.0, 2.0, 5.0] {
            let data = SampledSeries::new(start, RATE, injected(n, &tmpl, 4096, amplitude)).unwrap();
            let snr = engine.filter(&data, &tmpl, &psd).unwrap();
            let (idx, peak) = crate::math::stats::StatsHelper::argmax(
                snr.valid_range().map(|i| snr.magnitude(i)),
            )
            .unwrap();
            assert_eq!(snr.valid_range().start + idx, 4096);
            peaks.push(peak);
        }
        assert!((peaks[1] / peaks[0] - 2.0).abs() < 1e-9);
        assert!((peaks[2] / peaks[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn injection_in_noise_peaks_at_injection_time() {
        let rate = RATE;
        let mut rng = StdRng::seed_from_u64(42);
        let total = (rate * 32.0) as usize;
        let start = GpsTime::from_seconds(984.0);
        let tmpl_natural = TemplateGenerator::new().synthesize(&params(), rate).unwrap();
        let event_index = (16.0 * rate) as usize;

        let mut peaks = Vec::new();
        for amplitude in [10.0, 20.0] {
            let mut data = injected(total, &tmpl_natural, event_index, amplitude);
            let mut noise_rng = StdRng::seed_from_u64(rng.gen());
            data.iter_mut()
                .for_each(|v| *v += noise_rng.gen_range(-1.0..1.0));
            let series = SampledSeries::new(start, rate, data).unwrap();
            let conditioned = Preprocessor::new(PreprocessConfig {
                f_low: 30.0,
                f_high: 500.0,
                notch_frequencies: Vec::new(),
                notch_q: 30.0,
                analysis_center: GpsTime::from_seconds(1000.0),
                analysis_half_width: 4.0,
                psd_window_length: 4.0,
            })
            .condition(series)
            .unwrap();

            let n = conditioned.whitened.len();
            let engine = MatchedFilterEngine::new(30.0, 4.0).with_template(template(n));
            let snr = engine.execute(conditioned).unwrap();
            let valid = snr.valid_range();
            let (idx, peak) = crate::math::stats::StatsHelper::argmax(
                valid.clone().map(|i| snr.magnitude(i)),
            )
            .unwrap();
            let peak_time = snr.time_at(valid.start + idx);
            assert!((peak_time - GpsTime::from_seconds(1000.0)).abs() < 1.5 / rate);
            peaks.push(peak);
        }
        assert!(peaks[0] > 8.0, "peak {}", peaks[0]);
        let ratio = peaks[1] / peaks[0];
        assert!((ratio - 2.0).abs() < 0.25, "ratio {ratio}");
    }

    #[test]
    fn trim_degrades_for_short_series() {
        let engine = MatchedFilterEngine::new(30.0, 4.0);
        assert_eq!(engine.settling_trim(16 * 4096, 4096.0), 4 * 4096);
        assert_eq!(engine.settling_trim(8 * 4096, 4096.0), 2 * 4096);
        assert_eq!(engine.settling_trim(3, 4096.0), 0);
        assert_eq!(MatchedFilterEngine::new(30.0, 0.0).settling_trim(100, 10.0), 0);
    }

    #[test]
    fn mismatched_template_length_is_rejected() {
        let psd = NoisePowerSpectrum::white(RATE, 0.25);
        let data = SampledSeries::new(GpsTime::default(), RATE, vec![0.0; 8192]).unwrap();
        let err = MatchedFilterEngine::new(30.0, 0.5)
            .filter(&data, &template(4096), &psd)
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }

    #[test]
    fn empty_spectrum_is_numerical_error() {
        let psd = NoisePowerSpectrum::new(vec![0.0; 10], 0.25);
        let data = SampledSeries::new(GpsTime::default(), RATE, vec![0.0; 8192]).unwrap();
        let err = MatchedFilterEngine::new(30.0, 0.5)
            .filter(&data, &template(8192), &psd)
            .unwrap_err();
        assert_eq!(err.kind(), "NumericalError");
    }

    #[test]
    fn restrict_requires_window_inside_valid_region() {
        let n = 8192;
        let tmpl = template(n);
        let psd = NoisePowerSpectrum::white(RATE, 0.25);
        let engine = MatchedFilterEngine::new(30.0, 0.5);
        let data = SampledSeries::new(
            GpsTime::from_seconds(0.0),
            RATE,
            injected(n, &tmpl, 4096, 1.0),
        )
        .unwrap();
        let snr = engine.filter(&data, &tmpl, &psd).unwrap();
        // Valid region is [0.5, 1.5) seconds.
        let narrowed = engine
            .restrict(snr.clone(), GpsTime::from_seconds(1.0), 0.25)
            .unwrap();
        assert_eq!(narrowed.valid_range(), 3072..5121);
        assert_eq!(narrowed.values(), snr.values());

        let partial = engine.restrict(snr.clone(), GpsTime::from_seconds(1.4), 0.25);
        assert_eq!(partial.unwrap_err().kind(), "WindowOutOfRangeError");
        let outside = engine.restrict(snr, GpsTime::from_seconds(3.0), 0.1);
        assert_eq!(outside.unwrap_err().kind(), "WindowOutOfRangeError");
    }
}
