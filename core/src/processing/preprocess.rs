use crate::math::fft::{bin_frequency, FftHelper};
use crate::math::stats::StatsHelper;
use crate::prelude::{ProcessingStage, SensorState, StageError, StageResult};
use crate::processing::psd::{welch, NoisePowerSpectrum};
use crate::series::SampledSeries;
use crate::telemetry::log::LogManager;
use crate::time::{GpsTime, TimeSpan};
use num_complex::Complex64;
use rustfft::num_traits::Zero;

/// PSD bins added on each side of a notch; covers the Hann main lobe.
const NOTCH_GUARD_BINS: f64 = 2.0;

/// Parameters of the conditioning chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    pub f_low: f64,
    pub f_high: f64,
    pub notch_frequencies: Vec<f64>,
    /// Quality factor of each notch: suppressed width is `f / q`.
    pub notch_q: f64,
    pub analysis_center: GpsTime,
    pub analysis_half_width: f64,
    pub psd_window_length: f64,
}

/// Whitened analysis window together with the spectrum used to whiten it.
#[derive(Debug, Clone)]
pub struct ConditionedSeries {
    pub whitened: SampledSeries,
    pub psd: NoisePowerSpectrum,
}

/// Band-limits, notches, estimates the PSD over the full span, crops the
/// analysis window and whitens it. The order is fixed: the spectrum must
/// come from the full filtered series, not from the crop.
pub struct Preprocessor {
    config: PreprocessConfig,
    logger: LogManager,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            config,
            logger: LogManager::new(),
        }
    }

    pub fn with_logger(mut self, logger: LogManager) -> Self {
        self.logger = logger;
        self
    }

    pub fn condition(&self, series: SampledSeries) -> StageResult<ConditionedSeries> {
        let cfg = &self.config;
        let window = TimeSpan::centered(cfg.analysis_center, cfg.analysis_half_width);
        if !series.span().covers(&window) {
            return Err(StageError::InsufficientData {
                what: "analysis crop",
                requested: window,
                available: series.span(),
            });
        }

        let mut filtered = band_limit(&series, cfg.f_low, cfg.f_high);
        for &frequency in &cfg.notch_frequencies {
            filtered = notch(&filtered, frequency, cfg.notch_q);
        }

        // Welch leakage leaves notched bands slightly above zero; the crop
        // below leaks far more into them, so they are dropped outright.
        let resolution = frequency_resolution(&filtered);
        let mut psd =
            welch(&filtered, cfg.psd_window_length)?.restrict_band(cfg.f_low, cfg.f_high);
        let guard = NOTCH_GUARD_BINS * psd.delta_f();
        for &frequency in &cfg.notch_frequencies {
            psd = psd.suppress_band(
                frequency,
                notch_half_width(frequency, cfg.notch_q, resolution) + guard,
            );
        }
        let cropped = filtered.crop(window)?;
        let whitened = whiten(&cropped, &psd)?;

        self.logger.record(&format!(
            "conditioned {} samples over {}, whitened RMS {:.4}",
            whitened.len(),
            window,
            StatsHelper::rms(whitened.samples())
        ));
        Ok(ConditionedSeries { whitened, psd })
    }
}

impl ProcessingStage for Preprocessor {
    type Input = SampledSeries;
    type Output = ConditionedSeries;

    fn completes(&self) -> SensorState {
        SensorState::Preprocessed
    }

    fn execute(&self, input: SampledSeries) -> StageResult<ConditionedSeries> {
        self.condition(input)
    }
}

/// Applies `keep(frequency)` as a zero-phase mask in the frequency domain.
fn spectral_mask(series: &SampledSeries, keep: impl Fn(f64) -> bool) -> SampledSeries {
    let n = series.len();
    if n == 0 {
        return series.with_samples(Vec::new());
    }
    let fft = FftHelper::new(n);
    let mut spectrum = fft.forward(series.samples());
    for (k, bin) in spectrum.iter_mut().enumerate() {
        if !keep(bin_frequency(k, n, series.sample_rate())) {
            *bin = Complex64::zero();
        }
    }
    series.with_samples(fft.inverse_real(spectrum))
}

/// Keeps content in the closed band `[f_low, f_high]`.
pub fn band_limit(series: &SampledSeries, f_low: f64, f_high: f64) -> SampledSeries {
    spectral_mask(series, |f| f >= f_low && f <= f_high)
}

/// Removes a band of width `frequency / q` centred on `frequency`, never
/// narrower than one frequency bin.
pub fn notch(series: &SampledSeries, frequency: f64, q: f64) -> SampledSeries {
    let half_width = notch_half_width(frequency, q, frequency_resolution(series));
    spectral_mask(series, |f| (f - frequency).abs() > half_width)
}

fn frequency_resolution(series: &SampledSeries) -> f64 {
    series.sample_rate() / series.len().max(1) as f64
}

fn notch_half_width(frequency: f64, q: f64, resolution: f64) -> f64 {
    (frequency / q / 2.0).max(resolution / 2.0)
}

/// Divides the spectrum by the noise amplitude so that noise matching `psd`
/// comes out white with unit variance. Bins with no noise estimate are zeroed.
pub fn whiten(series: &SampledSeries, psd: &NoisePowerSpectrum) -> StageResult<SampledSeries> {
    let n = series.len();
    let rate = series.sample_rate();
    let fft = FftHelper::new(n);
    let mut spectrum = fft.forward(series.samples());
    for (k, bin) in spectrum.iter_mut().enumerate() {
        *bin = match psd.whitening_amplitude(bin_frequency(k, n, rate), rate) {
            Some(amplitude) => *bin / amplitude,
            None => Complex64::zero(),
        };
    }
    let whitened = fft.inverse_real(spectrum);
    if !StatsHelper::all_finite(&whitened) {
        return Err(StageError::Numerical("whitened series is not finite".into()));
    }
    Ok(series.with_samples(whitened))
}
