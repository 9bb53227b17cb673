//! In-memory time series flowing between pipeline stages.
//!
//! Buffers are owned and never handed out mutably: every transform builds a
//! new series from the previous one.

use crate::prelude::{StageError, StageResult};
use crate::time::{GpsTime, TimeSpan};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Samples as delivered by a data source, before any validation. Each
/// sample carries its own timestamp so that dropouts are visible.
#[derive(Debug, Clone)]
pub struct RawSeries {
    samples: Vec<f64>,
    times: Vec<GpsTime>,
    sample_rate: f64,
}

impl RawSeries {
    pub fn new(samples: Vec<f64>, times: Vec<GpsTime>, sample_rate: f64) -> StageResult<Self> {
        if samples.len() != times.len() {
            return Err(StageError::InvalidInput(format!(
                "{} samples but {} timestamps",
                samples.len(),
                times.len()
            )));
        }
        Ok(Self {
            samples,
            times,
            sample_rate,
        })
    }

    /// Gap-free series starting at `start`.
    pub fn uniform(start: GpsTime, sample_rate: f64, samples: Vec<f64>) -> Self {
        let dt = 1.0 / sample_rate;
        let times = (0..samples.len())
            .map(|i| start + i as f64 * dt)
            .collect();
        Self {
            samples,
            times,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn times(&self) -> &[GpsTime] {
        &self.times
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nominal span `[t0, t0 + n / rate)`.
    pub fn span(&self) -> Option<TimeSpan> {
        let start = *self.times.first()?;
        Some(TimeSpan::from_duration(
            start,
            self.samples.len() as f64 / self.sample_rate,
        ))
    }

    pub(crate) fn into_parts(self) -> (Vec<f64>, Vec<GpsTime>, f64) {
        (self.samples, self.times, self.sample_rate)
    }
}

/// Uniformly sampled real series. `sample_count / sample_rate` is its duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledSeries {
    samples: Vec<f64>,
    sample_rate: f64,
    start: GpsTime,
}

impl SampledSeries {
    pub fn new(start: GpsTime, sample_rate: f64, samples: Vec<f64>) -> StageResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StageError::InvalidInput(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if !start.is_finite() {
            return Err(StageError::InvalidInput("start time is not finite".into()));
        }
        Ok(Self {
            samples,
            sample_rate,
            start,
        })
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn delta_t(&self) -> f64 {
        1.0 / self.sample_rate
    }

    pub fn start(&self) -> GpsTime {
        self.start
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    pub fn span(&self) -> TimeSpan {
        TimeSpan::from_duration(self.start, self.duration())
    }

    pub fn time_at(&self, index: usize) -> GpsTime {
        self.start + index as f64 / self.sample_rate
    }

    /// New series with the same timing and different sample values.
    pub fn with_samples(&self, samples: Vec<f64>) -> SampledSeries {
        SampledSeries {
            samples,
            sample_rate: self.sample_rate,
            start: self.start,
        }
    }

    /// Copies out `[span.start, span.start + round(duration * rate))`.
    pub fn crop(&self, span: TimeSpan) -> StageResult<SampledSeries> {
        let offset = ((span.start - self.start) * self.sample_rate).round();
        let count = (span.duration() * self.sample_rate).round();
        let insufficient = || StageError::InsufficientData {
            what: "analysis crop",
            requested: span,
            available: self.span(),
        };
        if offset < 0.0 || count <= 0.0 || offset + count > self.samples.len() as f64 {
            return Err(insufficient());
        }
        let first = offset as usize;
        let last = first + count as usize;
        Ok(SampledSeries {
            samples: self.samples[first..last].to_vec(),
            sample_rate: self.sample_rate,
            start: self.time_at(first),
        })
    }
}

/// Complex matched-filter output, one value per analysis sample. The time of
/// sample `i` is the time at which the template's reference point sits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrSeries {
    values: Vec<Complex64>,
    sample_rate: f64,
    start: GpsTime,
    valid_start: usize,
    valid_end: usize,
}

impl SnrSeries {
    pub fn new(
        start: GpsTime,
        sample_rate: f64,
        values: Vec<Complex64>,
        valid: Range<usize>,
    ) -> StageResult<Self> {
        if valid.start > valid.end || valid.end > values.len() {
            return Err(StageError::InvalidInput(format!(
                "valid region {:?} does not fit {} samples",
                valid,
                values.len()
            )));
        }
        Ok(Self {
            values,
            sample_rate,
            start,
            valid_start: valid.start,
            valid_end: valid.end,
        })
    }

    pub fn values(&self) -> &[Complex64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn start(&self) -> GpsTime {
        self.start
    }

    pub fn time_at(&self, index: usize) -> GpsTime {
        self.start + index as f64 / self.sample_rate
    }

    pub fn magnitude(&self, index: usize) -> f64 {
        self.values[index].norm()
    }

    pub fn valid_range(&self) -> Range<usize> {
        self.valid_start..self.valid_end
    }

    /// Time span covered by the valid region.
    pub fn valid_span(&self) -> TimeSpan {
        TimeSpan::new(self.time_at(self.valid_start), self.time_at(self.valid_end))
    }

    /// Indices whose times fall inside the closed interval `[from, to]`,
    /// clamped to the series bounds.
    pub fn index_range(&self, from: GpsTime, to: GpsTime) -> Range<usize> {
        const EPS: f64 = 1e-6;
        let len = self.values.len() as f64;
        let lo = ((from - self.start) * self.sample_rate - EPS).ceil().clamp(0.0, len);
        let hi = ((to - self.start) * self.sample_rate + EPS).floor() + 1.0;
        let hi = hi.clamp(0.0, len);
        if hi <= lo {
            return 0..0;
        }
        lo as usize..hi as usize
    }

    /// Same values with the valid region narrowed to `range`.
    pub fn with_valid(self, range: Range<usize>) -> StageResult<SnrSeries> {
        SnrSeries::new(self.start, self.sample_rate, self.values, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_returns_requested_length() {
        let series =
            SampledSeries::new(GpsTime::from_seconds(10.0), 4.0, (0..40).map(f64::from).collect())
                .unwrap();
        let cropped = series
            .crop(TimeSpan::centered(GpsTime::from_seconds(15.0), 1.0))
            .unwrap();
        assert_eq!(cropped.len(), 8);
        assert_eq!(cropped.start(), GpsTime::from_seconds(14.0));
        assert_eq!(cropped.samples()[0], 16.0);
    }

    #[test]
    fn crop_beyond_end_is_insufficient() {
        let series = SampledSeries::new(GpsTime::from_seconds(0.0), 4.0, vec![0.0; 16]).unwrap();
        let err = series
            .crop(TimeSpan::centered(GpsTime::from_seconds(3.5), 1.0))
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientDataError");
    }

    #[test]
    fn raw_series_rejects_mismatched_timestamps() {
        let err = RawSeries::new(vec![0.0; 3], vec![GpsTime::default(); 2], 1.0).unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }

    #[test]
    fn index_range_is_inclusive_and_clamped() {
        let snr = SnrSeries::new(
            GpsTime::from_seconds(0.0),
            10.0,
            vec![Complex64::new(0.0, 0.0); 20],
            0..20,
        )
        .unwrap();
        assert_eq!(
            snr.index_range(GpsTime::from_seconds(0.5), GpsTime::from_seconds(0.7)),
            5..8
        );
        assert_eq!(
            snr.index_range(GpsTime::from_seconds(-1.0), GpsTime::from_seconds(0.1)),
            0..2
        );
        assert_eq!(
            snr.index_range(GpsTime::from_seconds(5.0), GpsTime::from_seconds(6.0)),
            0..0
        );
    }
}
