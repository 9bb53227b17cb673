use crate::interface::quality::VetoLookup;
use crate::prelude::{ProcessingStage, SensorState, StageError, StageResult};
use crate::series::{RawSeries, SampledSeries};
use crate::telemetry::log::LogManager;

/// Relative deviation from the nominal spacing tolerated before a gap
/// counts as a dropout. Timestamps near 1e9 s carry ~1e-7 s of rounding.
const SPACING_TOLERANCE: f64 = 0.1;

/// Gate that admits a raw series only if its rate, veto state and sample
/// spacing are all acceptable.
pub struct Validator {
    allowed_rates: Vec<f64>,
    veto: VetoLookup,
    logger: LogManager,
}

impl Validator {
    pub fn new(allowed_rates: &[f64], veto: VetoLookup) -> Self {
        Self {
            allowed_rates: allowed_rates.to_vec(),
            veto,
            logger: LogManager::new(),
        }
    }

    pub fn with_logger(mut self, logger: LogManager) -> Self {
        self.logger = logger;
        self
    }

    pub fn validate(&self, series: RawSeries) -> StageResult<SampledSeries> {
        if series.is_empty() {
            return Err(StageError::InvalidInput("series holds no samples".into()));
        }
        self.check_sample_rate(series.sample_rate())?;
        self.check_veto(&series)?;
        check_continuity(&series)?;

        let (samples, times, sample_rate) = series.into_parts();
        self.logger.record(&format!(
            "validated {} samples at {} Hz from {}",
            samples.len(),
            sample_rate,
            times[0]
        ));
        SampledSeries::new(times[0], sample_rate, samples)
    }

    fn check_sample_rate(&self, rate: f64) -> StageResult<()> {
        if self.allowed_rates.iter().any(|&allowed| allowed == rate) {
            Ok(())
        } else {
            Err(StageError::SampleRateMismatch {
                actual: rate,
                allowed: self.allowed_rates.clone(),
            })
        }
    }

    fn check_veto(&self, series: &RawSeries) -> StageResult<()> {
        match &self.veto {
            VetoLookup::NotRequested => Ok(()),
            VetoLookup::Unsupported { flag } => {
                self.logger.advisory(&format!(
                    "no quality annotations available; skipping veto check for '{}'",
                    flag
                ));
                Ok(())
            }
            VetoLookup::Unresolved { flag } => {
                self.logger
                    .advisory(&format!("flag '{}' not found; skipping veto check", flag));
                Ok(())
            }
            VetoLookup::Resolved { flag, segments } => {
                let Some(span) = series.span() else {
                    return Ok(());
                };
                match segments.first_overlap(&span) {
                    Some(active) => Err(StageError::VetoActive {
                        flag: flag.clone(),
                        active,
                        series: span,
                    }),
                    None => Ok(()),
                }
            }
        }
    }
}

fn check_continuity(series: &RawSeries) -> StageResult<()> {
    let expected = 1.0 / series.sample_rate();
    let times = series.times();
    for (index, pair) in times.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        if ((gap - expected) / expected).abs() > SPACING_TOLERANCE {
            return Err(StageError::Discontinuity {
                index,
                time: pair[0],
                gap,
                expected,
            });
        }
    }
    Ok(())
}

impl ProcessingStage for Validator {
    type Input = RawSeries;
    type Output = SampledSeries;

    fn completes(&self) -> SensorState {
        SensorState::Validated
    }

    fn execute(&self, input: RawSeries) -> StageResult<SampledSeries> {
        self.validate(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::quality::SegmentList;
    use crate::time::{GpsTime, TimeSpan};

    fn uniform(rate: f64, len: usize) -> RawSeries {
        RawSeries::uniform(GpsTime::from_seconds(1000.0), rate, vec![0.5; len])
    }

    #[test]
    fn disallowed_rates_always_mismatch() {
        let validator = Validator::new(&[4096.0, 16384.0], VetoLookup::NotRequested);
        for rate in [1.0, 2048.0, 4095.0, 4096.5, 8192.0, 32768.0] {
            let err = validator.validate(uniform(rate, 16)).unwrap_err();
            assert_eq!(err.kind(), "SampleRateMismatch", "rate {}", rate);
        }
    }

    #[test]
    fn uniform_series_passes() {
        let validator = Validator::new(&[4096.0], VetoLookup::NotRequested);
        let series = validator.validate(uniform(4096.0, 8192)).unwrap();
        assert_eq!(series.len(), 8192);
        assert_eq!(series.start(), GpsTime::from_seconds(1000.0));
        assert_eq!(series.duration(), 2.0);
    }

    #[test]
    fn deleting_interior_sample_is_discontinuity() {
        let validator = Validator::new(&[4096.0], VetoLookup::NotRequested);
        let raw = uniform(4096.0, 4096);
        let mut samples = raw.samples().to_vec();
        let mut times = raw.times().to_vec();
        samples.remove(1234);
        times.remove(1234);
        let gapped = RawSeries::new(samples, times, 4096.0).unwrap();
        match validator.validate(gapped).unwrap_err() {
            StageError::Discontinuity { index, .. } => assert_eq!(index, 1233),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn active_veto_over_span_fails() {
        let veto = VetoLookup::Resolved {
            flag: "CBC_CAT2".into(),
            segments: SegmentList::new(vec![TimeSpan::centered(
                GpsTime::from_seconds(1000.5),
                10.0,
            )]),
        };
        let validator = Validator::new(&[4096.0], veto);
        let err = validator.validate(uniform(4096.0, 4096)).unwrap_err();
        assert_eq!(err.kind(), "VetoActive");
    }

    #[test]
    fn veto_outside_span_passes() {
        let veto = VetoLookup::Resolved {
            flag: "CBC_CAT2".into(),
            segments: SegmentList::new(vec![TimeSpan::centered(
                GpsTime::from_seconds(900.0),
                10.0,
            )]),
        };
        let validator = Validator::new(&[4096.0], veto);
        assert!(validator.validate(uniform(4096.0, 4096)).is_ok());
    }

    #[test]
    fn missing_annotations_are_advisory_only() {
        for veto in [
            VetoLookup::Unsupported {
                flag: "CBC_CAT2".into(),
            },
            VetoLookup::Unresolved {
                flag: "CBC_CAT2".into(),
            },
        ] {
            let validator = Validator::new(&[4096.0], veto);
            assert!(validator.validate(uniform(4096.0, 64)).is_ok());
        }
    }
}
