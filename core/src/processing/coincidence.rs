use crate::interface::detection::{CoincidenceResult, DetectionResult};

/// Compares peak arrival times of two sensors against a tolerance.
#[derive(Debug, Clone, Copy)]
pub struct CoincidenceEvaluator {
    tolerance: f64,
}

impl CoincidenceEvaluator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn evaluate(
        &self,
        a: Option<&DetectionResult>,
        b: Option<&DetectionResult>,
    ) -> Option<CoincidenceResult> {
        evaluate(a, b, self.tolerance)
    }
}

/// `None` when either sensor has no result; otherwise the absolute peak
/// time difference and whether it is within `tolerance`.
pub fn evaluate(
    a: Option<&DetectionResult>,
    b: Option<&DetectionResult>,
    tolerance: f64,
) -> Option<CoincidenceResult> {
    let (a, b) = (a?, b?);
    let delta_t = (a.peak_time - b.peak_time).abs();
    Some(CoincidenceResult {
        delta_t,
        coincident: delta_t <= tolerance,
    })
}
