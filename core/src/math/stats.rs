pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Index of the largest value; ties go to the lowest index.
    pub fn argmax(values: impl IntoIterator<Item = f64>) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, value) in values.into_iter().enumerate() {
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((idx, value)),
            }
        }
        best
    }

    pub fn all_finite(samples: &[f64]) -> bool {
        samples.iter().all(|v| v.is_finite())
    }
}
