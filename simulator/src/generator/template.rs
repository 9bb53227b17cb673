use std::f64::consts::PI;
use transientcore::processing::WaveformTemplate;

/// Power-line style sinusoid sampled at `rate`, phase-locked to absolute time
/// so that adjacent fetches line up.
pub fn line_interference(
    start_seconds: f64,
    length: usize,
    rate: f64,
    frequency: f64,
    amplitude: f64,
) -> Vec<f64> {
    (0..length)
        .map(|i| {
            let t = start_seconds + i as f64 / rate;
            amplitude * (2.0 * PI * frequency * t.rem_euclid(1.0)).sin()
        })
        .collect()
}

/// Adds `template`, scaled to a peak of `amplitude`, so that its reference
/// sample lands on index `at`. Samples falling outside `samples` are dropped.
pub fn inject(samples: &mut [f64], template: &WaveformTemplate, at: i64, amplitude: f64) {
    let waveform = template.series().samples();
    let peak = waveform
        .get(template.reference_index())
        .map(|v| v.abs())
        .unwrap_or(0.0);
    if peak == 0.0 {
        return;
    }
    let offset = at - template.reference_index() as i64;
    for (j, value) in waveform.iter().enumerate() {
        let idx = offset + j as i64;
        if idx >= 0 && (idx as usize) < samples.len() {
            samples[idx as usize] += amplitude * value / peak;
        }
    }
}
