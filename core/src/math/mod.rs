pub mod fft;
pub mod stats;
pub mod window;

pub use fft::{bin_frequency, FftHelper};
pub use stats::StatsHelper;
