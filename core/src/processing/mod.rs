pub mod coincidence;
pub mod matched_filter;
pub mod peak;
pub mod preprocess;
pub mod psd;
pub mod template;
pub mod validator;

pub use coincidence::CoincidenceEvaluator;
pub use matched_filter::MatchedFilterEngine;
pub use peak::{find_peak, Peak, PeakDetector, PeakWindow};
pub use preprocess::{ConditionedSeries, PreprocessConfig, Preprocessor};
pub use psd::NoisePowerSpectrum;
pub use template::{Approximant, TemplateGenerator, TemplateParams, WaveformTemplate};
pub use validator::Validator;
