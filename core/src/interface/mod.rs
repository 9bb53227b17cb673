pub mod detection;
pub mod quality;
pub mod source;

pub use detection::{CoincidenceResult, DetectionResult};
pub use quality::{SegmentList, VetoLookup};
pub use source::{SourceCapabilities, StrainSource};
