use crate::time::TimeSpan;
use serde::{Deserialize, Serialize};

/// Active intervals of a named quality flag, kept sorted by start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentList {
    segments: Vec<TimeSpan>,
}

impl SegmentList {
    pub fn new(mut segments: Vec<TimeSpan>) -> Self {
        segments.retain(|span| !span.is_empty());
        segments.sort_by(|a, b| a.start.seconds().total_cmp(&b.start.seconds()));
        Self { segments }
    }

    pub fn segments(&self) -> &[TimeSpan] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First active interval that overlaps `span`.
    pub fn first_overlap(&self, span: &TimeSpan) -> Option<TimeSpan> {
        self.segments.iter().copied().find(|seg| seg.overlaps(span))
    }
}

/// Outcome of resolving the configured veto flag against a data source.
/// Resolved once per sensor before validation starts.
#[derive(Debug, Clone, PartialEq)]
pub enum VetoLookup {
    /// No veto flag configured.
    NotRequested,
    /// The source does not carry quality annotations at all.
    Unsupported { flag: String },
    /// Annotations exist but the flag name is unknown to the source.
    Unresolved { flag: String },
    Resolved { flag: String, segments: SegmentList },
}
