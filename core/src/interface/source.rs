use crate::interface::quality::{SegmentList, VetoLookup};
use crate::prelude::StageResult;
use crate::series::RawSeries;
use crate::time::GpsTime;

/// Capabilities a data source declares up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCapabilities {
    pub quality_annotations: bool,
}

/// Input collaborator: delivers raw sensor data already acquired elsewhere.
pub trait StrainSource: Send + Sync {
    fn fetch(&self, sensor: &str, center: GpsTime, half_window: f64) -> StageResult<RawSeries>;

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::default()
    }

    /// Active segments of `flag` for `sensor`, if the source knows the flag.
    fn lookup_flag(&self, _sensor: &str, _flag: &str) -> Option<SegmentList> {
        None
    }
}

impl VetoLookup {
    pub fn resolve(
        source: &dyn StrainSource,
        capabilities: SourceCapabilities,
        sensor: &str,
        flag: Option<&str>,
    ) -> VetoLookup {
        let Some(flag) = flag else {
            return VetoLookup::NotRequested;
        };
        if !capabilities.quality_annotations {
            return VetoLookup::Unsupported { flag: flag.into() };
        }
        match source.lookup_flag(sensor, flag) {
            Some(segments) => VetoLookup::Resolved {
                flag: flag.into(),
                segments,
            },
            None => VetoLookup::Unresolved { flag: flag.into() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeSpan;

    struct Annotated;

    impl StrainSource for Annotated {
        fn fetch(&self, _: &str, center: GpsTime, _: f64) -> StageResult<RawSeries> {
            Ok(RawSeries::uniform(center, 1.0, vec![0.0]))
        }

        fn capabilities(&self) -> SourceCapabilities {
            SourceCapabilities {
                quality_annotations: true,
            }
        }

        fn lookup_flag(&self, _: &str, flag: &str) -> Option<SegmentList> {
            (flag == "CAT2").then(|| {
                SegmentList::new(vec![TimeSpan::centered(GpsTime::from_seconds(0.0), 1.0)])
            })
        }
    }

    #[test]
    fn resolve_covers_every_lookup_path() {
        let source = Annotated;
        let caps = source.capabilities();
        assert_eq!(
            VetoLookup::resolve(&source, caps, "A", None),
            VetoLookup::NotRequested
        );
        assert!(matches!(
            VetoLookup::resolve(&source, caps, "A", Some("CAT2")),
            VetoLookup::Resolved { .. }
        ));
        assert!(matches!(
            VetoLookup::resolve(&source, caps, "A", Some("CAT3")),
            VetoLookup::Unresolved { .. }
        ));
        assert!(matches!(
            VetoLookup::resolve(&source, SourceCapabilities::default(), "A", Some("CAT2")),
            VetoLookup::Unsupported { .. }
        ));
    }
}
