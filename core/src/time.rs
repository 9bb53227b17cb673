use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// Absolute epoch in seconds. Converted once at ingestion; every stage
/// downstream works in this representation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpsTime(f64);

impl GpsTime {
    pub const fn from_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    pub fn min(self, other: Self) -> Self {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }

    pub fn max(self, other: Self) -> Self {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl Add<f64> for GpsTime {
    type Output = GpsTime;

    fn add(self, seconds: f64) -> GpsTime {
        GpsTime(self.0 + seconds)
    }
}

impl Sub<f64> for GpsTime {
    type Output = GpsTime;

    fn sub(self, seconds: f64) -> GpsTime {
        GpsTime(self.0 - seconds)
    }
}

impl Sub for GpsTime {
    type Output = f64;

    fn sub(self, other: GpsTime) -> f64 {
        self.0 - other.0
    }
}

impl fmt::Display for GpsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Half-open interval `[start, end)` of absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: GpsTime,
    pub end: GpsTime,
}

impl TimeSpan {
    pub fn new(start: GpsTime, end: GpsTime) -> Self {
        Self { start, end }
    }

    pub fn from_duration(start: GpsTime, duration: f64) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    /// Symmetric span around `center`.
    pub fn centered(center: GpsTime, half_width: f64) -> Self {
        Self {
            start: center - half_width,
            end: center + half_width,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end.partial_cmp(&self.start) != Some(Ordering::Greater)
    }

    pub fn contains(&self, time: GpsTime) -> bool {
        time >= self.start && time < self.end
    }

    pub fn covers(&self, other: &TimeSpan) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersect(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let span = TimeSpan::new(self.start.max(other.start), self.end.min(other.end));
        if span.is_empty() {
            None
        } else {
            Some(span)
        }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_overlap_is_half_open() {
        let a = TimeSpan::new(GpsTime::from_seconds(0.0), GpsTime::from_seconds(1.0));
        let b = TimeSpan::new(GpsTime::from_seconds(1.0), GpsTime::from_seconds(2.0));
        assert!(!a.overlaps(&b));
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn centered_span_has_expected_duration() {
        let span = TimeSpan::centered(GpsTime::from_seconds(1000.0), 4.0);
        assert_eq!(span.duration(), 8.0);
        assert!(span.contains(GpsTime::from_seconds(996.0)));
        assert!(!span.contains(GpsTime::from_seconds(1004.0)));
    }
}
