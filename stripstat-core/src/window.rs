//! Signal time windows.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Accepted signal-time interval of one region:
/// `[center_ns - half_width_ns, center_ns + half_width_ns]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionWindow {
    /// Window center (ns).
    pub center_ns: f64,
    /// Half width (ns).
    pub half_width_ns: f64,
}

impl PartitionWindow {
    /// Creates a window.
    #[must_use]
    pub fn new(center_ns: f64, half_width_ns: f64) -> Self {
        Self {
            center_ns,
            half_width_ns,
        }
    }

    /// Window that accepts nothing, used for regions without hits.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the window has zero width.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.half_width_ns <= 0.0
    }

    /// Lower edge (ns).
    #[inline]
    #[must_use]
    pub fn start_ns(&self) -> f64 {
        self.center_ns - self.half_width_ns
    }

    /// Upper edge (ns).
    #[inline]
    #[must_use]
    pub fn stop_ns(&self) -> f64 {
        self.center_ns + self.half_width_ns
    }

    /// Full width (ns).
    #[inline]
    #[must_use]
    pub fn width_ns(&self) -> f64 {
        2.0 * self.half_width_ns
    }

    /// Returns true if `time_ns` lies inside the window (edges included).
    #[inline]
    #[must_use]
    pub fn contains(&self, time_ns: f64) -> bool {
        !self.is_empty() && (time_ns - self.center_ns).abs() <= self.half_width_ns
    }

    /// Returns true if the two windows share a nonzero stretch of time.
    /// Windows that only touch at an edge do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start_ns() < other.stop_ns()
            && other.start_ns() < self.stop_ns()
    }
}

/// How a region's window was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WindowSource {
    /// Gaussian fit on the background-subtracted peak.
    Fit,
    /// Fit unusable; window centered on the histogram mode.
    Fallback,
    /// No hits in the region.
    NoHits,
}

/// Time partitions of one event used by the statistics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimePartition {
    /// Expected-signal window.
    Signal,
    /// Everything after the dead-time cut outside the signal window.
    Background,
    /// Signal-width window placed where no signal is expected.
    Control,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        let window = PartitionWindow::new(300.0, 15.0);
        assert!(window.contains(285.0));
        assert!(window.contains(315.0));
        assert!(!window.contains(315.1));
        assert!((window.width_ns() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_window_accepts_nothing() {
        let window = PartitionWindow::empty();
        assert!(window.is_empty());
        assert!(!window.contains(0.0));
    }

    #[test]
    fn test_window_overlap() {
        let a = PartitionWindow::new(100.0, 10.0);
        assert!(a.overlaps(&PartitionWindow::new(115.0, 10.0)));
        assert!(!a.overlaps(&PartitionWindow::new(130.0, 10.0)));
        // Touching at 110 ns.
        assert!(!a.overlaps(&PartitionWindow::new(120.0, 10.0)));
        assert!(!a.overlaps(&PartitionWindow::empty()));
    }
}
