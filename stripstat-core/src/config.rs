//! Analysis configuration.

use crate::cluster::ClusteringConfig;
use crate::error::{Error, Result};
use crate::window::PartitionWindow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time structure of the readout and of the signal search.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimingConfig {
    /// Length of the raw readout window (ns).
    pub raw_window_ns: f64,
    /// Hits earlier than this are discarded (ns).
    pub dead_time_ns: f64,
    /// Bin width of the per-region time histogram (ns).
    pub bin_width_ns: f64,
    /// Half width of the initial peak search window (ns).
    pub initial_half_width_ns: f64,
    /// Signal window half width in units of the fitted sigma.
    pub window_sigmas: f64,
    /// Minimum filled bins for the Gaussian fit to be trusted.
    pub min_fit_bins: usize,
    /// Start of the control window (ns); `None` places it right after the
    /// dead-time cut.
    pub control_window_start_ns: Option<f64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            raw_window_ns: 24_000.0,
            dead_time_ns: 100.0,
            bin_width_ns: 1.0,
            initial_half_width_ns: 40.0,
            window_sigmas: 3.0,
            min_fit_bins: 5,
            control_window_start_ns: None,
        }
    }
}

impl TimingConfig {
    /// Checks the parameters for consistency.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("raw_window_ns", self.raw_window_ns),
            ("bin_width_ns", self.bin_width_ns),
            ("initial_half_width_ns", self.initial_half_width_ns),
            ("window_sigmas", self.window_sigmas),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.dead_time_ns.is_finite()
            && self.dead_time_ns >= 0.0
            && self.dead_time_ns < self.raw_window_ns)
        {
            return Err(Error::Config(format!(
                "dead_time_ns must lie in [0, {}), got {}",
                self.raw_window_ns, self.dead_time_ns
            )));
        }
        if let Some(start) = self.control_window_start_ns {
            if !(start.is_finite() && start >= self.dead_time_ns && start < self.raw_window_ns) {
                return Err(Error::Config(format!(
                    "control_window_start_ns must lie in [{}, {}), got {start}",
                    self.dead_time_ns, self.raw_window_ns
                )));
            }
        }
        Ok(())
    }

    /// Readout time usable for noise measurement once the dead-time cut and
    /// the signal window are removed (ns).
    #[must_use]
    pub fn background_duration_ns(&self, signal: &PartitionWindow) -> f64 {
        let usable = self.raw_window_ns - self.dead_time_ns;
        let overlap = if signal.is_empty() {
            0.0
        } else {
            (signal.stop_ns().min(self.raw_window_ns) - signal.start_ns().max(self.dead_time_ns))
                .max(0.0)
        };
        (usable - overlap).max(0.0)
    }

    /// Control window of the same width as `signal`, placed where no signal
    /// is expected.
    ///
    /// The window starts at `control_window_start_ns` (or the dead-time cut).
    /// If that overlaps the signal window or runs past the readout it is
    /// moved right after the signal window, or right before it. The result
    /// always lies in `[dead_time_ns, raw_window_ns]`: when neither side of
    /// the signal window has room for the full width, the larger free gap is
    /// used and the control window comes out narrower than `signal`.
    #[must_use]
    pub fn control_window(&self, signal: &PartitionWindow) -> PartitionWindow {
        if signal.is_empty() {
            return PartitionWindow::empty();
        }
        let half = signal.half_width_ns;
        let fits = |w: &PartitionWindow| {
            w.start_ns() >= self.dead_time_ns && w.stop_ns() <= self.raw_window_ns
        };
        let start = self.control_window_start_ns.unwrap_or(self.dead_time_ns);
        let candidate = PartitionWindow::new(start + half, half);
        if fits(&candidate) && !candidate.overlaps(signal) {
            return candidate;
        }
        let after = PartitionWindow::new(signal.stop_ns() + half, half);
        if fits(&after) {
            return after;
        }
        let before = PartitionWindow::new(signal.start_ns() - half, half);
        if fits(&before) {
            return before;
        }

        let gap_before = (
            self.dead_time_ns,
            signal.start_ns().clamp(self.dead_time_ns, self.raw_window_ns),
        );
        let gap_after = (
            signal.stop_ns().clamp(self.dead_time_ns, self.raw_window_ns),
            self.raw_window_ns,
        );
        let (lo, hi) = if gap_after.1 - gap_after.0 > gap_before.1 - gap_before.0 {
            gap_after
        } else {
            gap_before
        };
        let half = ((hi - lo) / 2.0).max(0.0);
        PartitionWindow::new(lo + half, half)
    }
}

/// Full analysis configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisConfig {
    /// Readout timing.
    pub timing: TimingConfig,
    /// Clustering parameters.
    pub clustering: ClusteringConfig,
    /// Strips per front-end chip.
    pub chip_size: u16,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            clustering: ClusteringConfig::default(),
            chip_size: 8,
        }
    }
}

impl AnalysisConfig {
    /// Sets the timing parameters.
    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Sets the clustering parameters.
    #[must_use]
    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }

    /// Sets the chip size.
    #[must_use]
    pub fn with_chip_size(mut self, chip_size: u16) -> Self {
        self.chip_size = chip_size;
        self
    }

    /// Checks the whole configuration.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;
        if !(self.clustering.cluster_time_ns.is_finite() && self.clustering.cluster_time_ns > 0.0) {
            return Err(Error::Config(format!(
                "cluster_time_ns must be positive, got {}",
                self.clustering.cluster_time_ns
            )));
        }
        if self.chip_size == 0 {
            return Err(Error::Config("chip_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_timing() {
        let timing = TimingConfig {
            dead_time_ns: 30_000.0,
            ..TimingConfig::default()
        };
        assert!(timing.validate().is_err());

        let timing = TimingConfig {
            bin_width_ns: 0.0,
            ..TimingConfig::default()
        };
        assert!(timing.validate().is_err());

        let config = AnalysisConfig::default().with_chip_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_background_duration() {
        let timing = TimingConfig {
            raw_window_ns: 1000.0,
            dead_time_ns: 100.0,
            ..TimingConfig::default()
        };
        let signal = PartitionWindow::new(300.0, 20.0);
        assert_relative_eq!(timing.background_duration_ns(&signal), 860.0);
        assert_relative_eq!(
            timing.background_duration_ns(&PartitionWindow::empty()),
            900.0
        );
        // Only the part after the dead-time cut is removed.
        let early = PartitionWindow::new(100.0, 20.0);
        assert_relative_eq!(timing.background_duration_ns(&early), 880.0);
    }

    #[test]
    fn test_control_window_placement() {
        let timing = TimingConfig {
            raw_window_ns: 1000.0,
            dead_time_ns: 100.0,
            ..TimingConfig::default()
        };
        let signal = PartitionWindow::new(300.0, 20.0);
        let control = timing.control_window(&signal);
        assert_relative_eq!(control.start_ns(), 100.0);
        assert_relative_eq!(control.width_ns(), 40.0);

        let early_signal = PartitionWindow::new(110.0, 20.0);
        let moved = timing.control_window(&early_signal);
        assert_relative_eq!(moved.start_ns(), 130.0);
        assert!(!moved.overlaps(&early_signal));

        assert!(timing.control_window(&PartitionWindow::empty()).is_empty());
    }

    #[test]
    fn test_control_window_before_signal() {
        let timing = TimingConfig {
            raw_window_ns: 1000.0,
            dead_time_ns: 100.0,
            control_window_start_ns: Some(800.0),
            ..TimingConfig::default()
        };
        let signal = PartitionWindow::new(900.0, 60.0);
        let control = timing.control_window(&signal);
        assert_relative_eq!(control.start_ns(), 720.0);
        assert_relative_eq!(control.stop_ns(), 840.0);
    }

    #[test]
    fn test_control_window_stays_in_readout() {
        let timing = TimingConfig {
            raw_window_ns: 1000.0,
            dead_time_ns: 100.0,
            ..TimingConfig::default()
        };
        // Signal covers [130, 990]: 30 ns free before it, 10 ns after.
        let signal = PartitionWindow::new(560.0, 430.0);
        let control = timing.control_window(&signal);
        assert_relative_eq!(control.start_ns(), 100.0);
        assert_relative_eq!(control.stop_ns(), 130.0);
        assert!(!control.overlaps(&signal));

        // No free readout at all.
        let covering = PartitionWindow::new(550.0, 450.0);
        let control = timing.control_window(&covering);
        assert!(control.is_empty());
        assert!(control.start_ns() >= 100.0 && control.stop_ns() <= 1000.0);
    }
}
