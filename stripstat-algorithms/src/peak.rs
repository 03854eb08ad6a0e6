//! Signal window estimation.
//!
//! For every region the hit times of a whole run are histogrammed. The
//! signal window is centered on the histogram mode, a flat background
//! measured outside the initial search window is subtracted and a Gaussian
//! is fitted inside it. The window becomes `mean ± window_sigmas * sigma`.
#![allow(clippy::cast_precision_loss)]

use crate::fit::{fit_gaussian, GaussianFit};
use rayon::prelude::*;
use std::collections::BTreeMap;
use stripstat_core::config::TimingConfig;
use stripstat_core::geometry::{ChannelMapping, Geometry, RegionId};
use stripstat_core::histogram::TimeHistogram;
use stripstat_core::hit::RawEvent;
use stripstat_core::window::{PartitionWindow, WindowSource};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-region time histograms filled over a run.
#[derive(Debug, Clone)]
pub struct TimeHistogramSet {
    histograms: BTreeMap<RegionId, TimeHistogram>,
    strip_counts: BTreeMap<RegionId, u16>,
}

impl TimeHistogramSet {
    /// Creates empty histograms for every region of `geometry`.
    #[must_use]
    pub fn new(geometry: &Geometry, timing: &TimingConfig) -> Self {
        let histograms = geometry
            .region_ids()
            .map(|id| {
                (
                    id,
                    TimeHistogram::new(timing.raw_window_ns, timing.bin_width_ns),
                )
            })
            .collect();
        let strip_counts = geometry
            .regions()
            .map(|region| (region.id, region.strip_count))
            .collect();
        Self {
            histograms,
            strip_counts,
        }
    }

    /// Adds the hits of one validated event. Unmapped channels, masked
    /// strips and strips beyond the region are ignored.
    pub fn fill_event<M: ChannelMapping + ?Sized>(&mut self, event: &RawEvent, mapping: &M) {
        for (channel, time_ns) in event.iter() {
            let Some((region, strip)) = mapping.map(channel) else {
                continue;
            };
            let in_range = self
                .strip_counts
                .get(&region)
                .is_some_and(|&count| (1..=count).contains(&strip));
            if !in_range || !mapping.is_active(region, strip) {
                continue;
            }
            if let Some(hist) = self.histograms.get_mut(&region) {
                hist.fill(time_ns);
            }
        }
    }

    /// Histogram of one region.
    #[must_use]
    pub fn get(&self, region: RegionId) -> Option<&TimeHistogram> {
        self.histograms.get(&region)
    }

    /// All histograms, keyed by region.
    #[must_use]
    pub fn histograms(&self) -> &BTreeMap<RegionId, TimeHistogram> {
        &self.histograms
    }

    /// Takes ownership of the histograms.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<RegionId, TimeHistogram> {
        self.histograms
    }
}

/// Estimated signal window with provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowEstimate {
    /// Accepted signal window.
    pub window: PartitionWindow,
    /// How the window was obtained.
    pub source: WindowSource,
    /// Histogram mode (bin center, ns).
    pub mode_ns: f64,
    /// Flat background subtracted per bin.
    pub background_per_bin: f64,
    /// Fit result, if the fit was used.
    pub fit: Option<GaussianFit>,
}

impl WindowEstimate {
    fn no_hits() -> Self {
        Self {
            window: PartitionWindow::empty(),
            source: WindowSource::NoHits,
            mode_ns: 0.0,
            background_per_bin: 0.0,
            fit: None,
        }
    }
}

/// Estimates the signal window of each region.
#[derive(Debug, Clone)]
pub struct PeakWindowEstimator {
    timing: TimingConfig,
}

impl PeakWindowEstimator {
    /// Create with the run's timing configuration.
    #[must_use]
    pub fn new(timing: TimingConfig) -> Self {
        Self { timing }
    }

    /// Estimates the window for one region's time histogram.
    #[must_use]
    pub fn estimate(&self, histogram: &TimeHistogram) -> WindowEstimate {
        let Some(mode_bin) = histogram.max_bin() else {
            return WindowEstimate::no_hits();
        };
        let mode_ns = histogram.bin_center(mode_bin);
        let half_width = self.timing.initial_half_width_ns;
        let search = PartitionWindow::new(mode_ns, half_width);

        let (outside_sum, outside_bins) = histogram
            .iter()
            .filter(|&(t, _)| t >= self.timing.dead_time_ns && !search.contains(t))
            .fold((0u64, 0usize), |(sum, n), (_, count)| (sum + count, n + 1));
        let background_per_bin = if outside_bins > 0 {
            outside_sum as f64 / outside_bins as f64
        } else {
            0.0
        };

        let fallback = WindowEstimate {
            window: search,
            source: WindowSource::Fallback,
            mode_ns,
            background_per_bin,
            fit: None,
        };

        let filled = histogram
            .iter()
            .filter(|&(t, count)| count > 0 && search.contains(t))
            .count();
        if filled < self.timing.min_fit_bins {
            log::warn!(
                "only {filled} filled bins around {mode_ns:.1} ns (need {}), using search window",
                self.timing.min_fit_bins
            );
            return fallback;
        }

        let fit = match fit_gaussian(
            histogram,
            search.start_ns()..=search.stop_ns(),
            background_per_bin,
        ) {
            Ok(fit) => fit,
            Err(err) => {
                log::warn!("peak fit around {mode_ns:.1} ns failed: {err}, using search window");
                return fallback;
            }
        };
        if !search.contains(fit.mean) {
            log::warn!(
                "fitted mean {:.1} ns outside search window around {mode_ns:.1} ns, using search window",
                fit.mean
            );
            return fallback;
        }

        WindowEstimate {
            window: PartitionWindow::new(fit.mean, self.timing.window_sigmas * fit.sigma),
            source: WindowSource::Fit,
            mode_ns,
            background_per_bin,
            fit: Some(fit),
        }
    }

    /// Estimates the windows of all regions in parallel.
    #[must_use]
    pub fn estimate_all(
        &self,
        histograms: &BTreeMap<RegionId, TimeHistogram>,
    ) -> BTreeMap<RegionId, WindowEstimate> {
        histograms
            .par_iter()
            .map(|(&region, hist)| {
                let estimate = self.estimate(hist);
                log::debug!(
                    "region {region}: window {:.1} ± {:.1} ns ({:?})",
                    estimate.window.center_ns,
                    estimate.window.half_width_ns,
                    estimate.source
                );
                (region, estimate)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use stripstat_core::geometry::{ChamberId, Region, StripMap};

    fn timing() -> TimingConfig {
        TimingConfig {
            raw_window_ns: 1000.0,
            dead_time_ns: 100.0,
            bin_width_ns: 1.0,
            ..TimingConfig::default()
        }
    }

    /// Gaussian peak at 400 ns (sigma 5) on a flat background of 4 per bin.
    fn peaked_histogram() -> TimeHistogram {
        let mut hist = TimeHistogram::new(1000.0, 1.0);
        for bin in 0..1000 {
            let t = f64::from(bin) + 0.5;
            let z = (t - 400.0) / 5.0;
            let signal = (300.0 * (-0.5 * z * z).exp()).round() as u64;
            for _ in 0..(signal + 4) {
                hist.fill(t);
            }
        }
        hist
    }

    #[test]
    fn test_window_from_fit() {
        let estimator = PeakWindowEstimator::new(timing());
        let estimate = estimator.estimate(&peaked_histogram());
        assert_eq!(estimate.source, WindowSource::Fit);
        assert_abs_diff_eq!(estimate.mode_ns, 400.5, epsilon = 1.0);
        assert_abs_diff_eq!(estimate.background_per_bin, 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(estimate.window.center_ns, 400.0, epsilon = 0.1);
        assert_abs_diff_eq!(estimate.window.half_width_ns, 15.0, epsilon = 0.3);
    }

    #[test]
    fn test_empty_region_collapses_window() {
        let estimator = PeakWindowEstimator::new(timing());
        let estimate = estimator.estimate(&TimeHistogram::new(1000.0, 1.0));
        assert_eq!(estimate.source, WindowSource::NoHits);
        assert_eq!(estimate.window, PartitionWindow::new(0.0, 0.0));
        assert!(estimate.fit.is_none());
    }

    #[test]
    fn test_single_bin_falls_back_to_search_window() {
        let mut hist = TimeHistogram::new(1000.0, 1.0);
        for _ in 0..50 {
            hist.fill(250.2);
        }
        let estimate = PeakWindowEstimator::new(timing()).estimate(&hist);
        assert_eq!(estimate.source, WindowSource::Fallback);
        assert_abs_diff_eq!(estimate.window.center_ns, 250.5);
        assert_abs_diff_eq!(estimate.window.half_width_ns, 40.0);
    }

    #[test]
    fn test_histogram_set_skips_masked_unmapped_and_out_of_range() {
        let geometry =
            Geometry::new([Region::new(RegionId(1), ChamberId(1), "A", 4, 1.0)]).unwrap();
        let mut mapping = StripMap::new();
        mapping.insert(10, RegionId(1), 1, true).unwrap();
        mapping.insert(11, RegionId(1), 2, false).unwrap();
        mapping.insert(12, RegionId(1), 5, true).unwrap();

        let mut set = TimeHistogramSet::new(&geometry, &timing());
        set.fill_event(
            &RawEvent::new(0, vec![10, 11, 12, 99], vec![300.0; 4]),
            &mapping,
        );
        assert_eq!(set.get(RegionId(1)).unwrap().entries(), 1);
    }

    #[test]
    fn test_estimate_all() {
        let mut histograms = BTreeMap::new();
        histograms.insert(RegionId(1), peaked_histogram());
        histograms.insert(RegionId(2), TimeHistogram::new(1000.0, 1.0));
        let windows = PeakWindowEstimator::new(timing()).estimate_all(&histograms);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[&RegionId(1)].source, WindowSource::Fit);
        assert_eq!(windows[&RegionId(2)].source, WindowSource::NoHits);
    }
}
