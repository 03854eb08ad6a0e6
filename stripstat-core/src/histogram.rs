//! Histogram types used by the statistics engine.
//!
//! - [`Distribution`] - integer-valued distribution (multiplicities, cluster
//!   sizes) whose range grows on demand
//! - [`TimeHistogram`] - fixed-width time histogram over the readout window
//! - [`StripProfile`] - per-strip hit counts
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use crate::hit::StripId;
use std::ops::RangeInclusive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const DEFAULT_DISTRIBUTION_RANGE: usize = 16;

/// Integer-binned distribution with a dynamically growing upper bound.
///
/// Bin `i` counts fills with value `i`. Filling a value beyond the current
/// range grows the bin array geometrically; existing counts are kept
/// exactly where they were.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Distribution {
    counts: Vec<u64>,
    entries: u64,
}

impl Default for Distribution {
    fn default() -> Self {
        Self::with_range(DEFAULT_DISTRIBUTION_RANGE)
    }
}

impl Distribution {
    /// Creates an empty distribution covering values `0..upper`.
    #[must_use]
    pub fn with_range(upper: usize) -> Self {
        Self {
            counts: vec![0; upper.max(1)],
            entries: 0,
        }
    }

    /// Records one value.
    pub fn fill(&mut self, value: usize) {
        self.fill_n(value, 1);
    }

    /// Records `n` occurrences of a value.
    pub fn fill_n(&mut self, value: usize, n: u64) {
        if value >= self.counts.len() {
            self.grow(value);
        }
        self.counts[value] += n;
        self.entries += n;
    }

    fn grow(&mut self, value: usize) {
        let target = (value + 1)
            .next_power_of_two()
            .max(self.counts.len().saturating_mul(2));
        self.counts.resize(target, 0);
    }

    /// Current exclusive upper bound of the bin range.
    #[must_use]
    pub fn upper_bound(&self) -> usize {
        self.counts.len()
    }

    /// Count in the bin for `value` (0 outside the range).
    #[must_use]
    pub fn bin(&self, value: usize) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// Number of fills.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Returns true if nothing was filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Sum of bin contents, optionally restricted to a value range.
    #[must_use]
    pub fn integral(&self, range: Option<RangeInclusive<usize>>) -> u64 {
        match range {
            None => self.counts.iter().sum(),
            Some(range) => {
                let start = *range.start();
                let end = (*range.end()).min(self.counts.len().saturating_sub(1));
                if start > end {
                    return 0;
                }
                self.counts[start..=end].iter().sum()
            }
        }
    }

    /// Mean value, 0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.entries == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .iter()
            .map(|(value, count)| value as f64 * count as f64)
            .sum();
        sum / self.entries as f64
    }

    /// Standard deviation (population), 0 when empty.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.entries == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq: f64 = self
            .iter()
            .map(|(value, count)| {
                let d = value as f64 - mean;
                d * d * count as f64
            })
            .sum();
        (sum_sq / self.entries as f64).sqrt()
    }

    /// Standard error of the mean, 0 when empty.
    #[must_use]
    pub fn mean_error(&self) -> f64 {
        if self.entries == 0 {
            return 0.0;
        }
        self.std_dev() / (self.entries as f64).sqrt()
    }

    /// Adds all counts of `other`.
    pub fn merge(&mut self, other: &Self) {
        for (value, count) in other.iter() {
            self.fill_n(value, count);
        }
    }

    /// Iterates over non-empty bins as `(value, count)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(v, &c)| (v, c))
    }

    /// Raw bin contents.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }
}

/// Fixed bin width time histogram over `[0, range_ns)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeHistogram {
    counts: Vec<u64>,
    bin_width_ns: f64,
    range_ns: f64,
    underflow: u64,
    overflow: u64,
}

impl TimeHistogram {
    /// Creates an empty histogram. The number of bins is
    /// `ceil(range_ns / bin_width_ns)`.
    #[must_use]
    pub fn new(range_ns: f64, bin_width_ns: f64) -> Self {
        let n_bins = if bin_width_ns > 0.0 && range_ns > 0.0 {
            (range_ns / bin_width_ns).ceil() as usize
        } else {
            0
        };
        Self {
            counts: vec![0; n_bins],
            bin_width_ns,
            range_ns,
            underflow: 0,
            overflow: 0,
        }
    }

    /// Bin index for a time, if inside the range.
    #[inline]
    #[must_use]
    pub fn bin_of(&self, time_ns: f64) -> Option<usize> {
        if time_ns.is_nan() || time_ns < 0.0 {
            return None;
        }
        let bin = (time_ns / self.bin_width_ns) as usize;
        (bin < self.counts.len()).then_some(bin)
    }

    /// Records one hit time.
    pub fn fill(&mut self, time_ns: f64) {
        match self.bin_of(time_ns) {
            Some(bin) => self.counts[bin] += 1,
            None if time_ns < 0.0 => self.underflow += 1,
            None => self.overflow += 1,
        }
    }

    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if the histogram has no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Bin width (ns).
    #[must_use]
    pub fn bin_width_ns(&self) -> f64 {
        self.bin_width_ns
    }

    /// Upper edge of the histogram range (ns).
    #[must_use]
    pub fn range_ns(&self) -> f64 {
        self.range_ns
    }

    /// Center time of a bin (ns).
    #[inline]
    #[must_use]
    pub fn bin_center(&self, bin: usize) -> f64 {
        (bin as f64 + 0.5) * self.bin_width_ns
    }

    /// Content of a bin.
    #[must_use]
    pub fn content(&self, bin: usize) -> u64 {
        self.counts.get(bin).copied().unwrap_or(0)
    }

    /// In-range entries.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Entries outside `[0, range_ns)`.
    #[must_use]
    pub fn out_of_range(&self) -> u64 {
        self.underflow + self.overflow
    }

    /// Bin with maximum content (lowest index on ties), `None` when empty.
    #[must_use]
    pub fn max_bin(&self) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (bin, &count) in self.counts.iter().enumerate() {
            if count > 0 && best.is_none_or(|(_, c)| count > c) {
                best = Some((bin, count));
            }
        }
        best.map(|(bin, _)| bin)
    }

    /// Iterates over `(bin_center_ns, content)` for every bin.
    pub fn iter(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(bin, &count)| (self.bin_center(bin), count))
    }

    /// Adds all counts of a histogram with the same binning.
    ///
    /// Histograms with different binning are left untouched and `false`
    /// is returned.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.counts.len() != other.counts.len()
            || (self.bin_width_ns - other.bin_width_ns).abs() > f64::EPSILON
        {
            return false;
        }
        for (dst, src) in self.counts.iter_mut().zip(&other.counts) {
            *dst += src;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        true
    }
}

/// Per-strip hit counts for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripProfile {
    counts: Vec<u64>,
}

impl StripProfile {
    /// Creates an empty profile for strips `1..=strip_count`.
    #[must_use]
    pub fn new(strip_count: StripId) -> Self {
        Self {
            counts: vec![0; usize::from(strip_count)],
        }
    }

    /// Records a hit; strips outside the profile are ignored and `false`
    /// is returned.
    pub fn fill(&mut self, strip: StripId) -> bool {
        match usize::from(strip)
            .checked_sub(1)
            .and_then(|i| self.counts.get_mut(i))
        {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    /// Count for one strip (0 outside the profile).
    #[must_use]
    pub fn count(&self, strip: StripId) -> u64 {
        usize::from(strip)
            .checked_sub(1)
            .and_then(|i| self.counts.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Number of strips.
    #[must_use]
    pub fn strip_count(&self) -> usize {
        self.counts.len()
    }

    /// Sum over all strips.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Iterates over `(strip, count)` for every strip.
    pub fn iter(&self) -> impl Iterator<Item = (StripId, u64)> + '_ {
        (1..=StripId::MAX).zip(self.counts.iter().copied())
    }
}
