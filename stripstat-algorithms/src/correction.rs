//! Noise-corrected detector metrics.
//!
//! Efficiency is deconvolved from the fake-coincidence probability
//! measured in the control window:
//!
//! `P_signal = (P_peak - P_fake) / (1 - P_fake)`
//!
//! Cluster size and multiplicity are corrected with the fractions of
//! signal-only, background-only and mixed events, and noise rates are
//! normalised by event count, background duration and strip area.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::unused_self
)]

use crate::aggregator::{RegionStatistics, WindowStatistics};
use crate::peak::WindowEstimate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use stripstat_core::config::AnalysisConfig;
use stripstat_core::geometry::{ChamberId, ChannelMapping, Geometry, Region, RegionId};
use stripstat_core::histogram::Distribution;
use stripstat_core::metrics::{ChamberSummary, CorrectedMetrics, NoiseProfile};
use stripstat_core::window::WindowSource;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const NS_PER_S: f64 = 1e9;

/// A value with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Central value.
    pub value: f64,
    /// Uncertainty.
    pub error: f64,
}

impl Measurement {
    /// Creates a measurement.
    #[must_use]
    pub fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }

    /// Mean of a distribution with its standard error.
    #[must_use]
    pub fn mean_of(dist: &Distribution) -> Self {
        Self::new(dist.mean(), dist.mean_error())
    }

    /// Relative uncertainty, 0 for a zero value.
    #[must_use]
    pub fn relative_error(&self) -> f64 {
        ratio(self.error, self.value.abs())
    }
}

/// `num / den`, or 0 when the denominator vanishes.
#[inline]
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Binomial probability `k / n` with error `sqrt(p (1 - p) / n)`.
#[must_use]
pub fn binomial(successes: u64, trials: u64) -> Measurement {
    if trials == 0 {
        return Measurement::default();
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    Measurement::new(p, binomial_error(p, n))
}

#[inline]
fn binomial_error(p: f64, n: f64) -> f64 {
    if n <= 0.0 {
        0.0
    } else {
        (p * (1.0 - p) / n).max(0.0).sqrt()
    }
}

/// True detection probability `(P_peak - P_fake) / (1 - P_fake)`, with its
/// binomial error over `trials` events. Undefined cases give 0.
#[must_use]
pub fn deconvolve_efficiency(peak: Measurement, fake: Measurement, trials: u64) -> Measurement {
    let p = ratio(peak.value - fake.value, 1.0 - fake.value);
    Measurement::new(p, binomial_error(p, trials as f64))
}

/// Fractions of detected events containing signal only, background only,
/// and both.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalFractions {
    /// Signal only: `P_signal (1 - P_fake) / P_peak`.
    pub signal: Measurement,
    /// Background only: `P_fake (1 - P_signal) / P_peak`.
    pub fake: Measurement,
    /// Both: `P_signal P_fake / P_peak`.
    pub both: Measurement,
}

/// Splits the detected events into signal-only, background-only and mixed
/// fractions. Errors add relative contributions to first order.
#[must_use]
pub fn signal_fractions(
    peak: Measurement,
    fake: Measurement,
    signal: Measurement,
) -> SignalFractions {
    let p_peak_rel = peak.relative_error();
    let p_signal_rel = signal.relative_error();
    let p_fake_rel = fake.relative_error();
    let not_fake_rel = ratio(fake.error, (1.0 - fake.value).abs());
    let not_signal_rel = ratio(signal.error, (1.0 - signal.value).abs());

    let f_signal = ratio(signal.value * (1.0 - fake.value), peak.value);
    let f_fake = ratio(fake.value * (1.0 - signal.value), peak.value);
    let f_both = ratio(signal.value * fake.value, peak.value);

    SignalFractions {
        signal: Measurement::new(
            f_signal,
            f_signal.abs() * (p_signal_rel + not_fake_rel + p_peak_rel),
        ),
        fake: Measurement::new(
            f_fake,
            f_fake.abs() * (p_fake_rel + not_signal_rel + p_peak_rel),
        ),
        both: Measurement::new(f_both, f_both.abs() * (p_signal_rel + p_fake_rel + p_peak_rel)),
    }
}

/// Signal cluster size
/// `(CS_peak - CS_fake (F_fake + F_both/2)) / (F_signal + F_both/2)`.
#[must_use]
pub fn corrected_cluster_size(
    peak: Measurement,
    fake: Measurement,
    fractions: &SignalFractions,
) -> Measurement {
    let fake_weight = fractions.fake.value + fractions.both.value / 2.0;
    let fake_weight_error = fractions.fake.error + fractions.both.error / 2.0;
    let signal_weight = fractions.signal.value + fractions.both.value / 2.0;
    let signal_weight_error = fractions.signal.error + fractions.both.error / 2.0;

    let numerator = peak.value - fake.value * fake_weight;
    let numerator_error =
        peak.error + fake.error * fake_weight.abs() + fake.value.abs() * fake_weight_error;

    let value = ratio(numerator, signal_weight);
    let relative = ratio(numerator_error, numerator.abs())
        + ratio(signal_weight_error, signal_weight.abs());
    Measurement::new(value, value.abs() * relative)
}

/// Signal cluster multiplicity
/// `CM_peak - CM_background * (peak_width / background_width)`.
#[must_use]
pub fn corrected_multiplicity(
    peak: Measurement,
    background: Measurement,
    peak_width_ns: f64,
    background_width_ns: f64,
) -> Measurement {
    let scale = ratio(peak_width_ns, background_width_ns);
    Measurement::new(
        peak.value - background.value * scale,
        peak.error + background.error * scale,
    )
}

/// Uniformity score `exp(-stddev / mean)` in (0, 1]; 0 when the mean is 0
/// or there are no values.
#[must_use]
pub fn homogeneity(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (-variance.sqrt() / mean).exp()
}

/// Probabilities behind the efficiency estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EfficiencyEstimate {
    /// Detection probability in the signal window.
    pub peak: Measurement,
    /// Detection probability in the control window.
    pub fake: Measurement,
    /// Deconvolved signal probability.
    pub signal: Measurement,
    /// Event composition fractions.
    pub fractions: SignalFractions,
}

/// Final results for one region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionReport {
    /// Region identifier.
    pub region: RegionId,
    /// Chamber of the region.
    pub chamber: ChamberId,
    /// Region name.
    pub name: String,
    /// Region area (cm²).
    pub area_cm2: f64,
    /// Signal window estimate.
    pub window: WindowEstimate,
    /// Corrected metrics.
    pub metrics: CorrectedMetrics,
    /// Noise rates per strip and chip.
    pub noise: NoiseProfile,
    /// Efficiency ingredients.
    pub efficiency: EfficiencyEstimate,
    /// Raw distributions for external serialization.
    pub statistics: RegionStatistics,
}

/// Turns accumulated statistics into corrected metrics.
#[derive(Debug, Clone)]
pub struct CorrectionEngine<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> CorrectionEngine<'a> {
    /// Create with the run's configuration.
    #[must_use]
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Efficiency ingredients from the signal and control windows.
    #[must_use]
    pub fn efficiency(
        &self,
        signal: &WindowStatistics,
        control: &WindowStatistics,
    ) -> EfficiencyEstimate {
        let trials = signal.events;
        let peak = binomial(signal.detected, trials);
        let fake = binomial(control.detected, control.events);
        let p_signal = deconvolve_efficiency(peak, fake, trials);
        EfficiencyEstimate {
            peak,
            fake,
            signal: p_signal,
            fractions: signal_fractions(peak, fake, p_signal),
        }
    }

    /// Per-strip, per-chip and mean noise rates.
    #[must_use]
    pub fn noise_profile<M: ChannelMapping + ?Sized>(
        &self,
        region: &Region,
        stats: &RegionStatistics,
        mapping: &M,
    ) -> NoiseProfile {
        let duration_s = self.config.timing.background_duration_ns(&stats.window) / NS_PER_S;
        let exposure = stats.events() as f64 * duration_s * region.strip_area_cm2;

        let mut profile = NoiseProfile::default();
        let mut active_rates = Vec::new();
        let mut active_counts = 0u64;
        let mut masked_sum = 0.0;
        for (strip, count) in stats.noise_profile.iter() {
            let rate = ratio(count as f64, exposure);
            profile.strip_rates.push(rate);
            if mapping.is_active(region.id, strip) {
                active_rates.push(rate);
                active_counts += count;
            } else {
                profile.masked_strips.push(strip);
                masked_sum += rate;
            }
        }
        profile.masked_rate = ratio(masked_sum, profile.masked_strips.len() as f64);

        let n_active = active_rates.len() as f64;
        profile.mean_rate = ratio(active_rates.iter().sum(), n_active);
        profile.rate_error = ratio((active_counts as f64).sqrt(), exposure * n_active);
        profile.strip_homogeneity = homogeneity(&active_rates);

        let chip_size = usize::from(self.config.chip_size.max(1));
        let mut active_chip_rates = Vec::new();
        for (chip, rates) in profile.strip_rates.chunks(chip_size).enumerate() {
            let (sum, n) = rates
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    let strip = (chip * chip_size + i + 1) as u16;
                    mapping.is_active(region.id, strip)
                })
                .fold((0.0, 0usize), |(sum, n), (_, rate)| (sum + rate, n + 1));
            let chip_rate = ratio(sum, n as f64);
            profile.chip_rates.push(chip_rate);
            if n > 0 {
                active_chip_rates.push(chip_rate);
            }
        }
        profile.chip_homogeneity = homogeneity(&active_chip_rates);
        profile
    }

    /// Computes the report of one region.
    #[must_use]
    pub fn correct<M: ChannelMapping + ?Sized>(
        &self,
        region: &Region,
        estimate: WindowEstimate,
        stats: RegionStatistics,
        mapping: &M,
    ) -> RegionReport {
        let efficiency = self.efficiency(&stats.signal, &stats.control);
        let noise = self.noise_profile(region, &stats, mapping);

        let cluster_size = corrected_cluster_size(
            Measurement::mean_of(&stats.signal.cluster_size),
            Measurement::mean_of(&stats.control.cluster_size),
            &efficiency.fractions,
        );
        let multiplicity = corrected_multiplicity(
            Measurement::mean_of(&stats.signal.cluster_multiplicity),
            Measurement::mean_of(&stats.background.cluster_multiplicity),
            stats.window.width_ns(),
            self.config.timing.background_duration_ns(&stats.window),
        );

        let noise_cluster_size = Measurement::mean_of(&stats.background.cluster_size);
        let cluster_rate = ratio(noise.mean_rate, noise_cluster_size.value);
        let cluster_rate_error = cluster_rate
            * (ratio(noise.rate_error, noise.mean_rate) + noise_cluster_size.relative_error());

        let metrics = CorrectedMetrics {
            rate: noise.mean_rate,
            rate_error: noise.rate_error,
            cluster_rate,
            cluster_rate_error,
            cluster_size: cluster_size.value,
            cluster_size_error: cluster_size.error,
            cluster_multiplicity: multiplicity.value,
            multiplicity_error: multiplicity.error,
            efficiency: efficiency.signal.value,
            efficiency_error: efficiency.signal.error,
        };

        RegionReport {
            region: region.id,
            chamber: region.chamber,
            name: region.name.clone(),
            area_cm2: region.area_cm2(),
            window: estimate,
            metrics,
            noise,
            efficiency,
            statistics: stats,
        }
    }

    /// Corrects every region in parallel. Regions missing from `geometry`
    /// are dropped with a warning.
    #[must_use]
    pub fn correct_all<M: ChannelMapping + ?Sized>(
        &self,
        geometry: &Geometry,
        windows: &BTreeMap<RegionId, WindowEstimate>,
        statistics: BTreeMap<RegionId, RegionStatistics>,
        mapping: &M,
    ) -> Vec<RegionReport> {
        let mut reports: Vec<RegionReport> = statistics
            .into_par_iter()
            .filter_map(|(id, stats)| {
                let Some(region) = geometry.region(id) else {
                    log::warn!("statistics for unknown region {id} dropped");
                    return None;
                };
                let estimate = windows.get(&id).copied().unwrap_or(WindowEstimate {
                    window: stats.window,
                    source: WindowSource::NoHits,
                    mode_ns: 0.0,
                    background_per_bin: 0.0,
                    fit: None,
                });
                Some(self.correct(region, estimate, stats, mapping))
            })
            .collect();
        reports.sort_by_key(|r| r.region);
        reports
    }
}

/// Area-weighted mean of rate and cluster size over the partitions of each
/// chamber.
#[must_use]
pub fn summarize_chambers(reports: &[RegionReport]) -> Vec<ChamberSummary> {
    let mut chambers: BTreeMap<ChamberId, ChamberSummary> = BTreeMap::new();
    let mut rate_var: BTreeMap<ChamberId, (f64, f64)> = BTreeMap::new();
    for report in reports {
        let area = report.area_cm2;
        let summary = chambers.entry(report.chamber).or_insert_with(|| ChamberSummary {
            chamber: report.chamber,
            ..ChamberSummary::default()
        });
        summary.regions.push(report.region);
        summary.area_cm2 += area;
        summary.rate += report.metrics.rate * area;
        summary.cluster_size += report.metrics.cluster_size * area;

        let var = rate_var.entry(report.chamber).or_default();
        var.0 += (report.metrics.rate_error * area).powi(2);
        var.1 += (report.metrics.cluster_size_error * area).powi(2);
    }
    chambers
        .into_iter()
        .map(|(id, mut summary)| {
            let (rate_var, cs_var) = rate_var.get(&id).copied().unwrap_or_default();
            let area = summary.area_cm2;
            summary.rate = ratio(summary.rate, area);
            summary.cluster_size = ratio(summary.cluster_size, area);
            summary.rate_error = ratio(rate_var.sqrt(), area);
            summary.cluster_size_error = ratio(cs_var.sqrt(), area);
            summary
        })
        .collect()
}
