//! End-of-run metrics.

use crate::geometry::{ChamberId, RegionId};
use crate::hit::StripId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Noise-corrected performance metrics of one region.
///
/// Computed once after all events are aggregated. Undefined quantities
/// (zero denominators) are reported as 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrectedMetrics {
    /// Mean noise rate per unit area (Hz/cm²).
    pub rate: f64,
    /// Uncertainty of `rate`.
    pub rate_error: f64,
    /// Mean noise cluster rate, `rate / cluster_size` (Hz/cm²).
    pub cluster_rate: f64,
    /// Uncertainty of `cluster_rate`.
    pub cluster_rate_error: f64,
    /// Signal cluster size after background deconvolution (strips).
    pub cluster_size: f64,
    /// Uncertainty of `cluster_size`.
    pub cluster_size_error: f64,
    /// Signal cluster multiplicity after background subtraction.
    pub cluster_multiplicity: f64,
    /// Uncertainty of `cluster_multiplicity`.
    pub multiplicity_error: f64,
    /// Deconvolved detection efficiency.
    pub efficiency: f64,
    /// Uncertainty of `efficiency`.
    pub efficiency_error: f64,
}

/// Per-strip and per-chip noise rates of one region.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NoiseProfile {
    /// Rate of every strip (Hz/cm²), index `strip - 1`.
    pub strip_rates: Vec<f64>,
    /// Masked strips, excluded from the means.
    pub masked_strips: Vec<StripId>,
    /// Mean rate of the masked strips (Hz/cm²), 0 if none.
    pub masked_rate: f64,
    /// Mean rate of the active strips of every chip (Hz/cm²).
    pub chip_rates: Vec<f64>,
    /// Mean rate over active strips (Hz/cm²).
    pub mean_rate: f64,
    /// Uncertainty of `mean_rate`.
    pub rate_error: f64,
    /// Homogeneity of the active strip rates, in (0, 1], 0 when silent.
    pub strip_homogeneity: f64,
    /// Homogeneity of the chip rates.
    pub chip_homogeneity: f64,
}

/// Area-weighted aggregate over the partitions of a chamber.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChamberSummary {
    /// Chamber identifier.
    pub chamber: ChamberId,
    /// Partitions that contributed.
    pub regions: Vec<RegionId>,
    /// Total area (cm²).
    pub area_cm2: f64,
    /// Area-weighted noise rate (Hz/cm²).
    pub rate: f64,
    /// Uncertainty of `rate`.
    pub rate_error: f64,
    /// Area-weighted signal cluster size.
    pub cluster_size: f64,
    /// Uncertainty of `cluster_size`.
    pub cluster_size_error: f64,
}

