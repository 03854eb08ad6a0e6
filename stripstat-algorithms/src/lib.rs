//! stripstat-algorithms: Clustering and statistics engines.
//!
//! This crate provides:
//! - **Strip** clustering - strip adjacency over one region's hits
//! - **Time-window** clustering - rolling time pre-grouping, then adjacency
//! - **Peak window estimation** - histogram mode plus Gaussian fit
//! - **Statistics aggregation** - per-region distributions for the signal,
//!   background and control time partitions
//! - **Correction** - noise-corrected rate, cluster size, multiplicity and
//!   efficiency
//!
#![warn(missing_docs)]

mod aggregator;
mod clustering;
mod correction;
pub mod fit;
mod peak;
mod processing;
mod strip;
mod time_window;

pub use aggregator::{RegionStatistics, RunCounters, StatisticsAggregator, WindowStatistics};
pub use clustering::{ClusterState, Clusterer, HitClustering};
pub use correction::{
    binomial, corrected_cluster_size, corrected_multiplicity, deconvolve_efficiency, homogeneity,
    signal_fractions, summarize_chambers, CorrectionEngine, EfficiencyEstimate, Measurement,
    RegionReport, SignalFractions,
};
pub use fit::{fit_gaussian, fit_points, GaussianFit};
pub use peak::{PeakWindowEstimator, TimeHistogramSet, WindowEstimate};
pub use processing::{analyze_run, EventSource, RunReport};
pub use strip::StripClustering;
pub use time_window::TimeWindowClustering;

// Re-export core clustering types
pub use stripstat_core::cluster::{AdjacencyPolicy, ClusteringConfig, ClusteringStatistics};
