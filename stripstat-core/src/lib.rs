//! stripstat-core: Core types for strip detector data processing.
//!
//! This crate provides the value types shared by the clustering and
//! statistics engines: hits and raw events, detector geometry and channel
//! mapping, clusters, histograms, signal windows and corrected metrics.
//!

pub mod cluster;
pub mod config;
pub mod error;
pub mod geometry;
pub mod histogram;
pub mod hit;
pub mod metrics;
pub mod window;

pub use cluster::{
    AdjacencyPolicy, Cluster, ClusteringConfig, ClusteringMode, ClusteringStatistics,
};
pub use config::{AnalysisConfig, TimingConfig};
pub use error::{DecodeError, Error, FitError, Result};
pub use geometry::{ChamberId, ChannelMapping, Geometry, Region, RegionId, StripMap};
pub use histogram::{Distribution, StripProfile, TimeHistogram};
pub use hit::{EventQuality, Hit, RawEvent, StripId};
pub use metrics::{ChamberSummary, CorrectedMetrics, NoiseProfile};
pub use window::{PartitionWindow, TimePartition, WindowSource};
