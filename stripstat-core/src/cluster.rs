//! Cluster types and clustering configuration.

use crate::geometry::RegionId;
use crate::hit::{Hit, StripId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A set of hits on consecutive strips of one region, treated as a single
/// particle crossing.
///
/// Invariant: `strips` holds the consecutive integers
/// `first_strip..=last_strip`, so `size() == strips.len()`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Sequence number within one clustering call.
    pub id: u32,
    /// Region the cluster was found in.
    pub region: RegionId,
    /// Distinct member strips, ascending.
    pub strips: Vec<StripId>,
    /// Number of hits (a strip may fire more than once).
    pub hit_count: usize,
    /// Earliest hit time (ns).
    pub start_time_ns: f64,
    /// Latest hit time (ns).
    pub stop_time_ns: f64,
}

impl Cluster {
    /// Starts a cluster from its first hit.
    #[must_use]
    pub fn seed(id: u32, hit: &Hit) -> Self {
        Self {
            id,
            region: hit.region,
            strips: vec![hit.strip],
            hit_count: 1,
            start_time_ns: hit.time_ns,
            stop_time_ns: hit.time_ns,
        }
    }

    /// Adds a hit whose strip is equal or adjacent to the last strip.
    pub fn extend(&mut self, hit: &Hit) {
        debug_assert!(hit.strip >= self.last_strip() && hit.strip - self.last_strip() <= 1);
        if hit.strip != self.last_strip() {
            self.strips.push(hit.strip);
        }
        self.hit_count += 1;
        self.start_time_ns = self.start_time_ns.min(hit.time_ns);
        self.stop_time_ns = self.stop_time_ns.max(hit.time_ns);
    }

    /// Returns true if `strip` continues this cluster without a gap.
    #[inline]
    #[must_use]
    pub fn accepts(&self, strip: StripId) -> bool {
        strip.saturating_sub(self.last_strip()) <= 1
    }

    /// Lowest strip.
    #[inline]
    #[must_use]
    pub fn first_strip(&self) -> StripId {
        self.strips[0]
    }

    /// Highest strip.
    #[inline]
    #[must_use]
    pub fn last_strip(&self) -> StripId {
        self.strips[self.strips.len() - 1]
    }

    /// Number of strips, `last_strip - first_strip + 1`.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        usize::from(self.last_strip() - self.first_strip()) + 1
    }

    /// Cluster center in strip units.
    #[inline]
    #[must_use]
    pub fn center(&self) -> f64 {
        (f64::from(self.first_strip()) + f64::from(self.last_strip())) / 2.0
    }

    /// Time spread of the member hits (ns).
    #[inline]
    #[must_use]
    pub fn spread_ns(&self) -> f64 {
        self.stop_time_ns - self.start_time_ns
    }
}

/// What to do with a two-hit time group whose strips are not adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdjacencyPolicy {
    /// Keep both hits as single-strip clusters.
    #[default]
    SplitSingles,
    /// Drop the pair; neither hit is counted.
    DiscardPair,
}

/// How hits are grouped before strip adjacency is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ClusteringMode {
    /// Strip adjacency over all hits of a time partition.
    #[default]
    Strip,
    /// Rolling time window first, strip adjacency inside each window.
    TimeWindow,
}

/// Configuration for clustering algorithms.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusteringConfig {
    /// Grouping strategy.
    pub mode: ClusteringMode,
    /// Rolling window length for time pre-grouping (ns).
    pub cluster_time_ns: f64,
    /// Policy for non-adjacent two-hit time groups.
    pub adjacency: AdjacencyPolicy,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            mode: ClusteringMode::Strip,
            cluster_time_ns: 30.0,
            adjacency: AdjacencyPolicy::SplitSingles,
        }
    }
}

impl ClusteringConfig {
    /// Creates a new clustering configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the grouping mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ClusteringMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the rolling window length.
    #[must_use]
    pub fn with_cluster_time_ns(mut self, window: f64) -> Self {
        self.cluster_time_ns = window;
        self
    }

    /// Sets the adjacency policy.
    #[must_use]
    pub fn with_adjacency(mut self, policy: AdjacencyPolicy) -> Self {
        self.adjacency = policy;
        self
    }
}

/// Statistics from a clustering run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusteringStatistics {
    /// Hits seen by the clusterer.
    pub hits_processed: usize,
    /// Clusters produced.
    pub clusters_found: usize,
    /// Hits dropped by [`AdjacencyPolicy::DiscardPair`].
    pub discarded_hits: usize,
}

impl ClusteringStatistics {
    /// Adds another run's counters.
    pub fn merge(&mut self, other: &Self) {
        self.hits_processed += other.hits_processed;
        self.clusters_found += other.clusters_found;
        self.discarded_hits += other.discarded_hits;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_operations() {
        let r = RegionId(0);
        let mut cluster = Cluster::seed(0, &Hit::new(r, 5, 110.0));
        assert!(cluster.accepts(5));
        assert!(cluster.accepts(6));
        assert!(!cluster.accepts(7));

        cluster.extend(&Hit::new(r, 6, 100.0));
        cluster.extend(&Hit::new(r, 6, 125.0));
        cluster.extend(&Hit::new(r, 7, 112.0));

        assert_eq!(cluster.strips, vec![5, 6, 7]);
        assert_eq!(cluster.hit_count, 4);
        assert_eq!(cluster.size(), 3);
        assert!((cluster.center() - 6.0).abs() < f64::EPSILON);
        assert!((cluster.spread_ns() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clustering_config() {
        let config = ClusteringConfig::new()
            .with_mode(ClusteringMode::TimeWindow)
            .with_cluster_time_ns(25.0)
            .with_adjacency(AdjacencyPolicy::DiscardPair);

        assert_eq!(config.mode, ClusteringMode::TimeWindow);
        assert!((config.cluster_time_ns - 25.0).abs() < f64::EPSILON);
        assert_eq!(config.adjacency, AdjacencyPolicy::DiscardPair);
    }
}
