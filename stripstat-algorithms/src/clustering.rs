//! Clustering trait and algorithm dispatch.

use crate::{StripClustering, TimeWindowClustering};
use stripstat_core::cluster::{Cluster, ClusteringConfig, ClusteringMode, ClusteringStatistics};
use stripstat_core::hit::Hit;

/// Reusable scratch buffers and counters for clustering calls.
#[derive(Debug, Default)]
pub struct ClusterState {
    pub(crate) scratch: Vec<Hit>,
    pub(crate) group: Vec<Hit>,
    pub(crate) next_id: u32,
    pub(crate) statistics: ClusteringStatistics,
}

impl ClusterState {
    /// Clears buffers and counters.
    pub fn reset(&mut self) {
        self.scratch.clear();
        self.group.clear();
        self.next_id = 0;
        self.statistics = ClusteringStatistics::default();
    }

    /// Counters accumulated since the last reset.
    #[must_use]
    pub fn statistics(&self) -> &ClusteringStatistics {
        &self.statistics
    }
}

/// Common interface of the clustering algorithms.
///
/// Clustering is total: every finite hit set produces a (possibly empty)
/// list of clusters and never fails.
pub trait HitClustering: Send + Sync {
    /// Algorithm name.
    fn name(&self) -> &'static str;

    /// Clusters `hits`, appending the result to `out`.
    ///
    /// Cluster ids continue from `state` so that ids stay unique across
    /// calls until the state is reset.
    fn cluster_into(&self, hits: &[Hit], state: &mut ClusterState, out: &mut Vec<Cluster>);

    /// Clusters `hits` with a fresh state.
    fn cluster(&self, hits: &[Hit]) -> Vec<Cluster> {
        let mut state = ClusterState::default();
        let mut out = Vec::new();
        self.cluster_into(hits, &mut state, &mut out);
        out
    }
}

/// Clustering algorithm selected by [`ClusteringConfig::mode`].
#[derive(Debug, Clone)]
pub enum Clusterer {
    /// Strip adjacency only.
    Strip(StripClustering),
    /// Time pre-grouping, then strip adjacency.
    TimeWindow(TimeWindowClustering),
}

impl Clusterer {
    /// Builds the algorithm described by `config`.
    #[must_use]
    pub fn from_config(config: &ClusteringConfig) -> Self {
        match config.mode {
            ClusteringMode::Strip => Self::Strip(StripClustering::new()),
            ClusteringMode::TimeWindow => Self::TimeWindow(TimeWindowClustering::new(config.clone())),
        }
    }
}

impl HitClustering for Clusterer {
    fn name(&self) -> &'static str {
        match self {
            Self::Strip(algo) => algo.name(),
            Self::TimeWindow(algo) => algo.name(),
        }
    }

    fn cluster_into(&self, hits: &[Hit], state: &mut ClusterState, out: &mut Vec<Cluster>) {
        match self {
            Self::Strip(algo) => algo.cluster_into(hits, state, out),
            Self::TimeWindow(algo) => algo.cluster_into(hits, state, out),
        }
    }
}

/// Scans hits sorted by (region, strip, time) and emits runs of
/// consecutive strips.
pub(crate) fn cluster_sorted(hits: &[Hit], next_id: &mut u32, out: &mut Vec<Cluster>) -> usize {
    let before = out.len();
    let mut current: Option<Cluster> = None;
    for hit in hits {
        match current.as_mut() {
            Some(cluster) if cluster.region == hit.region && cluster.accepts(hit.strip) => {
                cluster.extend(hit);
            }
            _ => {
                if let Some(done) = current.replace(Cluster::seed(*next_id, hit)) {
                    out.push(done);
                }
                *next_id += 1;
            }
        }
    }
    out.extend(current);
    out.len() - before
}
