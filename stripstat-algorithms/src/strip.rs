//! Strip adjacency clustering.
//!
//! Hits are sorted by strip (ties by time) and scanned in order; a gap of
//! more than one strip closes the current cluster. Every hit ends up in
//! exactly one cluster, so the output partitions the input.

use crate::clustering::{cluster_sorted, ClusterState, HitClustering};
use stripstat_core::cluster::Cluster;
use stripstat_core::hit::Hit;

/// Strip adjacency clustering for the hits of one region in one event.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripClustering;

impl StripClustering {
    /// Creates the algorithm.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HitClustering for StripClustering {
    fn name(&self) -> &'static str {
        "Strip"
    }

    fn cluster_into(&self, hits: &[Hit], state: &mut ClusterState, out: &mut Vec<Cluster>) {
        if hits.is_empty() {
            return;
        }

        state.scratch.clear();
        state.scratch.extend_from_slice(hits);
        // Region first keeps mixed input from merging across regions.
        state
            .scratch
            .sort_by(|a, b| a.region.cmp(&b.region).then_with(|| Hit::by_strip_then_time(a, b)));

        let found = cluster_sorted(&state.scratch, &mut state.next_id, out);

        state.statistics.hits_processed += hits.len();
        state.statistics.clusters_found += found;
    }
}
