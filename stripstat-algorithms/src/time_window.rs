//! Time-window pre-grouping followed by strip adjacency.
//!
//! Hits are grouped per region into rolling windows of `cluster_time_ns`,
//! measured from the first hit of the group. Strip adjacency is applied
//! inside each group, so two adjacent strips firing far apart in time end
//! up in different clusters.

use crate::clustering::{cluster_sorted, ClusterState, HitClustering};
use stripstat_core::cluster::{AdjacencyPolicy, Cluster, ClusteringConfig};
use stripstat_core::hit::Hit;

/// Time-window clustering.
#[derive(Debug, Clone)]
pub struct TimeWindowClustering {
    config: ClusteringConfig,
}

impl Default for TimeWindowClustering {
    fn default() -> Self {
        Self::new(ClusteringConfig::default())
    }
}

impl TimeWindowClustering {
    /// Create with custom configuration.
    #[must_use]
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Rolling window length (ns).
    #[must_use]
    pub fn cluster_time_ns(&self) -> f64 {
        self.config.cluster_time_ns
    }

    /// Policy for non-adjacent two-hit groups.
    #[must_use]
    pub fn adjacency(&self) -> AdjacencyPolicy {
        self.config.adjacency
    }

    fn flush_group(&self, state: &mut ClusterState, out: &mut Vec<Cluster>) -> usize {
        let group = &mut state.group;
        if group.is_empty() {
            return 0;
        }
        if group.len() == 2
            && self.config.adjacency == AdjacencyPolicy::DiscardPair
            && group[0].strip.abs_diff(group[1].strip) > 1
        {
            state.statistics.discarded_hits += 2;
            group.clear();
            return 0;
        }
        group.sort_by(Hit::by_strip_then_time);
        let found = cluster_sorted(group, &mut state.next_id, out);
        group.clear();
        found
    }
}

impl HitClustering for TimeWindowClustering {
    fn name(&self) -> &'static str {
        "TimeWindow"
    }

    fn cluster_into(&self, hits: &[Hit], state: &mut ClusterState, out: &mut Vec<Cluster>) {
        if hits.is_empty() {
            return;
        }

        let mut scratch = std::mem::take(&mut state.scratch);
        scratch.clear();
        scratch.extend_from_slice(hits);
        scratch.sort_by(|a, b| a.region.cmp(&b.region).then_with(|| Hit::by_time(a, b)));

        let window = self.config.cluster_time_ns;
        let mut found = 0;
        let mut group_start: Option<&Hit> = None;
        for hit in &scratch {
            let opens_group = group_start
                .is_none_or(|first| first.region != hit.region || hit.time_ns - first.time_ns > window);
            if opens_group {
                found += self.flush_group(state, out);
                group_start = Some(hit);
            }
            state.group.push(*hit);
        }
        found += self.flush_group(state, out);

        state.scratch = scratch;
        state.statistics.hits_processed += hits.len();
        state.statistics.clusters_found += found;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripstat_core::geometry::RegionId;

    const R: RegionId = RegionId(1);

    fn discard() -> TimeWindowClustering {
        TimeWindowClustering::new(
            ClusteringConfig::default().with_adjacency(AdjacencyPolicy::DiscardPair),
        )
    }

    #[test]
    fn test_three_strips_in_window() {
        let hits = [
            Hit::new(R, 7, 112.0),
            Hit::new(R, 5, 100.0),
            Hit::new(R, 6, 120.0),
        ];
        let clusters = TimeWindowClustering::default().cluster(&hits);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size(), 3);
        assert!((clusters[0].center() - 6.0).abs() < f64::EPSILON);
        assert!((clusters[0].spread_ns() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_time_separation_splits_adjacent_strips() {
        let hits = [Hit::new(R, 5, 100.0), Hit::new(R, 6, 200.0)];
        let clusters = TimeWindowClustering::default().cluster(&hits);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_non_adjacent_pair_split_policy() {
        let hits = [Hit::new(R, 5, 100.0), Hit::new(R, 9, 105.0)];
        let clusters = TimeWindowClustering::default().cluster(&hits);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.size() == 1));
    }

    #[test]
    fn test_non_adjacent_pair_discard_policy() {
        let hits = [Hit::new(R, 5, 100.0), Hit::new(R, 9, 105.0)];
        let mut state = ClusterState::default();
        let mut out = Vec::new();
        discard().cluster_into(&hits, &mut state, &mut out);
        assert!(out.is_empty());
        assert_eq!(state.statistics().discarded_hits, 2);
        assert_eq!(state.statistics().hits_processed, 2);
    }

    #[test]
    fn test_discard_only_applies_to_pairs() {
        let hits = [
            Hit::new(R, 5, 100.0),
            Hit::new(R, 9, 105.0),
            Hit::new(R, 10, 106.0),
        ];
        let clusters = discard().cluster(&hits);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[1].size(), 2);
    }

    #[test]
    fn test_rolling_window_is_anchored_on_first_hit() {
        // 0 -> 25 -> 50: the third hit is 50 ns after the group start.
        let hits = [
            Hit::new(R, 1, 0.0),
            Hit::new(R, 2, 25.0),
            Hit::new(R, 3, 50.0),
        ];
        let clusters = TimeWindowClustering::default().cluster(&hits);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].size(), 2);
        assert_eq!(clusters[1].size(), 1);
    }
}
