#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
use stripstat_algorithms::{
    deconvolve_efficiency, homogeneity, HitClustering, Measurement, StripClustering,
    TimeWindowClustering,
};
use stripstat_core::cluster::{AdjacencyPolicy, Cluster, ClusteringConfig};
use stripstat_core::geometry::RegionId;
use stripstat_core::hit::Hit;

const R: RegionId = RegionId(7);

/// Small deterministic generator so the hit sets are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

fn random_hits(seed: u64, n: usize) -> Vec<Hit> {
    let mut rng = Lcg(seed);
    (0..n)
        .map(|_| {
            let strip = (rng.next() % 48) as u16 + 1;
            let time = (rng.next() % 2000) as f64 / 10.0;
            Hit::new(R, strip, time)
        })
        .collect()
}

fn assert_partition(hits: &[Hit], clusters: &[Cluster]) {
    let assigned: usize = clusters.iter().map(|c| c.hit_count).sum();
    assert_eq!(assigned, hits.len(), "every hit belongs to one cluster");

    for c in clusters {
        assert_eq!(c.size(), usize::from(c.last_strip() - c.first_strip()) + 1);
        assert_eq!(c.size(), c.strips.len());
        for pair in c.strips.windows(2) {
            assert_eq!(pair[1], pair[0] + 1, "strips are consecutive");
        }
    }
}

#[test]
fn test_strip_clusters_partition_hits() {
    for seed in 0..50 {
        let hits = random_hits(seed, (seed as usize % 40) + 1);
        let clusters = StripClustering::new().cluster(&hits);
        assert_partition(&hits, &clusters);

        // Strip ranges never overlap within one event.
        let mut ranges: Vec<(u16, u16)> = clusters
            .iter()
            .map(|c| (c.first_strip(), c.last_strip()))
            .collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[1].0 > pair[0].1 + 1, "clusters {pair:?} touch");
        }
    }
}

#[test]
fn test_time_window_clusters_partition_hits() {
    for seed in 100..150 {
        let hits = random_hits(seed, 30);
        let clusters = TimeWindowClustering::default().cluster(&hits);
        assert_partition(&hits, &clusters);
    }
}

#[test]
fn test_discard_policy_only_loses_pairs() {
    let algo = TimeWindowClustering::new(
        ClusteringConfig::default().with_adjacency(AdjacencyPolicy::DiscardPair),
    );
    for seed in 200..230 {
        let hits = random_hits(seed, 20);
        let clusters = algo.cluster(&hits);
        let assigned: usize = clusters.iter().map(|c| c.hit_count).sum();
        assert!(assigned <= hits.len());
        assert_eq!((hits.len() - assigned) % 2, 0);
    }
}

#[test]
fn test_three_strip_round_trip() {
    let hits = [
        Hit::new(R, 7, 118.0),
        Hit::new(R, 5, 101.0),
        Hit::new(R, 6, 109.0),
    ];
    for clusters in [
        StripClustering::new().cluster(&hits),
        TimeWindowClustering::default().cluster(&hits),
    ] {
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size(), 3);
        assert!((clusters[0].center() - 6.0).abs() < f64::EPSILON);
        assert!((clusters[0].spread_ns() - 17.0).abs() < 1e-12);
    }
}

#[test]
fn test_gap_of_four_policy() {
    let hits = [Hit::new(R, 5, 100.0), Hit::new(R, 9, 104.0)];

    // Default policy keeps both strips as single-strip clusters.
    let split = TimeWindowClustering::default().cluster(&hits);
    assert_eq!(split.len(), 2);
    assert!(split.iter().all(|c| c.size() == 1));

    let discard = TimeWindowClustering::new(
        ClusteringConfig::default().with_adjacency(AdjacencyPolicy::DiscardPair),
    )
    .cluster(&hits);
    assert!(discard.is_empty());
}

#[test]
fn test_efficiency_identity() {
    for k in [0u64, 1, 500, 999, 1000] {
        let peak = stripstat_algorithms::binomial(k, 1000);
        let signal = deconvolve_efficiency(peak, Measurement::new(0.0, 0.0), 1000);
        assert_eq!(signal.value, peak.value);
    }
}

#[test]
fn test_homogeneity_range() {
    let mut rng = Lcg(42);
    for _ in 0..100 {
        let values: Vec<f64> = (0..16).map(|_| (rng.next() % 1000) as f64).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let h = homogeneity(&values);
        if mean > 0.0 {
            assert!(h > 0.0 && h <= 1.0, "homogeneity {h} out of range");
        } else {
            assert_eq!(h, 0.0);
        }
    }
    assert_eq!(homogeneity(&[0.0; 8]), 0.0);
}
