#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
use approx::assert_abs_diff_eq;
use std::collections::BTreeMap;
use stripstat_algorithms::{analyze_run, CorrectionEngine, PeakWindowEstimator, StatisticsAggregator};
use stripstat_core::config::{AnalysisConfig, TimingConfig};
use stripstat_core::geometry::{ChamberId, Geometry, Region, RegionId, StripMap};
use stripstat_core::histogram::TimeHistogram;
use stripstat_core::hit::RawEvent;
use stripstat_core::window::{PartitionWindow, WindowSource};

const REGION: RegionId = RegionId(1);

fn setup() -> (Geometry, StripMap, AnalysisConfig) {
    let geometry = Geometry::new([Region::new(REGION, ChamberId(1), "RE4-2-A", 32, 4.0)]).unwrap();
    let mut mapping = StripMap::new();
    for strip in 1..=32u16 {
        mapping
            .insert(2000 + u32::from(strip), REGION, strip, true)
            .unwrap();
    }
    let config = AnalysisConfig::default().with_timing(TimingConfig {
        raw_window_ns: 2000.0,
        dead_time_ns: 100.0,
        ..TimingConfig::default()
    });
    (geometry, mapping, config)
}

fn single_hit_events(n: i64) -> Vec<RawEvent> {
    (0..n)
        .map(|i| RawEvent::new(i, vec![2010], vec![650.0]))
        .collect()
}

#[test]
fn test_clean_signal_with_known_window() {
    let (geometry, mapping, config) = setup();
    let windows = BTreeMap::from([(REGION, PartitionWindow::new(650.0, 15.0))]);
    let mut aggregator = StatisticsAggregator::new(&geometry, &mapping, &config, &windows);
    for event in single_hit_events(1000) {
        aggregator.fill_event(&event);
    }
    let (mut statistics, _) = aggregator.finish();
    let stats = statistics.remove(&REGION).unwrap();

    let region = geometry.region(REGION).unwrap();
    let estimate = PeakWindowEstimator::new(config.timing.clone())
        .estimate(&TimeHistogram::new(2000.0, 1.0));
    let report = CorrectionEngine::new(&config).correct(region, estimate, stats, &mapping);

    assert_eq!(report.metrics.efficiency, 1.0);
    assert_eq!(report.metrics.efficiency_error, 0.0);
    assert_eq!(report.metrics.cluster_size, 1.0);
    assert_eq!(report.metrics.cluster_multiplicity, 1.0);
    assert_eq!(report.metrics.rate, 0.0);
}

#[test]
fn test_clean_signal_full_pipeline() {
    let (geometry, mapping, config) = setup();
    let report = analyze_run(&single_hit_events(1000), &geometry, &mapping, &config).unwrap();

    assert_eq!(report.counters.events_processed, 1000);
    let region = report.region(REGION).unwrap();
    // A single filled time bin cannot be fitted.
    assert_eq!(region.window.source, WindowSource::Fallback);
    assert!(region.window.window.contains(650.0));

    assert_eq!(region.metrics.efficiency, 1.0);
    assert_eq!(region.metrics.efficiency_error, 0.0);
    assert_eq!(region.metrics.cluster_size, 1.0);
    assert_eq!(region.metrics.cluster_multiplicity, 1.0);
    assert_eq!(region.statistics.signal.cluster_size.bin(1), 1000);
}

/// Normal quantiles scaled to a 4 ns spread, one per event slot.
const JITTER_NS: [f64; 18] = [
    -7.6, -5.6, -4.4, -3.5, -2.7, -2.0, -1.4, -0.8, -0.3, 0.3, 0.8, 1.4, 2.0, 2.7, 3.5, 4.4,
    5.6, 7.6,
];

#[test]
fn test_noise_is_subtracted() {
    let (geometry, mapping, config) = setup();
    // Signal on strips 10-11 in 9 of 10 events; one noise hit per event
    // on a rotating strip, late in the readout window.
    let events: Vec<RawEvent> = (0..2000i64)
        .map(|i| {
            let jitter = JITTER_NS[(i % 18) as usize];
            let noise_strip = 20 + (i % 10) as u32;
            let noise_time = 1000.0 + (i % 900) as f64;
            if i % 10 == 9 {
                RawEvent::new(i, vec![2000 + noise_strip], vec![noise_time])
            } else {
                RawEvent::new(
                    i,
                    vec![2010, 2011, 2000 + noise_strip],
                    vec![650.0 + jitter, 651.0 + jitter, noise_time],
                )
            }
        })
        .collect();

    let report = analyze_run(&events, &geometry, &mapping, &config).unwrap();
    let region = report.region(REGION).unwrap();

    assert!(region.window.window.contains(650.0));
    // No noise reaches the control window, so nothing is subtracted.
    assert_eq!(region.efficiency.fake.value, 0.0);
    assert_abs_diff_eq!(region.metrics.efficiency, 0.9, epsilon = 1e-12);
    assert_abs_diff_eq!(region.metrics.cluster_size, 2.0, epsilon = 1e-12);
    assert!(region.metrics.rate > 0.0);
    assert!(region.metrics.cluster_rate > 0.0);
    // Noise hits sit on ten strips only, so the profile is far from flat.
    assert!(region.noise.strip_homogeneity < 0.5);
    assert_eq!(region.noise.strip_rates.len(), 32);
    assert_eq!(region.noise.chip_rates.len(), 4);
    assert_eq!(region.noise.chip_rates[0], 0.0);
}
