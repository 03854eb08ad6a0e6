//! Run-level pipeline: window estimation, aggregation and correction.

use crate::aggregator::{RunCounters, StatisticsAggregator};
use crate::correction::{summarize_chambers, CorrectionEngine, RegionReport};
use crate::peak::{PeakWindowEstimator, TimeHistogramSet};
use std::collections::BTreeMap;
use stripstat_core::config::AnalysisConfig;
use stripstat_core::error::{DecodeError, Result};
use stripstat_core::geometry::{ChannelMapping, Geometry, RegionId};
use stripstat_core::hit::RawEvent;
use stripstat_core::metrics::ChamberSummary;
use stripstat_core::window::PartitionWindow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A re-iterable stream of decoded events.
///
/// The pipeline walks the stream twice: once to locate the signal windows
/// and once to aggregate statistics.
pub trait EventSource {
    /// Iterates over the events in order. A `DecodeError` item marks an
    /// event that could not be decoded; it is skipped and counted.
    fn events(&self) -> Box<dyn Iterator<Item = std::result::Result<RawEvent, DecodeError>> + '_>;
}

impl EventSource for [RawEvent] {
    fn events(&self) -> Box<dyn Iterator<Item = std::result::Result<RawEvent, DecodeError>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}

impl EventSource for Vec<RawEvent> {
    fn events(&self) -> Box<dyn Iterator<Item = std::result::Result<RawEvent, DecodeError>> + '_> {
        self.as_slice().events()
    }
}

/// Everything produced by one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunReport {
    /// Event and hit counters.
    pub counters: RunCounters,
    /// Per-region results, ordered by region id.
    pub regions: Vec<RegionReport>,
    /// Per-chamber aggregates.
    pub chambers: Vec<ChamberSummary>,
}

impl RunReport {
    /// Report of one region.
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&RegionReport> {
        self.regions.iter().find(|r| r.region == id)
    }
}

/// Runs the full analysis over one event stream.
///
/// # Errors
/// Returns a configuration error if `config` is invalid. Per-event problems
/// never fail the run.
pub fn analyze_run<S, M>(
    source: &S,
    geometry: &Geometry,
    mapping: &M,
    config: &AnalysisConfig,
) -> Result<RunReport>
where
    S: EventSource + ?Sized,
    M: ChannelMapping + ?Sized,
{
    config.validate()?;
    log::info!(
        "analyzing {} regions ({:?} clustering)",
        geometry.len(),
        config.clustering.mode
    );

    let mut histograms = TimeHistogramSet::new(geometry, &config.timing);
    for event in source.events().flatten() {
        if event.is_corrupted() || event.validate().is_err() {
            continue;
        }
        histograms.fill_event(&event, mapping);
    }

    let estimator = PeakWindowEstimator::new(config.timing.clone());
    let estimates = estimator.estimate_all(histograms.histograms());
    let windows: BTreeMap<RegionId, PartitionWindow> = estimates
        .iter()
        .map(|(&id, estimate)| (id, estimate.window))
        .collect();

    let mut aggregator = StatisticsAggregator::new(geometry, mapping, config, &windows);
    let mut decode_failures = 0u64;
    for event in source.events() {
        match event {
            Ok(event) => {
                aggregator.fill_event(&event);
            }
            Err(err) => {
                decode_failures += 1;
                log::debug!("undecodable event skipped: {err}");
            }
        }
    }
    let (statistics, mut counters) = aggregator.finish();
    counters.events_seen += decode_failures;
    counters.events_malformed += decode_failures;

    let engine = CorrectionEngine::new(config);
    let regions = engine.correct_all(geometry, &estimates, statistics, mapping);
    let chambers = summarize_chambers(&regions);

    log::info!(
        "run done: {} events seen, {} processed, {} corrupted, {} malformed, {} unmapped hits",
        counters.events_seen,
        counters.events_processed,
        counters.events_corrupted,
        counters.events_malformed,
        counters.hits_unmapped
    );
    if counters.hits_out_of_range > 0 {
        log::warn!(
            "{} hits mapped to strips outside their region were ignored",
            counters.hits_out_of_range
        );
    }

    Ok(RunReport {
        counters,
        regions,
        chambers,
    })
}
