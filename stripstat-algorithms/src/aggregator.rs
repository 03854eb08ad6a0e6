//! Per-region statistics accumulated event by event.
//!
//! Every event is split, per region, into three time partitions:
//! the signal window, the background region (after the dead-time cut,
//! outside the signal window) and a signal-width control window where no
//! signal is expected. Each partition gets its own hit multiplicity,
//! cluster size and cluster multiplicity distributions.
#![allow(clippy::cast_precision_loss)]

use crate::clustering::{ClusterState, Clusterer, HitClustering};
use std::collections::{BTreeMap, HashMap};
use stripstat_core::cluster::{Cluster, ClusteringStatistics};
use stripstat_core::config::AnalysisConfig;
use stripstat_core::geometry::{ChannelMapping, Geometry, RegionId};
use stripstat_core::histogram::{Distribution, StripProfile};
use stripstat_core::hit::{Hit, RawEvent};
use stripstat_core::window::{PartitionWindow, TimePartition};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distributions of one time partition of one region.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowStatistics {
    /// Active-strip hits per event.
    pub hit_multiplicity: Distribution,
    /// Strips per cluster.
    pub cluster_size: Distribution,
    /// Clusters per event.
    pub cluster_multiplicity: Distribution,
    /// Cluster centers in half-strip units (`first_strip + last_strip`).
    pub cluster_position: Distribution,
    /// Events recorded.
    pub events: u64,
    /// Events with at least one active-strip hit.
    pub detected: u64,
}

impl WindowStatistics {
    fn record(&mut self, hits: usize, clusters: &[Cluster]) {
        self.events += 1;
        if hits > 0 {
            self.detected += 1;
        }
        self.hit_multiplicity.fill(hits);
        self.cluster_multiplicity.fill(clusters.len());
        for cluster in clusters {
            self.cluster_size.fill(cluster.size());
            self.cluster_position
                .fill(usize::from(cluster.first_strip()) + usize::from(cluster.last_strip()));
        }
    }

    /// Fraction of events with at least one hit, 0 when no events.
    #[must_use]
    pub fn detection_probability(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.detected as f64 / self.events as f64
        }
    }
}

/// All statistics of one region for one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionStatistics {
    /// Region identifier.
    pub region: RegionId,
    /// Signal window used for this run.
    pub window: PartitionWindow,
    /// Control window used for this run.
    pub control_window: PartitionWindow,
    /// Signal window statistics.
    pub signal: WindowStatistics,
    /// Background region statistics.
    pub background: WindowStatistics,
    /// Control window statistics.
    pub control: WindowStatistics,
    /// Per-strip hits in the signal window (masked strips included).
    pub signal_profile: StripProfile,
    /// Per-strip hits in the background region (masked strips included).
    pub noise_profile: StripProfile,
    /// Clustering counters over all partitions.
    pub clustering: ClusteringStatistics,
}

impl RegionStatistics {
    fn new(
        region: RegionId,
        strip_count: u16,
        window: PartitionWindow,
        control_window: PartitionWindow,
    ) -> Self {
        Self {
            region,
            window,
            control_window,
            signal: WindowStatistics::default(),
            background: WindowStatistics::default(),
            control: WindowStatistics::default(),
            signal_profile: StripProfile::new(strip_count),
            noise_profile: StripProfile::new(strip_count),
            clustering: ClusteringStatistics::default(),
        }
    }

    /// Statistics of one time partition.
    #[must_use]
    pub fn partition(&self, partition: TimePartition) -> &WindowStatistics {
        match partition {
            TimePartition::Signal => &self.signal,
            TimePartition::Background => &self.background,
            TimePartition::Control => &self.control,
        }
    }

    /// Events recorded for this region.
    #[must_use]
    pub fn events(&self) -> u64 {
        self.signal.events
    }
}

/// Run-level event and hit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunCounters {
    /// Events offered to the aggregator.
    pub events_seen: u64,
    /// Events that reached the clusterer.
    pub events_processed: u64,
    /// Events skipped because the readout flagged them corrupted.
    pub events_corrupted: u64,
    /// Events skipped because they failed validation.
    pub events_malformed: u64,
    /// Hits on channels without a mapping.
    pub hits_unmapped: u64,
    /// Hits before the dead-time cut.
    pub hits_dead_time: u64,
    /// Hits mapped to a strip beyond the strip count of their region.
    pub hits_out_of_range: u64,
}

#[derive(Default)]
struct PartitionBuffers {
    signal: Vec<Hit>,
    background: Vec<Hit>,
    control: Vec<Hit>,
    clusters: Vec<Cluster>,
}

/// Accumulates per-region statistics over the events of one run.
///
/// Each run owns its aggregator; nothing is shared between runs.
pub struct StatisticsAggregator<'a, M: ChannelMapping + ?Sized> {
    mapping: &'a M,
    config: &'a AnalysisConfig,
    clusterer: Clusterer,
    regions: BTreeMap<RegionId, RegionStatistics>,
    counters: RunCounters,
    event_hits: HashMap<RegionId, Vec<Hit>>,
    buffers: PartitionBuffers,
    state: ClusterState,
}

impl<'a, M: ChannelMapping + ?Sized> StatisticsAggregator<'a, M> {
    /// Creates an aggregator for every region of `geometry`. Regions without
    /// an entry in `windows` get an empty signal window.
    #[must_use]
    pub fn new(
        geometry: &Geometry,
        mapping: &'a M,
        config: &'a AnalysisConfig,
        windows: &BTreeMap<RegionId, PartitionWindow>,
    ) -> Self {
        let regions = geometry
            .regions()
            .map(|region| {
                let window = windows.get(&region.id).copied().unwrap_or_default();
                let control = config.timing.control_window(&window);
                if !window.is_empty() && control.width_ns() < window.width_ns() {
                    log::warn!(
                        "region {}: control window {:.1}-{:.1} ns is narrower than the \
                         {:.1} ns signal window, fake-hit probability will be underestimated",
                        region.id,
                        control.start_ns(),
                        control.stop_ns(),
                        window.width_ns()
                    );
                }
                (
                    region.id,
                    RegionStatistics::new(region.id, region.strip_count, window, control),
                )
            })
            .collect();
        let event_hits = geometry.region_ids().map(|id| (id, Vec::new())).collect();
        Self {
            mapping,
            config,
            clusterer: Clusterer::from_config(&config.clustering),
            regions,
            counters: RunCounters::default(),
            event_hits,
            buffers: PartitionBuffers::default(),
            state: ClusterState::default(),
        }
    }

    /// Adds one event. Corrupted or malformed events are counted and
    /// skipped; the return value tells whether the event was used.
    pub fn fill_event(&mut self, event: &RawEvent) -> bool {
        self.counters.events_seen += 1;
        if event.is_corrupted() {
            self.counters.events_corrupted += 1;
            log::debug!("skipping corrupted event {}", event.event_number);
            return false;
        }
        if let Err(err) = event.validate() {
            self.counters.events_malformed += 1;
            log::debug!("skipping event {}: {err}", event.event_number);
            return false;
        }
        self.counters.events_processed += 1;

        for hits in self.event_hits.values_mut() {
            hits.clear();
        }
        for (channel, time_ns) in event.iter() {
            let Some((region, strip)) = self.mapping.map(channel) else {
                self.counters.hits_unmapped += 1;
                continue;
            };
            if time_ns < self.config.timing.dead_time_ns {
                self.counters.hits_dead_time += 1;
                continue;
            }
            let Some(stats) = self.regions.get(&region) else {
                self.counters.hits_unmapped += 1;
                continue;
            };
            if strip == 0 || usize::from(strip) > stats.noise_profile.strip_count() {
                self.counters.hits_out_of_range += 1;
                continue;
            }
            if let Some(hits) = self.event_hits.get_mut(&region) {
                hits.push(Hit::new(region, strip, time_ns));
            }
        }

        for (region, stats) in &mut self.regions {
            let hits = self
                .event_hits
                .get(region)
                .map_or(&[][..], Vec::as_slice);
            fill_region(
                stats,
                hits,
                self.mapping,
                &self.clusterer,
                &mut self.state,
                &mut self.buffers,
            );
        }
        true
    }

    /// Counters so far.
    #[must_use]
    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Statistics of one region so far.
    #[must_use]
    pub fn region(&self, region: RegionId) -> Option<&RegionStatistics> {
        self.regions.get(&region)
    }

    /// Ends the run and hands out the accumulated statistics.
    #[must_use]
    pub fn finish(self) -> (BTreeMap<RegionId, RegionStatistics>, RunCounters) {
        (self.regions, self.counters)
    }
}

fn fill_region<M: ChannelMapping + ?Sized>(
    stats: &mut RegionStatistics,
    hits: &[Hit],
    mapping: &M,
    clusterer: &Clusterer,
    state: &mut ClusterState,
    buffers: &mut PartitionBuffers,
) {
    buffers.signal.clear();
    buffers.background.clear();
    buffers.control.clear();

    for hit in hits {
        let active = mapping.is_active(hit.region, hit.strip);
        if stats.window.contains(hit.time_ns) {
            stats.signal_profile.fill(hit.strip);
            if active {
                buffers.signal.push(*hit);
            }
            continue;
        }
        stats.noise_profile.fill(hit.strip);
        if active {
            buffers.background.push(*hit);
            if stats.control_window.contains(hit.time_ns) {
                buffers.control.push(*hit);
            }
        }
    }

    state.reset();
    let partitions = [
        (&buffers.signal, &mut stats.signal),
        (&buffers.background, &mut stats.background),
        (&buffers.control, &mut stats.control),
    ];
    for (partition_hits, window_stats) in partitions {
        buffers.clusters.clear();
        clusterer.cluster_into(partition_hits, state, &mut buffers.clusters);
        window_stats.record(partition_hits.len(), &buffers.clusters);
    }
    stats.clustering.merge(state.statistics());
}
