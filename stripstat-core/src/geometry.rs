//! Detector geometry and channel mapping.
//!
//! A detector is described as a set of [`Region`]s (readout partitions),
//! each belonging to one chamber. The geometry is read once at run start
//! and never mutated by the processing code.

use crate::error::{Error, Result};
use crate::hit::StripId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a detector region (one readout partition of one chamber).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a chamber grouping one or more regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChamberId(pub u32);

impl fmt::Display for ChamberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A detector partition with independently tracked statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// Region identifier.
    pub id: RegionId,
    /// Chamber the region belongs to.
    pub chamber: ChamberId,
    /// Human readable name (e.g. `"RE2-2-A"`).
    pub name: String,
    /// Number of strips, numbered `1..=strip_count`.
    pub strip_count: StripId,
    /// Physical area of one strip (cm²).
    pub strip_area_cm2: f64,
}

impl Region {
    /// Creates a new region.
    #[must_use]
    pub fn new(
        id: RegionId,
        chamber: ChamberId,
        name: impl Into<String>,
        strip_count: StripId,
        strip_area_cm2: f64,
    ) -> Self {
        Self {
            id,
            chamber,
            name: name.into(),
            strip_count,
            strip_area_cm2,
        }
    }

    /// Total active area of the region (cm²).
    #[must_use]
    pub fn area_cm2(&self) -> f64 {
        f64::from(self.strip_count) * self.strip_area_cm2
    }

    /// Returns true if `strip` is a valid strip number for this region.
    #[inline]
    #[must_use]
    pub fn contains_strip(&self, strip: StripId) -> bool {
        strip >= 1 && strip <= self.strip_count
    }
}

/// Static detector geometry.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    regions: BTreeMap<RegionId, Region>,
}

impl Geometry {
    /// Builds and validates a geometry from a list of regions.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for duplicate region ids, empty regions or
    /// non-positive strip areas.
    pub fn new(regions: impl IntoIterator<Item = Region>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for region in regions {
            if region.strip_count == 0 {
                return Err(Error::Config(format!(
                    "region {} ({}) has no strips",
                    region.id, region.name
                )));
            }
            if !(region.strip_area_cm2.is_finite() && region.strip_area_cm2 > 0.0) {
                return Err(Error::Config(format!(
                    "region {} ({}) has invalid strip area {}",
                    region.id, region.name, region.strip_area_cm2
                )));
            }
            if let Some(previous) = map.insert(region.id, region) {
                return Err(Error::Config(format!(
                    "duplicate region id {}",
                    previous.id
                )));
            }
        }
        if map.is_empty() {
            return Err(Error::Config("geometry defines no regions".to_string()));
        }
        Ok(Self { regions: map })
    }

    /// Looks up a region.
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    /// Looks up a region, failing for unknown ids.
    ///
    /// # Errors
    /// Returns [`Error::UnknownRegion`] if the id is not part of the geometry.
    pub fn try_region(&self, id: RegionId) -> Result<&Region> {
        self.region(id).ok_or(Error::UnknownRegion(id.0))
    }

    /// Iterates over all regions in id order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// Iterates over the region ids in order.
    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns true if the geometry has no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Distinct chambers, in id order.
    #[must_use]
    pub fn chambers(&self) -> Vec<ChamberId> {
        let mut chambers: Vec<ChamberId> = self.regions.values().map(|r| r.chamber).collect();
        chambers.sort_unstable();
        chambers.dedup();
        chambers
    }

    /// Regions (partitions) of one chamber.
    pub fn regions_of(&self, chamber: ChamberId) -> impl Iterator<Item = &Region> {
        self.regions.values().filter(move |r| r.chamber == chamber)
    }

    /// Number of partitions of one chamber.
    #[must_use]
    pub fn partition_count(&self, chamber: ChamberId) -> usize {
        self.regions_of(chamber).count()
    }

    /// Total active area of one chamber (cm²).
    #[must_use]
    pub fn total_area_cm2(&self, chamber: ChamberId) -> f64 {
        self.regions_of(chamber).map(Region::area_cm2).sum()
    }
}

/// Channel-to-strip mapping collaborator.
pub trait ChannelMapping: Send + Sync {
    /// Maps a raw readout channel to its region and strip.
    fn map(&self, raw_channel: u32) -> Option<(RegionId, StripId)>;

    /// Returns false for masked (inactive) strips.
    fn is_active(&self, region: RegionId, strip: StripId) -> bool;
}

/// In-memory channel mapping table.
#[derive(Debug, Clone, Default)]
pub struct StripMap {
    channels: HashMap<u32, (RegionId, StripId)>,
    masked: HashSet<(RegionId, StripId)>,
}

impl StripMap {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the channel is already mapped.
    pub fn insert(
        &mut self,
        raw_channel: u32,
        region: RegionId,
        strip: StripId,
        active: bool,
    ) -> Result<()> {
        if self.channels.insert(raw_channel, (region, strip)).is_some() {
            return Err(Error::Config(format!(
                "channel {raw_channel} is mapped twice"
            )));
        }
        if !active {
            self.masked.insert((region, strip));
        }
        Ok(())
    }

    /// Number of mapped channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no channel is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Checks every mapped strip against the geometry.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a channel points to an unknown region or
    /// to a strip outside the region, or if two channels share a strip.
    pub fn validate(&self, geometry: &Geometry) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.channels.len());
        for (&channel, &(region_id, strip)) in &self.channels {
            let region = geometry.region(region_id).ok_or_else(|| {
                Error::Config(format!(
                    "channel {channel} maps to unknown region {region_id}"
                ))
            })?;
            if !region.contains_strip(strip) {
                return Err(Error::Config(format!(
                    "channel {channel} maps to strip {strip} outside region {} (1..={})",
                    region.name, region.strip_count
                )));
            }
            if !seen.insert((region_id, strip)) {
                return Err(Error::Config(format!(
                    "strip {strip} of region {} is mapped by more than one channel",
                    region.name
                )));
            }
        }
        Ok(())
    }
}

impl ChannelMapping for StripMap {
    #[inline]
    fn map(&self, raw_channel: u32) -> Option<(RegionId, StripId)> {
        self.channels.get(&raw_channel).copied()
    }

    #[inline]
    fn is_active(&self, region: RegionId, strip: StripId) -> bool {
        !self.masked.contains(&(region, strip))
    }
}
