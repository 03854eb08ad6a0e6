//! JSON configuration, geometry and channel mapping loaders.
//!
//! The run configuration file has two sections:
//!
//! ```json
//! {
//!   "analysis": {
//!     "timing": { "raw_window_ns": 24000.0, "dead_time_ns": 100.0 },
//!     "clustering": { "mode": "time_window", "cluster_time_ns": 30.0 },
//!     "chip_size": 8
//!   },
//!   "detector": {
//!     "regions": [
//!       { "id": 1, "chamber": 1, "name": "RE4-2-A", "strip_count": 48, "strip_area_cm2": 3.2 }
//!     ]
//!   }
//! }
//! ```
//!
//! Every analysis parameter is optional and falls back to its default. The
//! channel mapping lives in a separate file:
//!
//! ```json
//! { "channels": [ { "channel": 2001, "region": 1, "strip": 1, "active": true } ] }
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use stripstat_core::cluster::{AdjacencyPolicy, ClusteringConfig, ClusteringMode};
use stripstat_core::config::{AnalysisConfig, TimingConfig};
use stripstat_core::geometry::{ChamberId, Geometry, Region, RegionId, StripMap};
use stripstat_core::hit::StripId;

#[derive(Deserialize)]
struct JsonConfig {
    #[serde(default)]
    analysis: JsonAnalysis,
    detector: JsonDetector,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonAnalysis {
    timing: JsonTiming,
    clustering: JsonClustering,
    chip_size: u16,
}

impl Default for JsonAnalysis {
    fn default() -> Self {
        Self {
            timing: JsonTiming::default(),
            clustering: JsonClustering::default(),
            chip_size: AnalysisConfig::default().chip_size,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonTiming {
    raw_window_ns: f64,
    dead_time_ns: f64,
    bin_width_ns: f64,
    initial_half_width_ns: f64,
    window_sigmas: f64,
    min_fit_bins: usize,
    control_window_start_ns: Option<f64>,
}

impl Default for JsonTiming {
    fn default() -> Self {
        let timing = TimingConfig::default();
        Self {
            raw_window_ns: timing.raw_window_ns,
            dead_time_ns: timing.dead_time_ns,
            bin_width_ns: timing.bin_width_ns,
            initial_half_width_ns: timing.initial_half_width_ns,
            window_sigmas: timing.window_sigmas,
            min_fit_bins: timing.min_fit_bins,
            control_window_start_ns: timing.control_window_start_ns,
        }
    }
}

#[derive(Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
enum JsonMode {
    #[default]
    Strip,
    TimeWindow,
}

#[derive(Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
enum JsonAdjacency {
    #[default]
    SplitSingles,
    DiscardPair,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonClustering {
    mode: JsonMode,
    cluster_time_ns: f64,
    adjacency: JsonAdjacency,
}

impl Default for JsonClustering {
    fn default() -> Self {
        Self {
            mode: JsonMode::default(),
            cluster_time_ns: ClusteringConfig::default().cluster_time_ns,
            adjacency: JsonAdjacency::default(),
        }
    }
}

#[derive(Deserialize)]
struct JsonDetector {
    regions: Vec<JsonRegion>,
}

#[derive(Deserialize)]
struct JsonRegion {
    id: u32,
    chamber: u32,
    #[serde(default)]
    name: Option<String>,
    strip_count: StripId,
    strip_area_cm2: f64,
}

#[derive(Deserialize)]
struct JsonMapping {
    channels: Vec<JsonChannel>,
}

#[derive(Deserialize)]
struct JsonChannel {
    channel: u32,
    region: u32,
    strip: StripId,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Analysis parameters and detector geometry of a run.
#[derive(Debug, Clone)]
pub struct RunConfigFile {
    /// Analysis parameters.
    pub analysis: AnalysisConfig,
    /// Detector regions.
    pub geometry: Geometry,
}

impl RunConfigFile {
    /// Load the configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if any
    /// parameter or region is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_config(json_config)
    }

    /// Load the configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or any parameter or
    /// region is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let JsonAnalysis {
            timing,
            clustering,
            chip_size,
        } = config.analysis;

        let timing = TimingConfig {
            raw_window_ns: timing.raw_window_ns,
            dead_time_ns: timing.dead_time_ns,
            bin_width_ns: timing.bin_width_ns,
            initial_half_width_ns: timing.initial_half_width_ns,
            window_sigmas: timing.window_sigmas,
            min_fit_bins: timing.min_fit_bins,
            control_window_start_ns: timing.control_window_start_ns,
        };
        let mode = match clustering.mode {
            JsonMode::Strip => ClusteringMode::Strip,
            JsonMode::TimeWindow => ClusteringMode::TimeWindow,
        };
        let adjacency = match clustering.adjacency {
            JsonAdjacency::SplitSingles => AdjacencyPolicy::SplitSingles,
            JsonAdjacency::DiscardPair => AdjacencyPolicy::DiscardPair,
        };
        let analysis = AnalysisConfig::default()
            .with_timing(timing)
            .with_clustering(
                ClusteringConfig::new()
                    .with_mode(mode)
                    .with_cluster_time_ns(clustering.cluster_time_ns)
                    .with_adjacency(adjacency),
            )
            .with_chip_size(chip_size);

        // Reject bad parameters at load time, before any event is read.
        analysis.validate()?;

        let regions = config.detector.regions.into_iter().map(|r| {
            let name = r.name.unwrap_or_else(|| format!("region-{}", r.id));
            Region::new(
                RegionId(r.id),
                ChamberId(r.chamber),
                name,
                r.strip_count,
                r.strip_area_cm2,
            )
        });
        let geometry = Geometry::new(regions)?;

        log::debug!(
            "loaded configuration: {} regions in {} chambers",
            geometry.len(),
            geometry.chambers().len()
        );
        Ok(Self { analysis, geometry })
    }
}

/// Load a channel mapping from a JSON file and check it against `geometry`.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, if a channel is
/// listed twice, or if a channel points outside the geometry.
pub fn load_strip_map<P: AsRef<Path>>(path: P, geometry: &Geometry) -> Result<StripMap> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let json: JsonMapping = serde_json::from_reader(reader)?;
    build_strip_map(json, geometry)
}

/// Load a channel mapping from a JSON string and check it against
/// `geometry`.
///
/// # Errors
/// See [`load_strip_map`].
pub fn strip_map_from_json(json: &str, geometry: &Geometry) -> Result<StripMap> {
    let json: JsonMapping = serde_json::from_str(json)?;
    build_strip_map(json, geometry)
}

fn build_strip_map(json: JsonMapping, geometry: &Geometry) -> Result<StripMap> {
    if json.channels.is_empty() {
        return Err(Error::InvalidFormat("channel mapping is empty".into()));
    }
    let mut mapping = StripMap::new();
    for c in json.channels {
        mapping.insert(c.channel, RegionId(c.region), c.strip, c.active)?;
    }
    mapping.validate(geometry)?;
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripstat_core::geometry::ChannelMapping;

    const CONFIG: &str = r#"{
        "analysis": {
            "timing": {
                "raw_window_ns": 2000.0,
                "dead_time_ns": 150.0,
                "control_window_start_ns": 200.0
            },
            "clustering": {
                "mode": "time_window",
                "cluster_time_ns": 25.0,
                "adjacency": "discard_pair"
            },
            "chip_size": 16
        },
        "detector": {
            "regions": [
                { "id": 1, "chamber": 7, "name": "A", "strip_count": 32, "strip_area_cm2": 2.5 },
                { "id": 2, "chamber": 7, "strip_count": 32, "strip_area_cm2": 3.0 }
            ]
        }
    }"#;

    #[test]
    fn test_json_loading() {
        let config = RunConfigFile::from_json(CONFIG).expect("Failed to parse JSON");

        let timing = &config.analysis.timing;
        assert_eq!(timing.raw_window_ns, 2000.0);
        assert_eq!(timing.dead_time_ns, 150.0);
        assert_eq!(timing.control_window_start_ns, Some(200.0));
        assert_eq!(timing.initial_half_width_ns, 40.0); // Default

        let clustering = &config.analysis.clustering;
        assert_eq!(clustering.mode, ClusteringMode::TimeWindow);
        assert_eq!(clustering.cluster_time_ns, 25.0);
        assert_eq!(clustering.adjacency, AdjacencyPolicy::DiscardPair);
        assert_eq!(config.analysis.chip_size, 16);

        assert_eq!(config.geometry.len(), 2);
        let unnamed = config.geometry.region(RegionId(2)).unwrap();
        assert_eq!(unnamed.name, "region-2");
        assert_eq!(unnamed.chamber, ChamberId(7));
        assert_eq!(config.geometry.partition_count(ChamberId(7)), 2);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "detector": {
                "regions": [
                    { "id": 1, "chamber": 1, "strip_count": 8, "strip_area_cm2": 1.0 }
                ]
            }
        }"#;
        let config = RunConfigFile::from_json(json).expect("Should parse minimal config");
        assert_eq!(config.analysis, AnalysisConfig::default());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let json = r#"{
            "analysis": { "timing": { "dead_time_ns": 30000.0 } },
            "detector": {
                "regions": [
                    { "id": 1, "chamber": 1, "strip_count": 8, "strip_area_cm2": 1.0 }
                ]
            }
        }"#;
        assert!(matches!(
            RunConfigFile::from_json(json),
            Err(Error::CoreError(stripstat_core::Error::Config(_)))
        ));

        let no_regions = r#"{ "detector": { "regions": [] } }"#;
        assert!(RunConfigFile::from_json(no_regions).is_err());

        let bad_policy = r#"{
            "analysis": { "clustering": { "adjacency": "merge" } },
            "detector": { "regions": [] }
        }"#;
        assert!(matches!(
            RunConfigFile::from_json(bad_policy),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_strip_map_loading() {
        let config = RunConfigFile::from_json(CONFIG).unwrap();
        let json = r#"{
            "channels": [
                { "channel": 100, "region": 1, "strip": 1 },
                { "channel": 101, "region": 1, "strip": 2, "active": false },
                { "channel": 200, "region": 2, "strip": 1 }
            ]
        }"#;
        let mapping = strip_map_from_json(json, &config.geometry).unwrap();
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.map(101), Some((RegionId(1), 2)));
        assert!(!mapping.is_active(RegionId(1), 2));
        assert!(mapping.is_active(RegionId(2), 1));
    }

    #[test]
    fn test_strip_map_rejects_bad_channels() {
        let config = RunConfigFile::from_json(CONFIG).unwrap();

        let duplicate = r#"{ "channels": [
            { "channel": 100, "region": 1, "strip": 1 },
            { "channel": 100, "region": 1, "strip": 2 }
        ] }"#;
        assert!(strip_map_from_json(duplicate, &config.geometry).is_err());

        let outside = r#"{ "channels": [ { "channel": 100, "region": 1, "strip": 33 } ] }"#;
        assert!(strip_map_from_json(outside, &config.geometry).is_err());

        let unknown = r#"{ "channels": [ { "channel": 100, "region": 9, "strip": 1 } ] }"#;
        assert!(strip_map_from_json(unknown, &config.geometry).is_err());

        let empty = r#"{ "channels": [] }"#;
        assert!(matches!(
            strip_map_from_json(empty, &config.geometry),
            Err(Error::InvalidFormat(_))
        ));
    }
}
