//! stripstat-io: configuration loading and file I/O for stripstat.
//!
//! This crate provides JSON loaders for the analysis configuration,
//! detector geometry and channel mapping, memory-mapped reading of binary
//! event files via memmap2, and CSV/JSON report writers.
//!

mod config;
mod error;
mod reader;
mod writer;

pub use config::{load_strip_map, strip_map_from_json, RunConfigFile};
pub use error::{Error, Result};
pub use reader::{EventFileReader, EventIter, MappedFileReader};
pub use writer::{EventFileWriter, ReportWriter};
