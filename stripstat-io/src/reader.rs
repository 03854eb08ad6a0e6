//! Memory-mapped event file reader.
//!
//! An event file (`.sev`) is a plain sequence of little-endian records:
//!
//! | field        | type            |
//! |--------------|-----------------|
//! | event number | `i64`           |
//! | quality      | `u8` (0 good, 1 corrupted, 255 absent) |
//! | channel count| `u32`           |
//! | time count   | `u32`           |
//! | channels     | `u32` × count   |
//! | times (ns)   | `f64` × count   |
//!
//! The file is scanned once at open time. A truncated record or an unknown
//! quality byte makes the whole file unreadable; a record whose channel and
//! time counts differ decodes to a [`DecodeError`] and is skipped by the
//! pipeline.

use crate::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use stripstat_algorithms::EventSource;
use stripstat_core::error::DecodeError;
use stripstat_core::hit::{EventQuality, RawEvent};

pub(crate) const RECORD_HEADER_LEN: usize = 8 + 1 + 4 + 4;
pub(crate) const QUALITY_GOOD: u8 = 0;
pub(crate) const QUALITY_CORRUPTED: u8 = 1;
pub(crate) const QUALITY_ABSENT: u8 = 255;

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    offset: usize,
    channels: usize,
    times: usize,
}

/// Reader for binary event files.
pub struct EventFileReader {
    reader: MappedFileReader,
    records: Vec<Record>,
}

impl EventFileReader {
    /// Opens and indexes an event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped, a record is
    /// truncated, or a quality byte is unknown.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let records = scan_records(reader.as_bytes()).map_err(|msg| {
            Error::InvalidFormat(format!("{msg} (file: {})", reader.path().display()))
        })?;
        log::debug!(
            "indexed {} events in {} ({} bytes)",
            records.len(),
            reader.path().display(),
            reader.len()
        );
        Ok(Self { reader, records })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Number of event records in the file.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.records.len()
    }

    /// Total hits over all well-formed records.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.channels == r.times)
            .map(|r| r.channels)
            .sum()
    }

    /// Decodes one event.
    ///
    /// # Errors
    /// Returns [`DecodeError::LengthMismatch`] if the record's channel and
    /// time counts differ.
    ///
    /// # Panics
    /// Panics if `index >= self.event_count()`.
    pub fn event(&self, index: usize) -> std::result::Result<RawEvent, DecodeError> {
        decode_record(self.reader.as_bytes(), self.records[index])
    }

    /// Iterates over the events in file order.
    #[must_use]
    pub fn iter(&self) -> EventIter<'_> {
        EventIter {
            data: self.reader.as_bytes(),
            records: self.records.iter(),
        }
    }

    /// Earliest and latest hit time over all decodable events, or `None`
    /// if the file has no hits.
    #[must_use]
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.iter()
            .flatten()
            .flat_map(|event| event.times_ns.into_iter())
            .filter(|t| t.is_finite())
            .fold(None, |range, t| match range {
                None => Some((t, t)),
                Some((lo, hi)) => Some((f64::min(lo, t), f64::max(hi, t))),
            })
    }
}

impl EventSource for EventFileReader {
    fn events(&self) -> Box<dyn Iterator<Item = std::result::Result<RawEvent, DecodeError>> + '_> {
        Box::new(self.iter())
    }
}

/// Iterator over the events of an [`EventFileReader`].
pub struct EventIter<'a> {
    data: &'a [u8],
    records: std::slice::Iter<'a, Record>,
}

impl Iterator for EventIter<'_> {
    type Item = std::result::Result<RawEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records
            .next()
            .map(|&record| decode_record(self.data, record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for EventIter<'_> {}

fn scan_records(data: &[u8]) -> std::result::Result<Vec<Record>, String> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        if data.len() - offset < RECORD_HEADER_LEN {
            return Err(format!(
                "truncated record header at byte {offset} (record {})",
                records.len()
            ));
        }
        let quality = data[offset + 8];
        if !matches!(quality, QUALITY_GOOD | QUALITY_CORRUPTED | QUALITY_ABSENT) {
            return Err(format!(
                "unknown quality byte {quality} at byte {} (record {})",
                offset + 8,
                records.len()
            ));
        }
        let channels = read_u32(data, offset + 9) as usize;
        let times = read_u32(data, offset + 13) as usize;
        let body = channels
            .checked_mul(4)
            .and_then(|c| times.checked_mul(8).and_then(|t| c.checked_add(t)))
            .ok_or_else(|| format!("record {} is too large", records.len()))?;
        let end = offset + RECORD_HEADER_LEN;
        if data.len() - end < body {
            return Err(format!(
                "truncated record {} at byte {offset}: needs {body} bytes, {} left",
                records.len(),
                data.len() - end
            ));
        }
        records.push(Record {
            offset,
            channels,
            times,
        });
        offset = end + body;
    }
    Ok(records)
}

fn decode_record(data: &[u8], record: Record) -> std::result::Result<RawEvent, DecodeError> {
    if record.channels != record.times {
        return Err(DecodeError::LengthMismatch {
            channels: record.channels,
            times: record.times,
        });
    }
    let offset = record.offset;
    let event_number = i64::from_le_bytes(read_array(data, offset));
    let quality = match data[offset + 8] {
        QUALITY_GOOD => Some(EventQuality::Good),
        QUALITY_CORRUPTED => Some(EventQuality::Corrupted),
        _ => None,
    };

    let channel_start = offset + RECORD_HEADER_LEN;
    let time_start = channel_start + 4 * record.channels;
    let channels = (0..record.channels)
        .map(|i| read_u32(data, channel_start + 4 * i))
        .collect();
    let times_ns = (0..record.times)
        .map(|i| f64::from_le_bytes(read_array(data, time_start + 8 * i)))
        .collect();

    Ok(RawEvent {
        event_number,
        quality,
        channels,
        times_ns,
    })
}

#[inline]
fn read_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&data[offset..offset + N]);
    bytes
}

#[inline]
fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_array(data, offset))
}
