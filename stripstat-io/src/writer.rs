//! Event file and report writers.

use crate::reader::{QUALITY_ABSENT, QUALITY_CORRUPTED, QUALITY_GOOD};
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use stripstat_algorithms::RunReport;
use stripstat_core::hit::{EventQuality, RawEvent};
use stripstat_core::window::WindowSource;

/// Writer for binary event files, the format read by
/// [`EventFileReader`](crate::EventFileReader).
pub struct EventFileWriter {
    writer: BufWriter<File>,
    events: u64,
}

impl EventFileWriter {
    /// Creates a new event file, truncating any existing one.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer, events: 0 })
    }

    /// Appends one event.
    ///
    /// # Errors
    /// Returns an error on write failure or if the event has more hits than
    /// a record can hold.
    pub fn write_event(&mut self, event: &RawEvent) -> Result<()> {
        let count = |len: usize| {
            u32::try_from(len).map_err(|_| {
                Error::InvalidFormat(format!(
                    "event {} has {len} entries, more than a record can hold",
                    event.event_number
                ))
            })
        };
        let channels = count(event.channels.len())?;
        let times = count(event.times_ns.len())?;
        let quality = match event.quality {
            Some(EventQuality::Good) => QUALITY_GOOD,
            Some(EventQuality::Corrupted) => QUALITY_CORRUPTED,
            None => QUALITY_ABSENT,
        };

        self.writer.write_all(&event.event_number.to_le_bytes())?;
        self.writer.write_all(&[quality])?;
        self.writer.write_all(&channels.to_le_bytes())?;
        self.writer.write_all(&times.to_le_bytes())?;
        for channel in &event.channels {
            self.writer.write_all(&channel.to_le_bytes())?;
        }
        for time in &event.times_ns {
            self.writer.write_all(&time.to_le_bytes())?;
        }
        self.events += 1;
        Ok(())
    }

    /// Appends all events of an iterator.
    ///
    /// # Errors
    /// Stops at the first failing event.
    pub fn write_events<'a, I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a RawEvent>,
    {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    /// Events written so far.
    #[must_use]
    pub fn events_written(&self) -> u64 {
        self.events
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the buffered data cannot be written.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writer for analysis reports.
///
/// Writes one run report as a per-region metrics table (CSV), a per-strip
/// noise table (CSV), or the complete report including raw distributions
/// (JSON).
pub struct ReportWriter {
    writer: BufWriter<File>,
}

impl ReportWriter {
    /// Creates a new report file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes one CSV row per region with the corrected metrics.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_metrics_csv(&mut self, report: &RunReport) -> Result<()> {
        writeln!(
            self.writer,
            "region,chamber,name,area_cm2,window_center_ns,window_half_width_ns,window_source,\
             events,efficiency,efficiency_error,cluster_size,cluster_size_error,\
             cluster_multiplicity,multiplicity_error,rate_hz_cm2,rate_error,\
             cluster_rate_hz_cm2,cluster_rate_error,strip_homogeneity,chip_homogeneity"
        )?;

        for r in &report.regions {
            let m = &r.metrics;
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                r.region,
                r.chamber,
                csv_field(&r.name),
                r.area_cm2,
                r.window.window.center_ns,
                r.window.window.half_width_ns,
                source_label(r.window.source),
                r.statistics.events(),
                m.efficiency,
                m.efficiency_error,
                m.cluster_size,
                m.cluster_size_error,
                m.cluster_multiplicity,
                m.multiplicity_error,
                m.rate,
                m.rate_error,
                m.cluster_rate,
                m.cluster_rate_error,
                r.noise.strip_homogeneity,
                r.noise.chip_homogeneity
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes one CSV row per strip with its background hits and noise rate.
    /// `chip_size` strips make up one front-end chip.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_strip_rates_csv(&mut self, report: &RunReport, chip_size: u16) -> Result<()> {
        let chip_size = usize::from(chip_size.max(1));
        writeln!(self.writer, "region,chip,strip,active,hits,rate_hz_cm2")?;

        for r in &report.regions {
            let profile = &r.statistics.noise_profile;
            for ((strip, hits), rate) in profile.iter().zip(&r.noise.strip_rates) {
                let active = !r.noise.masked_strips.contains(&strip);
                let chip = (usize::from(strip) - 1) / chip_size;
                writeln!(
                    self.writer,
                    "{},{},{},{},{},{}",
                    r.region,
                    chip,
                    strip,
                    u8::from(active),
                    hits,
                    rate
                )?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes the complete report as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error on serialization or write failure.
    pub fn write_json(&mut self, report: &RunReport) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, report)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the buffered data cannot be written.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn source_label(source: WindowSource) -> &'static str {
    match source {
        WindowSource::Fit => "fit",
        WindowSource::Fallback => "fallback",
        WindowSource::NoHits => "no_hits",
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
