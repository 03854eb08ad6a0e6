//! Hit and raw event types for strip detector readout data.

use crate::error::DecodeError;
use crate::geometry::RegionId;
use std::cmp::Ordering;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Strip number within a region (1-based).
pub type StripId = u16;

/// A single decoded hit: one timestamped signal on one strip.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Region the strip belongs to.
    pub region: RegionId,
    /// Strip number (1-based, unique within the region).
    pub strip: StripId,
    /// Time within the readout window (nanoseconds).
    pub time_ns: f64,
}

impl Hit {
    /// Creates a new hit.
    #[inline]
    #[must_use]
    pub fn new(region: RegionId, strip: StripId, time_ns: f64) -> Self {
        Self {
            region,
            strip,
            time_ns,
        }
    }

    /// Orders by strip, then by time.
    #[inline]
    #[must_use]
    pub fn by_strip_then_time(a: &Self, b: &Self) -> Ordering {
        a.strip
            .cmp(&b.strip)
            .then_with(|| a.time_ns.total_cmp(&b.time_ns))
    }

    /// Orders by time, then by strip.
    #[inline]
    #[must_use]
    pub fn by_time(a: &Self, b: &Self) -> Ordering {
        a.time_ns
            .total_cmp(&b.time_ns)
            .then_with(|| a.strip.cmp(&b.strip))
    }
}

/// Event quality flag written by the readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventQuality {
    /// Event passed the readout checks.
    Good,
    /// Event is flagged corrupted and must be skipped.
    Corrupted,
}

/// One event as it comes out of the readout, before channel mapping.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawEvent {
    /// Event sequence number.
    pub event_number: i64,
    /// Optional quality flag.
    pub quality: Option<EventQuality>,
    /// Raw readout channel per hit.
    pub channels: Vec<u32>,
    /// Timestamp per hit (nanoseconds), parallel to `channels`.
    pub times_ns: Vec<f64>,
}

impl RawEvent {
    /// Creates an event without a quality flag.
    #[must_use]
    pub fn new(event_number: i64, channels: Vec<u32>, times_ns: Vec<f64>) -> Self {
        Self {
            event_number,
            quality: None,
            channels,
            times_ns,
        }
    }

    /// Sets the quality flag.
    #[must_use]
    pub fn with_quality(mut self, quality: EventQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Number of hits in the event.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the event has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns true if the readout flagged this event as corrupted.
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        self.quality == Some(EventQuality::Corrupted)
    }

    /// Checks the event for impossible field values.
    ///
    /// # Errors
    /// Returns a [`DecodeError`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.event_number < 0 {
            return Err(DecodeError::NegativeEventNumber(self.event_number));
        }
        if self.channels.len() != self.times_ns.len() {
            return Err(DecodeError::LengthMismatch {
                channels: self.channels.len(),
                times: self.times_ns.len(),
            });
        }
        if let Some(&bad) = self
            .times_ns
            .iter()
            .find(|t| !t.is_finite() || **t < 0.0)
        {
            return Err(DecodeError::InvalidTimestamp(bad));
        }
        Ok(())
    }

    /// Iterates over `(channel, time)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.channels
            .iter()
            .copied()
            .zip(self.times_ns.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ordering() {
        let r = RegionId(1);
        let mut hits = vec![
            Hit::new(r, 7, 12.0),
            Hit::new(r, 5, 30.0),
            Hit::new(r, 5, 10.0),
        ];
        hits.sort_by(Hit::by_strip_then_time);
        assert_eq!(hits[0], Hit::new(r, 5, 10.0));
        assert_eq!(hits[1], Hit::new(r, 5, 30.0));
        assert_eq!(hits[2].strip, 7);

        hits.sort_by(Hit::by_time);
        assert_eq!(hits[1].strip, 7);
    }

    #[test]
    fn test_event_validation() {
        let ok = RawEvent::new(3, vec![1, 2], vec![10.0, 20.0]);
        assert!(ok.validate().is_ok());

        let negative = RawEvent::new(-1, vec![], vec![]);
        assert_eq!(
            negative.validate(),
            Err(DecodeError::NegativeEventNumber(-1))
        );

        let mismatch = RawEvent::new(4, vec![1, 2], vec![10.0]);
        assert_eq!(
            mismatch.validate(),
            Err(DecodeError::LengthMismatch {
                channels: 2,
                times: 1
            })
        );

        let nan = RawEvent::new(5, vec![1], vec![f64::NAN]);
        assert!(matches!(
            nan.validate(),
            Err(DecodeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_quality_flag() {
        let event = RawEvent::new(1, vec![], vec![]);
        assert!(!event.is_corrupted());
        assert!(event.with_quality(EventQuality::Corrupted).is_corrupted());
    }
}
