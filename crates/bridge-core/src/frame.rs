//! Fixed-layout telemetry frames.
//!
//! ```text
//! ┌───────────────┬───────────┬───────────┬─────┬───────────┐
//! │ timestamp i64 │ field 0   │ field 1   │ ... │ field N-1 │
//! │ 8 bytes LE    │ f64 LE    │ f64 LE    │     │ f64 LE    │
//! └───────────────┴───────────┴───────────┴─────┴───────────┘
//! ```
//!
//! Fields appear in registry order. With the five reference fields a frame is
//! 48 bytes: `[timestamp][lat][lon][speed][heading][track]`.
//!
//! The timestamp counts 100 ns ticks since 0001-01-01T00:00:00 of the chosen
//! clock, which is what the receiving instrument panels expect.

use crate::error::FrameError;
use crate::registry::TelemetryRegistry;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_WIDTH: usize = 8;
pub const FIELD_WIDTH: usize = 8;
/// Frame length for the five reference fields.
pub const REFERENCE_FRAME_LEN: usize = TIMESTAMP_WIDTH + 5 * FIELD_WIDTH;

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: u32 = 100;
const SECONDS_PER_DAY: i64 = 86_400;

/// Which wall clock stamps outgoing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampClock {
    #[default]
    Local,
    Utc,
}

/// 100 ns ticks since 0001-01-01T00:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameTimestamp(pub i64);

impl FrameTimestamp {
    pub fn now(clock: TimestampClock) -> Self {
        match clock {
            TimestampClock::Local => Self::from_datetime(&Local::now()),
            TimestampClock::Utc => Self::from_datetime(&Utc::now()),
        }
    }

    /// Ticks for the wall-clock reading of `datetime` in its own time zone.
    pub fn from_datetime<Tz: TimeZone>(datetime: &DateTime<Tz>) -> Self {
        Self::from_naive(&datetime.naive_local())
    }

    pub fn from_naive(naive: &NaiveDateTime) -> Self {
        let days = i64::from(naive.num_days_from_ce()).saturating_sub(1);
        let seconds = days
            .saturating_mul(SECONDS_PER_DAY)
            .saturating_add(i64::from(naive.num_seconds_from_midnight()));
        // Leap seconds report nanos past 1e9; fold them into the last tick.
        let sub_ticks = naive.nanosecond().min(999_999_999) / NANOS_PER_TICK;
        Self(
            seconds
                .saturating_mul(TICKS_PER_SECOND)
                .saturating_add(i64::from(sub_ticks)),
        )
    }

    /// Wall-clock reading this timestamp represents, if it is in range.
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        let total_seconds = self.0.div_euclid(TICKS_PER_SECOND);
        let sub_ticks = self.0.rem_euclid(TICKS_PER_SECOND);
        let days = total_seconds.div_euclid(SECONDS_PER_DAY);
        let second_of_day = total_seconds.rem_euclid(SECONDS_PER_DAY);

        let date = NaiveDate::from_num_days_from_ce_opt(i32::try_from(days).ok()?.checked_add(1)?)?;
        let nanos = u32::try_from(sub_ticks).ok()?.checked_mul(NANOS_PER_TICK)?;
        let time = chrono::NaiveTime::from_num_seconds_from_midnight_opt(
            u32::try_from(second_of_day).ok()?,
            nanos,
        )?;
        Some(NaiveDateTime::new(date, time))
    }

    pub fn to_le_bytes(self) -> [u8; TIMESTAMP_WIDTH] {
        self.0.to_le_bytes()
    }
}

/// Ordered field names making up a frame layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSchema {
    fields: Vec<String>,
}

impl FrameSchema {
    pub fn from_registry(registry: &TelemetryRegistry) -> Self {
        Self {
            fields: registry.iter().map(|f| f.name().to_string()).collect(),
        }
    }

    pub fn from_names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            fields: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Byte offset of the value for `name`.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(|index| TIMESTAMP_WIDTH.saturating_add(index.saturating_mul(FIELD_WIDTH)))
    }

    pub fn frame_len(&self) -> usize {
        frame_len(self.fields.len())
    }
}

fn frame_len(field_count: usize) -> usize {
    TIMESTAMP_WIDTH.saturating_add(field_count.saturating_mul(FIELD_WIDTH))
}

/// Serializes registry values into frames, reusing one buffer.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    buffer: Vec<u8>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode the current cached value of every field.
    ///
    /// In-flight and unregistered fields contribute whatever value they last
    /// held, so a frame is always produced at full length.
    pub fn encode(&mut self, registry: &TelemetryRegistry, timestamp: FrameTimestamp) -> &[u8] {
        self.buffer.clear();
        self.buffer.reserve(frame_len(registry.len()));
        self.buffer.extend_from_slice(&timestamp.to_le_bytes());
        for value in registry.values() {
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
        &self.buffer
    }
}

/// Owned frame encoding for one-off use.
pub fn encode(registry: &TelemetryRegistry, timestamp: FrameTimestamp) -> Vec<u8> {
    FrameEncoder::new().encode(registry, timestamp).to_vec()
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub timestamp: FrameTimestamp,
    pub values: Vec<f64>,
}

impl TelemetryFrame {
    /// Decode a frame that must hold exactly `field_count` values.
    pub fn decode(bytes: &[u8], field_count: usize) -> Result<Self, FrameError> {
        let expected = frame_len(field_count);
        if bytes.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Self::decode_any(bytes)
    }

    /// Decode a frame, inferring the field count from its length.
    pub fn decode_any(bytes: &[u8]) -> Result<Self, FrameError> {
        let Some((timestamp, payload)) = bytes.split_first_chunk::<TIMESTAMP_WIDTH>() else {
            return Err(FrameError::TooShort {
                expected: TIMESTAMP_WIDTH,
                actual: bytes.len(),
            });
        };
        if payload.len() % FIELD_WIDTH != 0 {
            return Err(FrameError::UnalignedPayload {
                payload: payload.len(),
            });
        }

        let values = payload
            .chunks_exact(FIELD_WIDTH)
            .filter_map(|chunk| <[u8; FIELD_WIDTH]>::try_from(chunk).ok())
            .map(f64::from_le_bytes)
            .collect();

        Ok(Self {
            timestamp: FrameTimestamp(i64::from_le_bytes(*timestamp)),
            values,
        })
    }

    /// Value for a named field under `schema`.
    pub fn value_of(&self, schema: &FrameSchema, name: &str) -> Option<f64> {
        let index = schema.field_names().iter().position(|f| f == name)?;
        self.values.get(index).copied()
    }
}
