use serde::Deserialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::error::PayloadError;

/// Payload of a `countdown_update` push event.
///
/// The backend also sends its own `days`/`hours`/`minutes`/`seconds` breakdown;
/// those fields are ignored because the breakdown is projected locally.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CountdownPayload {
    /// Instant at which the current period ends.
    #[serde(rename = "endDate", alias = "endInstant")]
    pub end_date: RawInstant,
}

impl CountdownPayload {
    /// Decode a raw JSON payload.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, PayloadError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Build a payload around an already-parsed instant.
    pub fn at(end: OffsetDateTime) -> Self {
        Self {
            end_date: RawInstant::Resolved(end),
        }
    }
}

/// End-instant as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawInstant {
    /// RFC 3339 / ISO-8601 text, e.g. `2025-03-20T00:00:00.000Z`.
    Text(String),
    /// Milliseconds since the Unix epoch; fractions are rounded to the nearest millisecond.
    EpochMillis(f64),
    /// Instant parsed by the caller.
    #[serde(skip_deserializing)]
    Resolved(OffsetDateTime),
}

impl RawInstant {
    /// Resolve the wire representation into an absolute instant.
    pub fn resolve(&self) -> Result<OffsetDateTime, PayloadError> {
        match self {
            Self::Text(value) => OffsetDateTime::parse(value.trim(), &Rfc3339).map_err(|source| {
                PayloadError::InvalidInstant {
                    value: value.clone(),
                    source,
                }
            }),
            Self::EpochMillis(millis) => {
                let out_of_range = || PayloadError::InstantOutOfRange { millis: *millis };
                if !millis.is_finite() {
                    return Err(out_of_range());
                }
                // Saturating cast; anything that large is rejected below.
                let whole = millis.round() as i128;
                OffsetDateTime::from_unix_timestamp_nanos(whole.saturating_mul(1_000_000))
                    .map_err(|_| out_of_range())
            }
            Self::Resolved(instant) => Ok(*instant),
        }
    }
}
