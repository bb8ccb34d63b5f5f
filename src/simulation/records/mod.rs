pub mod http_source;
pub mod provider;

use chrono::{DateTime, NaiveDateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Precision of the encoded polylines delivered by the trip source (Google polyline format).
const POLYLINE_PRECISION: u32 = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("trip {trip_id}: field {field} is not a number: {value:?}")]
    InvalidNumber {
        trip_id: String,
        field: &'static str,
        value: String,
    },
    #[error("trip {trip_id}: field {field} is not a timestamp: {value:?}")]
    InvalidTimestamp {
        trip_id: String,
        field: &'static str,
        value: String,
    },
    #[error("trip {trip_id}: duration must be positive, got {duration}")]
    NonPositiveDuration { trip_id: String, duration: f64 },
    #[error("trip {trip_id}: cannot decode polyline: {reason}")]
    InvalidPolyline { trip_id: String, reason: String },
    #[error("trip {trip_id}: unexpected record layout: {reason}")]
    InvalidLayout { trip_id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("no trip record at index {index}, the source holds {total} records")]
    NotFound { index: usize, total: usize },
    #[error("trip source unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    MalformedRecord(#[from] RecordError),
}

/// A validated trip as consumed by the simulation. Coordinates are stored as `x = longitude`
/// and `y = latitude`.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub trip_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub trip_distance: f64,
    pub trip_duration: f64,
    pub start_centroid: Coord<f64>,
    pub end_centroid: Coord<f64>,
    pub points: Vec<Coord<f64>>,
}

impl TripRecord {
    /// Start time in the unit of the simulation clock.
    pub fn start_millis(&self) -> f64 {
        self.start_time.timestamp_millis() as f64
    }
}

/// Numbers are delivered either as JSON numbers or as strings, depending on the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Number(n) => Some(*n),
            RawNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

impl std::fmt::Display for RawNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawNumber::Number(n) => write!(f, "{n}"),
            RawNumber::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A trip record as it comes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTripRecord {
    pub trip_id: RawTripId,
    pub start_time: String,
    pub end_time: String,
    pub trip_distance: RawNumber,
    pub trip_duration: RawNumber,
    pub start_centroid_latitude: RawNumber,
    pub start_centroid_longitude: RawNumber,
    pub end_centroid_latitude: RawNumber,
    pub end_centroid_longitude: RawNumber,
    pub encoded_points: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTripId {
    Id(String),
    Number(u64),
}

impl std::fmt::Display for RawTripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawTripId::Id(s) => write!(f, "{s}"),
            RawTripId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One page of the trip source. Records are kept as JSON values and validated one by one when
/// they are served, so a single broken record does not spoil the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TripPage {
    pub records: Vec<serde_json::Value>,
    pub total: usize,
}

/// Wire format of `GET /routes?start=<n>&end=<m>`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTripPage {
    pub data: Vec<serde_json::Value>,
    pub total: RawNumber,
}

impl TryFrom<RawTripPage> for TripPage {
    type Error = ProviderError;

    fn try_from(value: RawTripPage) -> Result<Self, Self::Error> {
        let total = value
            .total
            .as_f64()
            .filter(|t| t.is_finite() && *t >= 0.)
            .ok_or_else(|| {
                ProviderError::Unavailable(format!("invalid total count {}", value.total))
            })?;
        Ok(TripPage {
            records: value.data,
            total: total as usize,
        })
    }
}

impl TryFrom<&serde_json::Value> for TripRecord {
    type Error = RecordError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        let raw = RawTripRecord::deserialize(value).map_err(|e| RecordError::InvalidLayout {
            trip_id: match value.get("tripId") {
                Some(serde_json::Value::String(id)) => id.clone(),
                Some(id) => id.to_string(),
                None => "<unknown>".to_string(),
            },
            reason: e.to_string(),
        })?;
        TripRecord::try_from(raw)
    }
}

impl TryFrom<RawTripRecord> for TripRecord {
    type Error = RecordError;

    fn try_from(raw: RawTripRecord) -> Result<Self, Self::Error> {
        let trip_id = raw.trip_id.to_string();

        let number = |field: &'static str, value: &RawNumber| {
            value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| RecordError::InvalidNumber {
                    trip_id: trip_id.clone(),
                    field,
                    value: value.to_string(),
                })
        };
        let timestamp = |field: &'static str, value: &str| {
            parse_timestamp(value).ok_or_else(|| RecordError::InvalidTimestamp {
                trip_id: trip_id.clone(),
                field,
                value: value.to_string(),
            })
        };

        let trip_duration = number("tripDuration", &raw.trip_duration)?;
        if trip_duration <= 0. {
            return Err(RecordError::NonPositiveDuration {
                trip_id: trip_id.clone(),
                duration: trip_duration,
            });
        }
        let start_time = timestamp("startTime", &raw.start_time)?;
        let end_time = timestamp("endTime", &raw.end_time)?;
        let trip_distance = number("tripDistance", &raw.trip_distance)?;
        let start_centroid = Coord {
            x: number("startCentroidLongitude", &raw.start_centroid_longitude)?,
            y: number("startCentroidLatitude", &raw.start_centroid_latitude)?,
        };
        let end_centroid = Coord {
            x: number("endCentroidLongitude", &raw.end_centroid_longitude)?,
            y: number("endCentroidLatitude", &raw.end_centroid_latitude)?,
        };

        let points = polyline::decode_polyline(&raw.encoded_points, POLYLINE_PRECISION)
            .map_err(|e| RecordError::InvalidPolyline {
                trip_id: trip_id.clone(),
                reason: e.to_string(),
            })?
            .0;

        Ok(TripRecord {
            trip_id,
            start_time,
            end_time,
            trip_distance,
            trip_duration,
            start_centroid,
            end_centroid,
            points,
        })
    }
}

/// Accepts RFC 3339 timestamps and naive ISO 8601 date times. The latter are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|t| t.and_utc())
}
