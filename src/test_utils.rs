use crate::simulation::color::StrokeColor;
use crate::simulation::engines::spawner::RecordFeed;
use crate::simulation::records::provider::TripSource;
use crate::simulation::records::{
    ProviderError, RawNumber, RawTripId, RawTripRecord, TripPage, TripRecord,
};
use crate::simulation::render::{IconDescriptor, IconSymbol, PathStyle, Renderer};
use crate::simulation::route::RouteId;
use chrono::DateTime;
use geo::Coord;
use std::future::Future;

/// The example polyline of the Google polyline documentation. It decodes to three points.
pub const SAMPLE_POLYLINE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

pub fn raw_record(trip_id: &str, start_time: &str, duration: f64) -> RawTripRecord {
    RawTripRecord {
        trip_id: RawTripId::Id(trip_id.to_string()),
        start_time: start_time.to_string(),
        end_time: "2019-06-01T23:59:59Z".to_string(),
        trip_distance: RawNumber::from(1200.),
        trip_duration: RawNumber::from(duration),
        start_centroid_latitude: RawNumber::from(41.9),
        start_centroid_longitude: RawNumber::from(-87.6),
        end_centroid_latitude: RawNumber::from(41.8),
        end_centroid_longitude: RawNumber::from(-87.7),
        encoded_points: SAMPLE_POLYLINE.to_string(),
    }
}

pub fn trip_record(trip_id: &str, start_millis: f64, duration: f64) -> TripRecord {
    let start_time = DateTime::from_timestamp_millis(start_millis as i64).unwrap();
    TripRecord {
        trip_id: trip_id.to_string(),
        start_time,
        end_time: start_time + chrono::Duration::milliseconds(duration as i64),
        trip_distance: 1200.,
        trip_duration: duration,
        start_centroid: Coord { x: -87.6, y: 41.9 },
        end_centroid: Coord { x: -87.7, y: 41.8 },
        points: vec![
            Coord { x: -87.6, y: 41.9 },
            Coord { x: -87.65, y: 41.85 },
            Coord { x: -87.7, y: 41.8 },
        ],
    }
}

pub fn path_style() -> PathStyle {
    PathStyle {
        stroke_color: StrokeColor::new(0, 0, 0, 0),
        stroke_opacity: 1.,
        stroke_weight: 3.,
        geodesic: true,
        icon: IconDescriptor {
            symbol: IconSymbol::ForwardClosedArrow,
            scale: 2.,
            stroke_color: StrokeColor::new(0x33, 0x99, 0x33, StrokeColor::OPAQUE),
            offset: 0.,
        },
    }
}

/// Runs a future to completion on a fresh single threaded runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// A trip source backed by a vector. Records every requested range.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTripSource {
    records: Vec<serde_json::Value>,
    requested: Vec<(usize, usize)>,
    failures: usize,
    page_cap: Option<usize>,
}

impl InMemoryTripSource {
    pub fn new(records: Vec<RawTripRecord>) -> Self {
        Self::from_values(
            records
                .into_iter()
                .map(|r| serde_json::to_value(r).unwrap())
                .collect(),
        )
    }

    /// Records as they would arrive over the wire, broken ones included.
    pub fn from_values(records: Vec<serde_json::Value>) -> Self {
        InMemoryTripSource {
            records,
            ..Default::default()
        }
    }

    /// `n` valid records with ids `trip-0`, `trip-1`, ... one minute apart.
    pub fn with_records(n: usize) -> Self {
        let start = DateTime::from_timestamp_millis(1_559_383_200_000).unwrap();
        let records = (0..n)
            .map(|i| {
                let t = start + chrono::Duration::minutes(i as i64);
                raw_record(&format!("trip-{i}"), &t.to_rfc3339(), 60_000.)
            })
            .collect();
        Self::new(records)
    }

    pub fn requested(&self) -> Vec<(usize, usize)> {
        self.requested.clone()
    }

    /// Drops all records from index `n` on, like a data source that shrinks between requests.
    pub fn truncate(&mut self, n: usize) {
        self.records.truncate(n);
    }

    /// Pages hold at most `n` records, whatever range is requested.
    pub fn cap_pages(&mut self, n: usize) {
        self.page_cap = Some(n);
    }

    /// The next `n` page requests fail as unavailable.
    pub fn fail_next(&mut self, n: usize) {
        self.failures = n;
    }
}

impl TripSource for InMemoryTripSource {
    async fn fetch_page(&mut self, start: usize, end: usize) -> Result<TripPage, ProviderError> {
        self.requested.push((start, end));
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ProviderError::Unavailable("connection refused".to_string()));
        }
        let len = self.records.len();
        let end = self.page_cap.map_or(end, |cap| end.min(start + cap));
        Ok(TripPage {
            records: self.records[start.min(len)..end.min(len)].to_vec(),
            total: len,
        })
    }
}

/// A record feed that answers from memory, optionally after a number of polls or with failures.
#[derive(Debug, Clone, Default)]
pub struct ImmediateFeed {
    records: Vec<TripRecord>,
    pub requested: Vec<usize>,
    current: Option<usize>,
    delay: u32,
    wait: u32,
    failures: usize,
}

impl ImmediateFeed {
    pub fn new(records: Vec<TripRecord>) -> Self {
        ImmediateFeed {
            records,
            ..Default::default()
        }
    }

    /// Every request is answered on the `polls + 1`th poll.
    pub fn delayed(mut self, polls: u32) -> Self {
        self.delay = polls;
        self
    }

    /// The next `n` answers are failures.
    pub fn failing(mut self, n: usize) -> Self {
        self.failures = n;
        self
    }

    pub fn fail_once(&mut self) {
        self.failures += 1;
    }
}

impl RecordFeed for ImmediateFeed {
    fn request(&mut self, index: usize) {
        self.requested.push(index);
        self.current = Some(index);
        self.wait = self.delay;
    }

    fn poll(&mut self) -> Option<Result<TripRecord, ProviderError>> {
        let index = self.current?;
        if self.wait > 0 {
            self.wait -= 1;
            return None;
        }
        self.current = None;
        if self.failures > 0 {
            self.failures -= 1;
            return Some(Err(ProviderError::Unavailable("timeout".to_string())));
        }
        Some(self.records.get(index).cloned().ok_or(ProviderError::NotFound {
            index,
            total: self.records.len(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Attach {
        now: f64,
        id: RouteId,
        trip_id: String,
        points: usize,
        icon_color: String,
    },
    IconOffset {
        now: f64,
        id: RouteId,
        offset: f64,
    },
    IconColor {
        now: f64,
        id: RouteId,
        color: String,
    },
    Detach {
        now: f64,
        id: RouteId,
    },
}

/// Keeps every call in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    pub fn attached(&self) -> usize {
        self.count(|c| matches!(c, RenderCall::Attach { .. }))
    }

    pub fn detached(&self) -> usize {
        self.count(|c| matches!(c, RenderCall::Detach { .. }))
    }

    fn count(&self, predicate: impl Fn(&RenderCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }
}

impl Renderer for RecordingRenderer {
    fn attach(
        &mut self,
        now: f64,
        id: RouteId,
        trip_id: &str,
        points: &[Coord<f64>],
        style: &PathStyle,
    ) {
        self.calls.push(RenderCall::Attach {
            now,
            id,
            trip_id: trip_id.to_string(),
            points: points.len(),
            icon_color: style.icon.stroke_color.to_hex(),
        });
    }

    fn set_icon_offset(&mut self, now: f64, id: RouteId, offset: f64) {
        self.calls.push(RenderCall::IconOffset { now, id, offset });
    }

    fn set_icon_color(&mut self, now: f64, id: RouteId, color: StrokeColor) {
        self.calls.push(RenderCall::IconColor {
            now,
            id,
            color: color.to_hex(),
        });
    }

    fn detach(&mut self, now: f64, id: RouteId) {
        self.calls.push(RenderCall::Detach { now, id });
    }
}
