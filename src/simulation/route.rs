use crate::simulation::color::StrokeColor;
use crate::simulation::records::TripRecord;
use geo::Coord;
use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteId(pub u64);

impl Display for RouteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePhase {
    Active,
    /// Completed at tick `since`. The first decay step happens on the tick after.
    Decaying { since: u64 },
}

/// One animated trip path.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    id: RouteId,
    trip_id: String,
    points: Vec<Coord<f64>>,
    duration: f64,
    start_time: f64,
    drawn_fraction: f64,
    icon_color: StrokeColor,
    phase: RoutePhase,
}

impl Route {
    /// Creates an active route. `now` is the simulation time at spawn and becomes the route's
    /// start time; the record's own start time is not used for progress.
    pub fn spawn(id: RouteId, record: TripRecord, now: f64, icon_color: StrokeColor) -> Self {
        Route {
            id,
            trip_id: record.trip_id,
            points: record.points,
            duration: record.trip_duration,
            start_time: now,
            drawn_fraction: 0.,
            icon_color,
            phase: RoutePhase::Active,
        }
    }

    /// Unclamped progress `t = (now - start_time) / duration`.
    pub fn progress(&self, now: f64) -> f64 {
        (now - self.start_time) / self.duration
    }

    pub fn is_complete(&self, now: f64) -> bool {
        self.progress(now) >= 1.
    }

    /// Moves the drawn fraction (percent) towards `t * 100`, limited to `max_step` percent per
    /// call. Returns the new value if it changed.
    pub fn advance_drawn_fraction(&mut self, now: f64, max_step: f64) -> Option<f64> {
        let upper = (self.drawn_fraction + max_step).min(100.);
        let next = (self.progress(now) * 100.).clamp(0., upper).max(self.drawn_fraction);
        if next == self.drawn_fraction {
            return None;
        }
        self.drawn_fraction = next;
        Some(next)
    }

    pub(crate) fn start_decay(&mut self, tick: u64) {
        debug_assert_eq!(self.phase, RoutePhase::Active);
        self.phase = RoutePhase::Decaying { since: tick };
    }

    /// Whether the route has been decaying since before `tick`.
    pub fn decays_at(&self, tick: u64) -> bool {
        matches!(self.phase, RoutePhase::Decaying { since } if since < tick)
    }

    pub fn fade(&mut self, step: i32) -> StrokeColor {
        self.icon_color.fade(step);
        self.icon_color
    }

    pub fn is_faded(&self) -> bool {
        self.icon_color.is_transparent()
    }

    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn points(&self) -> &[Coord<f64>] {
        &self.points
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn drawn_fraction(&self) -> f64 {
        self.drawn_fraction
    }

    pub fn icon_color(&self) -> StrokeColor {
        self.icon_color
    }

    pub fn stroke_alpha(&self) -> i32 {
        self.icon_color.alpha
    }

    pub fn phase(&self) -> RoutePhase {
        self.phase
    }
}
