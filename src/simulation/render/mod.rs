pub mod events_renderer;

use crate::simulation::color::StrokeColor;
use crate::simulation::route::RouteId;
use geo::Coord;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IconSymbol {
    ForwardClosedArrow,
}

/// The moving marker drawn along a path. Its offset is driven by the drawn fraction and its
/// stroke color by the decay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconDescriptor {
    pub symbol: IconSymbol,
    pub scale: f64,
    pub stroke_color: StrokeColor,
    /// Offset along the path in percent.
    pub offset: f64,
}

/// How a route path is drawn. The line itself stays transparent by default, only the icon shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStyle {
    pub stroke_color: StrokeColor,
    pub stroke_opacity: f64,
    pub stroke_weight: f64,
    pub geodesic: bool,
    pub icon: IconDescriptor,
}

/// The map surface routes are drawn on. Implementations own the visual resources; the
/// simulation refers to them by [`RouteId`]. `now` is the simulation time of the call.
pub trait Renderer {
    fn attach(
        &mut self,
        now: f64,
        id: RouteId,
        trip_id: &str,
        points: &[Coord<f64>],
        style: &PathStyle,
    );
    fn set_icon_offset(&mut self, now: f64, id: RouteId, offset: f64);
    fn set_icon_color(&mut self, now: f64, id: RouteId, color: StrokeColor);
    fn detach(&mut self, now: f64, id: RouteId);
}
