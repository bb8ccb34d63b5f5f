use crate::simulation::color::StrokeColor;
use crate::simulation::events::{
    EventsManager, IconColorChangedEventBuilder, IconOffsetChangedEventBuilder,
    RouteAttachedEventBuilder, RouteDetachedEventBuilder,
};
use crate::simulation::render::{PathStyle, Renderer};
use crate::simulation::route::RouteId;
use geo::Coord;
use std::cell::RefCell;
use std::rc::Rc;

/// Publishes every renderer call as an event. Subscribers (e.g. the JSON events writer or a
/// map front end) receive the drawing instructions from the events manager.
#[derive(Debug, Clone)]
pub struct EventsRenderer {
    events: Rc<RefCell<EventsManager>>,
}

impl EventsRenderer {
    pub fn new(events: Rc<RefCell<EventsManager>>) -> Self {
        EventsRenderer { events }
    }

    pub fn events(&self) -> Rc<RefCell<EventsManager>> {
        self.events.clone()
    }
}

impl Renderer for EventsRenderer {
    fn attach(
        &mut self,
        now: f64,
        id: RouteId,
        trip_id: &str,
        points: &[Coord<f64>],
        style: &PathStyle,
    ) {
        self.events.borrow_mut().publish_event(
            &RouteAttachedEventBuilder::default()
                .time(now)
                .route(id)
                .trip_id(trip_id.to_string())
                .points(points.iter().map(|c| [c.x, c.y]).collect())
                .style(style.clone())
                .build()
                .unwrap(),
        );
    }

    fn set_icon_offset(&mut self, now: f64, id: RouteId, offset: f64) {
        self.events.borrow_mut().publish_event(
            &IconOffsetChangedEventBuilder::default()
                .time(now)
                .route(id)
                .offset(offset)
                .build()
                .unwrap(),
        );
    }

    fn set_icon_color(&mut self, now: f64, id: RouteId, color: StrokeColor) {
        self.events.borrow_mut().publish_event(
            &IconColorChangedEventBuilder::default()
                .time(now)
                .route(id)
                .color(color.to_hex())
                .build()
                .unwrap(),
        );
    }

    fn detach(&mut self, now: f64, id: RouteId) {
        self.events.borrow_mut().publish_event(
            &RouteDetachedEventBuilder::default()
                .time(now)
                .route(id)
                .build()
                .unwrap(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::events::{EventTrait, RouteAttachedEvent};
    use crate::test_utils::path_style;

    #[test]
    fn calls_become_events() {
        let events = Rc::new(RefCell::new(EventsManager::new()));
        let types = Rc::new(RefCell::new(Vec::new()));
        let attached = Rc::new(RefCell::new(Vec::new()));

        let t = types.clone();
        events
            .borrow_mut()
            .on_any(move |e: &dyn EventTrait| t.borrow_mut().push(e.type_()));
        let a = attached.clone();
        events
            .borrow_mut()
            .on::<RouteAttachedEvent, _>(move |e| a.borrow_mut().push(e.clone()));

        let mut renderer = EventsRenderer::new(events);
        let points = vec![Coord { x: -87.6, y: 41.9 }, Coord { x: -87.7, y: 41.8 }];
        renderer.attach(1., RouteId(1), "trip-1", &points, &path_style());
        renderer.set_icon_offset(2., RouteId(1), 0.09);
        renderer.set_icon_color(3., RouteId(1), "#339933FE".parse().unwrap());
        renderer.detach(4., RouteId(1));

        assert_eq!(
            *types.borrow(),
            vec!["routeAttached", "iconOffset", "iconColor", "routeDetached"]
        );
        let attached = attached.borrow();
        assert_eq!(attached[0].points, vec![[-87.6, 41.9], [-87.7, 41.8]]);
        assert_eq!(attached[0].style, path_style());
    }

    #[test]
    fn attached_event_describes_the_whole_path() {
        let events = Rc::new(RefCell::new(EventsManager::new()));
        let json = Rc::new(RefCell::new(None));
        let j = json.clone();
        events
            .borrow_mut()
            .on::<RouteAttachedEvent, _>(move |e| *j.borrow_mut() = Some(e.to_json()));

        let mut style = path_style();
        style.stroke_weight = 5.;
        style.icon.scale = 3.;
        let mut renderer = EventsRenderer::new(events);
        renderer.attach(1., RouteId(7), "trip-7", &[Coord { x: 1., y: 2. }], &style);

        let json = json.borrow().clone().unwrap();
        assert_eq!(json["type"], "routeAttached");
        assert_eq!(json["route"], 7);
        let style = &json["style"];
        assert_eq!(style["stroke_color"], "#00000000");
        assert_eq!(style["stroke_opacity"], 1.);
        assert_eq!(style["stroke_weight"], 5.);
        assert_eq!(style["geodesic"], true);
        assert_eq!(style["icon"]["symbol"], "FORWARD_CLOSED_ARROW");
        assert_eq!(style["icon"]["scale"], 3.);
        assert_eq!(style["icon"]["stroke_color"], "#339933FF");
        assert_eq!(style["icon"]["offset"], 0.);
    }
}
