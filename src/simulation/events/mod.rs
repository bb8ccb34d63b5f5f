pub mod json_writer;

use crate::simulation::render::PathStyle;
use crate::simulation::route::RouteId;
use derive_builder::Builder;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub trait EventTrait: Debug + Any {
    //This can't be a const, because traits with const fields are not dyn compatible.
    fn type_(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    /// Simulation time in epoch milliseconds.
    fn time(&self) -> f64;
    fn to_json(&self) -> serde_json::Value;
}

type OnEventFn = dyn Fn(&dyn EventTrait) + 'static;

pub type OnEventFnBuilder = dyn FnOnce(&mut EventsManager) + Send;

/// The EventsManager holds call-backs for event processing. Callbacks are registered either for
/// one concrete event type or for all events. Rust has no reflection, so the per-type dispatch
/// goes through the `TypeId` of the event.
#[derive(Default)]
pub struct EventsManager {
    per_type: HashMap<TypeId, Vec<Rc<OnEventFn>>>,
    catch_all: Vec<Box<OnEventFn>>,
    finish: Vec<Box<dyn Fn() + 'static>>,
}

impl Debug for EventsManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventsManager {{ per_type: {:?}, catch_all: {:?}, finish: {:?} }}",
            self.per_type.len(),
            self.catch_all.len(),
            self.finish.len()
        )
    }
}

impl EventsManager {
    pub fn new() -> Self {
        EventsManager {
            per_type: HashMap::new(),
            catch_all: Vec::new(),
            finish: Vec::new(),
        }
    }

    pub fn publish_event(&mut self, event: &dyn EventTrait) {
        let tid = event.as_any().type_id();
        if let Some(list) = self.per_type.get(&tid).cloned() {
            for h in list {
                h(event);
            }
        }
        for h in &self.catch_all {
            h(event);
        }
    }

    pub fn finish(&mut self) {
        for f in self.finish.iter_mut() {
            f()
        }
    }

    /// This function is used to register callbacks for specific event types.
    pub fn on<E, F>(&mut self, f: F)
    where
        E: EventTrait,
        F: Fn(&E) + 'static,
    {
        let type_id = TypeId::of::<E>();
        let entry = self.per_type.entry(type_id).or_default();
        entry.push(Rc::new(move |ev: &dyn EventTrait| {
            if let Some(e) = ev.as_any().downcast_ref::<E>() {
                f(e);
            }
        }));
    }

    /// This function is used to register callbacks for all event types.
    pub fn on_any<F>(&mut self, f: F)
    where
        F: Fn(&dyn EventTrait) + 'static,
    {
        self.catch_all.push(Box::new(f));
    }

    pub fn on_finish<F>(&mut self, f: F)
    where
        F: Fn() + 'static,
    {
        self.finish.push(Box::new(f));
    }
}

macro_rules! impl_event {
    ($event:ty, $type_name:literal) => {
        impl $event {
            pub const TYPE: &'static str = $type_name;
        }

        impl EventTrait for $event {
            fn type_(&self) -> &'static str {
                Self::TYPE
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn time(&self) -> f64 {
                self.time
            }
            fn to_json(&self) -> serde_json::Value {
                let mut value = serde_json::to_value(self).unwrap_or_default();
                if let Some(map) = value.as_object_mut() {
                    map.insert("type".to_string(), Self::TYPE.into());
                }
                value
            }
        }
    };
}

/// A route path was handed to the renderer.
#[derive(Builder, Debug, Clone, Serialize, PartialEq)]
pub struct RouteAttachedEvent {
    pub time: f64,
    pub route: RouteId,
    pub trip_id: String,
    /// `[longitude, latitude]` pairs.
    pub points: Vec<[f64; 2]>,
    pub style: PathStyle,
}
impl_event!(RouteAttachedEvent, "routeAttached");

#[derive(Builder, Debug, Clone, Serialize, PartialEq)]
pub struct IconOffsetChangedEvent {
    pub time: f64,
    pub route: RouteId,
    /// Drawn fraction in percent.
    pub offset: f64,
}
impl_event!(IconOffsetChangedEvent, "iconOffset");

#[derive(Builder, Debug, Clone, Serialize, PartialEq)]
pub struct IconColorChangedEvent {
    pub time: f64,
    pub route: RouteId,
    pub color: String,
}
impl_event!(IconColorChangedEvent, "iconColor");

#[derive(Builder, Debug, Clone, Serialize, PartialEq)]
pub struct RouteDetachedEvent {
    pub time: f64,
    pub route: RouteId,
}
impl_event!(RouteDetachedEvent, "routeDetached");
