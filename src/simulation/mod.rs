pub mod clock;
pub mod color;
pub mod config;
pub mod controller;
pub mod engines;
pub mod events;
pub mod io;
pub mod logging;
pub mod records;
pub mod render;
pub mod route;
pub mod route_sets;
pub mod scheduler;
#[allow(clippy::module_inception)]
pub mod simulation;
