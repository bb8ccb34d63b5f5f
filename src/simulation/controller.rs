use crate::external_services::trips::TripsServiceAdapterFactory;
use crate::simulation::clock::SimulationClock;
use crate::simulation::config::{write_config, Config, WriteEvents};
use crate::simulation::events::json_writer::JsonEventsWriter;
use crate::simulation::events::{EventsManager, OnEventFnBuilder};
use crate::simulation::logging;
use crate::simulation::render::events_renderer::EventsRenderer;
use crate::simulation::scheduler::{Scheduler, StopCondition};
use crate::simulation::simulation::{RunStatistics, Simulation, SimulationError};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tracing::info;

/// Runs a complete playback: sets up output and logging, starts the trips adapter thread, and
/// ticks the simulation until it stops. Renderer calls are published as events.
pub fn run(config: Config) -> Result<RunStatistics, SimulationError> {
    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)?;
    let _guards = logging::init_logging(&config);
    write_config(&config, &output_dir)?;
    info!("Output is written to {output_dir:?}");

    let events = Rc::new(RefCell::new(EventsManager::new()));
    for subscriber in events_subscribers(&config, &output_dir) {
        subscriber(&mut *events.borrow_mut());
    }

    let factory = TripsServiceAdapterFactory::from_config(&config.trips())?;
    let (adapter, feed) = factory.spawn_thread("trips")?;

    let sim_config = config.simulation();
    let clock = match sim_config.start_time {
        Some(start) => SimulationClock::starting_at(start, sim_config.speed),
        None => SimulationClock::starting_now(sim_config.speed),
    };
    info!(
        "Starting simulation at {} with speed {}",
        clock.now(),
        clock.speed()
    );

    let simulation = Simulation::new(&sim_config, clock, feed, EventsRenderer::new(events.clone()));
    let mut scheduler = Scheduler::new(
        simulation,
        StopCondition {
            max_ticks: sim_config.max_ticks,
            when_idle: sim_config.stop_when_idle,
        },
    );
    scheduler.start();
    let stats = scheduler.run();

    events.borrow_mut().finish();
    // dropping the simulation drops the request sender of the adapter
    drop(scheduler);
    adapter.shutdown();

    info!("Simulation finished after {} ticks.", stats.ticks);
    Ok(stats)
}

fn events_subscribers(config: &Config, output_dir: &Path) -> Vec<Box<OnEventFnBuilder>> {
    let mut subscribers: Vec<Box<OnEventFnBuilder>> = Vec::new();
    if config.output().write_events == WriteEvents::Json {
        subscribers.push(JsonEventsWriter::register(output_dir.join("events.jsonl")));
    }
    subscribers
}
