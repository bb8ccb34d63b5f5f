use serial_test::serial;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;
use trip_sim::external_services::trips::TripsServiceAdapterFactory;
use trip_sim::simulation::clock::SimulationClock;
use trip_sim::simulation::config::{self, Config, Logging, Output, TripsSource, WriteEvents};
use trip_sim::simulation::controller;
use trip_sim::simulation::events::json_writer::JsonEventsWriter;
use trip_sim::simulation::events::{EventsManager, IconOffsetChangedEvent};
use trip_sim::simulation::render::events_renderer::EventsRenderer;
use trip_sim::simulation::route::RouteId;
use trip_sim::simulation::scheduler::{Scheduler, StopCondition};
use trip_sim::simulation::simulation::Simulation;
use trip_sim::test_utils::{
    trip_record, ImmediateFeed, InMemoryTripSource, RecordingRenderer, RenderCall,
};

// 2019-06-01T10:00:00Z
const START: f64 = 1_559_383_200_000.;

#[test]
fn active_routes_never_exceed_capacity() {
    let records = (0..60)
        .map(|i| trip_record(&format!("trip-{i}"), START, 1_000_000.))
        .collect();
    let mut simulation = Simulation::new(
        &config::Simulation::default(),
        SimulationClock::new(START, 1.),
        ImmediateFeed::new(records),
        RecordingRenderer::default(),
    );

    for _ in 0..100 {
        simulation.tick();
        assert!(simulation.routes().active().len() <= 50);
    }
    assert_eq!(simulation.routes().active().len(), 50);
    assert_eq!(simulation.statistics().spawned, 50);
    assert!(simulation.spawner().has_pending_record());
}

#[test]
fn spawning_resumes_when_capacity_is_freed() {
    let sim_config = config::Simulation {
        max_active: 2,
        ..Default::default()
    };
    let records = vec![
        trip_record("short", START, 5.),
        trip_record("long", START, 1000.),
        trip_record("waiting", START, 1000.),
    ];
    let mut simulation = Simulation::new(
        &sim_config,
        SimulationClock::new(START, 1.),
        ImmediateFeed::new(records),
        RecordingRenderer::default(),
    );

    simulation.tick();
    simulation.tick();
    assert_eq!(simulation.routes().active().len(), 2);

    // "short" spawned at tick 1 completes at tick 6, "waiting" follows at tick 7
    for _ in 0..4 {
        simulation.tick();
    }
    assert_eq!(simulation.statistics().spawned, 2);
    simulation.tick();
    assert_eq!(simulation.statistics().spawned, 3);
    let trips: Vec<&str> = simulation
        .routes()
        .active()
        .iter()
        .map(|r| r.trip_id())
        .collect();
    assert_eq!(trips, vec!["long", "waiting"]);
}

#[test]
fn every_route_runs_through_the_whole_lifecycle() {
    let records = (0..5)
        .map(|i| trip_record(&format!("trip-{i}"), START + i as f64 * 10., 50.))
        .collect();
    let mut simulation = Simulation::new(
        &config::Simulation::default(),
        SimulationClock::new(START, 1.),
        ImmediateFeed::new(records),
        RecordingRenderer::default(),
    );

    let mut ticks = 0;
    while !simulation.is_idle() {
        simulation.tick();
        ticks += 1;
        assert!(ticks < 10_000, "simulation did not become idle");
    }

    let calls = &simulation.renderer().calls;
    let renderer = simulation.renderer();
    assert_eq!(renderer.attached(), 5);
    assert_eq!(renderer.detached(), 5);

    // per route: attach first, detach last, offsets non-decreasing, alpha non-increasing
    let mut offsets: HashMap<RouteId, f64> = HashMap::new();
    let mut alphas: HashMap<RouteId, u8> = HashMap::new();
    let mut detached: Vec<RouteId> = Vec::new();
    for call in calls {
        match call {
            RenderCall::Attach { id, .. } => {
                assert!(!offsets.contains_key(id));
                offsets.insert(*id, 0.);
            }
            RenderCall::IconOffset { id, offset, .. } => {
                assert!(!detached.contains(id));
                let previous = offsets.insert(*id, *offset).unwrap();
                assert!(*offset > previous);
                assert!(*offset - previous <= 0.09 + 1e-9);
            }
            RenderCall::IconColor { id, color, .. } => {
                assert!(!detached.contains(id));
                let alpha = u8::from_str_radix(&color[7..9], 16).unwrap();
                if let Some(previous) = alphas.insert(*id, alpha) {
                    assert!(alpha < previous);
                }
            }
            RenderCall::Detach { id, .. } => {
                assert_eq!(alphas[id], 0);
                detached.push(*id);
            }
        }
    }
    assert_eq!(detached.len(), 5);
}

#[test]
fn playback_through_the_trips_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");

    let events = Rc::new(RefCell::new(EventsManager::new()));
    JsonEventsWriter::register(events_path.clone())(&mut *events.borrow_mut());
    let offsets = Rc::new(RefCell::new(0));
    let counter = offsets.clone();
    events
        .borrow_mut()
        .on::<IconOffsetChangedEvent, _>(move |_| *counter.borrow_mut() += 1);

    // five records one minute apart, each lasting one minute
    let factory = TripsServiceAdapterFactory::new(InMemoryTripSource::with_records(5), 2, 1);
    let (adapter, feed) = factory.spawn_thread("trips").unwrap();

    let sim_config = config::Simulation {
        speed: 60_000.,
        ..Default::default()
    };
    let simulation = Simulation::new(
        &sim_config,
        SimulationClock::new(START, sim_config.speed),
        feed,
        EventsRenderer::new(events.clone()),
    );
    let mut scheduler = Scheduler::new(
        simulation,
        StopCondition {
            max_ticks: Some(10_000_000),
            when_idle: true,
        },
    );
    assert!(scheduler.start());
    let stats = scheduler.run();
    events.borrow_mut().finish();
    drop(scheduler);
    adapter.shutdown();

    assert!(stats.ticks < 10_000_000);
    assert_eq!(stats.spawned, 5);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.evicted, 5);
    assert!(*offsets.borrow() >= 5);

    let lines: Vec<serde_json::Value> = fs::read_to_string(&events_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let attached: Vec<&str> = lines
        .iter()
        .filter(|l| l["type"] == "routeAttached")
        .map(|l| l["trip_id"].as_str().unwrap())
        .collect();
    assert_eq!(attached, vec!["trip-0", "trip-1", "trip-2", "trip-3", "trip-4"]);
    assert_eq!(
        lines.iter().filter(|l| l["type"] == "routeDetached").count(),
        5
    );
}

#[test]
#[serial]
fn controller_keeps_ticking_without_trip_service() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.set_trips(TripsSource {
        // nothing is expected to listen on the discard port
        base_url: "http://127.0.0.1:9".to_string(),
        max_attempts: 1,
        request_timeout_ms: 200,
        ..Default::default()
    });
    config.set_simulation(config::Simulation {
        speed: 1000.,
        max_ticks: Some(50),
        ..Default::default()
    });
    config.set_output(Output {
        output_dir: dir.path().to_path_buf(),
        logging: Logging::Info,
        write_events: WriteEvents::Json,
    });

    let stats = controller::run(config).unwrap();

    assert_eq!(stats.ticks, 50);
    assert_eq!(stats.spawned, 0);
    assert!(dir.path().join("output_config.yml").exists());
    assert!(dir.path().join("events.jsonl").exists());
    assert!(dir.path().join("log.txt").exists());
}
