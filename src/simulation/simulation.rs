use crate::simulation::clock::SimulationClock;
use crate::simulation::config;
use crate::simulation::engines::decay_engine::DecayEngine;
use crate::simulation::engines::progress_engine::ProgressEngine;
use crate::simulation::engines::reaper::LifecycleReaper;
use crate::simulation::engines::spawner::{RecordFeed, RouteSpawner};
use crate::simulation::records::ProviderError;
use crate::simulation::render::Renderer;
use crate::simulation::route_sets::RouteSets;
use derive_more::Debug;
use thiserror::Error;
use tracing::{info, instrument, warn};

const STATS_INTERVAL: u64 = 1000;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("trip provider: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("failed to set up output: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub ticks: u64,
    pub spawned: u64,
    pub completed: u64,
    pub evicted: u64,
    pub failed_steps: u64,
}

/// The route lifecycle engine. One call of [`Simulation::tick`] advances the clock and runs the
/// spawner, progress updater, reaper, decay updater and reaper again, in this order.
#[derive(Debug)]
pub struct Simulation<F: RecordFeed, R: Renderer> {
    clock: SimulationClock,
    #[debug(skip)]
    spawner: RouteSpawner<F>,
    routes: RouteSets,
    progress: ProgressEngine,
    decay: DecayEngine,
    reaper: LifecycleReaper,
    #[debug(skip)]
    renderer: R,
    failed_steps: u64,
}

impl<F: RecordFeed, R: Renderer> Simulation<F, R> {
    /// Builds the engine. The spawner requests the first record right away.
    pub fn new(config: &config::Simulation, clock: SimulationClock, feed: F, renderer: R) -> Self {
        Simulation {
            clock,
            spawner: RouteSpawner::new(feed, config.path_style()),
            routes: RouteSets::new(config.max_active),
            progress: ProgressEngine::new(config.max_step_percent),
            decay: DecayEngine::new(config.decay_step),
            reaper: LifecycleReaper::default(),
            renderer,
            failed_steps: 0,
        }
    }

    #[instrument(level = "trace", skip(self), fields(tick = self.clock.tick() + 1))]
    pub fn tick(&mut self) {
        let now = self.clock.advance();
        let tick = self.clock.tick();

        // a failing spawn must not keep the other routes from moving
        if let Err(e) = self
            .spawner
            .do_step(now, &mut self.routes, &mut self.renderer)
        {
            self.failed_steps += 1;
            warn!("Spawner step failed at tick {tick}: {}", SimulationError::from(e));
        }

        self.progress
            .do_step(now, self.routes.active_mut(), &mut self.renderer);
        self.reaper.retire_completed(now, tick, &mut self.routes);
        self.decay
            .do_step(now, tick, self.routes.decaying_mut(), &mut self.renderer);
        self.reaper
            .evict_faded(now, &mut self.routes, &mut self.renderer);

        if tick % STATS_INTERVAL == 0 {
            self.log_statistics();
        }
    }

    /// No record is left to spawn and no route is visible anymore.
    pub fn is_idle(&self) -> bool {
        self.spawner.is_exhausted() && self.routes.is_empty()
    }

    pub fn statistics(&self) -> RunStatistics {
        RunStatistics {
            ticks: self.clock.tick(),
            spawned: self.spawner.spawned(),
            completed: self.reaper.completed(),
            evicted: self.reaper.evicted(),
            failed_steps: self.failed_steps,
        }
    }

    pub fn log_statistics(&self) {
        let stats = self.statistics();
        info!(
            tick = stats.ticks,
            now = self.clock.now(),
            active = self.routes.active().len(),
            decaying = self.routes.decaying().len(),
            spawned = stats.spawned,
            completed = stats.completed,
            evicted = stats.evicted,
            failed_steps = stats.failed_steps,
            "Simulation statistics"
        );
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn routes(&self) -> &RouteSets {
        &self.routes
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn spawner(&self) -> &RouteSpawner<F> {
        &self.spawner
    }
}
