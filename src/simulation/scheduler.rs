use crate::simulation::engines::spawner::RecordFeed;
use crate::simulation::render::Renderer;
use crate::simulation::simulation::{RunStatistics, Simulation};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// When to end a run on its own, in addition to an explicit stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopCondition {
    pub max_ticks: Option<u64>,
    pub when_idle: bool,
}

/// Stops a running scheduler from another thread.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    running: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        stop(&self.running);
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// A receiver that observes every start and stop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }
}

fn stop(running: &watch::Sender<bool>) {
    let was_running = running.send_replace(false);
    if was_running {
        info!("Scheduler stopped.");
    } else {
        debug!("Scheduler is not running. Stop is a no-op.");
    }
}

/// Drives a [`Simulation`] with a fixed tick period of `1 / speed` milliseconds.
pub struct Scheduler<F: RecordFeed, R: Renderer> {
    simulation: Simulation<F, R>,
    running: Arc<watch::Sender<bool>>,
    stop_condition: StopCondition,
}

impl<F: RecordFeed, R: Renderer> Scheduler<F, R> {
    pub fn new(simulation: Simulation<F, R>, stop_condition: StopCondition) -> Self {
        let (running, _) = watch::channel(false);
        Scheduler {
            simulation,
            running: Arc::new(running),
            stop_condition,
        }
    }

    /// Marks the scheduler as running. Returns false, and changes nothing, if it already runs.
    pub fn start(&self) -> bool {
        let mut started = false;
        self.running.send_if_modified(|running| {
            if *running {
                return false;
            }
            *running = true;
            started = true;
            true
        });
        if started {
            info!(
                "Scheduler started with a tick period of {:?}.",
                self.simulation.clock().tick_period()
            );
        } else {
            warn!("Scheduler is already running. Ignoring start.");
        }
        started
    }

    pub fn stop(&self) {
        stop(&self.running);
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            running: self.running.clone(),
        }
    }

    /// Runs a single tick, regardless of the running state.
    pub fn step(&mut self) {
        self.simulation.tick();
    }

    /// Ticks until the scheduler is stopped or a stop condition is met. Does nothing if the
    /// scheduler was not started. Ticks which are late are not caught up.
    pub fn run(&mut self) -> RunStatistics {
        let period = self.simulation.clock().tick_period();
        let mut next = Instant::now();

        while self.is_running() {
            self.simulation.tick();

            if self.should_stop() {
                self.stop();
                break;
            }

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else if now - next > Duration::from_millis(100) {
                next = now;
            }
        }

        self.simulation.log_statistics();
        self.simulation.statistics()
    }

    fn should_stop(&self) -> bool {
        let stats_tick = self.simulation.clock().tick();
        if self
            .stop_condition
            .max_ticks
            .is_some_and(|max| stats_tick >= max)
        {
            info!("Reached tick limit of {stats_tick} ticks.");
            return true;
        }
        if self.stop_condition.when_idle && self.simulation.is_idle() {
            info!("All trip records are played back.");
            return true;
        }
        false
    }

    pub fn simulation(&self) -> &Simulation<F, R> {
        &self.simulation
    }

    pub fn into_simulation(self) -> Simulation<F, R> {
        self.simulation
    }
}
