use chrono::{DateTime, Utc};
use std::time::Duration;

/// Virtual time of the simulation in epoch milliseconds.
///
/// The clock is advanced by `speed` once per tick and ticks are scheduled every `1 / speed`
/// milliseconds, so the animation rate is decoupled from the real elapsed time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationClock {
    now: f64,
    speed: f64,
    tick: u64,
}

impl SimulationClock {
    pub fn new(start: f64, speed: f64) -> Self {
        assert!(
            speed.is_finite() && Self::period_for(speed).is_some(),
            "simulation speed must be positive with a representable tick period, got {speed}"
        );
        SimulationClock {
            now: start,
            speed,
            tick: 0,
        }
    }

    pub fn starting_at(start: DateTime<Utc>, speed: f64) -> Self {
        Self::new(start.timestamp_millis() as f64, speed)
    }

    pub fn starting_now(speed: f64) -> Self {
        Self::starting_at(Utc::now(), speed)
    }

    pub fn advance(&mut self) -> f64 {
        self.now += self.speed;
        self.tick += 1;
        self.now
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of ticks since the clock was created.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn tick_period(&self) -> Duration {
        Self::period_for(self.speed).unwrap_or(Duration::MAX)
    }

    /// The wall clock time between two ticks at `speed`, if `speed` is positive and the period
    /// fits into a [`Duration`].
    pub fn period_for(speed: f64) -> Option<Duration> {
        if speed <= 0. {
            return None;
        }
        Duration::try_from_secs_f64(1. / speed / 1000.).ok()
    }
}
