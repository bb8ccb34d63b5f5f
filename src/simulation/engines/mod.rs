pub mod decay_engine;
pub mod progress_engine;
pub mod reaper;
pub mod spawner;
