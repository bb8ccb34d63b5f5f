use crate::simulation::clock::SimulationClock;
use crate::simulation::color::StrokeColor;
use crate::simulation::io::{is_url, resolve_path};
use crate::simulation::records::http_source::RetryPolicy;
use crate::simulation::render::{IconDescriptor, IconSymbol, PathStyle};
use ahash::HashMap;
use chrono::{DateTime, Utc};
use clap::Parser;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{Debug, Display};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Macro to register an override handler for a specific config key
#[macro_export]
macro_rules! register_override {
    ($key:literal, $func:expr) => {
        inventory::submit! {
            $crate::simulation::config::OverrideHandler {
                key: $key,
                apply: $func,
            }
        }
    };
}

pub struct OverrideHandler {
    key: &'static str,
    apply: fn(config: &mut Config, value: &str) -> Result<(), ConfigError>,
}

// Collect all OverrideHandler submitted from anywhere in the crate
inventory::collect!(OverrideHandler);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("failed to write config file {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidOverride {
        key: String,
        value: String,
        reason: String,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(long, short)]
    pub config: String,
    #[arg(long= "set", value_parser = parse_key_val)]
    pub overrides: Vec<(String, String)>,
}

impl CommandLineArgs {
    pub fn new_with_path(path: impl ToString) -> Self {
        CommandLineArgs {
            config: path.to_string(),
            overrides: Vec::new(),
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=');
    match pos {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("invalid KEY=VALUE: no `=` found in `{}`", s)),
    }
}

/// All configuration of a run, organised in named modules. Missing modules fall back to their
/// defaults, which are inserted on first access so that the written config is complete.
#[derive(Serialize, Deserialize, Debug)]
pub struct Config {
    //this is deliberately a Mutex to allow for thread-safe sharing of the config
    modules: Mutex<HashMap<String, Box<dyn ConfigModule>>>,
    #[serde(skip)]
    context: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            modules: Mutex::new(HashMap::default()),
            context: None,
        }
    }
}

impl TryFrom<CommandLineArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CommandLineArgs) -> Result<Self, Self::Error> {
        let mut config = Config::from_file(Path::new(&args.config))?;
        config.apply_overrides(&args.overrides)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    pub fn from_file(config_path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_reader(BufReader::new(file), config_path)?;
        config.set_context(Some(config_path.to_path_buf()));
        Ok(config)
    }

    /// Parses a YAML config. `origin` is only used in error messages.
    pub fn from_reader(reader: impl Read, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn set_context(&mut self, context: Option<PathBuf>) {
        self.context = context;
    }

    pub fn context(&self) -> &Option<PathBuf> {
        &self.context
    }

    /// Apply generic key-value overrides to the config, e.g. simulation.speed=60
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<(), ConfigError> {
        info!("Applying overrides: {:?}", overrides);

        for (key, value) in overrides {
            let key_str = key.as_str();

            if let Some(handler) = inventory::iter::<OverrideHandler>().find(|h| h.key == key_str) {
                (handler.apply)(self, value)?;
            } else {
                warn!("No override handler found for key: {}", key);
            }
        }
        Ok(())
    }

    /// Checks the values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let trips = self.trips();
        if !is_url(&trips.base_url) {
            return Err(ConfigError::Invalid(format!(
                "trips.base_url must be an http(s) url, got {:?}",
                trips.base_url
            )));
        }
        if trips.prefetch_size == 0 {
            return Err(ConfigError::Invalid(
                "trips.prefetch_size must be greater than 0".to_string(),
            ));
        }
        if trips.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "trips.max_attempts must be at least 1".to_string(),
            ));
        }
        if trips.adapter_worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "trips.adapter_worker_threads must be at least 1".to_string(),
            ));
        }

        let simulation = self.simulation();
        if !(simulation.speed.is_finite() && simulation.speed > 0.) {
            return Err(ConfigError::Invalid(format!(
                "simulation.speed must be a positive number, got {}",
                simulation.speed
            )));
        }
        if SimulationClock::period_for(simulation.speed).is_none() {
            return Err(ConfigError::Invalid(format!(
                "simulation.speed {} is too small, its tick period does not fit a duration",
                simulation.speed
            )));
        }
        if simulation.max_active == 0 {
            return Err(ConfigError::Invalid(
                "simulation.max_active must be greater than 0".to_string(),
            ));
        }
        if !(simulation.max_step_percent.is_finite() && simulation.max_step_percent > 0.) {
            return Err(ConfigError::Invalid(format!(
                "simulation.max_step_percent must be a positive number, got {}",
                simulation.max_step_percent
            )));
        }
        if simulation.decay_step <= 0 {
            return Err(ConfigError::Invalid(format!(
                "simulation.decay_step must be positive, got {}",
                simulation.decay_step
            )));
        }
        Ok(())
    }

    pub fn trips(&self) -> TripsSource {
        self.module_or_default("trips")
    }

    pub fn set_trips(&mut self, trips: TripsSource) {
        self.set_module("trips", trips);
    }

    pub fn simulation(&self) -> Simulation {
        self.module_or_default("simulation")
    }

    pub fn set_simulation(&mut self, simulation: Simulation) {
        self.set_module("simulation", simulation);
    }

    pub fn output(&self) -> Output {
        self.module_or_default("output")
    }

    pub fn set_output(&mut self, output: Output) {
        self.set_module("output", output);
    }

    /// The output directory, relative paths resolved against the config file.
    pub fn output_dir(&self) -> PathBuf {
        resolve_path(self.context(), &self.output().output_dir)
    }

    fn module_or_default<T: ConfigModule + Default + Clone + 'static>(&self, key: &str) -> T {
        let mut modules = self.modules();
        if let Some(module) = modules
            .get(key)
            .and_then(|boxed| boxed.as_any().downcast_ref::<T>())
        {
            return module.clone();
        }
        let default = T::default();
        modules.insert(key.to_string(), Box::new(default.clone()));
        default
    }

    fn set_module(&mut self, key: &str, module: impl ConfigModule + 'static) {
        self.modules().insert(key.to_string(), Box::new(module));
    }

    fn modules(&self) -> MutexGuard<'_, HashMap<String, Box<dyn ConfigModule>>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn write_config(config: &Config, output_path: &Path) -> Result<(), ConfigError> {
    let output_config = output_path.join("output_config.yml");
    let write_error = |reason: String| ConfigError::Write {
        path: output_config.clone(),
        reason,
    };
    let file = File::create(&output_config).map_err(|e| write_error(e.to_string()))?;
    let writer = BufWriter::new(file);
    serde_yaml::to_writer(writer, config).map_err(|e| write_error(e.to_string()))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Where trip records come from and how the adapter thread talks to the source.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TripsSource {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_prefetch_size")]
    pub prefetch_size: usize,
    #[serde(default = "default_to_3")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_to_1")]
    /// The number of threads to be used for the tokio runtime by the adapter.
    pub adapter_worker_threads: u32,
}

impl TripsSource {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for TripsSource {
    fn default() -> Self {
        TripsSource {
            base_url: default_base_url(),
            prefetch_size: default_prefetch_size(),
            max_attempts: default_to_3(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            adapter_worker_threads: default_to_1(),
        }
    }
}

register_override!("trips.base_url", |config, value| {
    let mut trips = config.trips();
    trips.base_url = value.to_string();
    config.set_trips(trips);
    Ok(())
});

register_override!("trips.prefetch_size", |config, value| {
    let mut trips = config.trips();
    trips.prefetch_size = parse_value("trips.prefetch_size", value)?;
    config.set_trips(trips);
    Ok(())
});

register_override!("trips.max_attempts", |config, value| {
    let mut trips = config.trips();
    trips.max_attempts = parse_value("trips.max_attempts", value)?;
    config.set_trips(trips);
    Ok(())
});

register_override!("trips.adapter_worker_threads", |config, value| {
    let mut trips = config.trips();
    trips.adapter_worker_threads = parse_value("trips.adapter_worker_threads", value)?;
    config.set_trips(trips);
    Ok(())
});

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_prefetch_size() -> usize {
    200
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_to_1() -> u32 {
    1
}

fn default_to_3() -> u32 {
    3
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Simulation {
    /// Simulated milliseconds per tick. One tick lasts `1 / speed` ms of wall clock time.
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Start of the simulated time. Defaults to the wall clock at startup.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default = "default_max_active")]
    pub max_active: usize,
    /// Upper bound of the drawn fraction increase per tick, in percent.
    #[serde(default = "default_max_step_percent")]
    pub max_step_percent: f64,
    /// Alpha decrease per tick of a decaying route.
    #[serde(default = "default_decay_step")]
    pub decay_step: i32,
    #[serde(default = "default_icon_color")]
    pub icon_color: StrokeColor,
    #[serde(default = "default_line_color")]
    pub line_color: StrokeColor,
    #[serde(default = "default_icon_scale")]
    pub icon_scale: f64,
    #[serde(default = "default_stroke_weight")]
    pub stroke_weight: f64,
    #[serde(default)]
    pub max_ticks: Option<u64>,
    #[serde(default = "default_stop_when_idle")]
    pub stop_when_idle: bool,
}

impl Simulation {
    pub fn path_style(&self) -> PathStyle {
        PathStyle {
            stroke_color: self.line_color,
            stroke_opacity: 1.,
            stroke_weight: self.stroke_weight,
            geodesic: true,
            icon: IconDescriptor {
                symbol: IconSymbol::ForwardClosedArrow,
                scale: self.icon_scale,
                stroke_color: self.icon_color,
                offset: 0.,
            },
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            start_time: None,
            max_active: default_max_active(),
            max_step_percent: default_max_step_percent(),
            decay_step: default_decay_step(),
            icon_color: default_icon_color(),
            line_color: default_line_color(),
            icon_scale: default_icon_scale(),
            stroke_weight: default_stroke_weight(),
            max_ticks: None,
            stop_when_idle: default_stop_when_idle(),
        }
    }
}

register_override!("simulation.speed", |config, value| {
    let mut simulation = config.simulation();
    simulation.speed = parse_value("simulation.speed", value)?;
    config.set_simulation(simulation);
    Ok(())
});

register_override!("simulation.start_time", |config, value| {
    let mut simulation = config.simulation();
    simulation.start_time = Some(parse_value("simulation.start_time", value)?);
    config.set_simulation(simulation);
    Ok(())
});

register_override!("simulation.max_active", |config, value| {
    let mut simulation = config.simulation();
    simulation.max_active = parse_value("simulation.max_active", value)?;
    config.set_simulation(simulation);
    Ok(())
});

register_override!("simulation.decay_step", |config, value| {
    let mut simulation = config.simulation();
    simulation.decay_step = parse_value("simulation.decay_step", value)?;
    config.set_simulation(simulation);
    Ok(())
});

register_override!("simulation.icon_color", |config, value| {
    let mut simulation = config.simulation();
    simulation.icon_color = parse_value("simulation.icon_color", value)?;
    config.set_simulation(simulation);
    Ok(())
});

register_override!("simulation.max_ticks", |config, value| {
    let mut simulation = config.simulation();
    simulation.max_ticks = Some(parse_value("simulation.max_ticks", value)?);
    config.set_simulation(simulation);
    Ok(())
});

register_override!("simulation.stop_when_idle", |config, value| {
    let mut simulation = config.simulation();
    simulation.stop_when_idle = parse_value("simulation.stop_when_idle", value)?;
    config.set_simulation(simulation);
    Ok(())
});

fn default_speed() -> f64 {
    1.
}

fn default_max_active() -> usize {
    50
}

fn default_max_step_percent() -> f64 {
    0.09
}

fn default_decay_step() -> i32 {
    1
}

fn default_icon_color() -> StrokeColor {
    StrokeColor::new(0x33, 0x99, 0x33, StrokeColor::OPAQUE)
}

fn default_line_color() -> StrokeColor {
    StrokeColor::new(0, 0, 0, 0)
}

fn default_icon_scale() -> f64 {
    2.
}

fn default_stroke_weight() -> f64 {
    3.
}

fn default_stop_when_idle() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Output {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub write_events: WriteEvents,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            output_dir: default_output_dir(),
            logging: Logging::default(),
            write_events: WriteEvents::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./")
}

register_override!("output.output_dir", |config, value| {
    let mut output = config.output();
    output.output_dir = PathBuf::from(value);
    config.set_output(output);
    Ok(())
});

register_override!("output.logging", |config, value| {
    let mut output = config.output();
    output.logging = match value.to_lowercase().as_str() {
        "none" => Logging::None,
        "info" => Logging::Info,
        _ => {
            return Err(ConfigError::InvalidOverride {
                key: "output.logging".to_string(),
                value: value.to_string(),
                reason: "expected None or Info".to_string(),
            });
        }
    };
    config.set_output(output);
    Ok(())
});

register_override!("output.write_events", |config, value| {
    let mut output = config.output();
    output.write_events = match value.to_lowercase().as_str() {
        "none" => WriteEvents::None,
        "json" => WriteEvents::Json,
        _ => {
            return Err(ConfigError::InvalidOverride {
                key: "output.write_events".to_string(),
                value: value.to_string(),
                reason: "expected None or Json".to_string(),
            });
        }
    };
    config.set_output(output);
    Ok(())
});

#[typetag::serde(tag = "type")]
pub trait ConfigModule: Debug + Send + DynClone {
    fn as_any(&self) -> &dyn Any;
}

#[typetag::serde]
impl ConfigModule for TripsSource {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Simulation {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Output {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// This is needed to allow cloning of the trait object and thus cloning of the Config.
dyn_clone::clone_trait_object!(ConfigModule);

/// Have this extra layer of log level enum, as tracing subscriber has no
/// off/none option by default. At least it can't be parsed
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub enum Logging {
    #[default]
    None,
    Info,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub enum WriteEvents {
    #[default]
    None,
    Json,
}
