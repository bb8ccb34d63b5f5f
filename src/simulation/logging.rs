use std::io;
use tracing::dispatcher::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, registry, EnvFilter, Layer};

use crate::simulation::config::{Config, Logging};

// This is a helper struct to store the logger guards. When they are dropped, logging can be reset.
#[allow(dead_code)]
pub struct LogGuards {
    log_guard: Option<WorkerGuard>,
    default: DefaultGuard,
}

pub fn init_std_out_logging_thread_local() -> DefaultGuard {
    let collector = tracing_subscriber::registry().with(
        fmt::Layer::new()
            .with_writer(io::stdout)
            .with_filter(LevelFilter::INFO),
    );
    tracing::subscriber::set_default(collector)
}

/// Installs the console layer and, if configured, the JSON log file `<output_dir>/log.txt` as
/// the default subscriber of the calling thread. `RUST_LOG` refines the console level.
pub fn init_logging(config: &Config) -> LogGuards {
    let dir = config.output_dir();

    let (log_layer, log_guard) = if Logging::Info == config.output().logging {
        let log_file_appender = rolling::never(&dir, "log.txt");
        let (log_file, log_guard) = non_blocking(log_file_appender);
        let layer = fmt::Layer::new()
            .with_writer(log_file)
            .json()
            .with_ansi(false)
            .with_filter(LevelFilter::INFO);
        (Some(layer), Some(log_guard))
    } else {
        (None, None)
    };

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_filter(console_filter);

    // Add `Optional`s. If None, then the corresponding layer is not added.
    let collector = registry().with(log_layer).with(console_layer);

    let default = tracing::subscriber::set_default(collector);

    LogGuards { log_guard, default }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::Output;
    use serial_test::serial;
    use tracing::info;

    #[test]
    #[serial]
    fn write_json_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.set_output(Output {
            output_dir: dir.path().to_path_buf(),
            logging: Logging::Info,
            ..Default::default()
        });

        {
            let _guards = init_logging(&config);
            info!(tick = 1000, "Tick statistics");
        }

        let content = std::fs::read_to_string(dir.path().join("log.txt")).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["fields"]["message"], "Tick statistics");
        assert_eq!(line["fields"]["tick"], 1000);
    }

    #[test]
    #[serial]
    fn no_log_file_without_logging() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.set_output(Output {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        {
            let _guards = init_logging(&config);
            info!("not written to a file");
        }
        assert!(!dir.path().join("log.txt").exists());
    }
}
