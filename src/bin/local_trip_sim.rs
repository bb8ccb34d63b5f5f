use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use trip_sim::simulation::config::{CommandLineArgs, Config};
use trip_sim::simulation::controller;
use trip_sim::simulation::logging::init_std_out_logging_thread_local;

fn main() -> ExitCode {
    let _guard = init_std_out_logging_thread_local();

    let args = CommandLineArgs::parse();
    info!("Started with args: {:?}", args);

    let config = match Config::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match controller::run(config) {
        Ok(stats) => {
            info!("Finished: {stats:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Simulation failed: {e}");
            ExitCode::FAILURE
        }
    }
}
