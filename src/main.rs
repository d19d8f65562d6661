//! lightsshd binary entry point.

use std::process::ExitCode;

use lightsshd::{cli, config::Config, daemon, logging};
use tracing::{error, info};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'lightsshd --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(config.log_filter());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen,
        "starting lightsshd"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "unable to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(daemon::run(&config)) {
        // Open sessions are not drained; leave immediately.
        Ok(daemon::Shutdown::Signal) => std::process::exit(0),
        Err(e) => {
            error!(error = %e, "lightsshd failed");
            ExitCode::FAILURE
        }
    }
}
