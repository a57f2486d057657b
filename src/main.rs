use std::process::ExitCode;

use beadfe::{cli, logger};
use clap::Parser;

fn main() -> ExitCode {
    // Session log (overwrites the previous session's log)
    logger::init();

    let args = cli::CliArgs::parse();
    let code = cli::run(args);
    beadfe::log_info!("CLI run finished");
    code
}
