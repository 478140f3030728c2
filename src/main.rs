use std::env::consts::{
    ARCH, DLL_EXTENSION, DLL_PREFIX, DLL_SUFFIX, EXE_EXTENSION, EXE_SUFFIX, FAMILY, OS,
};

use anyhow::{Context, Error};
use clap::Parser;
use tracing::trace;

use crate::cli::Cli;
use crate::engine::{init_logger, load_app_config};
use crate::program::Program;

mod cli;
mod engine;
mod gelbooru;
mod program;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let mut config = load_app_config(&cli.config_dir)
        .with_context(|| format!("Failed to load config from {}", cli.config_dir.display()))?;
    cli.apply(&mut config);
    config.validate()?;

    // Held until exit so the file writer gets flushed.
    let _guard = init_logger(&config.logging)?;
    log_system_information();

    let program = Program::new(config);
    program.run().await
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("DLL_EXTENSION:  \"{}\"", DLL_EXTENSION);
    trace!("DLL_PREFIX:     \"{}\"", DLL_PREFIX);
    trace!("DLL_SUFFIX:     \"{}\"", DLL_SUFFIX);
    trace!("EXE_EXTENSION:  \"{}\"", EXE_EXTENSION);
    trace!("EXE_SUFFIX:     \"{}\"", EXE_SUFFIX);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
    trace!("CPUS:           \"{}\"", num_cpus::get());
}
