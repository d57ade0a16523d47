mod cli;
mod commands;
mod heap;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pgrsc=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Command::Inspect { file, json } => commands::inspect::run(&file, json),
        Command::Load { file } => commands::load::run(&file, heap::load_heap_config(config)?),
        Command::Defrag { file, spacers } => {
            commands::defrag::run(&file, spacers, heap::load_heap_config(config)?)
        }
        Command::Repack {
            input,
            output,
            compress,
        } => commands::repack::run(&input, &output, compress, heap::load_heap_config(config)?),
        Command::Hexdump {
            file,
            chunk,
            offset,
            size,
            ascii,
        } => commands::hexdump::run(&file, chunk, &offset, size, ascii),
        Command::Sample {
            output,
            count,
            size,
            compress,
        } => commands::sample::run(&output, count, size, compress),
    }
}
