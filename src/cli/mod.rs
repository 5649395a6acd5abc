pub mod manifest;
pub mod output;
pub mod stats;
pub mod timers;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use manifest::{process_manifest_command, ManifestCommand};
use stats::{process_stats_command, StatsCommand};
use timers::{process_timers_command, TimersCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    host::{config::HostConfig, start_host},
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX, HOST_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "webtime", version, long_about = None)]
#[command(about = "Reports on time spent per website and runs the browser's native host", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the native host directly on stdin/stdout. Browsers start webtime-host instead; this is for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Display time spent per domain")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "List countdown timers")]
    Timers {
        #[command(flatten)]
        command: TimersCommand,
    },
    #[command(about = "Print the native messaging manifest for the host")]
    Manifest {
        #[command(flatten)]
        command: ManifestCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };

    match args.commands {
        Commands::Serve { dir } => {
            let dir = application_dir(dir)?;
            enable_logging(HOST_PREFIX, &dir, logging_level, args.log)?;
            let config = HostConfig::load(&dir)?;
            start_host(dir, config).await
        }
        Commands::Stats { command } => {
            enable_logging(CLI_PREFIX, &application_dir(None)?, logging_level, args.log)?;
            process_stats_command(command).await
        }
        Commands::Timers { command } => {
            enable_logging(CLI_PREFIX, &application_dir(None)?, logging_level, args.log)?;
            process_timers_command(command).await
        }
        Commands::Manifest { command } => process_manifest_command(command),
    }
}

/// Either the given directory or the default one, created if missing.
pub fn application_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    dir.map_or_else(create_application_default_path, ensure_dir)
}
