use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Arguments of the native messaging host. Browsers launch it with their own arguments (the
/// calling extension's origin, a manifest path, a parent window handle), which are accepted and
/// ignored.
#[derive(Parser, Debug)]
#[command(name = "webtime-host", version)]
pub struct HostArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// This option is for debugging purposes only. Logs go to stderr, stdout carries messages.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[arg(long = "parent-window", hide = true)]
    pub parent_window: Option<i64>,
    #[arg(hide = true)]
    pub browser_args: Vec<String>,
}
