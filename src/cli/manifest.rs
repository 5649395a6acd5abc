use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::{json, Value};

use crate::utils::dir::APPLICATION_NAME;

pub const HOST_BINARY_NAME: &str = "webtime-host";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrowserFamily {
    Chromium,
    Firefox,
}

#[derive(Debug, Parser)]
pub struct ManifestCommand {
    #[arg(long, help = "Id of the extension allowed to talk to the host")]
    extension_id: String,
    #[arg(long, value_enum, default_value_t = BrowserFamily::Chromium)]
    browser: BrowserFamily,
    #[arg(long, help = "Path of the host binary. Defaults to the one next to this executable")]
    host_path: Option<PathBuf>,
}

/// Prints the native messaging manifest browsers need to find the host.
pub fn process_manifest_command(command: ManifestCommand) -> Result<()> {
    let host_path = match command.host_path {
        Some(path) => path,
        None => to_host_path(std::env::current_exe().context("Can't locate this executable")?),
    };
    let manifest = host_manifest(&host_path, &command.extension_id, command.browser);
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

/// The host binary is installed next to the cli.
pub fn to_host_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(HOST_BINARY_NAME);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

fn host_manifest(host_path: &Path, extension_id: &str, browser: BrowserFamily) -> Value {
    let mut manifest = json!({
        "name": APPLICATION_NAME,
        "description": "Tracks time spent on websites and runs countdown timers",
        "path": host_path.to_string_lossy(),
        "type": "stdio",
    });
    match browser {
        BrowserFamily::Chromium => {
            manifest["allowed_origins"] = json!([format!("chrome-extension://{extension_id}/")]);
        }
        BrowserFamily::Firefox => {
            manifest["allowed_extensions"] = json!([extension_id]);
        }
    }
    manifest
}
