use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};
use webtime::{
    host::{args::HostArgs, config::HostConfig, start_host},
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    let args = HostArgs::parse();
    let app_dir = args
        .dir
        .clone()
        .map_or_else(create_application_default_path, ensure_dir)?;
    enable_logging(HOST_PREFIX, &app_dir, args.log, args.log_console)?;
    debug!("Started by the browser with {:?}", args.browser_args);

    let config = HostConfig::load(&app_dir)
        .inspect_err(|e| error!("Failed to load config {e:?}"))?;
    single_thread_runtime()?
        .block_on(start_host(app_dir, config))
        .inspect_err(|e| error!("Host failed {e:?}"))
}
