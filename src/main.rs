use anyhow::Result;
use tracing::error;
use webtime::cli::run_cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    run_cli().await.inspect_err(|e| {
        error!("Error running cli {e:?}");
    })?;
    Ok(())
}
