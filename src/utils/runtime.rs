use anyhow::Result;

/// The host is a single event loop; every task it spawns interleaves only at await points.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
