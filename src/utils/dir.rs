use std::{env, io, path::PathBuf};

use anyhow::{Context, Result};

pub const APPLICATION_NAME: &str = "webtime";

/// Resolves and creates the application directory. It holds the store, optional config and logs.
pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = PathBuf::from(
                env::var("APPDATA").context("APPDATA should be present on Windows")?,
            );
            path.push(APPLICATION_NAME);
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .context("Couldn't find neither XDG_STATE_HOME nor HOME")?;
            path.push(APPLICATION_NAME);
            path
        }
    };

    ensure_dir(path)
}

pub fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}
