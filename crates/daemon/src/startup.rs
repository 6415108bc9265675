// Standalone startup: PID file, TCP listener, liveness check.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

/// PID file: ~/.gdslink/gdslinkd.pid (diagnostics only)
const PID_FILE_NAME: &str = "gdslinkd.pid";
const LIVENESS_TIMEOUT: Duration = Duration::from_millis(500);

/// Resolved paths for server runtime files.
pub struct RuntimePaths {
    pub base_dir: PathBuf,
    pub pid_path: PathBuf,
}

impl RuntimePaths {
    /// Resolve paths under `~/.gdslink/`, creating the directory.
    pub fn resolve() -> Result<Self> {
        let base_dir =
            gdslink_common::config::global_dir().context("could not determine home directory")?;
        fs::create_dir_all(&base_dir).context("failed to create ~/.gdslink/")?;
        Ok(Self::in_dir(base_dir))
    }

    pub fn in_dir(base_dir: PathBuf) -> Self {
        Self { pid_path: base_dir.join(PID_FILE_NAME), base_dir }
    }
}

/// Write the current process PID to `path`.
pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file = fs::File::create(path).context("failed to create PID file")?;
    write!(file, "{pid}").context("failed to write PID")?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, "failed to remove PID file");
        }
    }
}

/// Bind the control listener. Failing to bind is fatal for the server.
pub async fn bind_listener(address: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind control server to {address}"))?;
    let local_addr = listener.local_addr().context("failed to read listener address")?;
    info!(%local_addr, "control server listening");
    Ok(listener)
}

/// Check if a server is already accepting connections on `address`.
pub async fn is_server_running(address: &str) -> bool {
    matches!(tokio::time::timeout(LIVENESS_TIMEOUT, TcpStream::connect(address)).await, Ok(Ok(_)))
}
