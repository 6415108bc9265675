use std::net::SocketAddr;

use anyhow::{Context, Result};
use gdslink_common::config::{Config, ServerConfig};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::host::{LayoutHost, MemoryHost};
use crate::rpc::tcp::{serve_tcp, ServerState};
use crate::startup::{bind_listener, remove_pid_file, write_pid_file, RuntimePaths};

/// A control server running inside the caller's tokio runtime.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Stop the server and wait for it to finish.
    pub async fn wait(mut self) {
        self.shutdown();
        self.join_task().await;
    }

    /// Wait for the server to stop on its own, e.g. after a `shutdown` request.
    pub async fn stopped(mut self) {
        self.join_task().await;
    }

    async fn join_task(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serve `host` on the configured address from the current runtime.
pub async fn start_embedded<H: LayoutHost>(host: H, config: &ServerConfig) -> Result<ServerHandle> {
    let listener = bind_listener(&config.address()).await?;
    let local_addr = listener.local_addr().context("failed to read listener address")?;

    let (state, hub_task) = ServerState::start(host, config.poll_interval());
    let shutdown_tx = state.shutdown_sender();
    let task = tokio::spawn(async move {
        if let Err(error) = serve_tcp(listener, state).await {
            warn!(?error, "embedded control server terminated unexpectedly");
        }
        if let Err(error) = hub_task.await {
            warn!(%error, "embedded control hub failed");
        }
    });

    info!(%local_addr, "embedded control server started");
    Ok(ServerHandle { local_addr, shutdown_tx, task: Some(task) })
}

/// Run the standalone server with an in-memory host until ctrl-c or a
/// `shutdown` request.
pub async fn run_standalone(config: Config) -> Result<()> {
    run_standalone_with_paths(config, RuntimePaths::resolve()?).await
}

async fn run_standalone_with_paths(config: Config, paths: RuntimePaths) -> Result<()> {
    let listener = bind_listener(&config.server.address()).await?;
    write_pid_file(&paths.pid_path)?;

    let (state, hub_task) = ServerState::start(MemoryHost::new(), config.server.poll_interval());
    let ctrl_c_tx = state.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping control server");
            let _ = ctrl_c_tx.send(());
        }
    });

    info!(address = %config.server.address(), "standalone control server started");
    let result = serve_tcp(listener, state).await;
    let hub_result = hub_task.await;
    remove_pid_file(&paths.pid_path);
    result.context("standalone control server exited with error")?;
    hub_result.context("control hub failed")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gdslink_common::config::{Config, ServerConfig};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    use super::{run_standalone_with_paths, start_embedded, RuntimePaths};
    use crate::host::MemoryHost;

    fn ephemeral() -> ServerConfig {
        ServerConfig { port: 0, ..ServerConfig::default() }
    }

    async fn call(address: &str, line: &str) -> Value {
        let stream = TcpStream::connect(address).await.expect("client should connect");
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(line.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();
        let mut reader = BufReader::new(read_half);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(response.trim_end()).expect("response should be JSON")
    }

    #[tokio::test]
    async fn embedded_server_answers_and_stops() {
        let handle = start_embedded(MemoryHost::new(), &ephemeral()).await.unwrap();
        let address = handle.local_addr().to_string();

        let pong = call(&address, r#"{"id":1,"method":"ping"}"#).await;
        assert_eq!(pong, json!({"id": 1, "ok": true, "result": {"message": "pong"}}));

        tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .expect("embedded server should stop");
        assert!(TcpStream::connect(&address).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_request_stops_embedded_server() {
        let handle = start_embedded(MemoryHost::new(), &ephemeral()).await.unwrap();
        let address = handle.local_addr().to_string();

        let stopped = call(&address, r#"{"id":"bye","method":"shutdown"}"#).await;
        assert_eq!(stopped["result"], json!({"message": "server stopped"}));

        tokio::time::timeout(Duration::from_secs(2), handle.stopped())
            .await
            .expect("server should stop after shutdown request");
    }

    #[tokio::test]
    async fn standalone_server_removes_pid_file_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let paths = RuntimePaths::in_dir(tmp.path().to_path_buf());
        let pid_path = paths.pid_path.clone();

        // Reserve a free port, then hand it to the standalone server.
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);
        let config = Config {
            server: ServerConfig { port, ..ServerConfig::default() },
            ..Config::default()
        };
        let address = config.server.address();
        let server = tokio::spawn(run_standalone_with_paths(config, paths));

        for _ in 0..40 {
            if pid_path.exists() && TcpStream::connect(&address).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(pid_path.exists(), "standalone server should write its PID file");

        call(&address, r#"{"id":1,"method":"shutdown"}"#).await;
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("standalone server should exit")
            .expect("standalone task should not panic")
            .expect("standalone server should exit cleanly");
        assert!(!pid_path.exists());
    }
}
