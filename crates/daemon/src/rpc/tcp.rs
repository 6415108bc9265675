use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::hub::{spawn_hub, HubHandle};
use super::outbound::{ConnectionHandle, ConnectionId, OutboundFrame};
use crate::host::LayoutHost;

/// Everything a connection needs to reach its server instance.
#[derive(Debug, Clone)]
pub struct ServerState {
    hub: HubHandle,
    shutdown_tx: broadcast::Sender<()>,
    next_connection_id: Arc<AtomicU64>,
}

impl ServerState {
    /// Spawn the hub for `host` and return the shared state plus the hub task.
    pub fn start<H: LayoutHost>(host: H, poll_interval: Duration) -> (Self, JoinHandle<()>) {
        let (shutdown_tx, _) = broadcast::channel(4);
        let (hub, task) = spawn_hub(host, poll_interval, shutdown_tx.clone());
        let state = Self { hub, shutdown_tx, next_connection_id: Arc::new(AtomicU64::new(1)) };
        (state, task)
    }

    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Serve newline-delimited JSON over TCP until shutdown is requested,
/// either by a `shutdown` request or through `ServerState::request_shutdown`.
pub async fn serve_tcp(listener: TcpListener, state: ServerState) -> Result<()> {
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(error) = stream.set_nodelay(true) {
                        debug!(%error, "failed to disable nagle on control connection");
                    }
                    let connection_state = state.clone();
                    let connection_shutdown = state.shutdown_tx.subscribe();
                    tokio::spawn(async move {
                        if let Err(error) =
                            serve_connection(stream, connection_state, connection_shutdown).await
                        {
                            warn!(?error, %peer, "control connection failed");
                        }
                    });
                }
                Err(error) => warn!(%error, "failed to accept control connection"),
            },
        }
    }

    info!("control server stopped accepting connections");
    Ok(())
}

/// Handle one control stream until the peer leaves or the server stops.
pub async fn serve_connection<IO>(
    stream: IO,
    state: ServerState,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let connection_id = state.next_connection_id();
    let (read_half, write_half) = io::split(stream);
    let (handle, outbox) = ConnectionHandle::channel(connection_id);
    let writer = tokio::spawn(write_frames(write_half, outbox, state.shutdown_tx.clone()));
    debug!(connection = connection_id, "control connection opened");

    let result = read_requests(read_half, &handle, &state.hub, shutdown_rx).await;

    state.hub.disconnect(connection_id).await;
    drop(handle);
    let _ = writer.await;
    debug!(connection = connection_id, "control connection closed");
    result
}

async fn read_requests<R>(
    read_half: R,
    handle: &ConnectionHandle,
    hub: &HubHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);

    loop {
        let mut request_line = Vec::new();
        let bytes_read = tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            read = reader.read_until(b'\n', &mut request_line) => {
                read.context("failed to read control request")?
            }
        };

        if bytes_read == 0 {
            return Ok(());
        }
        if request_line.last() != Some(&b'\n') {
            trace!(bytes = request_line.len(), "discarding unterminated trailing fragment");
            return Ok(());
        }

        trim_line_endings(&mut request_line);
        if request_line.iter().all(|byte| byte.is_ascii_whitespace()) {
            continue;
        }

        trace!(connection = handle.id(), bytes = request_line.len(), "request line");
        if !hub.submit(handle, request_line).await {
            return Ok(());
        }
    }
}

async fn write_frames<W>(
    mut write_half: W,
    mut outbox: mpsc::UnboundedReceiver<OutboundFrame>,
    shutdown_tx: broadcast::Sender<()>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbox.recv().await {
        let written = write_frame(&mut write_half, &frame.line).await;
        if frame.shutdown_after {
            let _ = shutdown_tx.send(());
            break;
        }
        if let Err(error) = written {
            debug!(?error, "control connection writer stopped");
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn write_frame<W>(write_half: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_half.write_all(line.as_bytes()).await.context("failed to write control frame")?;
    write_half.flush().await.context("failed to flush control frame")
}

fn trim_line_endings(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
}
