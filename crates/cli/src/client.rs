use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use gdslink_common::config::{ServerConfig, DEFAULT_CONNECT_TIMEOUT_MS};
use gdslink_common::protocol::methods;
use gdslink_common::protocol::wire::{Event, Request, Response, ServerMessage};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

pub const SERVER_NOT_RUNNING_EXIT_CODE: i32 = 10;

/// Nothing is listening on the control address.
#[derive(Debug)]
pub struct ServerUnavailable {
    address: String,
    source: io::Error,
}

impl ServerUnavailable {
    fn new(address: String, source: io::Error) -> Self {
        Self { address, source }
    }

    pub fn exit_code(&self) -> i32 {
        SERVER_NOT_RUNNING_EXIT_CODE
    }
}

impl fmt::Display for ServerUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "control server is not running at {}; use exit code {}",
            self.address,
            self.exit_code()
        )
    }
}

impl std::error::Error for ServerUnavailable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// An `ok: false` response from the control server.
#[derive(Debug)]
pub struct ServerError {
    pub method: String,
    pub message: String,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.method, self.message)
    }
}

impl std::error::Error for ServerError {}

#[derive(Debug)]
pub struct ControlClient {
    address: String,
    timeout: Duration,
    next_request_id: AtomicU64,
}

impl Default for ControlClient {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl ControlClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.address())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Call `method` and return its `result`; `ok: false` becomes a
    /// `ServerError`.
    pub async fn call(&self, method: &str, params: Map<String, Value>) -> Result<Value> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let response = self.send(&Request::new(id, method, params)).await?;
        into_result(method, response)
    }

    /// Send one request on a fresh connection and wait for its response.
    /// Events that arrive first are skipped.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let mut connection = self.connect().await?;
        connection.write_request(request).await?;
        connection.read_response().await
    }

    /// Subscribe on a dedicated connection and stream selection changes.
    pub async fn watch_selection(&self) -> Result<SelectionWatch> {
        let mut connection = self.connect().await?;
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        connection
            .write_request(&Request::new(id, methods::SUBSCRIBE_SELECTION, Map::new()))
            .await?;
        let result = into_result(methods::SUBSCRIBE_SELECTION, connection.read_response().await?)?;
        let initial = result.get("selection").and_then(Value::as_str).map(ToOwned::to_owned);
        Ok(SelectionWatch { connection, initial })
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .with_context(|| format!("timed out connecting to control server {}", self.address))?
            .map_err(|err| {
                if is_server_unavailable_kind(err.kind()) {
                    anyhow!(ServerUnavailable::new(self.address.clone(), err))
                } else {
                    anyhow!(err)
                }
            })
            .with_context(|| format!("failed to connect to control server {}", self.address))?;
        debug!(address = %self.address, "connected to control server");

        let (read_half, write_half) = stream.into_split();
        Ok(Connection { reader: BufReader::new(read_half), writer: write_half, timeout: self.timeout })
    }
}

/// An open control connection.
#[derive(Debug)]
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl Connection {
    async fn write_request(&mut self, request: &Request) -> Result<()> {
        let mut payload = serde_json::to_vec(request).context("failed to serialize request")?;
        payload.push(b'\n');
        timeout(self.timeout, self.writer.write_all(&payload))
            .await
            .context("timed out writing request")?
            .context("failed writing request to control server")?;
        Ok(())
    }

    /// Next complete line, or `None` at EOF. A trailing fragment without
    /// `\n` is discarded.
    async fn read_message(&mut self, wait: Option<Duration>) -> Result<Option<ServerMessage>> {
        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line);
        let bytes = match wait {
            Some(wait) => timeout(wait, read).await.context("timed out waiting for response")?,
            None => read.await,
        }
        .context("failed reading from control server")?;

        if bytes == 0 || line.last() != Some(&b'\n') {
            return Ok(None);
        }
        trace!(bytes, "control line");
        let message = serde_json::from_slice(&line).context("failed to decode server message")?;
        Ok(Some(message))
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            match self.read_message(Some(self.timeout)).await? {
                Some(ServerMessage::Response(response)) => return Ok(response),
                Some(ServerMessage::Event(event)) => {
                    debug!(event = %event.event, "skipping event while waiting for response");
                }
                None => bail!("control server closed the connection before responding"),
            }
        }
    }
}

/// A live selection subscription.
#[derive(Debug)]
pub struct SelectionWatch {
    connection: Connection,
    initial: Option<String>,
}

impl SelectionWatch {
    /// The selection reported when the subscription was made.
    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    /// Wait for the next selection event; `None` once the server closes
    /// the connection.
    pub async fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            match self.connection.read_message(None).await? {
                Some(ServerMessage::Event(event)) if event.is_selection() => return Ok(Some(event)),
                Some(other) => debug!(?other, "ignoring non-selection message"),
                None => return Ok(None),
            }
        }
    }
}

fn into_result(method: &str, response: Response) -> Result<Value> {
    if response.ok {
        return Ok(response.result.unwrap_or(Value::Null));
    }
    let message = response.error.unwrap_or_else(|| "unknown error".to_string());
    Err(anyhow!(ServerError { method: method.to_string(), message }))
}

pub fn server_unavailable_exit_code(error: &anyhow::Error) -> Option<i32> {
    error.downcast_ref::<ServerUnavailable>().map(ServerUnavailable::exit_code)
}

fn is_server_unavailable_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gdslink_common::config::ServerConfig;
    use gdslink_daemon::host::geometry::{LayerInfo, Rect, SelectedShape};
    use gdslink_daemon::host::memory::LayoutDocument;
    use gdslink_daemon::host::MemoryHost;
    use gdslink_daemon::runtime::start_embedded;
    use serde_json::{json, Map};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::{server_unavailable_exit_code, ControlClient, ServerError, SERVER_NOT_RUNNING_EXIT_CODE};

    fn ephemeral() -> ServerConfig {
        ServerConfig { port: 0, poll_interval_ms: 20, ..ServerConfig::default() }
    }

    #[tokio::test]
    async fn calls_control_server_over_tcp() {
        let host = MemoryHost::with_document(LayoutDocument::with_cells(["B", "A", "B"]));
        let server = start_embedded(host, &ephemeral()).await.unwrap();
        let client = ControlClient::new(server.local_addr().to_string());

        let pong = client.call("ping", Map::new()).await.expect("ping should succeed");
        assert_eq!(pong, json!({"message": "pong"}));
        let cells = client.call("get_cell_list", Map::new()).await.unwrap();
        assert_eq!(cells, json!({"cells": ["A", "B"]}));

        server.wait().await;
    }

    #[tokio::test]
    async fn error_responses_become_server_errors() {
        let server = start_embedded(MemoryHost::new(), &ephemeral()).await.unwrap();
        let client = ControlClient::new(server.local_addr().to_string());

        let error = client.call("warp", Map::new()).await.expect_err("unknown method should fail");
        let server_error = error.downcast_ref::<ServerError>().expect("typed server error");
        assert_eq!(server_error.message, "Unknown method: warp");

        server.wait().await;
    }

    #[tokio::test]
    async fn skips_events_and_discards_unterminated_fragment() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut request = Vec::new();
            reader.read_until(b'\n', &mut request).await.unwrap();

            let reply = concat!(
                "{\"event\":\"selection\",\"data\":null}\n",
                "{\"id\":1,\"ok\":true,\"result\":{\"message\":\"pong\"}}\n",
                "{\"id\":2,\"ok\":tr",
            );
            write_half.write_all(reply.as_bytes()).await.unwrap();
        });

        let client = ControlClient::new(address);
        assert_eq!(client.call("ping", Map::new()).await.unwrap(), json!({"message": "pong"}));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn tags_refused_connection_as_server_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = ControlClient::new(address);
        let error = client.call("ping", Map::new()).await.expect_err("nothing is listening");
        assert_eq!(server_unavailable_exit_code(&error), Some(SERVER_NOT_RUNNING_EXIT_CODE));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(stream);
        });

        let client = ControlClient::new(address).with_timeout(Duration::from_millis(50));
        let error = client.call("ping", Map::new()).await.expect_err("no answer should time out");
        assert!(format!("{error:#}").contains("timed out"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn watch_selection_streams_changes() {
        let host = MemoryHost::with_document(LayoutDocument::with_cells(["TOP"]));
        let server = start_embedded(host.clone(), &ephemeral()).await.unwrap();
        let client = ControlClient::new(server.local_addr().to_string());

        let mut watch = client.watch_selection().await.expect("subscribe should succeed");
        assert_eq!(watch.initial(), None);

        host.set_selection(vec![SelectedShape::rect(LayerInfo::new(1, 0), Rect::new(0, 0, 1, 1))]);
        let event = tokio::time::timeout(Duration::from_secs(2), watch.next_event())
            .await
            .expect("event should arrive")
            .unwrap()
            .expect("connection should stay open");
        assert_eq!(event.data.as_deref(), Some("1/0@0_0_0_1_1_1_1_0"));

        server.shutdown();
        let closed = tokio::time::timeout(Duration::from_secs(2), watch.next_event())
            .await
            .expect("close should be observed")
            .unwrap();
        assert!(closed.is_none());
    }
}
