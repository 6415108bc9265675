// Control method dispatch against a `LayoutHost`.

use std::path::{Path, PathBuf};

use gdslink_common::protocol::methods::Method;
use gdslink_common::protocol::wire::{Frame, Response};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, debug_span, info};

use super::outbound::{ConnectionHandle, ConnectionId};
use super::selection::SelectionPublisher;
use super::trace::trace_id_from_raw_request;
use crate::host::{selection_fingerprint, HostError, LayoutHost, SelectionSignal, MAX_CELLVIEWS};

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Host(String),

    #[error("Server is shutting down")]
    ShuttingDown,
}

impl From<HostError> for DispatchError {
    fn from(error: HostError) -> Self {
        if error.is_not_found() {
            Self::NotFound(error.to_string())
        } else {
            Self::Host(error.to_string())
        }
    }
}

// ── Dispatcher ─────────────────────────────────────────────────────

/// What the server should do with one request line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineOutcome {
    /// `None` for lines that are silently ignored.
    pub response: Option<Response>,
    /// The request asked the server to stop.
    pub shutdown: bool,
}

impl LineOutcome {
    fn ignored() -> Self {
        Self { response: None, shutdown: false }
    }
}

/// Owns the host and the selection registry for one server instance.
pub struct Dispatcher<H: LayoutHost> {
    host: H,
    selection: SelectionPublisher,
    shutting_down: bool,
}

impl<H: LayoutHost> Dispatcher<H> {
    pub fn new(host: H) -> Self {
        Self { host, selection: SelectionPublisher::new(), shutting_down: false }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn has_subscribers(&self) -> bool {
        !self.selection.is_empty()
    }

    pub fn is_subscribed(&self, connection: ConnectionId) -> bool {
        self.selection.contains(connection)
    }

    /// Decode and dispatch one raw request line from `connection`.
    pub fn handle_line(&mut self, connection: &ConnectionHandle, line: &[u8]) -> LineOutcome {
        let (id, method, params) = match Frame::decode(line) {
            Frame::Request { id, method, params } => (id, method, params),
            Frame::Ignored => {
                debug!(connection = connection.id(), "ignoring request without method");
                return LineOutcome::ignored();
            }
            Frame::Malformed => {
                debug!(connection = connection.id(), "rejecting malformed request line");
                return LineOutcome { response: Some(Response::invalid_json()), shutdown: false };
            }
        };

        let trace_id = trace_id_from_raw_request(line);
        let span = debug_span!("request", %trace_id, connection = connection.id(), %method);
        let _entered = span.enter();

        let result = match params {
            Value::Null => self.dispatch(connection, &method, Map::new()),
            Value::Object(params) => self.dispatch(connection, &method, params),
            _ => Err(DispatchError::InvalidParams("params must be an object".to_string())),
        };

        let shutdown = result.is_ok() && Method::from_name(&method) == Some(Method::Shutdown);
        let response = match result {
            Ok(result) => Response::success(id, result),
            Err(error) => {
                debug!(%error, "request failed");
                Response::error(id, error.to_string())
            }
        };
        LineOutcome { response: Some(response), shutdown }
    }

    /// Run `method` for `connection`.
    pub fn dispatch(
        &mut self,
        connection: &ConnectionHandle,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<Value, DispatchError> {
        if self.shutting_down {
            return Err(DispatchError::ShuttingDown);
        }
        let method =
            Method::from_name(method).ok_or_else(|| DispatchError::UnknownMethod(method.into()))?;

        match method {
            Method::Ping => Ok(json!({ "message": "pong" })),
            Method::Shutdown => {
                self.selection.clear();
                self.shutting_down = true;
                info!("shutdown requested");
                Ok(json!({ "message": "server stopped" }))
            }
            Method::OpenLayout => self.open_layout(&params),
            Method::LoadGds => self.load_gds(&params),
            Method::GetCellList => self.get_cell_list(),
            Method::ExportGds => self.export_gds(&params),
            Method::SubscribeSelection => {
                let current = selection_fingerprint(&self.host);
                self.selection.subscribe(connection, current.clone());
                Ok(json!({ "subscribed": true, "selection": current }))
            }
            Method::UnsubscribeSelection => {
                self.selection.unsubscribe(connection.id());
                Ok(json!({ "subscribed": false }))
            }
        }
    }

    fn open_layout(&mut self, params: &Map<String, Value>) -> Result<Value, DispatchError> {
        let path = existing_file(params)?;
        let cellview_index = cellview_index(params)?;
        let cells = self.host.open_layout(&path, cellview_index)?;
        info!(path = %path.display(), cellview_index, "layout opened");
        Ok(json!({ "opened": true, "cellview_index": cellview_index, "cells": cells }))
    }

    fn load_gds(&mut self, params: &Map<String, Value>) -> Result<Value, DispatchError> {
        let path = existing_file(params)?;
        let cells = self.host.load_layout(&path)?;
        info!(path = %path.display(), "layout loaded");
        Ok(json!({ "loaded": true, "cells": cells }))
    }

    fn get_cell_list(&self) -> Result<Value, DispatchError> {
        let mut cells = self.host.cell_names()?;
        cells.sort();
        cells.dedup();
        Ok(json!({ "cells": cells }))
    }

    fn export_gds(&self, params: &Map<String, Value>) -> Result<Value, DispatchError> {
        let raw = required_path(params)?;
        let path = Path::new(raw);
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(HostError::DirectoryNotFound(dir.to_path_buf()).into());
            }
        }
        self.host.export_layout(path)?;
        info!(path = raw, "layout exported");
        Ok(json!({ "exported": true, "path": raw }))
    }

    // ── Selection ──────────────────────────────────────────────────

    /// Re-read the selection and push an event if it changed.
    pub fn publish_selection(&mut self) -> usize {
        if self.selection.is_empty() {
            return 0;
        }
        let current = selection_fingerprint(&self.host);
        self.selection.observe(current)
    }

    /// Forget everything registered for a closed connection.
    pub fn disconnect(&mut self, connection: ConnectionId) {
        if self.selection.unsubscribe(connection) {
            debug!(connection, "dropped subscription of closed connection");
        }
    }

    pub fn bind_selection_signal(&mut self) -> Option<SelectionSignal> {
        self.host.bind_selection_signal()
    }

    pub fn unbind_selection_signal(&mut self) {
        self.host.unbind_selection_signal();
    }
}

// ── Params ─────────────────────────────────────────────────────────

fn required_path(params: &Map<String, Value>) -> Result<&str, DispatchError> {
    params
        .get("path")
        .and_then(Value::as_str)
        .filter(|path| !path.is_empty())
        .ok_or_else(|| DispatchError::InvalidParams("path is required".to_string()))
}

fn existing_file(params: &Map<String, Value>) -> Result<PathBuf, DispatchError> {
    let path = PathBuf::from(required_path(params)?);
    if !path.exists() {
        return Err(HostError::FileNotFound(path).into());
    }
    Ok(path)
}

fn cellview_index(params: &Map<String, Value>) -> Result<usize, DispatchError> {
    let value = match params.get("cellview_index") {
        None | Some(Value::Null) => return Ok(0),
        Some(value) => value,
    };
    let index = value.as_u64().ok_or_else(|| {
        DispatchError::InvalidParams("cellview_index must be a non-negative integer".to_string())
    })?;
    usize::try_from(index).ok().filter(|&index| index < MAX_CELLVIEWS).ok_or_else(|| {
        DispatchError::InvalidParams(format!("cellview_index must be below {MAX_CELLVIEWS}"))
    })
}
