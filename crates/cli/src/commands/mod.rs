// CLI subcommand dispatch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use gdslink_common::config::Config;
use serde_json::{Map, Value};

use crate::client::ControlClient;
use crate::output::OutputFormat;

pub mod call;
pub mod cells;
pub mod export;
pub mod load;
pub mod open;
pub mod ping;
pub mod relay;
pub mod shutdown;
pub mod watch;

#[derive(Subcommand)]
pub enum Command {
    /// Check that the control server answers
    Ping,
    /// Send an arbitrary control request
    Call(call::CallArgs),
    /// Open a layout file in a cellview slot
    Open(open::OpenArgs),
    /// Read a layout file into the active layout
    Load(load::LoadArgs),
    /// List cell names of the active layout
    Cells,
    /// Write the active layout to a file
    Export(export::ExportArgs),
    /// Stream selection changes until the server goes away
    Watch,
    /// Forward tool calls found in a model output stream
    Relay(relay::RelayArgs),
    /// Stop the control server
    Shutdown,
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CliContext {
    pub fn client(&self) -> ControlClient {
        ControlClient::from_config(&self.config.server)
            .with_timeout(self.config.relay.connect_timeout())
    }
}

pub async fn run(cmd: Command, ctx: &CliContext) -> Result<()> {
    match cmd {
        Command::Ping => ping::run(ctx).await,
        Command::Call(args) => call::run(args, ctx).await,
        Command::Open(args) => open::run(args, ctx).await,
        Command::Load(args) => load::run(args, ctx).await,
        Command::Cells => cells::run(ctx).await,
        Command::Export(args) => export::run(args, ctx).await,
        Command::Watch => watch::run(ctx).await,
        Command::Relay(args) => relay::run(args, ctx).await,
        Command::Shutdown => shutdown::run(ctx).await,
    }
}

/// `{"path": <absolute path>}`; the server resolves paths against its own
/// working directory, so relative paths are anchored here first.
pub(crate) fn path_params(path: &Path) -> Result<Map<String, Value>> {
    let absolute = absolute_path(path)?;
    let mut params = Map::new();
    params.insert("path".into(), Value::String(absolute.to_string_lossy().into_owned()));
    Ok(params)
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve the current directory")?;
    Ok(cwd.join(path))
}

/// Cell names as a plain string list, whatever else the result carries.
pub(crate) fn cells_of(result: &Value) -> Vec<String> {
    result
        .get("cells")
        .and_then(Value::as_array)
        .map(|cells| cells.iter().filter_map(Value::as_str).map(ToOwned::to_owned).collect())
        .unwrap_or_default()
}
