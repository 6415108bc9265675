// `gdslink export`: write the active layout to a file.

use std::path::PathBuf;

use clap::Args;
use gdslink_common::protocol::methods;
use serde_json::Value;

use super::{path_params, CliContext};
use crate::output;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Destination file; its directory must already exist.
    pub path: PathBuf,
}

pub async fn run(args: ExportArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let result = ctx.client().call(methods::EXPORT_GDS, path_params(&args.path)?).await?;
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &Value) -> String {
    format!("Exported to {}", result["path"].as_str().unwrap_or("?"))
}
