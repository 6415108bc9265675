// `gdslink load`: read a layout file into the active layout.

use std::path::PathBuf;

use clap::Args;
use gdslink_common::protocol::methods;
use serde_json::Value;

use super::{cells_of, path_params, CliContext};
use crate::output;

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Layout file to merge into the active layout.
    pub path: PathBuf,
}

pub async fn run(args: LoadArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let result = ctx.client().call(methods::LOAD_GDS, path_params(&args.path)?).await?;
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &Value) -> String {
    format!("Loaded; layout now has {} cells.", cells_of(result).len())
}
