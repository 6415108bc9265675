// `gdslink open`: open a layout file in a cellview slot.

use std::path::PathBuf;

use clap::Args;
use gdslink_common::protocol::methods;
use serde_json::{json, Value};

use super::{cells_of, path_params, CliContext};
use crate::output;

#[derive(Debug, Args)]
pub struct OpenArgs {
    /// Layout file to open.
    pub path: PathBuf,

    /// Cellview slot to open it into.
    #[arg(long, default_value_t = 0)]
    cellview: usize,
}

pub async fn run(args: OpenArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let mut params = path_params(&args.path)?;
    params.insert("cellview_index".into(), json!(args.cellview));
    let result = ctx.client().call(methods::OPEN_LAYOUT, params).await?;
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &Value) -> String {
    let cells = cells_of(result);
    let slot = result["cellview_index"].as_u64().unwrap_or_default();
    if cells.is_empty() {
        return format!("Opened in cellview {slot}.");
    }
    format!("Opened in cellview {slot}: {}", cells.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_output_lists_cells() {
        let result = json!({"opened": true, "cellview_index": 1, "cells": ["TOP", "INV"]});
        assert_eq!(format_human(&result), "Opened in cellview 1: TOP, INV");
    }
}
