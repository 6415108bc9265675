// `gdslink cells`: list cell names of the active layout.

use gdslink_common::protocol::methods;
use serde_json::{Map, Value};

use super::{cells_of, CliContext};
use crate::output;

pub async fn run(ctx: &CliContext) -> anyhow::Result<()> {
    let result = ctx.client().call(methods::GET_CELL_LIST, Map::new()).await?;
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &Value) -> String {
    let cells = cells_of(result);
    if cells.is_empty() {
        return "No cells.".to_string();
    }
    cells.join("\n")
}
