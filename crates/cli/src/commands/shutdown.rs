// `gdslink shutdown`: stop the control server.

use gdslink_common::protocol::methods;
use serde_json::{Map, Value};

use super::CliContext;
use crate::output;

pub async fn run(ctx: &CliContext) -> anyhow::Result<()> {
    let result = ctx.client().call(methods::SHUTDOWN, Map::new()).await?;
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &Value) -> String {
    result["message"].as_str().unwrap_or("server stopped").to_string()
}
