// `gdslink call`: send an arbitrary control request.

use clap::Args;
use serde_json::{Map, Value};

use super::CliContext;
use crate::output;

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Method name, e.g. `get_cell_list`.
    pub method: String,

    /// Params as a JSON object.
    #[arg(long, value_parser = parse_params, default_value = "{}")]
    params: Map<String, Value>,
}

pub async fn run(args: CallArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let result = ctx.client().call(&args.method, args.params).await?;
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn parse_params(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(params)) => Ok(params),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err("params must be a JSON object".to_string()),
        Err(error) => Err(format!("invalid JSON: {error}")),
    }
}

fn format_human(result: &Value) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
}
