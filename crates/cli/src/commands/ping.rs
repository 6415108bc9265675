// `gdslink ping`: check that the control server answers.

use gdslink_common::protocol::methods;
use serde_json::{json, Map, Value};

use super::CliContext;
use crate::output;

pub async fn run(ctx: &CliContext) -> anyhow::Result<()> {
    let client = ctx.client();
    let result = client.call(methods::PING, Map::new()).await?;
    let report = json!({ "address": client.address(), "result": result });
    output::print_output(ctx.format, &report, format_human)?;
    Ok(())
}

fn format_human(report: &Value) -> String {
    let message = report["result"]["message"].as_str().unwrap_or("ok");
    format!("{message} from {}", report["address"].as_str().unwrap_or("server"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_output_names_the_server() {
        let report = json!({"address": "127.0.0.1:9009", "result": {"message": "pong"}});
        assert_eq!(format_human(&report), "pong from 127.0.0.1:9009");
    }
}
