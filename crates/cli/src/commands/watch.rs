// `gdslink watch`: stream selection changes.

use gdslink_common::selection::SelectionFingerprint;
use serde_json::{json, Value};
use tracing::info;

use super::CliContext;
use crate::output;

pub async fn run(ctx: &CliContext) -> anyhow::Result<()> {
    let mut watch = ctx.client().watch_selection().await?;
    print_selection(ctx, watch.initial())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing selection watch");
                return Ok(());
            }
            event = watch.next_event() => match event? {
                Some(event) => print_selection(ctx, event.data.as_deref())?,
                None => {
                    info!("control server closed the connection");
                    return Ok(());
                }
            },
        }
    }
}

fn print_selection(ctx: &CliContext, selection: Option<&str>) -> anyhow::Result<()> {
    output::print_output(ctx.format, &json!({ "selection": selection }), format_human)?;
    Ok(())
}

fn format_human(report: &Value) -> String {
    let Some(raw) = report["selection"].as_str() else {
        return "selection: none".to_string();
    };
    match raw.parse::<SelectionFingerprint>() {
        Ok(fingerprint) => format!(
            "selection: layer {}/{} with {} points ({raw})",
            fingerprint.layer,
            fingerprint.datatype,
            fingerprint.points.len()
        ),
        Err(_) => format!("selection: {raw}"),
    }
}
