// `gdslink relay`: forward tool calls found in a model output stream.
//
// Reads stdin line by line (SSE `data:` lines by default, plain text with
// `--raw`), feeds the text into a `ToolCallExtractor` and sends each
// recognised command to the control server.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args;
use gdslink_common::protocol::wire::{Request, Response};
use gdslink_common::stream::sse::delta_content;
use gdslink_common::stream::{ExtractorConfig, ToolCallExtractor, ToolCommand};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::CliContext;
use crate::client::ControlClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct RelayArgs {
    /// Treat stdin as plain text deltas instead of SSE `data:` lines.
    #[arg(long)]
    raw: bool,

    /// Print recognised commands instead of sending them.
    #[arg(long)]
    dry_run: bool,

    /// Copy every input line to stdout; reports then go to stderr.
    #[arg(long)]
    echo: bool,

    /// Tool tag to match (overrides the config file).
    #[arg(long)]
    tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Server-sent event lines from a chat-completions stream.
    Sse,
    /// Plain text, one delta per line.
    Raw,
}

/// Where recognised commands go.
pub enum Forward<'a> {
    DryRun,
    Send(&'a ControlClient),
}

/// Counters for one relayed stream.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RelaySummary {
    pub lines: usize,
    pub commands: usize,
    pub forwarded: usize,
    pub failed: usize,
    /// Commands without a `method`.
    pub skipped: usize,
    pub truncations: usize,
    /// Unterminated text left when the stream ended.
    pub dropped_bytes: usize,
}

/// One line of relay output.
#[derive(Debug, Serialize)]
struct RelayRecord {
    request: Request,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    dry_run: bool,
}

pub async fn run(args: RelayArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config.relay.extractor_config();
    if let Some(tag) = args.tag {
        config.tool_tag = tag;
    }
    let mode = if args.raw { InputMode::Raw } else { InputMode::Sse };
    let client = ctx.client();
    let forward = if args.dry_run { Forward::DryRun } else { Forward::Send(&client) };

    let input = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let (echo, report): (Option<&mut dyn Write>, &mut dyn Write) = if args.echo {
        (Some(&mut stdout), &mut stderr)
    } else {
        (None, &mut stdout)
    };
    let summary = relay_stream(input, echo, report, ctx.format, config, mode, forward).await?;

    if summary.dropped_bytes > 0 {
        output::print_warning(
            ctx.format,
            "UNTERMINATED_TOOL_CALL",
            &format!("stream ended inside an object; dropped {} bytes", summary.dropped_bytes),
        );
    }
    Ok(())
}

/// Relay one stream to completion.
pub async fn relay_stream<R>(
    input: R,
    mut echo: Option<&mut dyn Write>,
    report: &mut dyn Write,
    format: OutputFormat,
    config: ExtractorConfig,
    mode: InputMode,
    forward: Forward<'_>,
) -> Result<RelaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut input = input;
    let mut extractor = ToolCallExtractor::new(config);
    let mut summary = RelaySummary::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = input.read_until(b'\n', &mut line).await.context("failed to read relay input")?;
        if read == 0 {
            break;
        }
        summary.lines += 1;

        if let Some(echo) = echo.as_deref_mut() {
            echo.write_all(&line).context("failed to echo relay input")?;
            echo.flush().context("failed to echo relay input")?;
        }

        let text = String::from_utf8_lossy(&line);
        let delta = match mode {
            InputMode::Sse => match delta_content(text.trim_end_matches(['\r', '\n'])) {
                Some(delta) => delta,
                None => continue,
            },
            InputMode::Raw => text.into_owned(),
        };

        for command in extractor.push(&delta) {
            summary.commands += 1;
            forward_command(&command, &forward, report, format, &mut summary).await?;
        }
    }

    summary.truncations = extractor.truncations();
    summary.dropped_bytes = extractor.finish().len();
    info!(
        lines = summary.lines,
        commands = summary.commands,
        forwarded = summary.forwarded,
        failed = summary.failed,
        "relay stream finished"
    );
    Ok(summary)
}

async fn forward_command(
    command: &ToolCommand,
    forward: &Forward<'_>,
    report: &mut dyn Write,
    format: OutputFormat,
    summary: &mut RelaySummary,
) -> Result<()> {
    let Some(request) = command.to_request() else {
        debug!(params = ?command.params, "skipping tool call without method");
        summary.skipped += 1;
        return Ok(());
    };

    let record = match forward {
        Forward::DryRun => RelayRecord { request, response: None, error: None, dry_run: true },
        Forward::Send(client) => match client.send(&request).await {
            Ok(response) => {
                summary.forwarded += 1;
                info!(method = %request.method, ok = response.ok, "relayed tool call");
                RelayRecord { request, response: Some(response), error: None, dry_run: false }
            }
            Err(error) => {
                summary.failed += 1;
                warn!(method = %request.method, error = %format!("{error:#}"), "tool call not delivered");
                let error = Some(format!("{error:#}"));
                RelayRecord { request, response: None, error, dry_run: false }
            }
        },
    };

    output::write_output(report, format, &record, format_human)
        .context("failed to write relay report")?;
    report.flush().context("failed to write relay report")
}

fn format_human(record: &RelayRecord) -> String {
    let call = format!(
        "{} {}",
        record.request.method,
        serde_json::Value::Object(record.request.params.clone())
    );
    if record.dry_run {
        return format!("would send: {call}");
    }
    match (&record.response, &record.error) {
        (Some(response), _) if response.ok => format!(
            "{call} -> {}",
            response.result.clone().unwrap_or(serde_json::Value::Null)
        ),
        (Some(response), _) => {
            format!("{call} -> error: {}", response.error.as_deref().unwrap_or("unknown"))
        }
        (None, Some(error)) => format!("{call} -> not delivered: {error}"),
        (None, None) => call,
    }
}

#[cfg(test)]
mod tests {
    use gdslink_common::config::ServerConfig;
    use gdslink_common::stream::TruncationPolicy;
    use gdslink_daemon::host::memory::LayoutDocument;
    use gdslink_daemon::host::MemoryHost;
    use gdslink_daemon::runtime::start_embedded;
    use serde_json::{json, Value};

    use super::*;

    fn sse(delta: &str) -> String {
        format!("data: {}\n", json!({"choices": [{"delta": {"content": delta}}]}))
    }

    fn report_lines(report: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(report)
            .lines()
            .map(|line| serde_json::from_str(line).expect("report line should be JSON"))
            .collect()
    }

    #[tokio::test]
    async fn dry_run_reports_commands_split_across_sse_chunks() {
        let mut input = String::new();
        for chunk in ["Sure! ", "{\"tool\":\"klay", "out\",\"method\":\"get_cell_list\"", ",\"id\":7}", " done"] {
            input.push_str(&sse(chunk));
        }
        input.push_str("data: [DONE]\n");

        let mut report = Vec::new();
        let summary = relay_stream(
            input.as_bytes(),
            None,
            &mut report,
            OutputFormat::Json,
            ExtractorConfig::default(),
            InputMode::Sse,
            Forward::DryRun,
        )
        .await
        .unwrap();

        assert_eq!(summary.lines, 6);
        assert_eq!(summary.commands, 1);
        assert_eq!(summary.dropped_bytes, 0);
        assert_eq!(
            report_lines(&report),
            vec![json!({
                "request": {"id": 7, "method": "get_cell_list", "params": {}},
                "dry_run": true
            })]
        );
    }

    #[tokio::test]
    async fn raw_mode_echoes_input_and_skips_method_less_calls() {
        let input = "{\"tool\":\"klayout\",\"params\":{}}\n{\"tool\":\"other\",\"method\":\"ping\"}\n{\"tool\":\"klayout\",\"method\":\"ping\"}\n";
        let mut echoed = Vec::new();
        let mut report = Vec::new();

        let summary = relay_stream(
            input.as_bytes(),
            Some(&mut echoed as &mut dyn Write),
            &mut report,
            OutputFormat::Json,
            ExtractorConfig::default(),
            InputMode::Raw,
            Forward::DryRun,
        )
        .await
        .unwrap();

        assert_eq!(String::from_utf8(echoed).unwrap(), input);
        assert_eq!(summary.commands, 2);
        assert_eq!(summary.skipped, 1);
        let lines = report_lines(&report);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["request"], json!({"id": 1, "method": "ping", "params": {}}));
    }

    #[tokio::test]
    async fn unterminated_call_is_reported_as_dropped() {
        let input = "text {\"tool\":\"klayout\",\"method\":\n";
        let mut report = Vec::new();
        let summary = relay_stream(
            input.as_bytes(),
            None,
            &mut report,
            OutputFormat::Json,
            ExtractorConfig::default(),
            InputMode::Raw,
            Forward::DryRun,
        )
        .await
        .unwrap();

        assert_eq!(summary.commands, 0);
        assert_eq!(summary.dropped_bytes, "{\"tool\":\"klayout\",\"method\":\n".len());
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn oversized_garbage_does_not_hide_later_calls() {
        let config = ExtractorConfig {
            max_buffer: 64,
            truncation: TruncationPolicy::DropOpener,
            ..ExtractorConfig::default()
        };
        let mut input = String::from("{ never closed ");
        input.push_str(&"x".repeat(100));
        input.push('\n');
        input.push_str("{\"tool\":\"klayout\",\"method\":\"ping\"}\n");

        let mut report = Vec::new();
        let summary = relay_stream(
            input.as_bytes(),
            None,
            &mut report,
            OutputFormat::Json,
            config,
            InputMode::Raw,
            Forward::DryRun,
        )
        .await
        .unwrap();

        assert!(summary.truncations >= 1);
        assert_eq!(summary.commands, 1);
    }

    #[tokio::test]
    async fn sends_commands_to_control_server() {
        let host = MemoryHost::with_document(LayoutDocument::with_cells(["TOP", "INV", "TOP"]));
        let config = ServerConfig { port: 0, ..ServerConfig::default() };
        let server = start_embedded(host, &config).await.unwrap();
        let client = ControlClient::new(server.local_addr().to_string());

        let input = concat!(
            "{\"tool\":\"klayout\",\"method\":\"get_cell_list\",\"id\":3}\n",
            "{\"tool\":\"klayout\",\"method\":\"no_such_method\"}\n",
        );
        let mut report = Vec::new();
        let summary = relay_stream(
            input.as_bytes(),
            None,
            &mut report,
            OutputFormat::Json,
            ExtractorConfig::default(),
            InputMode::Raw,
            Forward::Send(&client),
        )
        .await
        .unwrap();

        assert_eq!(summary.forwarded, 2);
        assert_eq!(summary.failed, 0);
        let lines = report_lines(&report);
        assert_eq!(lines[0]["response"], json!({"id": 3, "ok": true, "result": {"cells": ["INV", "TOP"]}}));
        assert_eq!(
            lines[1]["response"],
            json!({"id": 1, "ok": false, "error": "Unknown method: no_such_method"})
        );

        server.wait().await;
    }

    #[tokio::test]
    async fn unreachable_server_counts_failures() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        let client = ControlClient::new(address);

        let mut report = Vec::new();
        let summary = relay_stream(
            "{\"tool\":\"klayout\",\"method\":\"ping\"}\n".as_bytes(),
            None,
            &mut report,
            OutputFormat::Json,
            ExtractorConfig::default(),
            InputMode::Raw,
            Forward::Send(&client),
        )
        .await
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert!(report_lines(&report)[0]["error"].as_str().unwrap().contains("not running"));
    }

    #[test]
    fn human_record_shows_call_and_result() {
        let record = RelayRecord {
            request: Request::new(1, "ping", serde_json::Map::new()),
            response: Some(Response::success(json!(1), json!({"message": "pong"}))),
            error: None,
            dry_run: false,
        };
        assert_eq!(format_human(&record), r#"ping {} -> {"message":"pong"}"#);
    }
}
