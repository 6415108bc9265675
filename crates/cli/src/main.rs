// gdslink CLI entry point.

use std::path::PathBuf;

use clap::Parser;
use gdslink_common::config::Config;

mod client;
mod commands;
mod exit_code;
mod output;

use commands::CliContext;
use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "gdslink", about = "Drive a layout editor over its local control socket")]
struct Cli {
    /// Control server host (defaults to the config file, then 127.0.0.1).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Control server port.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Read settings from this file instead of ~/.gdslink/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::detect(cli.json);
    let mut config = match &cli.config {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(error) => {
                output::print_error(
                    format,
                    "CONFIG_ERROR",
                    &format!("failed to read {}: {error}", path.display()),
                );
                return ExitCode::Usage.into();
            }
        },
        None => Config::load(),
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let ctx = CliContext { config, format };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            output::print_error(format, "CLI_ERROR", &format!("failed to start runtime: {error}"));
            return ExitCode::Error.into();
        }
    };

    match runtime.block_on(commands::run(cli.command, &ctx)) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}
