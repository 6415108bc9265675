// gdslinkd: standalone mode entry point.

use anyhow::{bail, Context};
use gdslink_common::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load();
    let address = config.server.address();
    if gdslink_daemon::startup::is_server_running(&address).await {
        bail!("a control server is already listening on {address}");
    }

    info!(%address, "starting standalone gdslink control server");
    gdslink_daemon::runtime::run_standalone(config)
        .await
        .context("standalone control server terminated unexpectedly")
}
