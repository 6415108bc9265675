// The hub task: sole owner of the dispatcher and the selection sources.
//
// Connections hand request lines to the hub and wait for an ack; the hub
// queues the response on the connection's outbox before acking, so replies
// leave in arrival order and always ahead of later events.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace};

use super::methods::Dispatcher;
use super::outbound::{ConnectionHandle, ConnectionId};
use crate::host::{LayoutHost, SelectionSignal};

const HUB_QUEUE_DEPTH: usize = 256;

#[derive(Debug)]
pub enum HubCommand {
    /// One trimmed request line; `done` fires once its response is queued.
    Line { connection: ConnectionHandle, line: Vec<u8>, done: oneshot::Sender<()> },
    /// The connection's reader has exited.
    Disconnected { connection: ConnectionId },
}

#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Hand a line to the hub and wait until it has been handled.
    /// Returns `false` once the hub has stopped.
    pub async fn submit(&self, connection: &ConnectionHandle, line: Vec<u8>) -> bool {
        let (done, handled) = oneshot::channel();
        let command = HubCommand::Line { connection: connection.clone(), line, done };
        if self.commands.send(command).await.is_err() {
            return false;
        }
        handled.await.is_ok()
    }

    pub async fn disconnect(&self, connection: ConnectionId) {
        let _ = self.commands.send(HubCommand::Disconnected { connection }).await;
    }
}

/// Spawn the hub for `host`. It runs until `shutdown_tx` fires or every
/// `HubHandle` is dropped.
pub fn spawn_hub<H: LayoutHost>(
    host: H,
    poll_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
) -> (HubHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(HUB_QUEUE_DEPTH);
    let shutdown_rx = shutdown_tx.subscribe();
    let hub = Hub {
        dispatcher: Dispatcher::new(host),
        poll_interval,
        ticker: None,
        signal: None,
        watching: false,
        shutdown_tx,
    };
    let stop_server = StopServerOnExit(hub.shutdown_tx.clone());
    let task = tokio::spawn(async move {
        let _stop_server = stop_server;
        hub.run(commands_rx, shutdown_rx).await;
    });
    (HubHandle { commands: commands_tx }, task)
}

/// Broadcasts shutdown when the hub task ends, including by panic, so
/// the accept loop never keeps handing connections to a dead hub.
struct StopServerOnExit(broadcast::Sender<()>);

impl Drop for StopServerOnExit {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("control hub panicked, stopping the server");
        }
        let _ = self.0.send(());
    }
}

struct Hub<H: LayoutHost> {
    dispatcher: Dispatcher<H>,
    poll_interval: Duration,
    ticker: Option<Interval>,
    signal: Option<SelectionSignal>,
    /// Selection sources are live (at least one subscriber).
    watching: bool,
    shutdown_tx: broadcast::Sender<()>,
}

impl<H: LayoutHost> Hub<H> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<HubCommand>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            // Selection sources come before commands so a busy command
            // queue cannot hold back polling.
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                () = next_tick(&mut self.ticker) => {
                    let delivered = self.dispatcher.publish_selection();
                    if delivered > 0 {
                        trace!(delivered, "selection change found by poll");
                    }
                }
                signal = next_signal(&mut self.signal) => match signal {
                    Some(()) => {
                        let delivered = self.dispatcher.publish_selection();
                        if delivered > 0 {
                            trace!(delivered, "selection change signalled by host");
                        }
                    }
                    None => {
                        debug!("host dropped the selection signal, polling only");
                        self.signal = None;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
            self.sync_selection_sources();
        }

        self.stop_watching();
        info!("control hub stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Line { connection, line, done } => {
                let outcome = self.dispatcher.handle_line(&connection, &line);
                if let Some(response) = outcome.response {
                    if outcome.shutdown {
                        if !connection.send_final(&response) {
                            // Nobody left to flush the reply; stop right away.
                            let _ = self.shutdown_tx.send(());
                        }
                    } else {
                        connection.send(&response);
                    }
                }
                let _ = done.send(());
            }
            HubCommand::Disconnected { connection } => self.dispatcher.disconnect(connection),
        }
    }

    /// Start polling and bind the host signal on the first subscriber;
    /// release both once the last one has gone.
    fn sync_selection_sources(&mut self) {
        match (self.dispatcher.has_subscribers(), self.watching) {
            (true, false) => {
                let mut ticker =
                    time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.ticker = Some(ticker);
                self.signal = self.dispatcher.bind_selection_signal();
                self.watching = true;
                debug!(
                    poll_ms = self.poll_interval.as_millis() as u64,
                    native_signal = self.signal.is_some(),
                    "selection watching started"
                );
            }
            (false, true) => {
                self.stop_watching();
                debug!("selection watching stopped");
            }
            _ => {}
        }
    }

    fn stop_watching(&mut self) {
        if !self.watching {
            return;
        }
        self.ticker = None;
        self.signal = None;
        self.dispatcher.unbind_selection_signal();
        self.watching = false;
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_signal(signal: &mut Option<SelectionSignal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}
