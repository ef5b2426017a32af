//! Live session management.
//!
//! One task owns the polling loop: on a fixed cadence it runs the composite
//! telemetry poll and broadcasts the result to every attached observer;
//! between ticks it services observer commands, replying to the originator
//! only. Both sides are bounded: a command waits at most one in-flight poll,
//! and polling waits at most one in-flight command.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::VescClient;
use crate::error::VescError;
use crate::messages::{
    InboundCommand, OutboundMessage, EVENT_SET_BATTERY_CUT, EVENT_SET_MOTOR_CONF,
};
use crate::telemetry::TelemetrySnapshot;

/// Broadcast channel capacity; slow observers lag rather than block.
const EVENT_CAPACITY: usize = 16;

/// Pending observer request capacity.
const REQUEST_CAPACITY: usize = 32;

/// One broadcast to all attached observers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A fresh telemetry snapshot
    Snapshot(Arc<TelemetrySnapshot>),
    /// The poll failed this tick; explicit no-data signal
    NoData,
}

/// A request from one observer, answered to that observer only.
#[derive(Debug)]
pub enum SessionRequest {
    /// A parsed command envelope
    Command {
        /// What the observer asked for
        command: InboundCommand,
        /// Where the reply goes
        reply: oneshot::Sender<OutboundMessage>,
    },
    /// Point-in-time snapshot (forces a poll outside the cadence)
    Snapshot {
        /// Latest data, or `None` when the device has never answered
        reply: oneshot::Sender<Option<Arc<TelemetrySnapshot>>>,
    },
}

/// An attached observer: broadcast subscription plus a request lane.
///
/// Dropping the session detaches the observer; an in-flight broadcast is
/// unaffected and an in-flight exchange always runs to completion.
pub struct ObserverSession {
    /// Receives every broadcast from the poll loop
    pub events: broadcast::Receiver<SessionEvent>,
    requests: mpsc::Sender<SessionRequest>,
}

impl ObserverSession {
    /// Send a command and wait for the reply addressed to this observer.
    pub async fn request(&self, command: InboundCommand) -> OutboundMessage {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .requests
            .send(SessionRequest::Command {
                command,
                reply: reply_tx,
            })
            .await;
        if sent.is_err() {
            return OutboundMessage::error(VescError::DispatcherClosed);
        }
        match reply_rx.await {
            Ok(message) => message,
            Err(_) => OutboundMessage::error(VescError::DispatcherClosed),
        }
    }
}

/// Handle for attaching observers and reading telemetry out-of-band.
#[derive(Clone)]
pub struct SessionHandle {
    events: broadcast::Sender<SessionEvent>,
    requests: mpsc::Sender<SessionRequest>,
    latest: watch::Receiver<Option<Arc<TelemetrySnapshot>>>,
}

impl SessionHandle {
    /// Attach a new observer. Attach and detach are safe at any time,
    /// including during an in-flight broadcast.
    pub fn attach(&self) -> ObserverSession {
        ObserverSession {
            events: self.events.subscribe(),
            requests: self.requests.clone(),
        }
    }

    /// The most recent successful snapshot, if any.
    pub fn latest(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.latest.borrow().clone()
    }

    /// Force a poll and return its snapshot, falling back to the latest
    /// known one when the device does not answer.
    pub async fn snapshot(&self) -> Option<Arc<TelemetrySnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .requests
            .send(SessionRequest::Snapshot { reply: reply_tx })
            .await
            .is_err()
        {
            return self.latest();
        }
        reply_rx.await.unwrap_or_else(|_| self.latest())
    }
}

/// The polling loop. Owns the client end of the link dispatcher.
pub struct SessionManager {
    client: VescClient,
    poll_interval: Duration,
    events: broadcast::Sender<SessionEvent>,
    requests: mpsc::Receiver<SessionRequest>,
    latest: watch::Sender<Option<Arc<TelemetrySnapshot>>>,
    shutdown: watch::Receiver<bool>,
}

impl SessionManager {
    /// Spawn the session task and return its handle.
    pub fn spawn(
        client: VescClient,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (latest_tx, latest_rx) = watch::channel(None);

        let handle = SessionHandle {
            events: events_tx.clone(),
            requests: requests_tx,
            latest: latest_rx,
        };
        let manager = SessionManager {
            client,
            poll_interval,
            events: events_tx,
            requests: requests_rx,
            latest: latest_tx,
            shutdown,
        };
        let task = tokio::spawn(manager.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "session loop started");
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.poll_and_broadcast().await;
                }
                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request).await,
                        None => break,
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("session loop stopping");
                    break;
                }
            }
        }
    }

    async fn poll_and_broadcast(&mut self) {
        match self.client.poll_snapshot().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.latest.send_replace(Some(snapshot.clone()));
                // No receivers attached is not an error.
                let _ = self.events.send(SessionEvent::Snapshot(snapshot));
            }
            Err(err) => {
                // Corrupt frames are worth noticing; timeouts and an absent
                // link are routine while the device is off.
                if err.is_corrupt_frame() {
                    warn!(error = %err, "telemetry poll failed, skipping tick");
                } else {
                    debug!(error = %err, "telemetry poll failed, skipping tick");
                }
                let _ = self.events.send(SessionEvent::NoData);
            }
        }
    }

    async fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::Snapshot { reply } => {
                let snapshot = match self.client.poll_snapshot().await {
                    Ok(snapshot) => {
                        let snapshot = Arc::new(snapshot);
                        self.latest.send_replace(Some(snapshot.clone()));
                        Some(snapshot)
                    }
                    Err(_) => self.latest.borrow().clone(),
                };
                let _ = reply.send(snapshot);
            }
            SessionRequest::Command { command, reply } => {
                let message = self.dispatch_command(command).await;
                // The observer may have detached while the exchange ran.
                let _ = reply.send(message);
            }
        }
    }

    async fn dispatch_command(&mut self, command: InboundCommand) -> OutboundMessage {
        match command {
            InboundCommand::SetParked => match self.client.set_parked(true).await {
                Ok(()) => {
                    // The device owns the lock state; read it back instead
                    // of assuming the optimistic result.
                    let parked = self.client.parked_status().await.unwrap_or(true);
                    OutboundMessage::Parked { parked }
                }
                Err(err) => {
                    warn!(error = %err, "park command failed");
                    OutboundMessage::Parked { parked: false }
                }
            },
            InboundCommand::SetUnparked => match self.client.set_parked(false).await {
                Ok(()) => {
                    let parked = self.client.parked_status().await.unwrap_or(false);
                    OutboundMessage::Unparked { unparked: !parked }
                }
                Err(err) => {
                    warn!(error = %err, "unpark command failed");
                    OutboundMessage::Unparked { unparked: false }
                }
            },
            InboundCommand::GetParkedStatus => match self.client.parked_status().await {
                Ok(parked) => OutboundMessage::Parked { parked },
                Err(err) => OutboundMessage::error(err),
            },
            InboundCommand::SetMotorConf(conf) => {
                let result = self
                    .client
                    .set_motor_limits(conf.motor_current, conf.battery_current, conf.field_weakening)
                    .await;
                if let Err(err) = &result {
                    warn!(error = %err, "motor limits rejected");
                }
                OutboundMessage::CommandResult {
                    event: EVENT_SET_MOTOR_CONF,
                    success: result.is_ok(),
                }
            }
            InboundCommand::SetBatteryCut(cut) => {
                let result = self
                    .client
                    .set_battery_cutoff(cut.battery_start, cut.end())
                    .await;
                if let Err(err) = &result {
                    warn!(error = %err, "battery cutoff rejected");
                }
                OutboundMessage::CommandResult {
                    event: EVENT_SET_BATTERY_CUT,
                    success: result.is_ok(),
                }
            }
        }
    }
}
