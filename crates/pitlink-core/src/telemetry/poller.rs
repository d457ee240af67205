//! Telemetry polling loop
//!
//! A single background task reads telemetry frames off the shared
//! connection on a fixed cadence, decodes them, derives alerts and publishes
//! everything on a broadcast channel. The loop owns a frame assembler so a
//! frame split across several reads (or several ticks) is put back together
//! before decoding.
//!
//! The loop also acts as the link watchdog: consecutive read failures mark
//! the connection failed, and with auto-reconnect enabled a failed link is
//! retried on a slower cadence.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::alerts::{AlertEvaluator, AlertEvent, AlertSettings, AlertTargets};
use super::{TelemetryReading, TelemetrySnapshot};
use crate::protocol::{
    decode_telemetry, ConnectionManager, ConnectionState, DecodeError, TransportError,
    TELEMETRY_FRAME_LEN,
};

/// Everything the link publishes to its consumers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum LinkEvent {
    Telemetry(TelemetryReading),
    Alert(AlertEvent),
}

/// Poller settings
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Consecutive read failures before the link is marked failed
    pub max_read_failures: u32,
    /// Retry a failed link from the poll loop
    pub auto_reconnect: bool,
    /// Minimum time between reconnect attempts
    pub reconnect_interval: Duration,
    pub alerts: AlertSettings,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_read_failures: 3,
            auto_reconnect: true,
            reconnect_interval: Duration::from_secs(5),
            alerts: AlertSettings::default(),
        }
    }
}

/// Accumulates bytes until a full telemetry frame is available
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(TELEMETRY_FRAME_LEN),
        }
    }

    /// Bytes still needed to complete the current frame
    pub fn missing(&self) -> usize {
        TELEMETRY_FRAME_LEN - self.buf.len()
    }

    /// Bytes buffered so far
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append bytes; returns the frame once 18 bytes have been collected
    ///
    /// Callers never push more than [`missing`](Self::missing) bytes at a time.
    pub fn push(&mut self, bytes: &[u8]) -> Option<[u8; TELEMETRY_FRAME_LEN]> {
        let take = bytes.len().min(self.missing());
        self.buf.extend_from_slice(&bytes[..take]);
        if self.buf.len() < TELEMETRY_FRAME_LEN {
            return None;
        }
        let mut frame = [0u8; TELEMETRY_FRAME_LEN];
        frame.copy_from_slice(&self.buf);
        self.buf.clear();
        Some(frame)
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!("discarding {} bytes of partial frame", self.buf.len());
        }
        self.buf.clear();
    }
}

/// Result of one poll tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Link not connected; nothing read
    NotConnected,
    /// No complete frame yet
    Waiting { buffered: usize },
    /// A reading was published along with this many alerts
    Published { alerts: usize },
    /// A complete frame failed to decode and was dropped
    DecodeFailed(DecodeError),
    /// The transport read failed; the partial frame was discarded
    ReadFailed(TransportError),
    /// A failed link was re-established
    Reconnected,
    /// A reconnect attempt failed
    ReconnectFailed(TransportError),
}

/// Telemetry poller
pub struct TelemetryPoller {
    connection: Arc<ConnectionManager>,
    config: PollerConfig,
    assembler: FrameAssembler,
    evaluator: AlertEvaluator,
    targets: watch::Receiver<AlertTargets>,
    events: broadcast::Sender<LinkEvent>,
    read_failures: u32,
    was_connected: bool,
    last_reconnect: Option<Instant>,
    /// Set while a reconnect is running on the blocking pool
    reconnecting: bool,
}

impl TelemetryPoller {
    pub fn new(
        connection: Arc<ConnectionManager>,
        config: PollerConfig,
        targets: watch::Receiver<AlertTargets>,
        events: broadcast::Sender<LinkEvent>,
    ) -> Self {
        Self {
            evaluator: AlertEvaluator::new(config.alerts),
            connection,
            config,
            assembler: FrameAssembler::new(),
            targets,
            events,
            read_failures: 0,
            was_connected: false,
            last_reconnect: None,
            reconnecting: false,
        }
    }

    /// Run one poll iteration
    ///
    /// Reads until a frame completes or the transport has nothing more
    /// buffered. Reads block for at most the transport's read timeout.
    pub async fn tick(&mut self) -> TickOutcome {
        let state = self.connection.state();
        if !state.is_connected() {
            self.was_connected = false;
            if let ConnectionState::Failed(_) = state {
                if let Some(outcome) = self.try_reconnect().await {
                    return outcome;
                }
            }
            return TickOutcome::NotConnected;
        }
        if !self.was_connected {
            // Fresh link: nothing buffered belongs to it
            self.assembler.reset();
            self.read_failures = 0;
            self.was_connected = true;
        }

        let mut chunk = [0u8; TELEMETRY_FRAME_LEN];
        loop {
            let want = self.assembler.missing();
            match self.connection.read(&mut chunk[..want]) {
                Ok(0) => {
                    return TickOutcome::Waiting {
                        buffered: self.assembler.buffered(),
                    };
                }
                Ok(n) => {
                    self.read_failures = 0;
                    if let Some(frame) = self.assembler.push(&chunk[..n]) {
                        return self.handle_frame(&frame);
                    }
                }
                Err(TransportError::NotConnected) => {
                    self.assembler.reset();
                    return TickOutcome::NotConnected;
                }
                Err(e) => return self.handle_read_error(e),
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) -> TickOutcome {
        match decode_telemetry(frame) {
            Ok(snapshot) => {
                let alerts = self.publish(snapshot);
                TickOutcome::Published { alerts }
            }
            Err(e) => {
                warn!("dropping telemetry frame: {}", e);
                TickOutcome::DecodeFailed(e)
            }
        }
    }

    fn publish(&mut self, snapshot: TelemetrySnapshot) -> usize {
        if snapshot.exceeds_safety_limit() {
            warn!(
                chamber = snapshot.chamber_temp_c,
                left = snapshot.cook_temp_left_c,
                right = snapshot.cook_temp_right_c,
                "probe above controller shutdown limit"
            );
        }

        let targets = *self.targets.borrow();
        let now = Instant::now().into_std();
        let alerts = self.evaluator.evaluate(&snapshot, &targets, now);

        // Sending only fails when nobody is subscribed
        let _ = self
            .events
            .send(LinkEvent::Telemetry(TelemetryReading::new(snapshot)));
        let count = alerts.len();
        for alert in alerts {
            info!("alert: {:?}", alert.kind);
            let _ = self.events.send(LinkEvent::Alert(alert));
        }
        count
    }

    fn handle_read_error(&mut self, err: TransportError) -> TickOutcome {
        self.assembler.reset();
        self.read_failures += 1;
        warn!(
            failures = self.read_failures,
            "telemetry read failed: {}", err
        );
        if self.read_failures >= self.config.max_read_failures {
            self.connection.mark_failed(format!(
                "{} consecutive read failures: {}",
                self.read_failures, err
            ));
            self.read_failures = 0;
            self.was_connected = false;
        }
        TickOutcome::ReadFailed(err)
    }

    async fn try_reconnect(&mut self) -> Option<TickOutcome> {
        if !self.config.auto_reconnect {
            return None;
        }
        let now = Instant::now();
        if let Some(last) = self.last_reconnect {
            if now.duration_since(last) < self.config.reconnect_interval {
                return None;
            }
        }
        self.last_reconnect = Some(now);
        self.assembler.reset();

        info!("attempting reconnect");
        let connection = self.connection.clone();
        self.reconnecting = true;
        let result = match tokio::task::spawn_blocking(move || connection.connect()).await {
            Ok(result) => result,
            Err(e) => Err(TransportError::ConnectFailed(e.to_string())),
        };
        self.reconnecting = false;
        Some(match result {
            Ok(()) => {
                self.read_failures = 0;
                self.was_connected = true;
                TickOutcome::Reconnected
            }
            Err(e) => TickOutcome::ReconnectFailed(e),
        })
    }

    /// Poll until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval = ?self.config.interval, "telemetry poller started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if self.reconnecting {
                        // The blocking connect keeps running; abort it so
                        // no link comes up without a poller behind it
                        debug!("aborting reconnect in flight");
                        self.connection.disconnect();
                    }
                    break;
                }
                outcome = self.tick() => {
                    if let TickOutcome::ReconnectFailed(e) = &outcome {
                        debug!("reconnect failed: {}", e);
                    }
                }
            }
        }

        debug!("telemetry poller stopped");
    }

    /// Spawn the poll loop on the current runtime
    pub fn spawn(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        PollerHandle { cancel, task }
    }
}

/// Handle to a running poller
pub struct PollerHandle {
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancel the loop and wait for it to finish
    ///
    /// A reconnect still in flight is aborted and leaves the link
    /// `Disconnected`. An established link is left as it is.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("telemetry poller task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
