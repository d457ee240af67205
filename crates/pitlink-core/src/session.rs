//! Link session
//!
//! Wires one connection manager to its dispatcher and telemetry poller and
//! owns their lifecycle. A UI holds a `Session`, subscribes to its events,
//! and sends commands through it.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::config::{ConfigError, LinkConfig};
use crate::dispatch::{CommandDispatcher, DispatchError};
use crate::protocol::{Command, ConnectionManager, ConnectionState, Connector, TransportError};
use crate::telemetry::{AlertTargets, LinkEvent, PollerConfig, PollerHandle, TelemetryPoller};
use crate::unit_conversion::TemperatureUnit;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

pub struct Session {
    connection: Arc<ConnectionManager>,
    dispatcher: CommandDispatcher,
    targets: Arc<watch::Sender<AlertTargets>>,
    events: broadcast::Sender<LinkEvent>,
    poller_config: PollerConfig,
    poller: Option<PollerHandle>,
    closed: bool,
}

impl Session {
    pub fn new(connector: Arc<dyn Connector>, poller_config: PollerConfig, event_capacity: usize) -> Self {
        let connection = Arc::new(ConnectionManager::new(connector));
        let (targets, _) = watch::channel(AlertTargets::default());
        let targets = Arc::new(targets);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            dispatcher: CommandDispatcher::new(connection.clone(), targets.clone()),
            connection,
            targets,
            events,
            poller_config,
            poller: None,
            closed: false,
        }
    }

    /// Build a session from a validated config
    pub fn from_config(config: &LinkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            config.connector(),
            config.poller_config(),
            config.event_capacity,
        ))
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Connect to the controller
    ///
    /// Device lookup and open run on the blocking pool.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || connection.connect())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?
    }

    /// Start the telemetry poller; no-op while one is running
    pub fn start_polling(&mut self) {
        if self.poller.as_ref().is_some_and(|p| !p.is_finished()) {
            return;
        }
        let poller = TelemetryPoller::new(
            self.connection.clone(),
            self.poller_config.clone(),
            self.targets.subscribe(),
            self.events.clone(),
        );
        self.poller = Some(poller.spawn());
        info!("telemetry polling started");
    }

    /// Stop the telemetry poller and wait for it to exit
    ///
    /// Stopping during an automatic reconnect aborts that reconnect, so the
    /// link ends up `Disconnected` rather than connected with no poller.
    pub async fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
            info!("telemetry polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Validate and send a command; see [`CommandDispatcher::dispatch`]
    pub fn dispatch(&self, cmd: Command, unit: TemperatureUnit) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(cmd, unit)
    }

    /// Telemetry readings and alerts
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Connection state changes
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Targets alerts are evaluated against
    pub fn targets(&self) -> AlertTargets {
        self.dispatcher.targets()
    }

    /// Replace the alert targets, e.g. with ones the UI restored
    pub fn set_targets(&self, targets: AlertTargets) {
        self.targets.send_replace(targets);
    }

    /// Stop polling, then disconnect
    pub async fn shutdown(mut self) {
        self.stop_polling().await;
        self.connection.disconnect();
        self.closed = true;
        debug!("session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Can't await here; cancel and let the task exit on its own
        if let Some(poller) = self.poller.take() {
            poller.cancel.cancel();
        }
        self.connection.disconnect();
    }
}
