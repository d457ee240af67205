//! Connection management
//!
//! Owns the transport to the controller and its lifecycle. One manager per
//! session, shared behind an `Arc` by the dispatcher and the poller; every
//! transport operation goes through a single lock so a telemetry read never
//! interleaves with a command write.

use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::stream::{Connector, DeviceId, Transport};
use super::TransportError;

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Resolving the device and opening the transport
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection lost or could not be established
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

struct Inner {
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    device: Option<DeviceId>,
    /// Bumped by every teardown so an in-flight connect can tell it was cancelled
    generation: u64,
    tx_bytes: u64,
    rx_bytes: u64,
}

/// Connection to the smoker controller
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// Create a new manager (not yet connected)
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                transport: None,
                device: None,
                generation: 0,
                tx_bytes: 0,
                rx_bytes: 0,
            }),
            state_tx,
        }
    }

    // Poisoning is ignored: every transition is a single assignment.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "connection state change");
        }
        inner.state = state.clone();
        self.state_tx.send_replace(state);
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    /// Watch connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Device of the current (or last) connection
    pub fn device(&self) -> Option<DeviceId> {
        self.lock().device.clone()
    }

    /// Cumulative (tx, rx) byte counters
    pub fn counters(&self) -> (u64, u64) {
        let inner = self.lock();
        (inner.tx_bytes, inner.rx_bytes)
    }

    /// Connect to the controller
    ///
    /// Does nothing when already connected or while another attempt is in
    /// flight. Failures leave the manager in `Failed` and are returned as values.
    pub fn connect(&self) -> Result<(), TransportError> {
        let generation = {
            let mut inner = self.lock();
            match inner.state {
                ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
                _ => {}
            }
            self.set_state(&mut inner, ConnectionState::Connecting);
            inner.generation
        };

        // Device lookup and open can take seconds; run them without the lock
        // so readers keep seeing `Connecting`.
        let resolved = self
            .connector
            .resolve()
            .map_err(|e| TransportError::DeviceNotFound(e.to_string()))
            .and_then(|device| {
                info!("connecting to {}", device);
                self.connector
                    .open(&device)
                    .map(|transport| (device, transport))
                    .map_err(|e| TransportError::ConnectFailed(e.to_string()))
            });

        let mut inner = self.lock();
        if inner.generation != generation || inner.state != ConnectionState::Connecting {
            if let Ok((_, mut transport)) = resolved {
                let _ = transport.close();
            }
            debug!("connect attempt superseded by disconnect");
            return Err(TransportError::ConnectAborted);
        }

        match resolved {
            Ok((device, transport)) => {
                info!("connected to {}", device);
                inner.transport = Some(transport);
                inner.device = Some(device);
                self.set_state(&mut inner, ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                warn!("connect failed: {}", e);
                self.set_state(&mut inner, ConnectionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Write a complete message to the controller
    ///
    /// Never queues: fails with `NotConnected` straight away when there is no
    /// open transport. A write error leaves the state alone.
    pub fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if !inner.state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let Some(transport) = inner.transport.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let result = transport.write_all(bytes).and_then(|_| transport.flush());
        match result {
            Ok(()) => {
                inner.tx_bytes += bytes.len() as u64;
                debug!("sent {:02x?}", bytes);
                Ok(())
            }
            Err(e) => {
                warn!("write of {} bytes failed: {}", bytes.len(), e);
                Err(TransportError::WriteFailed(e.to_string()))
            }
        }
    }

    /// Read whatever the controller has sent, up to `buf.len()` bytes
    ///
    /// Returns `Ok(0)` when nothing arrived within the transport's timeout.
    /// End of stream is reported as `ReadFailed`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inner = self.lock();
        if !inner.state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let Some(transport) = inner.transport.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        match read_available(&mut **transport, buf) {
            Ok(n) => {
                inner.rx_bytes += n as u64;
                Ok(n)
            }
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    /// Tear down after a detected link loss and enter `Failed`
    ///
    /// Leaves a plain `Disconnected` manager alone.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut inner = self.lock();
        if inner.state == ConnectionState::Disconnected {
            return;
        }
        warn!("connection marked failed: {}", reason);
        close_transport(&mut inner);
        self.set_state(&mut inner, ConnectionState::Failed(reason));
    }

    /// Disconnect from the controller
    ///
    /// Safe to call any number of times, from any state.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        if close_transport(&mut inner) {
            info!("disconnected");
        }
        self.set_state(&mut inner, ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        close_transport(inner);
    }
}

/// Close and drop the transport if open; returns whether there was one
fn close_transport(inner: &mut Inner) -> bool {
    inner.generation = inner.generation.wrapping_add(1);
    match inner.transport.take() {
        Some(mut transport) => {
            if let Err(e) = transport.close() {
                debug!("error closing transport: {}", e);
            }
            true
        }
        None => false,
    }
}

fn read_available(transport: &mut dyn Transport, buf: &mut [u8]) -> io::Result<usize> {
    match transport.read(buf) {
        Ok(0) => Err(io::Error::new(ErrorKind::UnexpectedEof, "stream closed by peer")),
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        writes: AtomicUsize,
        closes: AtomicUsize,
    }

    struct CountingTransport {
        counters: Arc<Counters>,
        fail_write: bool,
    }

    impl Read for CountingTransport {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(ErrorKind::TimedOut.into())
        }
    }

    impl Write for CountingTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.counters.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_write {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for CountingTransport {
        fn close(&mut self) -> io::Result<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        counters: Arc<Counters>,
        fail: bool,
        fail_write: bool,
        open_delay: Duration,
    }

    impl Connector for CountingConnector {
        fn resolve(&self) -> io::Result<DeviceId> {
            Ok(DeviceId::new("IoT Pitmaster", "mock"))
        }

        fn open(&self, _device: &DeviceId) -> io::Result<Box<dyn Transport>> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.open_delay);
            if self.fail {
                return Err(io::Error::new(ErrorKind::ConnectionRefused, "refused"));
            }
            Ok(Box::new(CountingTransport {
                counters: self.counters.clone(),
                fail_write: self.fail_write,
            }))
        }
    }

    fn manager(fail: bool) -> (ConnectionManager, Arc<Counters>) {
        manager_with(CountingConnector {
            fail,
            ..CountingConnector::default()
        })
    }

    fn manager_with(connector: CountingConnector) -> (ConnectionManager, Arc<Counters>) {
        let counters = connector.counters.clone();
        (ConnectionManager::new(Arc::new(connector)), counters)
    }

    /// Manager whose transport takes 200 ms to open
    fn slow_manager() -> (Arc<ConnectionManager>, Arc<Counters>) {
        let (mgr, counters) = manager_with(CountingConnector {
            open_delay: Duration::from_millis(200),
            ..CountingConnector::default()
        });
        (Arc::new(mgr), counters)
    }

    fn wait_for_connecting(mgr: &ConnectionManager) {
        for _ in 0..100 {
            if mgr.state() == ConnectionState::Connecting {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("connect never started");
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (mgr, counters) = manager(false);
        mgr.connect().unwrap();
        mgr.connect().unwrap();
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.device().unwrap().address, "mock");
    }

    #[test]
    fn test_connect_failure_enters_failed() {
        let (mgr, _) = manager(true);
        let err = mgr.connect().unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed(_)));
        assert!(matches!(mgr.state(), ConnectionState::Failed(_)));
    }

    #[test]
    fn test_send_when_disconnected() {
        let (mgr, counters) = manager(false);
        assert_eq!(mgr.send(&[5, 1]), Err(TransportError::NotConnected));
        assert_eq!(counters.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disconnect_idempotent() {
        let (mgr, counters) = manager(false);
        mgr.connect().unwrap();
        mgr.send(&[6, 1]).unwrap();
        mgr.disconnect();
        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.counters(), (2, 0));
    }

    #[test]
    fn test_read_timeout_is_empty() {
        let (mgr, _) = manager(false);
        mgr.connect().unwrap();
        let mut buf = [0u8; 18];
        assert_eq!(mgr.read(&mut buf), Ok(0));
    }

    #[test]
    fn test_mark_failed_then_reconnect() {
        let (mgr, counters) = manager(false);
        mgr.connect().unwrap();
        mgr.mark_failed("no data");
        assert_eq!(mgr.state(), ConnectionState::Failed("no data".to_string()));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

        mgr.connect().unwrap();
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_state_watch() {
        let (mgr, _) = manager(false);
        let rx = mgr.subscribe();
        mgr.connect().unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }

    #[test]
    fn test_connect_while_connecting_is_noop() {
        let (mgr, counters) = slow_manager();
        let first = {
            let mgr = mgr.clone();
            thread::spawn(move || mgr.connect())
        };
        wait_for_connecting(&mgr);

        assert_eq!(mgr.connect(), Ok(()));
        assert_eq!(first.join().unwrap(), Ok(()));
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_aborts_inflight_connect() {
        let (mgr, counters) = slow_manager();
        let attempt = {
            let mgr = mgr.clone();
            thread::spawn(move || mgr.connect())
        };
        wait_for_connecting(&mgr);

        mgr.disconnect();
        assert_eq!(attempt.join().unwrap(), Err(TransportError::ConnectAborted));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert!(mgr.device().is_none());
    }

    #[test]
    fn test_write_failure_keeps_connection() {
        let (mgr, counters) = manager_with(CountingConnector {
            fail_write: true,
            ..CountingConnector::default()
        });
        mgr.connect().unwrap();

        let err = mgr.send(&[6, 1]).unwrap_err();
        assert!(matches!(err, TransportError::WriteFailed(_)));
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(counters.writes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
        assert_eq!(mgr.counters(), (0, 0));
    }
}
