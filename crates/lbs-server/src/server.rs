use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use lbs_core::config::LbsConfig;
use lbs_core::{ArbiterError, CrashMonitor, NameOwnerChanged, SessionManager};
use lbs_protocol::wire::Delivery;
use lbs_protocol::{ArbiterSnapshot, Message, ProtocolError, ResourceClass, PROTOCOL_VERSION};
use lbs_transport::{ConnectionRole, LbsConnection, TransportError};

use crate::provider::ProviderHooks;
use crate::session::PeerSession;

/// Server-wide metrics tracked via atomic counters.
pub struct ServerMetrics {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU32,
    pub requests_total: AtomicU64,
    pub parameter_errors: AtomicU64,
    pub peer_departures: AtomicU64,
    pub force_removals: AtomicU64,
    pub start_time: std::time::Instant,
}

impl ServerMetrics {
    fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU32::new(0),
            requests_total: AtomicU64::new(0),
            parameter_errors: AtomicU64::new(0),
            peer_departures: AtomicU64::new(0),
            force_removals: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Session manager and crash monitor share one lock; every call and every
/// departure runs its whole turn under it.
struct Arbitration {
    manager: SessionManager,
    monitor: CrashMonitor,
}

struct Shared {
    config: LbsConfig,
    arbitration: Mutex<Arbitration>,
    status: AtomicI32,
    /// Status changes fanned out to every connection task
    signals: broadcast::Sender<Message>,
    metrics: ServerMetrics,
    /// Registered connections: peer id -> unique name
    peers: DashMap<u64, String>,
}

/// The location provider service. Accepts client connections on a local
/// socket and arbitrates their resource references.
pub struct LbsServer {
    shared: Arc<Shared>,
    next_peer_id: AtomicU64,
}

impl LbsServer {
    pub fn new(config: LbsConfig, hooks: ProviderHooks) -> Self {
        let manager = match (config.arbiter.interval_arbitration, hooks.interval) {
            (true, Some(interval)) => SessionManager::with_interval_arbiter(hooks.shutdown, interval),
            _ => SessionManager::new(hooks.shutdown),
        };
        let monitor = CrashMonitor::new(config.bus.clone());
        let (signals, _) = broadcast::channel(64);

        Self {
            shared: Arc::new(Shared {
                config,
                arbitration: Mutex::new(Arbitration { manager, monitor }),
                status: AtomicI32::new(0),
                signals,
                metrics: ServerMetrics::new(),
                peers: DashMap::new(),
            }),
            next_peer_id: AtomicU64::new(1),
        }
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.shared.metrics
    }

    /// Current arbitration state.
    pub fn snapshot(&self) -> ArbiterSnapshot {
        self.shared.arbitration.lock().manager.snapshot()
    }

    /// Unique names of the currently registered connections, sorted.
    pub fn connected_peers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.peers.iter().map(|e| e.value().clone()).collect();
        names.sort();
        names
    }

    /// Record a provider status change for `resource`. The value is what
    /// `GetStatus` reports from now on, and every registered client receives
    /// a `StatusChanged` signal.
    pub fn set_status(&self, resource: ResourceClass, status: i32) {
        self.shared.status.store(status, Ordering::Relaxed);
        let receivers = self
            .shared
            .signals
            .send(Message::StatusChanged {
                method: resource.method(),
                status,
            })
            .unwrap_or(0);
        debug!(resource = %resource, status, receivers, "provider status changed");
    }

    /// Bind the configured socket and serve until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let path = self
            .shared
            .config
            .server
            .socket_path
            .clone()
            .unwrap_or_else(lbs_common::platform::default_socket_path);

        // Remove stale socket if it exists
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        info!(
            "{} listening on {} (object {})",
            self.shared.config.server.service_name, path, self.shared.config.server.service_path
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });

        // Spawn periodic metrics logger
        let shared = self.shared.clone();
        let mut metrics_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {
                        let (tracked, anomalies) = {
                            let arbitration = shared.arbitration.lock();
                            (arbitration.manager.client_count(), arbitration.manager.anomaly_count())
                        };
                        let metrics = &shared.metrics;
                        info!(
                            connections_total = metrics.connections_total.load(Ordering::Relaxed),
                            connections_active = metrics.connections_active.load(Ordering::Relaxed),
                            requests = metrics.requests_total.load(Ordering::Relaxed),
                            parameter_errors = metrics.parameter_errors.load(Ordering::Relaxed),
                            departures = metrics.peer_departures.load(Ordering::Relaxed),
                            force_removals = metrics.force_removals.load(Ordering::Relaxed),
                            tracked_clients = tracked,
                            anomalies,
                            uptime_secs = metrics.start_time.elapsed().as_secs(),
                            "metrics snapshot"
                        );
                    }
                    _ = metrics_shutdown.changed() => { break; }
                }
            }
        });

        let result = self.serve(listener, shutdown_rx).await;
        let _ = std::fs::remove_file(&path);
        result
    }

    /// Accept connections on `listener` until `shutdown_rx` flips.
    pub async fn serve(
        &self,
        listener: UnixListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (departure_tx, departure_rx) = mpsc::unbounded_channel();
        let monitor_task = tokio::spawn(Self::run_crash_monitor(self.shared.clone(), departure_rx));

        let max_clients = self.shared.config.server.max_clients;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result?;

                    // Enforce connection limit
                    let current = self.shared.metrics.connections_active.load(Ordering::Relaxed);
                    if current >= max_clients {
                        warn!("connection rejected: max_clients ({}) reached", max_clients);
                        drop(stream);
                        continue;
                    }

                    let session = PeerSession::new(self.next_peer_id.fetch_add(1, Ordering::Relaxed));
                    let shared = self.shared.clone();
                    let departures = departure_tx.clone();
                    let peer_shutdown = shutdown_rx.clone();

                    shared.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
                    shared.metrics.connections_active.fetch_add(1, Ordering::Relaxed);

                    tokio::spawn(async move {
                        let conn = LbsConnection::new(ConnectionRole::Server, stream);
                        Self::handle_peer(conn, session, &shared, &departures, peer_shutdown).await;
                        shared.metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                _ = shutdown_rx.changed() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        // Wait for active sessions to drain (max 10s)
        if !self.shared.peers.is_empty() {
            debug!("closing peers: {}", self.connected_peers().join(", "));
        }
        let metrics = &self.shared.metrics;
        let remaining = metrics.connections_active.load(Ordering::Relaxed);
        if remaining > 0 {
            info!("waiting for {} active session(s) to finish (max 10s)", remaining);
            let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
            while metrics.connections_active.load(Ordering::Relaxed) > 0
                && tokio::time::Instant::now() < deadline
            {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let still_active = metrics.connections_active.load(Ordering::Relaxed);
            if still_active > 0 {
                warn!("{} session(s) still active after drain timeout", still_active);
            }
        }

        // The monitor finishes once every session has dropped its sender.
        drop(departure_tx);
        if tokio::time::timeout(Duration::from_secs(1), monitor_task).await.is_err() {
            warn!("crash monitor did not drain before shutdown");
        }

        info!("server shut down cleanly");
        Ok(())
    }

    /// Consume the peer-departure stream and hand each notification to the
    /// crash monitor.
    async fn run_crash_monitor(
        shared: Arc<Shared>,
        mut departures: mpsc::UnboundedReceiver<NameOwnerChanged>,
    ) {
        while let Some(change) = departures.recv().await {
            shared.metrics.peer_departures.fetch_add(1, Ordering::Relaxed);
            let mut guard = shared.arbitration.lock();
            let arbitration = &mut *guard;
            let removed = arbitration
                .monitor
                .on_peer_owner_changed(&mut arbitration.manager, &change);
            // counted under the lock so snapshots and metrics agree
            shared.metrics.force_removals.fetch_add(removed as u64, Ordering::Relaxed);
        }
        debug!("departure stream closed");
    }

    async fn handle_peer<S>(
        mut conn: LbsConnection<S>,
        mut session: PeerSession,
        shared: &Shared,
        departures: &mpsc::UnboundedSender<NameOwnerChanged>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer_id = session.peer_id;
        // Off unless configured: an idle client still owns its references.
        let idle = shared
            .config
            .server
            .idle_timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);
        let mut idle_deadline = idle.map(|d| Instant::now() + d);
        let mut signals = shared.signals.subscribe();
        let mut signals_open = true;
        debug!(peer_id, "client connected");

        loop {
            let frame = tokio::select! {
                result = conn.recv_frame() => result,
                signal = signals.recv(), if signals_open => {
                    match signal {
                        Ok(msg) if session.is_registered() => {
                            if let Err(e) = conn.signal(&msg).await {
                                error!(peer_id, "write error: {}", e);
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(peer_id, "client missed {} status signal(s)", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => signals_open = false,
                    }
                    continue;
                }
                _ = idle_expired(idle_deadline) => {
                    let secs = idle.map(|d| d.as_secs()).unwrap_or_default();
                    warn!(peer_id, "client idle timeout ({}s), disconnecting", secs);
                    break;
                }
                _ = shutdown_rx.changed() => {
                    debug!(peer_id, "closing connection for shutdown");
                    break;
                }
            };
            idle_deadline = idle.map(|d| Instant::now() + d);

            let (serial, reply) = match frame {
                Ok(frame) if frame.header.delivery() != Delivery::Call => {
                    warn!(peer_id, "ignoring {} sent by a client", frame.message.kind());
                    continue;
                }
                Ok(frame) => (
                    frame.header.serial,
                    Self::handle_message(shared, &mut session, frame.message),
                ),
                Err(TransportError::ConnectionClosed) => {
                    debug!(peer_id, "client disconnected");
                    break;
                }
                Err(TransportError::BadPayload { serial, source }) => {
                    error!(peer_id, "decode error: {}", source);
                    (serial, Message::Error(ProtocolError::SerializationError(source.to_string())))
                }
                Err(e) => {
                    error!(peer_id, "connection error: {}", e);
                    break;
                }
            };

            let close = matches!(reply, Message::Error(ProtocolError::VersionMismatch { .. }));
            if let Err(e) = conn.reply(serial, &reply).await {
                error!(peer_id, "write error: {}", e);
                break;
            }
            if close {
                break;
            }
        }

        if session.is_registered() {
            shared.peers.remove(&peer_id);
            let change = NameOwnerChanged::departure(&shared.config.bus, session.unique_name());
            if departures.send(change).is_err() {
                warn!(peer_id, "crash monitor gone, departure of {} dropped", session.unique_name());
            }
        }
        debug!(peer_id, "client session ended");
    }

    /// Process a single message and return the reply.
    fn handle_message(shared: &Shared, session: &mut PeerSession, msg: Message) -> Message {
        shared.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

        match msg {
            Message::Hello {
                protocol_version,
                name,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        peer_id = session.peer_id,
                        "'{}' speaks protocol v{}, expected v{}", name, protocol_version, PROTOCOL_VERSION
                    );
                    return Message::Error(ProtocolError::VersionMismatch {
                        server: PROTOCOL_VERSION,
                        client: protocol_version,
                    });
                }
                if session.is_registered() {
                    return Message::Welcome {
                        unique_name: session.unique_name().to_string(),
                    };
                }
                let unique_name = session.register(name).to_string();
                shared.peers.insert(session.peer_id, unique_name.clone());
                info!(
                    peer_id = session.peer_id,
                    client = %unique_name,
                    "Hello from '{}'",
                    session.client_name().unwrap_or_default()
                );
                Message::Welcome { unique_name }
            }

            Message::Ping => Message::Pong,

            _ if !session.is_registered() => {
                debug!(peer_id = session.peer_id, "call before Hello");
                Message::Error(ProtocolError::NotRegistered)
            }

            Message::AddReference { method } => {
                let result = shared
                    .arbitration
                    .lock()
                    .manager
                    .add_reference_raw(session.unique_name(), method)
                    .map(|_| ());
                Self::ack(shared, result)
            }

            Message::RemoveReference { method } => {
                let result = shared
                    .arbitration
                    .lock()
                    .manager
                    .remove_reference_raw(session.unique_name(), method)
                    .map(|_| ());
                Self::ack(shared, result)
            }

            Message::RequestInterval {
                method,
                interval_ms,
            } => {
                let result = shared
                    .arbitration
                    .lock()
                    .manager
                    .request_interval_raw(session.unique_name(), method, interval_ms)
                    .map(|_| ());
                Self::ack(shared, result)
            }

            Message::GetProviderInfo => Message::ProviderInfo {
                name: shared.config.server.name.clone(),
                description: shared.config.server.description.clone(),
            },

            Message::GetStatus => Message::Status {
                status: shared.status.load(Ordering::Relaxed),
            },

            Message::QueryState => {
                Message::StateSnapshot(shared.arbitration.lock().manager.snapshot())
            }

            other => {
                warn!(peer_id = session.peer_id, "unhandled message type {}", other.kind());
                Message::Error(ProtocolError::UnsupportedMessage(other.kind().to_string()))
            }
        }
    }

    fn ack(shared: &Shared, result: Result<(), ArbiterError>) -> Message {
        match result {
            Ok(()) => Message::Ack,
            Err(e) => {
                shared.metrics.parameter_errors.fetch_add(1, Ordering::Relaxed);
                debug!("call rejected: {}", e);
                Message::Error(e.into())
            }
        }
    }
}

async fn idle_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        )
        .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => { info!("received Ctrl+C, initiating shutdown"); }
            _ = sigterm.recv() => { info!("received SIGTERM, initiating shutdown"); }
        }
    }

    #[cfg(not(unix))]
    {
        if ctrl_c.await.is_err() {
            error!("failed to listen for Ctrl+C");
        }
        info!("received Ctrl+C, initiating shutdown");
    }
}
